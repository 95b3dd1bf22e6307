//! Authenticated API gateway for the stockroom client.
//!
//! This crate provides:
//! - [`GatewayClient`]: the single point of outbound HTTP communication
//! - A middleware pipeline that attaches the stored bearer token and
//!   transparently recovers from an expired access token once per request
//! - [`SessionEvent`] notifications when the durable session is refreshed or
//!   terminated beneath the caller

pub mod client;
pub mod config;
pub mod error;
pub mod events;
pub mod middleware;
pub mod transport;

#[cfg(any(test, feature = "testing"))]
pub mod testing;

pub use client::{GatewayClient, RequestOptions};
pub use config::GatewayConfig;
pub use error::GatewayError;
pub use events::{SessionEvent, TerminationReason};
pub use middleware::{BearerAuth, Middleware, Next, REFRESH_PATH, RefreshOnUnauthorized};
pub use transport::{ApiRequest, ApiResponse, ReqwestTransport, Transport};
