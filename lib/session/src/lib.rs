//! Authentication session for the stockroom client.
//!
//! This crate provides:
//! - [`SessionStore`]: the single source of truth for the signed-in user
//! - [`AuthService`]: typed calls to the backend's authentication endpoints
//! - User profile and role types
//! - Pre-flight validation of login, registration and password forms
//! - [`RouteGuard`] for gating screens on the session
//!
//! # Example
//!
//! ```
//! use std::sync::Arc;
//! use stockroom_core::{MemoryStore, SessionVault};
//! use stockroom_gateway::{GatewayClient, GatewayConfig};
//! use stockroom_session::{Role, RouteDecision, RouteGuard, RouteRequirement, SessionStore};
//!
//! let vault = SessionVault::new(Arc::new(MemoryStore::new()));
//! let gateway = GatewayClient::new(&GatewayConfig::default(), vault).unwrap();
//! let session = SessionStore::new(gateway).unwrap();
//!
//! assert!(!session.is_authenticated());
//! assert!(!session.has_role(Role::Administrator));
//! assert_eq!(
//!     RouteGuard::check(&session, RouteRequirement::Authenticated),
//!     RouteDecision::RedirectToLogin
//! );
//! ```

pub mod error;
pub mod guard;
pub mod service;
pub mod store;
pub mod token;
pub mod user;
pub mod validation;

pub use error::{AuthError, TokenError};
pub use guard::{RouteDecision, RouteGuard, RouteRequirement};
pub use service::{AuthGrant, AuthService};
pub use store::{SessionPhase, SessionSnapshot, SessionStore};
pub use user::{ProfileUpdate, Role, UserProfile};
pub use validation::{Credentials, PasswordChange, Registration};
