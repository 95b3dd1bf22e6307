//! Request pipeline for the gateway.
//!
//! Cross-cutting request policy is expressed as an explicit chain of
//! [`Middleware`] wrapping the [`Transport`]. The gateway installs:
//!
//! 1. [`BearerAuth`]: attaches the stored access token
//! 2. [`RefreshOnUnauthorized`]: exchanges the refresh token and re-dispatches
//!    once when an authenticated request is rejected with 401

use crate::error::GatewayError;
use crate::events::{SessionEvent, TerminationReason};
use crate::transport::{ApiRequest, ApiResponse, Transport};
use async_trait::async_trait;
use reqwest::header::AUTHORIZATION;
use reqwest::{Method, StatusCode};
use rootcause::prelude::Report;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use stockroom_core::SessionVault;
use tokio::sync::broadcast;
use tracing::{debug, info, warn};

/// Refresh endpoint, relative to the base endpoint.
pub const REFRESH_PATH: &str = "/auth/token/refresh/";

/// One stage of the request pipeline.
#[async_trait]
pub trait Middleware: Send + Sync {
    /// Handles `request`, delegating to `next` zero or more times.
    async fn handle(
        &self,
        request: ApiRequest,
        next: Next<'_>,
    ) -> Result<ApiResponse, Report<GatewayError>>;
}

/// The remainder of the pipeline after the current middleware.
#[derive(Clone, Copy)]
pub struct Next<'a> {
    transport: &'a dyn Transport,
    middleware: &'a [Arc<dyn Middleware>],
}

impl<'a> Next<'a> {
    /// Creates a cursor at the start of `middleware`, ending at `transport`.
    #[must_use]
    pub fn new(transport: &'a dyn Transport, middleware: &'a [Arc<dyn Middleware>]) -> Self {
        Self {
            transport,
            middleware,
        }
    }

    /// Runs the rest of the pipeline.
    ///
    /// # Errors
    ///
    /// Returns whatever error the remaining stages produce.
    pub async fn run(self, request: ApiRequest) -> Result<ApiResponse, Report<GatewayError>> {
        match self.middleware.split_first() {
            Some((current, rest)) => {
                current
                    .handle(request, Next::new(self.transport, rest))
                    .await
            }
            None => self.transport.send(&request).await,
        }
    }
}

/// Attaches the stored access token as a bearer credential.
///
/// Requests that already carry an `Authorization` header, or that are marked
/// anonymous, pass through unchanged, as do requests made while no token is
/// stored.
#[derive(Debug, Clone)]
pub struct BearerAuth {
    vault: SessionVault,
}

impl BearerAuth {
    /// Creates the middleware over the given vault.
    #[must_use]
    pub fn new(vault: SessionVault) -> Self {
        Self { vault }
    }
}

#[async_trait]
impl Middleware for BearerAuth {
    async fn handle(
        &self,
        mut request: ApiRequest,
        next: Next<'_>,
    ) -> Result<ApiResponse, Report<GatewayError>> {
        if !request.is_anonymous() && request.header(AUTHORIZATION.as_str()).is_none() {
            let token = self.vault.access_token().map_err(|e| GatewayError::Storage {
                details: e.to_string(),
            })?;
            if let Some(token) = token {
                request.set_bearer_token(&token);
            }
        }
        next.run(request).await
    }
}

#[derive(Deserialize)]
struct RefreshResponse {
    #[serde(alias = "access_token")]
    access: String,
}

/// Recovers from an expired access token once per request.
///
/// When an authenticated request comes back 401 and has not been retried, the
/// stored refresh token is exchanged for a new access token through the raw
/// transport, and the request is re-dispatched exactly once with the new
/// token. If the exchange fails, or the re-dispatched request is rejected
/// again, the durable session is cleared and [`SessionEvent::Terminated`] is
/// broadcast before the outcome is returned.
///
/// Concurrent requests refresh independently.
#[derive(Clone)]
pub struct RefreshOnUnauthorized {
    vault: SessionVault,
    transport: Arc<dyn Transport>,
    events: broadcast::Sender<SessionEvent>,
}

impl RefreshOnUnauthorized {
    /// Creates the middleware.
    ///
    /// `transport` must be the raw transport so the refresh call is never
    /// itself subject to this policy.
    #[must_use]
    pub fn new(
        vault: SessionVault,
        transport: Arc<dyn Transport>,
        events: broadcast::Sender<SessionEvent>,
    ) -> Self {
        Self {
            vault,
            transport,
            events,
        }
    }

    async fn refresh_access_token(&self) -> Result<String, (TerminationReason, Report<GatewayError>)> {
        let refresh_token = match self.vault.refresh_token() {
            Ok(Some(token)) => token,
            Ok(None) => {
                return Err((
                    TerminationReason::MissingRefreshToken,
                    GatewayError::RefreshFailed {
                        reason: "no refresh token stored".to_string(),
                    }
                    .into(),
                ));
            }
            Err(e) => {
                return Err((
                    TerminationReason::MissingRefreshToken,
                    GatewayError::RefreshFailed {
                        reason: format!("refresh token unreadable: {e}"),
                    }
                    .into(),
                ));
            }
        };

        let request =
            ApiRequest::new(Method::POST, REFRESH_PATH).with_body(json!({ "refresh": refresh_token }));

        let failed = |reason: String| -> (TerminationReason, Report<GatewayError>) {
            (
                TerminationReason::RefreshFailed,
                GatewayError::RefreshFailed { reason }.into(),
            )
        };

        let response = self
            .transport
            .send(&request)
            .await
            .map_err(|e| failed(e.to_string()))?;

        if !response.status().is_success() {
            let reason = match response.detail() {
                Some(detail) => format!("refresh endpoint returned {}: {detail}", response.status()),
                None => format!("refresh endpoint returned {}", response.status()),
            };
            return Err(failed(reason));
        }

        let refreshed: RefreshResponse = serde_json::from_value(response.into_body())
            .map_err(|e| failed(format!("malformed refresh response: {e}")))?;

        self.vault
            .store_access_token(&refreshed.access)
            .map_err(|e| failed(format!("failed to store refreshed token: {e}")))?;

        Ok(refreshed.access)
    }

    fn terminate(&self, reason: TerminationReason) {
        if let Err(e) = self.vault.clear() {
            warn!(error = %e, "failed to clear durable session");
        }
        info!(?reason, "session terminated");
        // No subscribers is fine: there is nothing in memory to reset.
        let _ = self.events.send(SessionEvent::Terminated { reason });
    }
}

#[async_trait]
impl Middleware for RefreshOnUnauthorized {
    async fn handle(
        &self,
        mut request: ApiRequest,
        next: Next<'_>,
    ) -> Result<ApiResponse, Report<GatewayError>> {
        let response = next.run(request.clone()).await?;

        if response.status() != StatusCode::UNAUTHORIZED || request.bearer_token().is_none() {
            return Ok(response);
        }

        request.mark_retried();
        debug!(path = request.path(), "access token rejected, refreshing");

        let access_token = match self.refresh_access_token().await {
            Ok(token) => token,
            Err((reason, report)) => {
                self.terminate(reason);
                return Err(report);
            }
        };
        let _ = self.events.send(SessionEvent::TokenRefreshed);

        request.set_bearer_token(&access_token);
        let retried = next.run(request).await?;

        if retried.status() == StatusCode::UNAUTHORIZED {
            self.terminate(TerminationReason::RetryRejected);
        }
        Ok(retried)
    }
}
