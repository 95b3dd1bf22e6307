//! Error types for the gateway crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `GatewayError`: every failure the gateway surfaces to its callers

use reqwest::StatusCode;
use std::fmt;

/// Errors from gateway requests.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum GatewayError {
    /// The request could not be built from its inputs.
    InvalidRequest { details: String },
    /// The request never produced an HTTP response.
    Network { details: String },
    /// The backend answered with a non-success status other than an
    /// exhausted authorization failure.
    Status {
        status: StatusCode,
        detail: Option<String>,
    },
    /// The backend rejected the credential even after a token refresh.
    Unauthorized { detail: Option<String> },
    /// Exchanging the refresh token for a new access token failed.
    RefreshFailed { reason: String },
    /// The response body did not have the expected shape.
    Decode { details: String },
    /// Durable session storage could not be read or written.
    Storage { details: String },
}

impl GatewayError {
    /// Returns the HTTP status behind this error, if the backend answered.
    #[must_use]
    pub fn status(&self) -> Option<StatusCode> {
        match self {
            Self::Status { status, .. } => Some(*status),
            Self::Unauthorized { .. } => Some(StatusCode::UNAUTHORIZED),
            _ => None,
        }
    }

    /// Returns the server-provided message, if the backend sent one.
    #[must_use]
    pub fn detail(&self) -> Option<&str> {
        match self {
            Self::Status { detail, .. } | Self::Unauthorized { detail } => detail.as_deref(),
            _ => None,
        }
    }
}

impl fmt::Display for GatewayError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidRequest { details } => {
                write!(f, "invalid request: {details}")
            }
            Self::Network { details } => {
                write!(f, "network error: {details}")
            }
            Self::Status { status, detail } => match detail {
                Some(detail) => write!(f, "request failed with {status}: {detail}"),
                None => write!(f, "request failed with {status}"),
            },
            Self::Unauthorized { detail } => match detail {
                Some(detail) => write!(f, "not authorized: {detail}"),
                None => write!(f, "not authorized"),
            },
            Self::RefreshFailed { reason } => {
                write!(f, "token refresh failed: {reason}")
            }
            Self::Decode { details } => {
                write!(f, "unexpected response body: {details}")
            }
            Self::Storage { details } => {
                write!(f, "session storage error: {details}")
            }
        }
    }
}

impl std::error::Error for GatewayError {}
