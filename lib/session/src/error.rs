//! Error types for the session crate.
//!
//! Errors are designed for layered context using rootcause:
//! - `AuthError`: failures of session lifecycle operations
//! - `TokenError`: an access token whose claims cannot be read locally

use std::fmt;

/// Errors from session lifecycle operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AuthError {
    /// Input was rejected before any request was sent.
    Validation { field: String, reason: String },
    /// The backend rejected the submitted credentials or account details.
    CredentialsRejected { message: String },
    /// The request failed for any other reason.
    RequestFailed { message: String },
    /// The operation requires an authenticated session.
    NotAuthenticated,
    /// Durable session storage could not be read or written.
    Storage { details: String },
    /// The backend returned a user profile that could not be understood.
    InvalidProfile { details: String },
}

impl AuthError {
    pub(crate) fn validation(field: &str, reason: impl Into<String>) -> Self {
        Self::Validation {
            field: field.to_string(),
            reason: reason.into(),
        }
    }

    /// Returns the human-readable message shown to the user.
    #[must_use]
    pub fn message(&self) -> String {
        match self {
            Self::Validation { reason, .. } => reason.clone(),
            Self::CredentialsRejected { message } | Self::RequestFailed { message } => {
                message.clone()
            }
            Self::NotAuthenticated => "No active session".to_string(),
            Self::Storage { .. } => "Could not save the session on this device".to_string(),
            Self::InvalidProfile { .. } => "The server returned an unreadable profile".to_string(),
        }
    }
}

impl fmt::Display for AuthError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Validation { field, reason } => {
                write!(f, "invalid {field}: {reason}")
            }
            Self::CredentialsRejected { message } => {
                write!(f, "credentials rejected: {message}")
            }
            Self::RequestFailed { message } => {
                write!(f, "request failed: {message}")
            }
            Self::NotAuthenticated => {
                write!(f, "not authenticated")
            }
            Self::Storage { details } => {
                write!(f, "session storage error: {details}")
            }
            Self::InvalidProfile { details } => {
                write!(f, "invalid user profile: {details}")
            }
        }
    }
}

impl std::error::Error for AuthError {}

/// Errors from decoding an access token locally.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TokenError {
    /// The token is not three dot-separated segments.
    Malformed,
    /// The payload segment is not valid base64url JSON.
    InvalidPayload { reason: String },
    /// The payload carries no numeric `exp` claim.
    MissingExpiry,
}

impl fmt::Display for TokenError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Malformed => write!(f, "token is not a JWT"),
            Self::InvalidPayload { reason } => write!(f, "invalid token payload: {reason}"),
            Self::MissingExpiry => write!(f, "token has no expiry claim"),
        }
    }
}

impl std::error::Error for TokenError {}
