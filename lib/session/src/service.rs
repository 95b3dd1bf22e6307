//! Typed calls to the backend's authentication endpoints.

use crate::error::AuthError;
use crate::user::{ProfileUpdate, UserProfile};
use crate::validation::{Credentials, PasswordChange, Registration};
use reqwest::StatusCode;
use rootcause::prelude::Report;
use serde::Deserialize;
use serde_json::{Value, json};
use stockroom_gateway::{GatewayClient, GatewayError, RequestOptions};
use tracing::instrument;

pub const LOGIN_PATH: &str = "/auth/login/";
pub const REGISTER_PATH: &str = "/auth/register/";
pub const LOGOUT_PATH: &str = "/auth/logout/";
pub const PROFILE_PATH: &str = "/auth/profile/";
pub const CHANGE_PASSWORD_PATH: &str = "/auth/cambiar-contrasena/";

/// Tokens and profile returned by a successful login or registration.
#[derive(Clone, Deserialize)]
pub struct AuthGrant {
    #[serde(rename = "usuario", alias = "user")]
    pub user: UserProfile,
    #[serde(rename = "access", alias = "access_token")]
    pub access_token: String,
    #[serde(rename = "refresh", alias = "refresh_token")]
    pub refresh_token: String,
}

impl std::fmt::Debug for AuthGrant {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AuthGrant")
            .field("user", &self.user)
            .finish_non_exhaustive()
    }
}

/// The operation a gateway failure happened in, for message selection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Operation {
    Login,
    Register,
    Logout,
    FetchProfile,
    UpdateProfile,
    ChangePassword,
}

impl Operation {
    fn default_message(self) -> &'static str {
        match self {
            Self::Login => "Login failed",
            Self::Register => "Registration failed",
            Self::Logout => "Logout failed",
            Self::FetchProfile => "Could not load profile",
            Self::UpdateProfile => "Could not update profile",
            Self::ChangePassword => "Could not change password",
        }
    }

    /// Whether the operation is sent without a stored credential, so a 401
    /// refuses the submitted credentials rather than the session.
    fn is_anonymous(self) -> bool {
        matches!(self, Self::Login | Self::Register)
    }

    /// Whether a 400 means the submitted credentials or details were refused.
    fn submits_credentials(self) -> bool {
        matches!(self, Self::Login | Self::Register | Self::ChangePassword)
    }

    fn returns_profile(self) -> bool {
        matches!(self, Self::FetchProfile | Self::UpdateProfile)
    }
}

/// Classifies a gateway failure and layers an [`AuthError`] on top of it.
fn auth_failure(report: Report<GatewayError>, operation: Operation) -> Report<AuthError> {
    let gateway_error = report.current_context();
    let message = gateway_error
        .detail()
        .unwrap_or(operation.default_message())
        .to_string();

    let error = match gateway_error {
        GatewayError::Unauthorized { .. } if operation.is_anonymous() => {
            AuthError::CredentialsRejected { message }
        }
        GatewayError::Unauthorized { .. } | GatewayError::RefreshFailed { .. } => {
            AuthError::NotAuthenticated
        }
        GatewayError::Status { status, .. }
            if *status == StatusCode::BAD_REQUEST && operation.submits_credentials() =>
        {
            AuthError::CredentialsRejected { message }
        }
        GatewayError::Decode { details } if operation.returns_profile() => {
            AuthError::InvalidProfile {
                details: details.clone(),
            }
        }
        _ => AuthError::RequestFailed { message },
    };

    report.context(error)
}

/// Thin client for the authentication endpoints.
#[derive(Debug, Clone)]
pub struct AuthService {
    gateway: GatewayClient,
}

impl AuthService {
    /// Creates the service over the shared gateway.
    #[must_use]
    pub fn new(gateway: GatewayClient) -> Self {
        Self { gateway }
    }

    /// Returns the gateway this service sends through.
    #[must_use]
    pub fn gateway(&self) -> &GatewayClient {
        &self.gateway
    }

    /// Exchanges credentials for tokens. Sent without any stored credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CredentialsRejected`] if the backend refuses the
    /// credentials, or [`AuthError::RequestFailed`] otherwise.
    #[instrument(skip(self, credentials), fields(email = credentials.email()))]
    pub async fn login(&self, credentials: &Credentials) -> Result<AuthGrant, Report<AuthError>> {
        self.gateway
            .post_with(LOGIN_PATH, credentials, RequestOptions::new().anonymous())
            .await
            .map_err(|e| auth_failure(e, Operation::Login))
    }

    /// Creates an account and signs it in. Sent without any stored credential.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CredentialsRejected`] if the backend refuses the
    /// account details, or [`AuthError::RequestFailed`] otherwise.
    #[instrument(skip(self, registration), fields(email = registration.email()))]
    pub async fn register(
        &self,
        registration: &Registration,
    ) -> Result<AuthGrant, Report<AuthError>> {
        self.gateway
            .post_with(
                REGISTER_PATH,
                &registration.body(),
                RequestOptions::new().anonymous(),
            )
            .await
            .map_err(|e| auth_failure(e, Operation::Register))
    }

    /// Asks the backend to invalidate `refresh_token`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend could not be notified.
    #[instrument(skip_all)]
    pub async fn logout(&self, refresh_token: &str) -> Result<(), Report<AuthError>> {
        self.gateway
            .post::<_, Value>(LOGOUT_PATH, &json!({ "refresh_token": refresh_token }))
            .await
            .map(drop)
            .map_err(|e| auth_failure(e, Operation::Logout))
    }

    /// Fetches the current user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotAuthenticated`] if the session was rejected,
    /// [`AuthError::InvalidProfile`] if the profile could not be read, or
    /// [`AuthError::RequestFailed`] otherwise.
    #[instrument(skip(self))]
    pub async fn fetch_profile(&self) -> Result<UserProfile, Report<AuthError>> {
        self.gateway
            .get(PROFILE_PATH)
            .await
            .map_err(|e| auth_failure(e, Operation::FetchProfile))
    }

    /// Applies `changes` to the current user's profile.
    ///
    /// # Errors
    ///
    /// See [`AuthService::fetch_profile`].
    #[instrument(skip(self))]
    pub async fn update_profile(
        &self,
        changes: &ProfileUpdate,
    ) -> Result<UserProfile, Report<AuthError>> {
        self.gateway
            .put(PROFILE_PATH, changes)
            .await
            .map_err(|e| auth_failure(e, Operation::UpdateProfile))
    }

    /// Replaces the current user's password.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::CredentialsRejected`] if the backend refuses the
    /// current password or the new one.
    #[instrument(skip_all)]
    pub async fn change_password(&self, change: &PasswordChange) -> Result<(), Report<AuthError>> {
        self.gateway
            .post::<_, Value>(CHANGE_PASSWORD_PATH, change)
            .await
            .map(drop)
            .map_err(|e| auth_failure(e, Operation::ChangePassword))
    }
}
