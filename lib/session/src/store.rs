//! The session store.
//!
//! [`SessionStore`] is the single source of truth for whether this client is
//! authenticated. It keeps an in-memory copy of the durable session and
//! rewrites durable storage in the same operation as every change to the
//! tokens or the user, so a restart reconstructs the same state.
//!
//! # Phases
//!
//! ```text
//! Anonymous --login/register--> Authenticating --ok--> Authenticated
//!                                     |                     |
//!                                   error          logout / expiry /
//!                                     v             gateway termination
//!                        Anonymous (last_error set) <-------+
//! ```

use crate::error::AuthError;
use crate::service::{AuthGrant, AuthService};
use crate::token;
use crate::user::{ProfileUpdate, Role, UserProfile};
use crate::validation::{self, Credentials, PasswordChange, Registration};
use chrono::{DateTime, Utc};
use rootcause::prelude::Report;
use std::sync::{Arc, Mutex, MutexGuard};
use stockroom_core::{SessionVault, StorageError};
use stockroom_gateway::{GatewayClient, SessionEvent};
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, info, instrument, warn};

/// Where the session is in its lifecycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionPhase {
    /// No usable session. `last_error` may describe the last failed attempt.
    Anonymous,
    /// A login or registration is in flight.
    Authenticating,
    /// An access token that is not known to be expired is held.
    Authenticated,
}

/// A point-in-time view of the session for display.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionSnapshot {
    pub phase: SessionPhase,
    pub user: Option<UserProfile>,
    pub is_authenticated: bool,
    pub is_loading: bool,
    pub last_error: Option<String>,
    /// Expiry of the held access token, when it can be read locally.
    pub expires_at: Option<DateTime<Utc>>,
    pub has_refresh_token: bool,
}

#[derive(Default)]
struct State {
    access_token: Option<String>,
    refresh_token: Option<String>,
    user: Option<UserProfile>,
    authenticating: bool,
    loading: bool,
    last_error: Option<String>,
}

impl State {
    fn is_authenticated(&self, now: DateTime<Utc>) -> bool {
        self.user.is_some()
            && self
                .access_token
                .as_deref()
                .is_some_and(|token| !token::is_known_expired(token, now))
    }

    fn drop_session(&mut self) {
        self.access_token = None;
        self.refresh_token = None;
        self.user = None;
    }
}

struct Inner {
    auth: AuthService,
    vault: SessionVault,
    state: Mutex<State>,
    events: Mutex<broadcast::Receiver<SessionEvent>>,
}

/// Authentication session shared by every part of the client.
///
/// Cloning is cheap; clones share one session.
#[derive(Clone)]
pub struct SessionStore {
    inner: Arc<Inner>,
}

impl std::fmt::Debug for SessionStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("SessionStore").finish_non_exhaustive()
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
}

fn storage_failure(report: Report<StorageError>) -> Report<AuthError> {
    let details = report.current_context().to_string();
    report.context(AuthError::Storage { details })
}

impl SessionStore {
    /// Creates the store over `gateway`, restoring any durable session.
    ///
    /// A durable session is restored only when the access token, refresh
    /// token and user are all present and the user can be read; anything
    /// less is cleared.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Storage`] if durable storage cannot be read.
    pub fn new(gateway: GatewayClient) -> Result<Self, Report<AuthError>> {
        let vault = gateway.vault().clone();
        let events = gateway.subscribe();
        let state = hydrate(&vault)?;

        Ok(Self {
            inner: Arc::new(Inner {
                auth: AuthService::new(gateway),
                vault,
                state: Mutex::new(state),
                events: Mutex::new(events),
            }),
        })
    }

    fn state(&self) -> MutexGuard<'_, State> {
        lock(&self.inner.state)
    }

    /// Applies session changes the gateway made beneath this store.
    fn sync(&self) {
        let mut events = lock(&self.inner.events);
        loop {
            match events.try_recv() {
                Ok(SessionEvent::Terminated { reason }) => {
                    info!(?reason, "session ended by gateway");
                    self.state().drop_session();
                }
                Ok(SessionEvent::TokenRefreshed) => self.reload_access_token(),
                Err(TryRecvError::Lagged(missed)) => {
                    debug!(missed, "session events lagged, reloading from storage");
                    self.reload_access_token();
                }
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
    }

    fn reload_access_token(&self) {
        match self.inner.vault.access_token() {
            Ok(Some(token)) => self.state().access_token = Some(token),
            Ok(None) => self.state().drop_session(),
            Err(e) => warn!(error = %e, "failed to reload access token"),
        }
    }

    /// Drops the in-memory session unless durable storage still holds it.
    fn reconcile_with_vault(&self) {
        let stored = self.inner.vault.load();
        let mut state = self.state();
        let kept = stored.is_ok_and(|stored| {
            stored.is_complete()
                && stored.access_token == state.access_token
                && stored.refresh_token == state.refresh_token
        });
        if !kept && state.access_token.is_some() {
            warn!("durable session lost, dropping in-memory session");
            state.drop_session();
        }
    }

    /// Clears the durable and in-memory session. Never fails.
    fn end_session(&self) {
        if let Err(e) = self.inner.vault.clear() {
            warn!(error = %e, "failed to clear durable session");
        }
        let mut state = self.state();
        state.drop_session();
        state.authenticating = false;
        state.loading = false;
    }

    fn begin(&self, authenticating: bool) {
        let mut state = self.state();
        state.last_error = None;
        state.loading = true;
        state.authenticating = authenticating;
    }

    fn fail(&self, report: Report<AuthError>) -> Report<AuthError> {
        let mut state = self.state();
        state.last_error = Some(report.current_context().message());
        state.loading = false;
        state.authenticating = false;
        report
    }

    fn reject(&self, error: AuthError) -> Report<AuthError> {
        self.fail(error.into())
    }

    /// Signs in with `credentials`.
    ///
    /// On failure the previous session, if any, is left as it was.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] without contacting the backend if the
    /// credentials are incomplete; otherwise whatever the backend refused.
    #[instrument(skip(self, credentials), fields(email = credentials.email()))]
    pub async fn login(&self, credentials: Credentials) -> Result<SessionSnapshot, Report<AuthError>> {
        self.begin(true);
        credentials.validate().map_err(|e| self.reject(e))?;

        let grant = self
            .inner
            .auth
            .login(&credentials)
            .await
            .map_err(|e| self.fail(e))?;
        self.establish(grant)?;

        let snapshot = self.snapshot();
        info!(role = ?snapshot.user.as_ref().map(UserProfile::role), "signed in");
        Ok(snapshot)
    }

    /// Creates an account and signs it in.
    ///
    /// # Errors
    ///
    /// Same as [`SessionStore::login`].
    #[instrument(skip(self, registration), fields(email = registration.email()))]
    pub async fn register(
        &self,
        registration: Registration,
    ) -> Result<SessionSnapshot, Report<AuthError>> {
        self.begin(true);
        registration.validate().map_err(|e| self.reject(e))?;

        let grant = self
            .inner
            .auth
            .register(&registration)
            .await
            .map_err(|e| self.fail(e))?;
        self.establish(grant)?;

        info!("account registered");
        Ok(self.snapshot())
    }

    fn establish(&self, grant: AuthGrant) -> Result<(), Report<AuthError>> {
        let user_json = serde_json::to_string(&grant.user).map_err(|e| {
            self.reject(AuthError::InvalidProfile {
                details: e.to_string(),
            })
        })?;

        if let Err(e) = self.inner.vault.store_session(
            &grant.access_token,
            &grant.refresh_token,
            &user_json,
        ) {
            self.reconcile_with_vault();
            return Err(self.fail(storage_failure(e)));
        }

        // Drop notifications about the session this one replaces.
        let mut events = lock(&self.inner.events);
        *events = events.resubscribe();

        let mut state = self.state();
        state.access_token = Some(grant.access_token);
        state.refresh_token = Some(grant.refresh_token);
        state.user = Some(grant.user);
        state.authenticating = false;
        state.loading = false;
        Ok(())
    }

    /// Signs out.
    ///
    /// The backend is asked to invalidate the refresh token on a best-effort
    /// basis; the local session is cleared regardless of the outcome.
    #[instrument(skip(self))]
    pub async fn logout(&self) {
        self.sync();
        let refresh_token = self.state().refresh_token.clone();

        if let Some(refresh_token) = refresh_token
            && let Err(e) = self.inner.auth.logout(&refresh_token).await
        {
            warn!(error = %e, "failed to notify backend of logout");
        }

        self.end_session();
        info!("signed out");
    }

    /// Reloads the user's profile from the backend, leaving the tokens alone.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::NotAuthenticated`] if there is no session or the
    /// backend no longer accepts it.
    #[instrument(skip(self))]
    pub async fn refresh_profile(&self) -> Result<UserProfile, Report<AuthError>> {
        self.sync();
        if !self.is_authenticated() {
            return Err(self.reject(AuthError::NotAuthenticated));
        }
        self.state().last_error = None;

        let result = self.inner.auth.fetch_profile().await;
        self.sync();
        let profile = result.map_err(|e| self.fail(e))?;

        self.store_profile(profile)
    }

    /// Applies `changes` to the user's profile.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] without contacting the backend if a
    /// changed field is invalid or nothing would change.
    #[instrument(skip(self))]
    pub async fn update_profile(
        &self,
        changes: ProfileUpdate,
    ) -> Result<UserProfile, Report<AuthError>> {
        self.sync();
        if !self.is_authenticated() {
            return Err(self.reject(AuthError::NotAuthenticated));
        }
        self.begin(false);

        if changes.is_empty() {
            return Err(self.reject(AuthError::validation("profile", "Nothing to update")));
        }
        if let Some(display_name) = changes.display_name_value() {
            validation::check_display_name(display_name).map_err(|e| self.reject(e))?;
        }
        if let Some(email) = changes.email_value() {
            validation::check_email(email).map_err(|e| self.reject(e))?;
        }

        let result = self.inner.auth.update_profile(&changes).await;
        self.sync();
        let profile = result.map_err(|e| self.fail(e))?;

        let profile = self.store_profile(profile)?;
        self.state().loading = false;
        Ok(profile)
    }

    fn store_profile(&self, profile: UserProfile) -> Result<UserProfile, Report<AuthError>> {
        let user_json = serde_json::to_string(&profile).map_err(|e| {
            self.reject(AuthError::InvalidProfile {
                details: e.to_string(),
            })
        })?;

        // The gateway may have ended the session while the request was out.
        if self.state().access_token.is_none() {
            return Err(self.reject(AuthError::NotAuthenticated));
        }
        self.inner
            .vault
            .store_user(&user_json)
            .map_err(|e| self.fail(storage_failure(e)))?;

        self.state().user = Some(profile.clone());
        Ok(profile)
    }

    /// Replaces the user's password. The session itself is unchanged.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] without contacting the backend if the
    /// change is incomplete; otherwise whatever the backend refused.
    #[instrument(skip_all)]
    pub async fn change_password(&self, change: PasswordChange) -> Result<(), Report<AuthError>> {
        self.sync();
        if !self.is_authenticated() {
            return Err(self.reject(AuthError::NotAuthenticated));
        }
        self.state().last_error = None;
        change.validate().map_err(|e| self.reject(e))?;

        let result = self.inner.auth.change_password(&change).await;
        self.sync();
        result.map_err(|e| self.fail(e))?;

        info!("password changed");
        Ok(())
    }

    /// Checks the held access token locally, without contacting the backend.
    ///
    /// Returns false, and clears the session, if there is no access token, it
    /// cannot be decoded, or its expiry is not in the future.
    pub fn is_session_valid(&self) -> bool {
        self.sync();
        let access_token = self.state().access_token.clone();

        let reason = match access_token.as_deref().map(token::expires_at) {
            None => "no access token",
            Some(Err(_)) => "access token cannot be decoded",
            Some(Ok(exp)) if exp <= Utc::now() => "access token expired",
            Some(Ok(_)) => return true,
        };

        if access_token.is_some() {
            info!(reason, "session no longer valid");
        }
        self.end_session();
        false
    }

    /// Returns true if the current user has `role`. False when signed out.
    #[must_use]
    pub fn has_role(&self, role: Role) -> bool {
        self.sync();
        self.state().user.as_ref().is_some_and(|u| u.role() == role)
    }

    /// Clears the last error.
    pub fn clear_error(&self) {
        self.state().last_error = None;
    }

    /// Returns true if an access token that is not known to be expired is held.
    #[must_use]
    pub fn is_authenticated(&self) -> bool {
        self.sync();
        self.state().is_authenticated(Utc::now())
    }

    /// Returns true while a login, registration or profile update is in flight.
    #[must_use]
    pub fn is_loading(&self) -> bool {
        self.state().loading
    }

    /// Returns the message of the most recent failed operation.
    #[must_use]
    pub fn last_error(&self) -> Option<String> {
        self.state().last_error.clone()
    }

    /// Returns the current user, if signed in.
    #[must_use]
    pub fn user(&self) -> Option<UserProfile> {
        self.sync();
        self.state().user.clone()
    }

    /// Returns where the session is in its lifecycle.
    #[must_use]
    pub fn phase(&self) -> SessionPhase {
        self.snapshot().phase
    }

    /// Returns a consistent view of the whole session.
    #[must_use]
    pub fn snapshot(&self) -> SessionSnapshot {
        self.sync();
        let state = self.state();
        let is_authenticated = state.is_authenticated(Utc::now());
        let phase = if state.authenticating {
            SessionPhase::Authenticating
        } else if is_authenticated {
            SessionPhase::Authenticated
        } else {
            SessionPhase::Anonymous
        };

        SessionSnapshot {
            phase,
            user: state.user.clone(),
            is_authenticated,
            is_loading: state.loading,
            last_error: state.last_error.clone(),
            expires_at: state
                .access_token
                .as_deref()
                .and_then(|t| token::expires_at(t).ok()),
            has_refresh_token: state.refresh_token.is_some(),
        }
    }

    /// Subscribes to refresh and termination events from the gateway.
    #[must_use]
    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.inner.auth.gateway().subscribe()
    }
}

fn hydrate(vault: &SessionVault) -> Result<State, Report<AuthError>> {
    let stored = vault.load().map_err(storage_failure)?;
    if stored.is_empty() {
        return Ok(State::default());
    }

    if stored.is_complete() {
        let user = stored
            .user
            .as_deref()
            .and_then(|user| serde_json::from_str::<UserProfile>(user).ok());
        if let Some(user) = user {
            debug!("restored durable session");
            return Ok(State {
                access_token: stored.access_token,
                refresh_token: stored.refresh_token,
                user: Some(user),
                ..State::default()
            });
        }
    }

    warn!("discarding incomplete durable session");
    vault.clear().map_err(storage_failure)?;
    Ok(State::default())
}
