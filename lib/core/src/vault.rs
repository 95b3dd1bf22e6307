//! The three durable session fields, kept consistent with each other.
//!
//! The vault is the only writer of `access_token`, `refresh_token` and `user`.
//! Multi-key transitions hold the vault lock for their whole duration, so a
//! concurrent reader never observes a token without its user or vice versa.

use crate::error::{Result, StorageError};
use crate::storage::{ACCESS_TOKEN_KEY, KeyValueStore, REFRESH_TOKEN_KEY, USER_KEY};
use std::fmt;
use std::sync::{Arc, Mutex, MutexGuard};
use tracing::warn;

/// The durable session fields as read in one consistent step.
#[derive(Clone, PartialEq, Eq, Default)]
pub struct StoredSession {
    /// Bearer credential, if stored.
    pub access_token: Option<String>,
    /// Refresh credential, if stored.
    pub refresh_token: Option<String>,
    /// Serialized user profile, if stored.
    pub user: Option<String>,
}

impl StoredSession {
    /// Returns true if none of the fields are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.access_token.is_none() && self.refresh_token.is_none() && self.user.is_none()
    }

    /// Returns true if all three fields are stored.
    #[must_use]
    pub fn is_complete(&self) -> bool {
        self.access_token.is_some() && self.refresh_token.is_some() && self.user.is_some()
    }
}

impl fmt::Debug for StoredSession {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StoredSession")
            .field("access_token", &self.access_token.as_ref().map(|_| "<redacted>"))
            .field("refresh_token", &self.refresh_token.as_ref().map(|_| "<redacted>"))
            .field("user", &self.user)
            .finish()
    }
}

/// Serialized access to the durable session fields.
///
/// Cloning a vault yields a handle to the same store and the same lock.
#[derive(Clone)]
pub struct SessionVault {
    store: Arc<dyn KeyValueStore>,
    lock: Arc<Mutex<()>>,
}

impl fmt::Debug for SessionVault {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SessionVault").finish_non_exhaustive()
    }
}

impl SessionVault {
    /// Creates a vault over the given store.
    #[must_use]
    pub fn new(store: Arc<dyn KeyValueStore>) -> Self {
        Self {
            store,
            lock: Arc::new(Mutex::new(())),
        }
    }

    fn guard(&self) -> MutexGuard<'_, ()> {
        self.lock.lock().unwrap_or_else(|poisoned| poisoned.into_inner())
    }

    /// Returns the stored access token.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn access_token(&self) -> Result<Option<String>, StorageError> {
        let _guard = self.guard();
        self.store.get(ACCESS_TOKEN_KEY)
    }

    /// Returns the stored refresh token.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn refresh_token(&self) -> Result<Option<String>, StorageError> {
        let _guard = self.guard();
        self.store.get(REFRESH_TOKEN_KEY)
    }

    /// Returns the stored serialized user profile.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn user(&self) -> Result<Option<String>, StorageError> {
        let _guard = self.guard();
        self.store.get(USER_KEY)
    }

    /// Reads all three fields in one locked step.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    pub fn load(&self) -> Result<StoredSession, StorageError> {
        let _guard = self.guard();
        self.load_locked()
    }

    fn load_locked(&self) -> Result<StoredSession, StorageError> {
        Ok(StoredSession {
            access_token: self.store.get(ACCESS_TOKEN_KEY)?,
            refresh_token: self.store.get(REFRESH_TOKEN_KEY)?,
            user: self.store.get(USER_KEY)?,
        })
    }

    /// Stores a complete session.
    ///
    /// If any write fails, the session stored before the call is put back.
    /// Should that also fail, all three fields are removed so the store is
    /// left empty rather than partial.
    ///
    /// # Errors
    ///
    /// Returns the first write error.
    pub fn store_session(
        &self,
        access_token: &str,
        refresh_token: &str,
        user: &str,
    ) -> Result<(), StorageError> {
        let _guard = self.guard();
        let previous = self.load_locked()?;
        let written = self
            .store
            .set(ACCESS_TOKEN_KEY, access_token)
            .and_then(|()| self.store.set(REFRESH_TOKEN_KEY, refresh_token))
            .and_then(|()| self.store.set(USER_KEY, user));

        if written.is_err()
            && let Err(e) = self.restore_locked(&previous)
        {
            warn!(error = %e, "failed to restore previous session, clearing");
            let _ = self.clear_locked();
        }
        written
    }

    /// Replaces the access token, leaving the refresh token and user untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn store_access_token(&self, access_token: &str) -> Result<(), StorageError> {
        let _guard = self.guard();
        self.store.set(ACCESS_TOKEN_KEY, access_token)
    }

    /// Replaces the serialized user profile, leaving the tokens untouched.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be written.
    pub fn store_user(&self, user: &str) -> Result<(), StorageError> {
        let _guard = self.guard();
        self.store.set(USER_KEY, user)
    }

    /// Removes all three fields.
    ///
    /// Every removal is attempted even if an earlier one fails.
    ///
    /// # Errors
    ///
    /// Returns the first removal error.
    pub fn clear(&self) -> Result<(), StorageError> {
        let _guard = self.guard();
        self.clear_locked()
    }

    fn restore_locked(&self, session: &StoredSession) -> Result<(), StorageError> {
        for (key, value) in [
            (ACCESS_TOKEN_KEY, &session.access_token),
            (REFRESH_TOKEN_KEY, &session.refresh_token),
            (USER_KEY, &session.user),
        ] {
            match value {
                Some(value) => self.store.set(key, value)?,
                None => self.store.remove(key)?,
            }
        }
        Ok(())
    }

    fn clear_locked(&self) -> Result<(), StorageError> {
        let access = self.store.remove(ACCESS_TOKEN_KEY);
        let refresh = self.store.remove(REFRESH_TOKEN_KEY);
        let user = self.store.remove(USER_KEY);
        access.and(refresh).and(user)
    }
}
