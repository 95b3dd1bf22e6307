//! User profile and role types.
//!
//! Field names on the wire follow the backend's schema (`nombre`, `rol`,
//! `activo`, `fecha_creacion`); the Rust side uses English names.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Account role assigned by the backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Role {
    /// Manages companies, products, and stock.
    #[serde(rename = "ADMINISTRADOR")]
    Administrator,
    /// Read-only external account.
    #[serde(rename = "EXTERNO")]
    External,
}

impl Role {
    /// Returns the backend's name for this role.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Administrator => "ADMINISTRADOR",
            Self::External => "EXTERNO",
        }
    }
}

impl fmt::Display for Role {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for Role {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_uppercase().as_str() {
            "ADMINISTRADOR" | "ADMINISTRATOR" | "ADMIN" => Ok(Self::Administrator),
            "EXTERNO" | "EXTERNAL" => Ok(Self::External),
            other => Err(format!("unknown role: {other}")),
        }
    }
}

/// The authenticated user's profile.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UserProfile {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    id: Option<i64>,
    email: String,
    #[serde(rename = "nombre", default)]
    display_name: String,
    #[serde(rename = "rol")]
    role: Role,
    #[serde(rename = "activo", default = "default_active")]
    active: bool,
    #[serde(
        rename = "fecha_creacion",
        default,
        skip_serializing_if = "Option::is_none"
    )]
    created_at: Option<DateTime<Utc>>,
}

fn default_active() -> bool {
    true
}

impl UserProfile {
    /// Creates a profile for a user the backend has not yet assigned an id.
    #[must_use]
    pub fn new(email: impl Into<String>, display_name: impl Into<String>, role: Role) -> Self {
        Self {
            id: None,
            email: email.into(),
            display_name: display_name.into(),
            role,
            active: true,
            created_at: None,
        }
    }

    /// Returns the backend id, if known.
    #[must_use]
    pub fn id(&self) -> Option<i64> {
        self.id
    }

    /// Returns the email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the display name.
    #[must_use]
    pub fn display_name(&self) -> &str {
        &self.display_name
    }

    /// Returns the role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Returns true if the account is active.
    #[must_use]
    pub fn is_active(&self) -> bool {
        self.active
    }

    /// Returns when the account was created, if known.
    #[must_use]
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }
}

/// Changes to apply to the current user's profile.
///
/// Only the fields that are set are sent.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct ProfileUpdate {
    #[serde(rename = "nombre", skip_serializing_if = "Option::is_none")]
    display_name: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    email: Option<String>,
}

impl ProfileUpdate {
    /// Creates an empty update.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Sets the new display name.
    #[must_use]
    pub fn display_name(mut self, display_name: impl Into<String>) -> Self {
        self.display_name = Some(display_name.into());
        self
    }

    /// Sets the new email address.
    #[must_use]
    pub fn email(mut self, email: impl Into<String>) -> Self {
        self.email = Some(email.into());
        self
    }

    pub(crate) fn display_name_value(&self) -> Option<&str> {
        self.display_name.as_deref()
    }

    pub(crate) fn email_value(&self) -> Option<&str> {
        self.email.as_deref()
    }

    /// Returns true if nothing would change.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.display_name.is_none() && self.email.is_none()
    }
}
