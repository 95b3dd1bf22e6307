//! Pre-flight validation of session forms.
//!
//! Every check here runs before any request is sent.

use crate::error::AuthError;
use crate::user::Role;
use serde::Serialize;

/// Minimum password length accepted on registration and password change.
pub const MIN_PASSWORD_LEN: usize = 8;

/// Maximum display name length accepted by the backend.
pub const MAX_DISPLAY_NAME_LEN: usize = 200;

/// Returns true if `email` has the shape `local@domain.tld` with no whitespace.
#[must_use]
pub fn is_well_formed_email(email: &str) -> bool {
    if email.chars().any(char::is_whitespace) {
        return false;
    }
    let Some((local, domain)) = email.split_once('@') else {
        return false;
    };
    if local.is_empty() {
        return false;
    }
    // `\S+@\S+\.\S+`: some dot in the remainder must have text on both sides.
    domain
        .char_indices()
        .filter(|(_, c)| *c == '.')
        .any(|(i, _)| i > 0 && i + 1 < domain.len())
}

pub(crate) fn check_email(email: &str) -> Result<(), AuthError> {
    if email.trim().is_empty() {
        return Err(AuthError::validation("email", "Email is required"));
    }
    if !is_well_formed_email(email) {
        return Err(AuthError::validation("email", "Email is invalid"));
    }
    Ok(())
}

fn check_new_password(field: &str, password: &str) -> Result<(), AuthError> {
    if password.is_empty() {
        return Err(AuthError::validation(field, "Password is required"));
    }
    if password.chars().count() < MIN_PASSWORD_LEN {
        return Err(AuthError::validation(
            field,
            format!("Password must be at least {MIN_PASSWORD_LEN} characters"),
        ));
    }
    Ok(())
}

fn check_confirmation(field: &str, password: &str, confirmation: &str) -> Result<(), AuthError> {
    if confirmation.is_empty() {
        return Err(AuthError::validation(field, "Please confirm the password"));
    }
    if password != confirmation {
        return Err(AuthError::validation(field, "Passwords do not match"));
    }
    Ok(())
}

pub(crate) fn check_display_name(display_name: &str) -> Result<(), AuthError> {
    if display_name.trim().is_empty() {
        return Err(AuthError::validation("display_name", "Name is required"));
    }
    if display_name.chars().count() > MAX_DISPLAY_NAME_LEN {
        return Err(AuthError::validation(
            "display_name",
            format!("Name must be at most {MAX_DISPLAY_NAME_LEN} characters"),
        ));
    }
    Ok(())
}

/// Login credentials.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct Credentials {
    email: String,
    password: String,
}

impl std::fmt::Debug for Credentials {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Credentials")
            .field("email", &self.email)
            .field("password", &"<redacted>")
            .finish()
    }
}

impl Credentials {
    /// Creates login credentials.
    #[must_use]
    pub fn new(email: impl Into<String>, password: impl Into<String>) -> Self {
        Self {
            email: email.into(),
            password: password.into(),
        }
    }

    /// Returns the email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Checks the credentials are complete and the email well-formed.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), AuthError> {
        check_email(&self.email)?;
        if self.password.is_empty() {
            return Err(AuthError::validation("password", "Password is required"));
        }
        Ok(())
    }
}

/// A new account request.
#[derive(Clone, PartialEq, Eq)]
pub struct Registration {
    display_name: String,
    email: String,
    password: String,
    confirmation: String,
    role: Role,
}

impl std::fmt::Debug for Registration {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Registration")
            .field("display_name", &self.display_name)
            .field("email", &self.email)
            .field("role", &self.role)
            .finish_non_exhaustive()
    }
}

/// Registration body as the backend expects it.
#[derive(Serialize)]
pub(crate) struct RegistrationBody<'a> {
    nombre: &'a str,
    email: &'a str,
    password: &'a str,
    rol: Role,
}

impl Registration {
    /// Creates a registration for an external account.
    ///
    /// `confirmation` must repeat `password`.
    #[must_use]
    pub fn new(
        display_name: impl Into<String>,
        email: impl Into<String>,
        password: impl Into<String>,
        confirmation: impl Into<String>,
    ) -> Self {
        Self {
            display_name: display_name.into(),
            email: email.into(),
            password: password.into(),
            confirmation: confirmation.into(),
            role: Role::External,
        }
    }

    /// Requests a different role for the new account.
    #[must_use]
    pub fn with_role(mut self, role: Role) -> Self {
        self.role = role;
        self
    }

    /// Returns the email address.
    #[must_use]
    pub fn email(&self) -> &str {
        &self.email
    }

    /// Returns the requested role.
    #[must_use]
    pub fn role(&self) -> Role {
        self.role
    }

    /// Checks every field, in form order.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), AuthError> {
        check_display_name(&self.display_name)?;
        check_email(&self.email)?;
        check_new_password("password", &self.password)?;
        check_confirmation("confirmation", &self.password, &self.confirmation)
    }

    pub(crate) fn body(&self) -> RegistrationBody<'_> {
        RegistrationBody {
            nombre: self.display_name.trim(),
            email: self.email.trim(),
            password: &self.password,
            rol: self.role,
        }
    }
}

/// A request to replace the current password.
#[derive(Clone, PartialEq, Eq, Serialize)]
pub struct PasswordChange {
    #[serde(rename = "contrasena_actual")]
    current: String,
    #[serde(rename = "contrasena_nueva")]
    new: String,
    #[serde(rename = "confirmar_contrasena_nueva")]
    confirmation: String,
}

impl std::fmt::Debug for PasswordChange {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("PasswordChange { .. }")
    }
}

impl PasswordChange {
    /// Creates a password change. `confirmation` must repeat `new`.
    #[must_use]
    pub fn new(
        current: impl Into<String>,
        new: impl Into<String>,
        confirmation: impl Into<String>,
    ) -> Self {
        Self {
            current: current.into(),
            new: new.into(),
            confirmation: confirmation.into(),
        }
    }

    /// Checks the change is complete and the new password acceptable.
    ///
    /// # Errors
    ///
    /// Returns [`AuthError::Validation`] naming the first offending field.
    pub fn validate(&self) -> Result<(), AuthError> {
        if self.current.is_empty() {
            return Err(AuthError::validation(
                "current_password",
                "Current password is required",
            ));
        }
        check_new_password("new_password", &self.new)?;
        check_confirmation("confirmation", &self.new, &self.confirmation)
    }
}
