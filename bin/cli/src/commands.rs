//! Command execution.

use crate::cli::Command;
use crate::error::CliError;
use rootcause::prelude::Report;
use std::fmt::Write as _;
use stockroom_session::{
    AuthError, Credentials, PasswordChange, ProfileUpdate, Registration, RouteDecision,
    RouteGuard, RouteRequirement, SessionSnapshot, SessionStore, UserProfile,
};

fn session_failure(report: Report<AuthError>) -> Report<CliError> {
    let message = report.current_context().message();
    report.context(CliError::Session { message })
}

/// Runs `command` against `session`, returning the text to print.
///
/// # Errors
///
/// Returns [`CliError::Session`] if the session operation failed, or
/// [`CliError::Denied`] if a check did not pass.
pub async fn run(session: &SessionStore, command: Command) -> Result<String, Report<CliError>> {
    match command {
        Command::Login { email, password } => {
            let snapshot = session
                .login(Credentials::new(email, password))
                .await
                .map_err(session_failure)?;
            Ok(signed_in(&snapshot))
        }
        Command::Register {
            name,
            email,
            password,
            confirm_password,
            role,
        } => {
            let confirmation = confirm_password.unwrap_or_else(|| password.clone());
            let registration =
                Registration::new(name, email, password, confirmation).with_role(role);
            let snapshot = session
                .register(registration)
                .await
                .map_err(session_failure)?;
            Ok(signed_in(&snapshot))
        }
        Command::Logout => {
            session.logout().await;
            Ok("Signed out".to_string())
        }
        Command::Whoami => Ok(match session.user() {
            Some(user) if session.is_authenticated() => describe_user(&user),
            _ => "Not signed in".to_string(),
        }),
        Command::Status => {
            let valid = session.is_session_valid();
            Ok(describe_status(valid, &session.snapshot()))
        }
        Command::Profile { name, email } => {
            let mut changes = ProfileUpdate::new();
            if let Some(name) = name {
                changes = changes.display_name(name);
            }
            if let Some(email) = email {
                changes = changes.email(email);
            }

            let result = if changes.is_empty() {
                session.refresh_profile().await
            } else {
                session.update_profile(changes).await
            };
            let profile = result.map_err(session_failure)?;
            Ok(describe_user(&profile))
        }
        Command::ChangePassword {
            current,
            new,
            confirm,
        } => {
            let confirmation = confirm.unwrap_or_else(|| new.clone());
            session
                .change_password(PasswordChange::new(current, new, confirmation))
                .await
                .map_err(session_failure)?;
            Ok("Password changed".to_string())
        }
        Command::Check { admin } => {
            let requirement = if admin {
                RouteRequirement::Administrator
            } else {
                RouteRequirement::Authenticated
            };
            match RouteGuard::check(session, requirement) {
                RouteDecision::Allow => Ok("Allowed".to_string()),
                RouteDecision::RedirectToLogin => Err(CliError::Denied {
                    reason: "sign in first".to_string(),
                }
                .into()),
                RouteDecision::RedirectToHome => Err(CliError::Denied {
                    reason: "administrator role required".to_string(),
                }
                .into()),
            }
        }
    }
}

fn signed_in(snapshot: &SessionSnapshot) -> String {
    match &snapshot.user {
        Some(user) => format!("Signed in as {}", describe_user(user)),
        None => "Signed in".to_string(),
    }
}

fn describe_user(user: &UserProfile) -> String {
    let mut out = if user.display_name().is_empty() {
        user.email().to_string()
    } else {
        format!("{} <{}>", user.display_name(), user.email())
    };
    let _ = write!(out, " ({})", user.role());
    if !user.is_active() {
        out.push_str(" [inactive]");
    }
    out
}

fn describe_status(valid: bool, snapshot: &SessionSnapshot) -> String {
    if !valid {
        return "No valid session".to_string();
    }
    let mut out = String::from("Session valid");
    if let Some(user) = &snapshot.user {
        let _ = write!(out, " for {}", describe_user(user));
    }
    if let Some(expires_at) = snapshot.expires_at {
        let _ = write!(out, ", access token expires {}", expires_at.to_rfc3339());
    }
    out
}
