//! Command-line arguments.

use clap::{Parser, Subcommand};
use stockroom_session::Role;

#[derive(Debug, Parser)]
#[command(name = "stockroom", version, about = "Sign in to the stockroom inventory backend")]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Sign in and keep the session for later invocations.
    Login {
        #[arg(long)]
        email: String,
        #[arg(long, env = "STOCKROOM_PASSWORD", hide_env_values = true)]
        password: String,
    },
    /// Create an account and sign it in.
    Register {
        #[arg(long)]
        name: String,
        #[arg(long)]
        email: String,
        #[arg(long, env = "STOCKROOM_PASSWORD", hide_env_values = true)]
        password: String,
        /// Repeats the password. Defaults to the password itself.
        #[arg(long, env = "STOCKROOM_PASSWORD_CONFIRMATION", hide_env_values = true)]
        confirm_password: Option<String>,
        #[arg(long, default_value = "EXTERNO")]
        role: Role,
    },
    /// Sign out and forget the session.
    Logout,
    /// Show the signed-in user without contacting the backend.
    Whoami,
    /// Check the stored session locally; an expired session is cleared.
    Status,
    /// Reload the profile from the backend, optionally changing it first.
    Profile {
        #[arg(long)]
        name: Option<String>,
        #[arg(long)]
        email: Option<String>,
    },
    /// Replace the account password.
    ChangePassword {
        #[arg(long, env = "STOCKROOM_PASSWORD", hide_env_values = true)]
        current: String,
        #[arg(long, env = "STOCKROOM_NEW_PASSWORD", hide_env_values = true)]
        new: String,
        #[arg(long, env = "STOCKROOM_NEW_PASSWORD_CONFIRMATION", hide_env_values = true)]
        confirm: Option<String>,
    },
    /// Exit successfully only if the session may open a protected screen.
    Check {
        /// Require the administrator role.
        #[arg(long)]
        admin: bool,
    },
}
