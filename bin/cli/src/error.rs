//! Errors surfaced by the command-line client.

use std::fmt;

/// Command failures.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum CliError {
    /// Configuration could not be loaded.
    Config { details: String },
    /// The client could not be set up.
    Setup { details: String },
    /// A session operation failed; `message` is the user-facing text.
    Session { message: String },
    /// The session does not permit the requested screen.
    Denied { reason: String },
}

impl fmt::Display for CliError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Config { details } => write!(f, "configuration error: {details}"),
            Self::Setup { details } => write!(f, "could not start client: {details}"),
            Self::Session { message } => write!(f, "{message}"),
            Self::Denied { reason } => write!(f, "access denied: {reason}"),
        }
    }
}

impl std::error::Error for CliError {}
