//! Error handling foundation for the stockroom client.
//!
//! This module provides the `Result` type alias using rootcause and the
//! storage error shared by every crate that touches durable session state.
//! Each crate defines its own domain-specific error types in their own
//! error modules, using rootcause's `.context()` to add layer-appropriate
//! context as errors propagate up the stack.

use rootcause::Report;
use std::fmt;

/// A Result type alias using rootcause's Report for error handling.
///
/// Each layer adds its own context via `.context()` as errors propagate.
pub type Result<T, C = ()> = std::result::Result<T, Report<C>>;

/// Errors from durable storage operations.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum StorageError {
    /// Reading the backing store failed.
    ReadFailed { reason: String },
    /// Writing the backing store failed.
    WriteFailed { reason: String },
    /// The backing store contents could not be parsed.
    Corrupt { reason: String },
}

impl fmt::Display for StorageError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::ReadFailed { reason } => {
                write!(f, "failed to read session storage: {reason}")
            }
            Self::WriteFailed { reason } => {
                write!(f, "failed to write session storage: {reason}")
            }
            Self::Corrupt { reason } => {
                write!(f, "session storage is corrupt: {reason}")
            }
        }
    }
}

impl std::error::Error for StorageError {}
