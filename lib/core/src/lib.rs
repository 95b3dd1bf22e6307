//! Core types and utilities for the stockroom client.
//!
//! This crate provides the foundational error handling and the durable
//! storage that backs the client's authentication session.

pub mod error;
pub mod storage;
pub mod vault;

pub use error::{Result, StorageError};
pub use storage::{
    ACCESS_TOKEN_KEY, FileStore, KeyValueStore, MemoryStore, REFRESH_TOKEN_KEY, USER_KEY,
};
pub use vault::{SessionVault, StoredSession};
