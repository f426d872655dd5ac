//! Storage port - key-addressed persistence for calibration state
//!
//! Mirrors a flash key-value namespace: string keys, string values, and a
//! namespace-wide clear. The schema layered on top lives in
//! [`crate::persistence`].

use thiserror::Error;

/// Error type for storage operations
#[derive(Error, Clone, Debug, PartialEq, Eq)]
pub enum StorageError {
    /// Backend could not be opened
    #[error("storage not available: {0}")]
    Unavailable(String),
    /// Writing a key failed
    #[error("failed to write '{key}': {reason}")]
    WriteFailed { key: String, reason: String },
    /// Stored value could not be decoded
    #[error("corrupt value for '{key}': {reason}")]
    Corrupt { key: String, reason: String },
}

/// Port for key-value persistence
pub trait KeyValueStore {
    /// Fetch a value; `Ok(None)` if the key was never written
    fn get(&self, key: &str) -> Result<Option<String>, StorageError>;

    /// Insert or overwrite a value
    fn put(&mut self, key: &str, value: String) -> Result<(), StorageError>;

    /// Remove a key; removing a missing key is not an error
    fn remove(&mut self, key: &str) -> Result<(), StorageError>;

    /// Remove every key in the namespace
    fn clear(&mut self) -> Result<(), StorageError>;
}
