//! Error types for store operations.
//!
//! This module defines errors that can occur while reading or writing
//! locations, including validation and transport failures.

use std::time::Duration;

use thiserror::Error;

use crate::index::IndexError;
use crate::location::ValidationError;

/// Errors that can occur during store operations.
#[derive(Debug, Error)]
pub enum StoreError {
    /// Coordinate was rejected before reaching the backend.
    #[error("Invalid coordinate: {0}")]
    Validation(#[from] ValidationError),

    /// Key is empty, too long or contains a reserved character.
    #[error("Invalid key {key:?}: {reason}")]
    InvalidKey {
        /// The rejected key.
        key: String,
        /// Why it was rejected.
        reason: String,
    },

    /// Geohash indexing failed.
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// The backend did not answer within the configured deadline.
    #[error("Store operation {operation} timed out after {timeout:?}")]
    Timeout {
        /// The operation that timed out.
        operation: &'static str,
        /// The deadline that was exceeded.
        timeout: Duration,
    },

    /// The connection to the backend is lost.
    #[error("Store unavailable: {0}")]
    Unavailable(String),

    /// A stored value could not be encoded or decoded.
    #[error("Codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

impl StoreError {
    /// Returns whether retrying the same operation may succeed.
    #[must_use]
    pub const fn is_transient(&self) -> bool {
        matches!(self, Self::Timeout { .. } | Self::Unavailable(_))
    }
}

/// Result type for store operations.
pub type StoreResult<T> = Result<T, StoreError>;
