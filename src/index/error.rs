//! Error types for geohash indexing.

use thiserror::Error;

use crate::location::ValidationError;

/// Errors that can occur while encoding, decoding or covering.
#[derive(Error, Debug, Clone, PartialEq)]
pub enum IndexError {
    /// Precision outside 1..=12 characters.
    #[error("Invalid geohash precision: {0} (expected 1..=12)")]
    InvalidPrecision(usize),

    /// Geohash string is empty, too long or has characters outside base32.
    #[error("Invalid geohash: {0:?}")]
    InvalidGeohash(String),

    /// Radius is negative or not finite.
    #[error("Invalid radius: {0} meters")]
    InvalidRadius(f64),

    /// The coordinate being indexed is invalid.
    #[error(transparent)]
    Validation(#[from] ValidationError),
}

/// Result type for index operations.
pub type IndexResult<T> = Result<T, IndexError>;
