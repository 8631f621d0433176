//! Error types for coordinate validation.

use thiserror::Error;

/// A coordinate that cannot be stored or queried.
#[derive(Error, Debug, Clone, Copy, PartialEq)]
pub enum ValidationError {
    /// Latitude or longitude is NaN or infinite.
    #[error("Coordinate is not finite: ({latitude}, {longitude})")]
    NonFinite {
        /// The rejected latitude.
        latitude: f64,
        /// The rejected longitude.
        longitude: f64,
    },

    /// Latitude outside [-90, 90].
    #[error("Latitude out of range [-90, 90]: {0}")]
    LatitudeOutOfRange(f64),

    /// Longitude outside [-180, 180].
    #[error("Longitude out of range [-180, 180]: {0}")]
    LongitudeOutOfRange(f64),
}

/// Result type for coordinate validation.
pub type ValidationResult<T> = Result<T, ValidationError>;
