//! Error types for live queries.

use thiserror::Error;

use crate::index::IndexError;
use crate::location::ValidationError;
use crate::store::StoreError;

/// Errors that can occur while creating or driving a query.
#[derive(Debug, Error)]
pub enum QueryError {
    /// The registration was unsubscribed; it accepts no further calls.
    #[error("Query is already unsubscribed")]
    AlreadyUnsubscribed,

    /// The query centre is not a valid coordinate.
    #[error("Invalid query center: {0}")]
    Validation(#[from] ValidationError),

    /// Covering the query region failed (bad radius or configuration).
    #[error("Index error: {0}")]
    Index(#[from] IndexError),

    /// A store round-trip failed. State is unchanged; the call may be retried.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// The query configuration could not be parsed.
    #[error("Invalid query configuration: {0}")]
    Config(#[from] serde_json::Error),
}

/// Result type for query operations.
pub type QueryResult<T> = Result<T, QueryError>;

#[cfg(test)]
mod tests {
    use std::time::Duration;

    use super::*;

    #[test]
    fn already_unsubscribed_display() {
        assert_eq!(
            QueryError::AlreadyUnsubscribed.to_string(),
            "Query is already unsubscribed"
        );
    }

    #[test]
    fn validation_display() {
        let err: QueryError = ValidationError::LongitudeOutOfRange(190.0).into();
        assert_eq!(
            err.to_string(),
            "Invalid query center: Longitude out of range [-180, 180]: 190"
        );
    }

    #[test]
    fn index_display() {
        let err: QueryError = IndexError::InvalidRadius(-1.0).into();
        assert_eq!(err.to_string(), "Index error: Invalid radius: -1 meters");
    }

    #[test]
    fn store_timeout_display() {
        let err: QueryError = StoreError::Timeout {
            operation: "range",
            timeout: Duration::from_secs(2),
        }
        .into();
        assert_eq!(
            err.to_string(),
            "Store error: Store operation range timed out after 2s"
        );
    }
}
