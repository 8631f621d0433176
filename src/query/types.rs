//! Types for live radius queries.

use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::index::{CoverageConfig, IndexError};
use crate::location::Coordinate;

use super::error::QueryResult;

/// Kind of change a query reports for a key.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum EventKind {
    /// The key is now inside the query circle.
    Entered,
    /// The key is no longer inside the query circle.
    Exited,
    /// The key moved and is still inside the query circle.
    Moved,
}

impl EventKind {
    /// Converts to string representation.
    #[must_use]
    pub const fn as_str(&self) -> &'static str {
        match self {
            Self::Entered => "entered",
            Self::Exited => "exited",
            Self::Moved => "moved",
        }
    }

    /// Parses from string representation.
    #[must_use]
    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "entered" => Some(Self::Entered),
            "exited" => Some(Self::Exited),
            "moved" => Some(Self::Moved),
            _ => None,
        }
    }
}

/// One event from a live query.
#[derive(Debug, Clone, PartialEq)]
pub struct QueryEvent {
    /// What happened.
    pub kind: EventKind,
    /// Key the event is about.
    pub key: String,
    /// Location of the key: the new one for enters and moves, the latest
    /// known one for exits.
    pub coordinate: Coordinate,
}

impl QueryEvent {
    /// Builds an `Entered` event.
    #[must_use]
    pub fn entered(key: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            kind: EventKind::Entered,
            key: key.into(),
            coordinate,
        }
    }

    /// Builds an `Exited` event.
    #[must_use]
    pub fn exited(key: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            kind: EventKind::Exited,
            key: key.into(),
            coordinate,
        }
    }

    /// Builds a `Moved` event.
    #[must_use]
    pub fn moved(key: impl Into<String>, coordinate: Coordinate) -> Self {
        Self {
            kind: EventKind::Moved,
            key: key.into(),
            coordinate,
        }
    }
}

/// Lifecycle of a query registration.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryState {
    /// Following the store and emitting events.
    Active,
    /// Stopped for good.
    Unsubscribed,
}

/// Centre and radius of a query.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct QueryCriteria {
    /// Centre of the circle.
    pub center: Coordinate,
    /// Radius in meters.
    pub radius_m: f64,
}

impl QueryCriteria {
    /// Creates validated criteria.
    ///
    /// # Errors
    ///
    /// Returns an error if the centre is invalid or the radius is negative or
    /// not finite.
    pub fn new(center: Coordinate, radius_m: f64) -> QueryResult<Self> {
        center.validate()?;
        if !radius_m.is_finite() || radius_m < 0.0 {
            return Err(IndexError::InvalidRadius(radius_m).into());
        }
        Ok(Self { center, radius_m })
    }

    /// Returns whether `coord` is inside the circle (boundary included).
    #[must_use]
    pub fn contains(&self, coord: &Coordinate) -> bool {
        self.center.is_within(coord, self.radius_m)
    }
}

/// Tuning for a query registration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct QueryConfig {
    /// How the query circle is covered with geohash cells.
    pub coverage: CoverageConfig,

    /// First delay before resubscribing after the watch is lost, in ms.
    pub backoff_initial_ms: u64,

    /// Longest delay between resubscription attempts, in ms.
    pub backoff_max_ms: u64,

    /// Capacity of the command channel to the query task.
    pub command_buffer: usize,
}

impl Default for QueryConfig {
    fn default() -> Self {
        Self {
            coverage: CoverageConfig::default(),
            backoff_initial_ms: 250,
            backoff_max_ms: 30_000,
            command_buffer: 32,
        }
    }
}

impl QueryConfig {
    /// First resubscription delay.
    #[must_use]
    pub const fn backoff_initial(&self) -> Duration {
        Duration::from_millis(self.backoff_initial_ms)
    }

    /// Longest resubscription delay.
    #[must_use]
    pub const fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or missing fields.
    pub fn from_json(json: &str) -> QueryResult<Self> {
        Ok(serde_json::from_str(json)?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::query::QueryError;

    #[test]
    fn event_kind_string_roundtrip() {
        for kind in [EventKind::Entered, EventKind::Exited, EventKind::Moved] {
            assert_eq!(EventKind::parse(kind.as_str()), Some(kind));
        }
        assert_eq!(EventKind::parse("teleported"), None);
    }

    #[test]
    fn event_constructors() {
        let c = Coordinate::new(1.0, 2.0).unwrap();
        assert_eq!(QueryEvent::entered("1", c).kind, EventKind::Entered);
        assert_eq!(QueryEvent::exited("1", c).kind, EventKind::Exited);
        assert_eq!(QueryEvent::moved("1", c).kind, EventKind::Moved);
        assert_eq!(QueryEvent::moved("1", c).key, "1");
    }

    #[test]
    fn criteria_rejects_bad_input() {
        let center = Coordinate::new(0.0, 0.0).unwrap();
        assert!(matches!(
            QueryCriteria::new(center, -10.0),
            Err(QueryError::Index(IndexError::InvalidRadius(_)))
        ));
        assert!(matches!(
            QueryCriteria::new(center, f64::INFINITY),
            Err(QueryError::Index(_))
        ));
        let bad_center = Coordinate {
            latitude: f64::NAN,
            longitude: 0.0,
        };
        assert!(matches!(
            QueryCriteria::new(bad_center, 10.0),
            Err(QueryError::Validation(_))
        ));
    }

    #[test]
    fn criteria_contains_is_inclusive() {
        let center = Coordinate::new(10.0, 10.0).unwrap();
        let point = Coordinate::new(10.01, 10.0).unwrap();
        let criteria = QueryCriteria::new(center, center.distance_to(&point)).unwrap();
        assert!(criteria.contains(&point));
    }

    #[test]
    fn config_defaults() {
        let config = QueryConfig::default();
        assert_eq!(config.backoff_initial(), Duration::from_millis(250));
        assert_eq!(config.backoff_max(), Duration::from_secs(30));
        assert_eq!(config.coverage, CoverageConfig::default());
    }

    #[test]
    fn config_from_json() {
        let config = QueryConfig::from_json(
            r#"{"coverage":{"max_cells":9,"max_precision":8},"backoff_initial_ms":10,"backoff_max_ms":100,"command_buffer":4}"#,
        )
        .unwrap();
        assert_eq!(config.coverage.max_cells, 9);
        assert_eq!(config.backoff_max(), Duration::from_millis(100));
    }

    #[test]
    fn config_from_json_rejects_garbage() {
        assert!(matches!(
            QueryConfig::from_json("{}"),
            Err(QueryError::Config(_))
        ));
    }
}
