//! Types for the location store.
//!
//! This module defines the value layout written to the backend, the records
//! read back from it, change notifications and store configuration.

use std::fmt;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::index::{encode, validate_precision};
use crate::location::{Coordinate, ValidationResult};

use super::error::{StoreError, StoreResult};

/// Monotonic sequence number the backend assigns to every write.
pub type Revision = u64;

/// Longest key accepted, in bytes.
pub const MAX_KEY_BYTES: usize = 768;

/// Characters the realtime backend reserves in key paths.
const RESERVED_KEY_CHARS: &[char] = &['.', '#', '$', '[', ']', '/'];

/// Value stored under each key.
///
/// Serializes as `{"g": "<geohash>", "l": [lat, lon]}`, the layout the
/// realtime backend indexes on `g`.
///
/// # Example
///
/// ```
/// use sightings_core::location::Coordinate;
/// use sightings_core::store::GeoEntry;
///
/// let coord = Coordinate::new(44.8125, 20.4612).unwrap();
/// let entry = GeoEntry::new(&coord, 10).unwrap();
/// let json = entry.to_json().unwrap();
/// assert!(json.starts_with(r#"{"g":"srywc"#));
/// assert_eq!(GeoEntry::from_json(&json).unwrap(), entry);
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct GeoEntry {
    /// Geohash of the location at the store's precision.
    #[serde(rename = "g")]
    pub geohash: String,

    /// `[latitude, longitude]`.
    #[serde(rename = "l")]
    pub location: [f64; 2],
}

impl GeoEntry {
    /// Builds the entry for a coordinate at `precision`.
    ///
    /// # Errors
    ///
    /// Returns an error if the coordinate or precision is invalid.
    pub fn new(coord: &Coordinate, precision: usize) -> StoreResult<Self> {
        coord.validate()?;
        Ok(Self {
            geohash: encode(coord, precision)?,
            location: [coord.latitude, coord.longitude],
        })
    }

    /// The stored coordinate, validated.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored value is out of range or non-finite.
    pub fn coordinate(&self) -> ValidationResult<Coordinate> {
        Coordinate::new(self.location[0], self.location[1])
    }

    /// Returns whether the entry's geohash starts with any of `prefixes`.
    #[must_use]
    pub fn matches_any(&self, prefixes: &[String]) -> bool {
        prefixes.iter().any(|p| self.geohash.starts_with(p.as_str()))
    }

    /// Parses an entry from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or missing fields.
    pub fn from_json(json: &str) -> StoreResult<Self> {
        Ok(serde_json::from_str(json)?)
    }

    /// Serializes the entry to JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if serialization fails.
    pub fn to_json(&self) -> StoreResult<String> {
        Ok(serde_json::to_string(self)?)
    }
}

/// An entry as held by the backend, with its write metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct StoredEntry {
    /// The stored value.
    pub entry: GeoEntry,
    /// Revision of the write that produced this value.
    pub revision: Revision,
    /// When the backend accepted the write.
    pub updated_at: DateTime<Utc>,
}

/// A key and its location, as read from the store.
#[derive(Debug, Clone, PartialEq)]
pub struct LocationRecord {
    /// Caller-chosen key.
    pub key: String,
    /// Validated coordinate.
    pub coordinate: Coordinate,
    /// Stored geohash.
    pub geohash: String,
    /// Revision of the write that produced this record.
    pub revision: Revision,
    /// When the backend accepted the write.
    pub updated_at: DateTime<Utc>,
}

impl LocationRecord {
    /// Builds a record from a backend entry.
    ///
    /// # Errors
    ///
    /// Returns an error if the stored coordinate is invalid.
    pub fn from_stored(key: String, stored: StoredEntry) -> ValidationResult<Self> {
        let coordinate = stored.entry.coordinate()?;
        Ok(Self {
            key,
            coordinate,
            geohash: stored.entry.geohash,
            revision: stored.revision,
            updated_at: stored.updated_at,
        })
    }
}

/// A write observed by a watch.
///
/// `entry` is the value after the write; `None` means the key was removed.
#[derive(Debug, Clone, PartialEq)]
pub struct Change {
    /// Key that was written.
    pub key: String,
    /// Revision of the write.
    pub revision: Revision,
    /// New value, or `None` if the key was removed.
    pub entry: Option<GeoEntry>,
}

impl Change {
    /// The coordinate after the write, if the key still exists.
    #[must_use]
    pub fn coordinate(&self) -> Option<ValidationResult<Coordinate>> {
        self.entry.as_ref().map(GeoEntry::coordinate)
    }
}

/// Checks a key against the backend's key rules.
///
/// # Errors
///
/// Returns [`StoreError::InvalidKey`] for empty or oversized keys, keys with
/// reserved characters (`. # $ [ ] /`) and keys with control characters.
pub fn validate_key(key: &str) -> StoreResult<()> {
    let reason = if key.is_empty() {
        Some("key is empty".to_string())
    } else if key.len() > MAX_KEY_BYTES {
        Some(format!("key is longer than {MAX_KEY_BYTES} bytes"))
    } else if let Some(c) = key.chars().find(|c| RESERVED_KEY_CHARS.contains(c)) {
        Some(format!("contains {c:?}"))
    } else if key.chars().any(char::is_control) {
        Some("contains a control character".to_string())
    } else {
        None
    };

    match reason {
        Some(reason) => Err(StoreError::InvalidKey {
            key: key.to_string(),
            reason,
        }),
        None => Ok(()),
    }
}

/// Connection settings for a location store.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoreConfig {
    /// Backend host or URL.
    pub host: String,

    /// Credential presented to the backend, if it requires one.
    pub auth_token: Option<String>,

    /// Deadline for each backend round-trip, in milliseconds.
    pub timeout_ms: u64,

    /// Geohash length written with each location.
    pub geohash_precision: usize,
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            auth_token: None,
            timeout_ms: 10_000,
            geohash_precision: 10,
        }
    }
}

impl StoreConfig {
    /// Round-trip deadline as a [`Duration`].
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// Checks the configuration.
    ///
    /// # Errors
    ///
    /// Returns an error if the precision is outside 1..=12.
    pub fn validate(&self) -> StoreResult<()> {
        validate_precision(self.geohash_precision)?;
        Ok(())
    }

    /// Parses a configuration from JSON.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is invalid or the configuration fails
    /// [`validate`](Self::validate).
    pub fn from_json(json: &str) -> StoreResult<Self> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }
}

impl fmt::Debug for StoreConfig {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        // Never print the credential
        f.debug_struct("StoreConfig")
            .field("host", &self.host)
            .field("auth_token", &self.auth_token.as_ref().map(|_| "<redacted>"))
            .field("timeout_ms", &self.timeout_ms)
            .field("geohash_precision", &self.geohash_precision)
            .finish()
    }
}
