//! The location store client.
//!
//! [`LocationStore`] validates and encodes locations, bounds every backend
//! round-trip by the configured timeout and hands out change watches to the
//! query layer. It holds no state of its own beyond the backend handle and
//! configuration, so it is cheap to clone and share across tasks.

use std::collections::{BTreeSet, HashSet};
use std::future::Future;
use std::sync::Arc;

use tracing::{debug, warn};

use crate::index::prefix_range;
use crate::location::Coordinate;
use crate::query::{QueryConfig, QueryRegistration, QueryResult};

use super::backend::{StoreBackend, WatchReceiver};
use super::error::{StoreError, StoreResult};
use super::types::{validate_key, GeoEntry, LocationRecord, StoreConfig};

/// Client for a key→location store.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use sightings_core::location::Coordinate;
/// use sightings_core::store::{LocationStore, MemoryBackend, StoreConfig};
///
/// # tokio_test_block_on(async {
/// let store = LocationStore::new(Arc::new(MemoryBackend::new()), StoreConfig::default())?;
///
/// store.set_location("25", Coordinate::new(44.8125, 20.4612)?).await?;
/// assert_eq!(store.get("25").await?, Some(Coordinate::new(44.8125, 20.4612)?));
///
/// store.remove_location("25").await?;
/// assert_eq!(store.get("25").await?, None);
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Clone)]
pub struct LocationStore {
    backend: Arc<dyn StoreBackend>,
    config: Arc<StoreConfig>,
}

impl std::fmt::Debug for LocationStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LocationStore")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

impl LocationStore {
    /// Creates a store client over `backend`.
    ///
    /// # Errors
    ///
    /// Returns an error if the configuration is invalid.
    pub fn new(backend: Arc<dyn StoreBackend>, config: StoreConfig) -> StoreResult<Self> {
        config.validate()?;
        Ok(Self {
            backend,
            config: Arc::new(config),
        })
    }

    /// The store configuration.
    #[must_use]
    pub fn config(&self) -> &StoreConfig {
        &self.config
    }

    /// Writes `coordinate` under `key`, replacing any previous location.
    ///
    /// Every open watch whose prefixes cover the key's old or new cell is
    /// notified before this returns.
    ///
    /// # Errors
    ///
    /// - [`StoreError::Validation`] if the coordinate is out of range
    /// - [`StoreError::InvalidKey`] if the key breaks the key rules
    /// - [`StoreError::Timeout`] / [`StoreError::Unavailable`] on transport failure
    pub async fn set_location(&self, key: &str, coordinate: Coordinate) -> StoreResult<()> {
        validate_key(key)?;
        let entry = GeoEntry::new(&coordinate, self.config.geohash_precision)?;
        let geohash = entry.geohash.clone();
        let revision = self
            .round_trip("upsert", self.backend.upsert(key, entry))
            .await?;
        debug!(key, %geohash, revision, "location set");
        Ok(())
    }

    /// Removes `key`. Returns `false` if it was not stored.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid or the backend fails.
    pub async fn remove_location(&self, key: &str) -> StoreResult<bool> {
        validate_key(key)?;
        let revision = self
            .round_trip("delete", self.backend.delete(key))
            .await?;
        debug!(key, ?revision, "location removed");
        Ok(revision.is_some())
    }

    /// The coordinate stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid, the backend fails, or the
    /// stored value is corrupt.
    pub async fn get(&self, key: &str) -> StoreResult<Option<Coordinate>> {
        Ok(self.get_record(key).await?.map(|r| r.coordinate))
    }

    /// The full record stored under `key`, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the key is invalid, the backend fails, or the
    /// stored value is corrupt.
    pub async fn get_record(&self, key: &str) -> StoreResult<Option<LocationRecord>> {
        validate_key(key)?;
        let stored = self.round_trip("get", self.backend.get(key)).await?;
        stored
            .map(|s| LocationRecord::from_stored(key.to_string(), s).map_err(StoreError::from))
            .transpose()
    }

    /// Every record whose geohash starts with `prefix`.
    ///
    /// Corrupt entries are skipped with a warning.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn query_prefix(&self, prefix: &str) -> StoreResult<Vec<LocationRecord>> {
        let (start, end) = prefix_range(prefix);
        let rows = self
            .round_trip("range", self.backend.range(&start, &end))
            .await?;

        Ok(rows
            .into_iter()
            .filter_map(|(key, stored)| match LocationRecord::from_stored(key, stored) {
                Ok(record) => Some(record),
                Err(e) => {
                    warn!(prefix, error = %e, "skipping corrupt entry");
                    None
                }
            })
            .collect())
    }

    /// Every record under any of `prefixes`, each key at most once.
    ///
    /// One range scan per prefix, each bounded by the timeout. Nothing is
    /// returned unless every scan succeeds.
    ///
    /// # Errors
    ///
    /// Returns the first backend failure.
    pub async fn records_in(&self, prefixes: &BTreeSet<String>) -> StoreResult<Vec<LocationRecord>> {
        let mut seen = HashSet::new();
        let mut records = Vec::new();
        for prefix in prefixes {
            for record in self.query_prefix(prefix).await? {
                if seen.insert(record.key.clone()) {
                    records.push(record);
                }
            }
        }
        Ok(records)
    }

    /// Opens a change watch over `prefixes`.
    ///
    /// # Errors
    ///
    /// Returns an error if the backend fails.
    pub async fn watch(&self, prefixes: &BTreeSet<String>) -> StoreResult<WatchReceiver> {
        let prefixes: Vec<String> = prefixes.iter().cloned().collect();
        self.round_trip("watch", self.backend.watch(prefixes)).await
    }

    /// Starts a live radius query with the default [`QueryConfig`].
    ///
    /// The coverage precision is capped at this store's geohash precision.
    ///
    /// # Errors
    ///
    /// See [`QueryRegistration::create`].
    pub async fn query(&self, center: Coordinate, radius_m: f64) -> QueryResult<QueryRegistration> {
        QueryRegistration::create(self, center, radius_m, QueryConfig::default()).await
    }

    /// Runs `fut` under the configured deadline.
    async fn round_trip<T>(
        &self,
        operation: &'static str,
        fut: impl Future<Output = StoreResult<T>>,
    ) -> StoreResult<T> {
        let timeout = self.config.timeout();
        tokio::time::timeout(timeout, fut)
            .await
            .map_err(|_| {
                warn!(operation, ?timeout, "store round-trip timed out");
                StoreError::Timeout { operation, timeout }
            })?
    }
}
