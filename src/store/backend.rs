//! Backend seam for the ordered key-value store.
//!
//! [`StoreBackend`] is everything the location store needs from the remote
//! realtime database: point reads, upserts, deletes, range scans over the
//! geohash index and change watches keyed by geohash prefix. The wire
//! protocol behind it is the implementor's concern.
//!
//! [`MemoryBackend`] implements the trait in-process. It keeps the same
//! ordering guarantees a remote backend must give and can simulate outages
//! and latency, which is how the resynchronization paths are tested.

use std::collections::{BTreeSet, HashMap};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use async_trait::async_trait;
use chrono::Utc;
use tokio::sync::mpsc;
use tracing::{debug, info};

use super::error::{StoreError, StoreResult};
use super::types::{Change, GeoEntry, Revision, StoredEntry};

/// Receiving half of a change watch.
///
/// The channel closes when the backend drops the watch, for example when the
/// connection is lost; the watcher must then re-establish it.
pub type WatchReceiver = mpsc::UnboundedReceiver<Change>;

/// Operations the location store requires from its backend.
///
/// # Ordering guarantees
///
/// - Writes to one key are applied in a single order; each gets a revision
///   greater than every earlier revision.
/// - A watch receives every write made after [`watch`](Self::watch) returns
///   whose previous or new geohash starts with one of its prefixes, in
///   revision order.
#[async_trait]
pub trait StoreBackend: Send + Sync {
    /// Reads the entry stored under `key`.
    async fn get(&self, key: &str) -> StoreResult<Option<StoredEntry>>;

    /// Writes `entry` under `key`, replacing any previous value.
    async fn upsert(&self, key: &str, entry: GeoEntry) -> StoreResult<Revision>;

    /// Removes `key`. Returns the revision of the removal, or `None` if the
    /// key did not exist.
    async fn delete(&self, key: &str) -> StoreResult<Option<Revision>>;

    /// Entries whose geohash is in `[start, end)`, ordered by geohash then key.
    async fn range(&self, start: &str, end: &str) -> StoreResult<Vec<(String, StoredEntry)>>;

    /// Starts watching writes that touch any of `prefixes`.
    async fn watch(&self, prefixes: Vec<String>) -> StoreResult<WatchReceiver>;
}

struct Watcher {
    prefixes: Vec<String>,
    tx: mpsc::UnboundedSender<Change>,
}

#[derive(Default)]
struct Inner {
    entries: HashMap<String, StoredEntry>,
    // (geohash, key), the ordered index range scans walk
    index: BTreeSet<(String, String)>,
    watchers: Vec<Watcher>,
    last_revision: Revision,
}

impl Inner {
    fn next_revision(&mut self) -> Revision {
        self.last_revision += 1;
        self.last_revision
    }

    /// Sends `change` to every watcher whose prefixes match `old` or `new`,
    /// dropping watchers whose receiver is gone.
    fn notify(&mut self, change: &Change, old: Option<&GeoEntry>) {
        self.watchers.retain(|watcher| {
            if watcher.tx.is_closed() {
                return false;
            }
            let touches = old.is_some_and(|e| e.matches_any(&watcher.prefixes))
                || change
                    .entry
                    .as_ref()
                    .is_some_and(|e| e.matches_any(&watcher.prefixes));
            !touches || watcher.tx.send(change.clone()).is_ok()
        });
    }
}

/// In-process [`StoreBackend`].
///
/// All state sits behind one lock, so writes, index updates and watch
/// notifications happen atomically and in revision order.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use sightings_core::store::{LocationStore, MemoryBackend, StoreConfig};
///
/// let backend = Arc::new(MemoryBackend::new());
/// let store = LocationStore::new(backend.clone(), StoreConfig::default()).unwrap();
///
/// // Later, in a test: simulate the connection dropping.
/// backend.set_available(false);
/// ```
#[derive(Default)]
pub struct MemoryBackend {
    inner: Mutex<Inner>,
    unavailable: AtomicBool,
    latency_ms: AtomicU64,
}

impl MemoryBackend {
    /// Creates an empty, available backend with no latency.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Simulates losing or regaining the connection.
    ///
    /// Going unavailable closes every open watch; operations fail with
    /// [`StoreError::Unavailable`] until the backend is available again.
    /// Stored data is kept.
    pub fn set_available(&self, available: bool) {
        self.unavailable.store(!available, Ordering::SeqCst);
        if available {
            info!("memory backend available");
        } else {
            let dropped = {
                let mut inner = self.lock();
                let n = inner.watchers.len();
                inner.watchers.clear();
                n
            };
            info!(dropped_watches = dropped, "memory backend unavailable");
        }
    }

    /// Returns whether the backend currently accepts operations.
    #[must_use]
    pub fn is_available(&self) -> bool {
        !self.unavailable.load(Ordering::SeqCst)
    }

    /// Delays every subsequent operation by `latency`.
    pub fn set_latency(&self, latency: Duration) {
        let ms = u64::try_from(latency.as_millis()).unwrap_or(u64::MAX);
        self.latency_ms.store(ms, Ordering::SeqCst);
    }

    /// Number of keys stored.
    #[must_use]
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    /// Returns whether no keys are stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Number of open watches.
    #[must_use]
    pub fn watch_count(&self) -> usize {
        let mut inner = self.lock();
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.len()
    }

    fn lock(&self) -> MutexGuard<'_, Inner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Applies configured latency, then checks availability.
    async fn round_trip(&self) -> StoreResult<()> {
        let latency = self.latency_ms.load(Ordering::SeqCst);
        if latency > 0 {
            tokio::time::sleep(Duration::from_millis(latency)).await;
        }
        if self.is_available() {
            Ok(())
        } else {
            Err(StoreError::Unavailable("memory backend offline".to_string()))
        }
    }
}

#[async_trait]
impl StoreBackend for MemoryBackend {
    async fn get(&self, key: &str) -> StoreResult<Option<StoredEntry>> {
        self.round_trip().await?;
        Ok(self.lock().entries.get(key).cloned())
    }

    async fn upsert(&self, key: &str, entry: GeoEntry) -> StoreResult<Revision> {
        self.round_trip().await?;
        let mut inner = self.lock();
        let revision = inner.next_revision();
        let stored = StoredEntry {
            entry: entry.clone(),
            revision,
            updated_at: Utc::now(),
        };

        let old = inner.entries.insert(key.to_string(), stored);
        if let Some(old) = &old {
            inner.index.remove(&(old.entry.geohash.clone(), key.to_string()));
        }
        inner.index.insert((entry.geohash.clone(), key.to_string()));

        let change = Change {
            key: key.to_string(),
            revision,
            entry: Some(entry),
        };
        inner.notify(&change, old.as_ref().map(|o| &o.entry));
        drop(inner);

        debug!(key, revision, "memory backend upsert");
        Ok(revision)
    }

    async fn delete(&self, key: &str) -> StoreResult<Option<Revision>> {
        self.round_trip().await?;
        let mut inner = self.lock();
        let Some(old) = inner.entries.remove(key) else {
            return Ok(None);
        };
        inner.index.remove(&(old.entry.geohash.clone(), key.to_string()));

        let revision = inner.next_revision();
        let change = Change {
            key: key.to_string(),
            revision,
            entry: None,
        };
        inner.notify(&change, Some(&old.entry));
        drop(inner);

        debug!(key, revision, "memory backend delete");
        Ok(Some(revision))
    }

    async fn range(&self, start: &str, end: &str) -> StoreResult<Vec<(String, StoredEntry)>> {
        self.round_trip().await?;
        let inner = self.lock();
        let lower = (start.to_string(), String::new());
        let upper = (end.to_string(), String::new());
        if lower >= upper {
            return Ok(Vec::new());
        }
        Ok(inner
            .index
            .range(lower..upper)
            .filter_map(|(_, key)| {
                inner
                    .entries
                    .get(key)
                    .map(|stored| (key.clone(), stored.clone()))
            })
            .collect())
    }

    async fn watch(&self, prefixes: Vec<String>) -> StoreResult<WatchReceiver> {
        self.round_trip().await?;
        let (tx, rx) = mpsc::unbounded_channel();
        let mut inner = self.lock();
        inner.watchers.retain(|w| !w.tx.is_closed());
        inner.watchers.push(Watcher { prefixes, tx });
        debug!(watches = inner.watchers.len(), "memory backend watch opened");
        Ok(rx)
    }
}
