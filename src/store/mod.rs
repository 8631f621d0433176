//! Location storage over a remote ordered key-value store.
//!
//! The remote store is the source of truth for every key's location. This
//! module validates writes, encodes them with a geohash so they can be found
//! by range scans, and exposes change watches that live queries follow.
//!
//! # Architecture
//!
//! ```text
//! caller
//!     │  set_location / remove_location / get
//!     ▼
//! LocationStore (validation, geohash encoding, timeouts)
//!     │
//!     ▼
//! dyn StoreBackend ── MemoryBackend (in-process)
//!                 └── remote realtime database client
//! ```
//!
//! # Consistency
//!
//! - Writes to one key are last-writer-wins, ordered by backend revision.
//! - A watch sees every write that touches its prefixes after it was
//!   opened, including writes that move a key out of its cells.
//! - Round-trips are bounded by [`StoreConfig::timeout_ms`]; a timed out
//!   operation fails with [`StoreError::Timeout`] and may be retried.

mod backend;
mod error;
mod manager;
mod types;

pub use backend::{MemoryBackend, StoreBackend, WatchReceiver};
pub use error::{StoreError, StoreResult};
pub use manager::LocationStore;
pub use types::{
    validate_key, Change, GeoEntry, LocationRecord, Revision, StoreConfig, StoredEntry,
    MAX_KEY_BYTES,
};
