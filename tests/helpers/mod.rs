//! Reusable helpers for store and query integration tests.
//!
//! Every helper builds on a fresh [`MemoryBackend`], so tests never share
//! state and can inject outages or latency without affecting each other.

#![allow(dead_code)]

use std::collections::BTreeSet;
use std::sync::Arc;
use std::time::Duration;

use futures::StreamExt;
use sightings_core::query::{EventKind, EventStream, QueryEvent, QueryRegistration};
use sightings_core::store::{LocationStore, MemoryBackend, StoreConfig};
use sightings_core::Coordinate;

/// Builds a coordinate, panicking on invalid input.
pub fn coord(latitude: f64, longitude: f64) -> Coordinate {
    Coordinate::new(latitude, longitude).expect("test coordinate must be valid")
}

/// Creates a store over a fresh in-memory backend.
///
/// The backend is returned too so tests can simulate faults.
pub fn new_store() -> (Arc<MemoryBackend>, LocationStore) {
    new_store_with(StoreConfig::default())
}

/// Like [`new_store`] with a custom configuration.
pub fn new_store_with(config: StoreConfig) -> (Arc<MemoryBackend>, LocationStore) {
    let backend = Arc::new(MemoryBackend::new());
    let store = LocationStore::new(backend.clone(), config).expect("valid store config");
    (backend, store)
}

/// Waits up to five seconds for the next event.
pub async fn next_event(stream: &mut EventStream) -> QueryEvent {
    next_event_within(stream, Duration::from_secs(5)).await
}

/// Waits up to `limit` for the next event.
pub async fn next_event_within(stream: &mut EventStream, limit: Duration) -> QueryEvent {
    tokio::time::timeout(limit, stream.next())
        .await
        .expect("timed out waiting for query event")
        .expect("event stream ended unexpectedly")
}

/// Waits until `query` has applied every change written so far.
///
/// The query task handles pending store changes before commands, so a
/// completed command round-trip means earlier writes have been processed.
pub async fn settle(query: &QueryRegistration) {
    query
        .active_keys()
        .await
        .expect("query must be active while settling");
}

/// Settles `query`, then asserts `stream` has nothing buffered.
pub async fn assert_quiet(query: &QueryRegistration, stream: &mut EventStream) {
    settle(query).await;
    let pending = stream.drain();
    assert!(pending.is_empty(), "unexpected events: {pending:?}");
}

/// Replays `events` as membership changes, panicking if a key enters twice,
/// exits or moves while outside. Returns the keys that end inside.
pub fn replay_membership(events: &[QueryEvent]) -> BTreeSet<String> {
    let mut inside = BTreeSet::new();
    for event in events {
        match event.kind {
            EventKind::Entered => assert!(
                inside.insert(event.key.clone()),
                "{} entered while inside",
                event.key
            ),
            EventKind::Exited => assert!(
                inside.remove(&event.key),
                "{} exited while outside",
                event.key
            ),
            EventKind::Moved => assert!(
                inside.contains(&event.key),
                "{} moved while outside",
                event.key
            ),
        }
    }
    inside
}
