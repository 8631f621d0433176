//! Integration tests for live radius queries.
//!
//! These tests drive `LocationStore` and `QueryRegistration` together over an
//! in-memory backend and verify:
//! - Enter/exit/move events for writes inside and outside the circle
//! - Replay of current members to new observers
//! - Re-centre and radius changes emitting only the difference
//! - Failure atomicity when the store times out
//! - Resubscription after the store connection drops
//! - Teardown on unsubscribe and drop

mod helpers;

use std::collections::BTreeMap;
use std::time::Duration;

use futures::StreamExt;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use sightings_core::query::{EventKind, QueryError, QueryEvent, QueryState};
use sightings_core::store::{StoreConfig, StoreError};

use helpers::{
    assert_quiet, coord, new_store, new_store_with, next_event, next_event_within, settle,
};

// ============================================================================
// Basic membership
// ============================================================================

#[tokio::test]
async fn empty_store_emits_nothing() {
    let (_backend, store) = new_store();
    let query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();

    assert_quiet(&query, &mut events).await;
    assert!(query.active_keys().await.unwrap().is_empty());
}

#[tokio::test]
async fn write_inside_enters_and_removal_exits() {
    let (_backend, store) = new_store();
    let query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut entered = query.observe(EventKind::Entered).await.unwrap();
    let mut exited = query.observe(EventKind::Exited).await.unwrap();

    store.set_location("1", coord(0.0, 0.0)).await.unwrap();
    assert_eq!(
        next_event(&mut entered).await,
        QueryEvent::entered("1", coord(0.0, 0.0))
    );

    assert!(store.remove_location("1").await.unwrap());
    assert_eq!(
        next_event(&mut exited).await,
        QueryEvent::exited("1", coord(0.0, 0.0))
    );

    assert_quiet(&query, &mut entered).await;
    assert_quiet(&query, &mut exited).await;
}

#[tokio::test]
async fn write_outside_is_ignored() {
    let (_backend, store) = new_store();
    let query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();

    // ~2.2 km east, in a neighbouring cell but outside the circle
    store.set_location("far", coord(0.0, 0.02)).await.unwrap();
    store.set_location("very-far", coord(45.0, 45.0)).await.unwrap();

    assert_quiet(&query, &mut events).await;
}

#[tokio::test]
async fn boundary_point_is_inside() {
    let (_backend, store) = new_store();
    let center = coord(37.7749, -122.4194);
    let edge = coord(37.7800, -122.4100);
    let radius = center.distance_to(&edge);

    let query = store.query(center, radius).await.unwrap();
    let mut entered = query.observe(EventKind::Entered).await.unwrap();

    store.set_location("edge", edge).await.unwrap();
    assert_eq!(next_event(&mut entered).await.key, "edge");
}

#[tokio::test]
async fn move_inside_then_out() {
    let (_backend, store) = new_store();
    let query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();

    store.set_location("1", coord(0.0, 0.001)).await.unwrap();
    store.set_location("1", coord(0.0, 0.002)).await.unwrap();
    store.set_location("1", coord(0.0, 0.05)).await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        QueryEvent::entered("1", coord(0.0, 0.001))
    );
    assert_eq!(
        next_event(&mut events).await,
        QueryEvent::moved("1", coord(0.0, 0.002))
    );
    // Exit reports where the key went.
    assert_eq!(
        next_event(&mut events).await,
        QueryEvent::exited("1", coord(0.0, 0.05))
    );
}

#[tokio::test]
async fn rewriting_same_location_is_silent() {
    let (_backend, store) = new_store();
    let query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();

    store.set_location("1", coord(0.0, 0.001)).await.unwrap();
    assert_eq!(next_event(&mut events).await.kind, EventKind::Entered);

    store.set_location("1", coord(0.0, 0.001)).await.unwrap();
    assert_quiet(&query, &mut events).await;
}

#[tokio::test]
async fn disjoint_queries_do_not_interfere() {
    let (_backend, store) = new_store();
    let here = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let there = store.query(coord(10.0, 10.0), 1_000.0).await.unwrap();
    let mut here_events = here.observe_all().await.unwrap();
    let mut there_events = there.observe_all().await.unwrap();

    store.set_location("1", coord(0.0, 0.0)).await.unwrap();

    assert_eq!(next_event(&mut here_events).await.key, "1");
    assert_quiet(&there, &mut there_events).await;
}

// ============================================================================
// Observers
// ============================================================================

#[tokio::test]
async fn new_observer_gets_current_members() {
    let (_backend, store) = new_store();
    store.set_location("b", coord(0.0, 0.001)).await.unwrap();
    store.set_location("a", coord(0.001, 0.0)).await.unwrap();
    store.set_location("out", coord(1.0, 1.0)).await.unwrap();

    let query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        QueryEvent::entered("a", coord(0.001, 0.0))
    );
    assert_eq!(
        next_event(&mut events).await,
        QueryEvent::entered("b", coord(0.0, 0.001))
    );
    assert_quiet(&query, &mut events).await;

    let active = query.active_keys().await.unwrap();
    assert_eq!(active.keys().collect::<Vec<_>>(), vec!["a", "b"]);
}

#[tokio::test]
async fn exit_observer_gets_no_replay() {
    let (_backend, store) = new_store();
    store.set_location("1", coord(0.0, 0.0)).await.unwrap();

    let query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut exited = query.observe(EventKind::Exited).await.unwrap();
    assert_quiet(&query, &mut exited).await;

    store.remove_location("1").await.unwrap();
    assert_eq!(next_event(&mut exited).await.kind, EventKind::Exited);
}

#[tokio::test]
async fn dropped_observer_does_not_block_others() {
    let (_backend, store) = new_store();
    let query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let dropped = query.observe_all().await.unwrap();
    let mut kept = query.observe_all().await.unwrap();
    drop(dropped);

    store.set_location("1", coord(0.0, 0.0)).await.unwrap();
    assert_eq!(next_event(&mut kept).await.key, "1");
}

// ============================================================================
// Criteria updates
// ============================================================================

#[tokio::test]
async fn recenter_emits_only_the_difference() {
    let (_backend, store) = new_store();
    // "a" is near the first centre only, "b" near the second only, "c" near both.
    store.set_location("a", coord(0.0, -0.01)).await.unwrap();
    store.set_location("b", coord(0.0, 0.04)).await.unwrap();
    store.set_location("c", coord(0.0, 0.015)).await.unwrap();

    let mut query = store.query(coord(0.0, 0.0), 2_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();
    assert_eq!(next_event(&mut events).await.key, "a");
    assert_eq!(next_event(&mut events).await.key, "c");

    query.recenter(coord(0.0, 0.03)).await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        QueryEvent::exited("a", coord(0.0, -0.01))
    );
    assert_eq!(
        next_event(&mut events).await,
        QueryEvent::entered("b", coord(0.0, 0.04))
    );
    assert_quiet(&query, &mut events).await;
    assert_eq!(query.center(), coord(0.0, 0.03));
}

#[tokio::test]
async fn recenter_to_same_criteria_is_silent() {
    let (_backend, store) = new_store();
    store.set_location("1", coord(0.0, 0.0)).await.unwrap();

    let mut query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();
    assert_eq!(next_event(&mut events).await.kind, EventKind::Entered);

    query.recenter(coord(0.0, 0.0)).await.unwrap();
    query.set_radius(1_000.0).await.unwrap();
    assert_quiet(&query, &mut events).await;
}

#[tokio::test]
async fn growing_radius_enters_and_shrinking_exits() {
    let (_backend, store) = new_store();
    store.set_location("1", coord(0.0, 0.015)).await.unwrap();

    let mut query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();
    assert_quiet(&query, &mut events).await;

    query.set_radius(2_000.0).await.unwrap();
    assert_eq!(next_event(&mut events).await.kind, EventKind::Entered);

    query.set_radius(500.0).await.unwrap();
    assert_eq!(next_event(&mut events).await.kind, EventKind::Exited);
}

#[tokio::test]
async fn changes_after_recenter_follow_new_cells() {
    let (_backend, store) = new_store();
    let mut query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();

    query.recenter(coord(40.0, -74.0)).await.unwrap();

    store.set_location("old-area", coord(0.0, 0.0)).await.unwrap();
    store.set_location("new-area", coord(40.0, -74.0)).await.unwrap();

    assert_eq!(next_event(&mut events).await.key, "new-area");
    assert_quiet(&query, &mut events).await;
}

#[tokio::test(start_paused = true)]
async fn timed_out_recenter_leaves_query_unchanged() {
    let (backend, store) = new_store_with(StoreConfig {
        timeout_ms: 100,
        ..StoreConfig::default()
    });
    store.set_location("1", coord(0.0, 0.0)).await.unwrap();

    let mut query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();
    assert_eq!(next_event(&mut events).await.kind, EventKind::Entered);

    backend.set_latency(Duration::from_secs(1));
    let err = query.recenter(coord(20.0, 20.0)).await.unwrap_err();
    assert!(matches!(
        err,
        QueryError::Store(StoreError::Timeout { .. })
    ));

    assert_eq!(query.center(), coord(0.0, 0.0));
    assert_eq!(
        query.active_keys().await.unwrap(),
        BTreeMap::from([("1".to_string(), coord(0.0, 0.0))])
    );
    assert_quiet(&query, &mut events).await;

    // Retrying once the store recovers succeeds.
    backend.set_latency(Duration::ZERO);
    query.recenter(coord(20.0, 20.0)).await.unwrap();
    assert_eq!(next_event(&mut events).await.kind, EventKind::Exited);
}

// ============================================================================
// Connection loss
// ============================================================================

#[tokio::test(start_paused = true)]
async fn resubscribes_and_reports_missed_changes() {
    let (backend, store) = new_store();
    store.set_location("1", coord(0.0, 0.0)).await.unwrap();

    let query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();
    assert_eq!(next_event(&mut events).await.key, "1");

    // Watches close; the writes below reach nobody until the query resubscribes.
    backend.set_available(false);
    backend.set_available(true);
    store.remove_location("1").await.unwrap();
    store.set_location("2", coord(0.0, 0.001)).await.unwrap();

    assert_eq!(
        next_event(&mut events).await,
        QueryEvent::exited("1", coord(0.0, 0.0))
    );
    assert_eq!(
        next_event(&mut events).await,
        QueryEvent::entered("2", coord(0.0, 0.001))
    );
    assert_eq!(query.state(), QueryState::Active);
}

#[tokio::test(start_paused = true)]
async fn keeps_retrying_through_long_outage() {
    let (backend, store) = new_store();
    let query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();

    backend.set_available(false);
    tokio::time::sleep(Duration::from_secs(5)).await;
    backend.set_available(true);

    store.set_location("1", coord(0.0, 0.0)).await.unwrap();
    let event = next_event_within(&mut events, Duration::from_secs(60)).await;
    assert_eq!(event, QueryEvent::entered("1", coord(0.0, 0.0)));

    // Live again: later writes arrive through the new watch.
    store.set_location("1", coord(0.0, 0.001)).await.unwrap();
    assert_eq!(next_event(&mut events).await.kind, EventKind::Moved);
}

// ============================================================================
// Teardown
// ============================================================================

#[tokio::test]
async fn unsubscribe_ends_streams_and_releases_watch() {
    let (backend, store) = new_store();
    let mut query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();
    assert_eq!(backend.watch_count(), 1);

    query.unsubscribe().await.unwrap();

    assert_eq!(events.next().await, None);
    assert_eq!(backend.watch_count(), 0);
    assert!(matches!(
        query.active_keys().await,
        Err(QueryError::AlreadyUnsubscribed)
    ));

    // Writes after unsubscribe go nowhere.
    store.set_location("1", coord(0.0, 0.0)).await.unwrap();
}

#[tokio::test]
async fn dropping_registration_ends_streams() {
    let (_backend, store) = new_store();
    let query = store.query(coord(0.0, 0.0), 1_000.0).await.unwrap();
    let mut events = query.observe_all().await.unwrap();

    drop(query);
    let end = tokio::time::timeout(Duration::from_secs(5), events.next())
        .await
        .unwrap();
    assert_eq!(end, None);
}

// ============================================================================
// Randomized placement
// ============================================================================

#[tokio::test]
async fn random_sightings_match_brute_force() {
    let (_backend, store) = new_store();
    let center = coord(51.5074, -0.1278);
    let radius = 2_500.0;
    let mut rng = StdRng::seed_from_u64(7);

    let query = store.query(center, radius).await.unwrap();
    let mut expected = BTreeMap::new();
    for id in 0..150 {
        let spot = coord(
            center.latitude + rng.gen_range(-0.05..0.05),
            center.longitude + rng.gen_range(-0.08..0.08),
        );
        let key = format!("pokemon-{id}");
        store.set_location(&key, spot).await.unwrap();
        if center.is_within(&spot, radius) {
            expected.insert(key, spot);
        }
    }

    settle(&query).await;
    assert!(!expected.is_empty());
    assert_eq!(query.active_keys().await.unwrap(), expected);
}
