//! The task that owns a query's state.
//!
//! Every mutation of a query (store changes, criteria updates, observer
//! registration, resubscription after an outage) happens on this one task,
//! so observers never see a half-applied update.
//!
//! The loop polls pending store changes before commands. A command sent
//! after a write is therefore handled after that write's change, which is
//! what makes a command round-trip usable as a barrier. The cost is that a
//! writer producing changes faster than the task drains them delays
//! commands until the backlog clears.

use std::collections::{BTreeMap, BTreeSet, HashMap};
use std::ops::ControlFlow;
use std::time::Duration;

use rand::Rng;
use tokio::sync::{mpsc, oneshot};
use tokio::time::Instant;
use tracing::{debug, info, trace, warn};

use crate::index::covering_prefixes;
use crate::location::Coordinate;
use crate::store::{Change, LocationStore, Revision, WatchReceiver};

use super::error::QueryResult;
use super::stream::EventStream;
use super::types::{EventKind, QueryConfig, QueryCriteria, QueryEvent};

/// Requests from a [`super::QueryRegistration`] handle.
pub(crate) enum Command {
    Observe {
        filter: Option<EventKind>,
        resp: oneshot::Sender<EventStream>,
    },
    Update {
        criteria: QueryCriteria,
        resp: oneshot::Sender<QueryResult<()>>,
    },
    ActiveKeys {
        resp: oneshot::Sender<BTreeMap<String, Coordinate>>,
    },
    Unsubscribe {
        resp: oneshot::Sender<()>,
    },
}

struct Subscriber {
    filter: Option<EventKind>,
    tx: mpsc::UnboundedSender<QueryEvent>,
}

impl Subscriber {
    fn accepts(&self, kind: EventKind) -> bool {
        self.filter.is_none_or(|f| f == kind)
    }
}

/// A completed scan of the store, not yet applied.
struct Scan {
    criteria: QueryCriteria,
    prefixes: BTreeSet<String>,
    watch: WatchReceiver,
    /// Keys inside the circle.
    inside: BTreeMap<String, Coordinate>,
    /// Every key found in the covering cells.
    located: HashMap<String, Coordinate>,
    revisions: HashMap<String, Revision>,
}

struct Resync {
    at: Instant,
    backoff: Duration,
}

enum Step {
    Change(Option<Change>),
    Resync,
    Command(Option<Command>),
}

pub(crate) struct QueryActor {
    id: u64,
    store: LocationStore,
    config: QueryConfig,
    criteria: QueryCriteria,
    prefixes: BTreeSet<String>,
    active: BTreeMap<String, Coordinate>,
    revisions: HashMap<String, Revision>,
    watch: Option<WatchReceiver>,
    subscribers: Vec<Subscriber>,
    resync: Option<Resync>,
}

impl QueryActor {
    /// Runs the initial scan. Fails without side effects if the store does.
    pub(crate) async fn start(
        id: u64,
        store: LocationStore,
        criteria: QueryCriteria,
        config: QueryConfig,
    ) -> QueryResult<Self> {
        let scan = scan(&store, &config, criteria).await?;
        let mut actor = Self {
            id,
            store,
            config,
            criteria,
            prefixes: BTreeSet::new(),
            active: BTreeMap::new(),
            revisions: HashMap::new(),
            watch: None,
            subscribers: Vec::new(),
            resync: None,
        };
        actor.apply_scan(scan);
        Ok(actor)
    }

    pub(crate) async fn run(mut self, mut commands: mpsc::Receiver<Command>) {
        loop {
            // Changes first: a change already delivered is applied before any
            // command that was sent after it.
            let step = tokio::select! {
                biased;
                change = next_change(&mut self.watch) => Step::Change(change),
                () = resync_due(self.resync.as_ref().map(|r| r.at)) => Step::Resync,
                cmd = commands.recv() => Step::Command(cmd),
            };

            match step {
                Step::Change(Some(change)) => self.apply_change(change),
                Step::Change(None) => self.watch_lost(),
                Step::Resync => self.resync().await,
                Step::Command(Some(cmd)) => {
                    if self.handle(cmd).await.is_break() {
                        break;
                    }
                }
                Step::Command(None) => {
                    debug!(query = self.id, "registration dropped");
                    break;
                }
            }
        }
        self.subscribers.clear();
        debug!(query = self.id, "query task stopped");
    }

    async fn handle(&mut self, cmd: Command) -> ControlFlow<()> {
        match cmd {
            Command::Observe { filter, resp } => {
                let stream = self.subscribe(filter);
                let _ = resp.send(stream);
            }
            Command::Update { criteria, resp } => {
                let result = self.update(criteria).await;
                let _ = resp.send(result);
            }
            Command::ActiveKeys { resp } => {
                let _ = resp.send(self.active.clone());
            }
            Command::Unsubscribe { resp } => {
                self.watch = None;
                self.subscribers.clear();
                let _ = resp.send(());
                return ControlFlow::Break(());
            }
        }
        ControlFlow::Continue(())
    }

    /// Registers an observer and replays the current members to it.
    fn subscribe(&mut self, filter: Option<EventKind>) -> EventStream {
        let (tx, rx) = mpsc::unbounded_channel();
        let subscriber = Subscriber { filter, tx };
        if subscriber.accepts(EventKind::Entered) {
            for (key, coord) in &self.active {
                let _ = subscriber.tx.send(QueryEvent::entered(key.clone(), *coord));
            }
        }
        debug!(
            query = self.id,
            ?filter,
            replayed = self.active.len(),
            "observer added"
        );
        self.subscribers.push(subscriber);
        EventStream::new(rx)
    }

    async fn update(&mut self, criteria: QueryCriteria) -> QueryResult<()> {
        if criteria == self.criteria {
            trace!(query = self.id, "criteria unchanged");
            return Ok(());
        }
        let scan = scan(&self.store, &self.config, criteria).await.map_err(|e| {
            warn!(query = self.id, error = %e, "criteria update failed");
            e
        })?;
        info!(
            query = self.id,
            latitude = criteria.center.latitude,
            longitude = criteria.center.longitude,
            radius_m = criteria.radius_m,
            "criteria updated"
        );
        self.apply_scan(scan);
        Ok(())
    }

    /// Replaces the query state with `scan`, emitting the differences.
    ///
    /// Exits go out first, then enters and moves, each in key order.
    fn apply_scan(&mut self, scan: Scan) {
        let previous = std::mem::take(&mut self.active);

        for (key, old) in &previous {
            if !scan.inside.contains_key(key) {
                let coord = scan.located.get(key).copied().unwrap_or(*old);
                self.emit(QueryEvent::exited(key.clone(), coord));
            }
        }
        for (key, coord) in &scan.inside {
            match previous.get(key) {
                None => self.emit(QueryEvent::entered(key.clone(), *coord)),
                Some(old) if old != coord => self.emit(QueryEvent::moved(key.clone(), *coord)),
                Some(_) => {}
            }
        }

        debug!(
            query = self.id,
            cells = scan.prefixes.len(),
            members = scan.inside.len(),
            "scan applied"
        );
        self.criteria = scan.criteria;
        self.prefixes = scan.prefixes;
        self.active = scan.inside;
        self.revisions = scan.revisions;
        self.watch = Some(scan.watch);
        self.resync = None;
    }

    fn apply_change(&mut self, change: Change) {
        if self
            .revisions
            .get(&change.key)
            .is_some_and(|&seen| change.revision <= seen)
        {
            trace!(query = self.id, key = %change.key, revision = change.revision, "stale change");
            return;
        }
        // Watches deliver in revision order, so once a key is past its
        // scanned revision no later change for it can be stale.
        self.revisions.remove(&change.key);

        let now = match change.coordinate() {
            None => None,
            Some(Ok(coord)) => Some(coord),
            Some(Err(e)) => {
                warn!(query = self.id, key = %change.key, error = %e, "ignoring corrupt location");
                None
            }
        };
        let inside = now.filter(|c| self.criteria.contains(c));

        match (self.active.get(&change.key).copied(), inside) {
            (None, Some(coord)) => {
                self.active.insert(change.key.clone(), coord);
                self.emit(QueryEvent::entered(change.key, coord));
            }
            (Some(old), Some(coord)) if old != coord => {
                self.active.insert(change.key.clone(), coord);
                self.emit(QueryEvent::moved(change.key, coord));
            }
            (Some(old), None) => {
                self.active.remove(&change.key);
                self.emit(QueryEvent::exited(change.key, now.unwrap_or(old)));
            }
            _ => {}
        }
    }

    fn emit(&mut self, event: QueryEvent) {
        trace!(query = self.id, kind = event.kind.as_str(), key = %event.key, "event");
        self.subscribers.retain(|s| {
            if s.accepts(event.kind) {
                s.tx.send(event.clone()).is_ok()
            } else {
                !s.tx.is_closed()
            }
        });
    }

    fn watch_lost(&mut self) {
        warn!(
            query = self.id,
            cells = self.prefixes.len(),
            "store watch closed, resubscribing"
        );
        self.watch = None;
        if self.resync.is_none() {
            self.schedule_resync(self.config.backoff_initial());
        }
    }

    fn schedule_resync(&mut self, backoff: Duration) {
        let delay = jittered(backoff);
        debug!(query = self.id, ?delay, "resubscribe scheduled");
        self.resync = Some(Resync {
            at: Instant::now() + delay,
            backoff,
        });
    }

    async fn resync(&mut self) {
        let Some(Resync { backoff, .. }) = self.resync.take() else {
            return;
        };
        match scan(&self.store, &self.config, self.criteria).await {
            Ok(scan) => {
                info!(query = self.id, "resubscribed");
                self.apply_scan(scan);
            }
            Err(e) => {
                let next = backoff.saturating_mul(2).min(self.config.backoff_max());
                warn!(query = self.id, error = %e, "resubscribe failed");
                self.schedule_resync(next);
            }
        }
    }
}

/// Covers `criteria`, opens a watch on the cells, then reads them.
///
/// The watch is opened before the read so no write between the two is lost;
/// anything it reports that the read already saw is dropped by revision.
async fn scan(
    store: &LocationStore,
    config: &QueryConfig,
    criteria: QueryCriteria,
) -> QueryResult<Scan> {
    let prefixes = covering_prefixes(&criteria.center, criteria.radius_m, &config.coverage)?;
    let watch = store.watch(&prefixes).await?;
    let records = store.records_in(&prefixes).await?;

    let mut inside = BTreeMap::new();
    let mut located = HashMap::with_capacity(records.len());
    let mut revisions = HashMap::with_capacity(records.len());
    for record in records {
        revisions.insert(record.key.clone(), record.revision);
        located.insert(record.key.clone(), record.coordinate);
        if criteria.contains(&record.coordinate) {
            inside.insert(record.key, record.coordinate);
        }
    }

    Ok(Scan {
        criteria,
        prefixes,
        watch,
        inside,
        located,
        revisions,
    })
}

async fn next_change(watch: &mut Option<WatchReceiver>) -> Option<Change> {
    match watch {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn resync_due(at: Option<Instant>) {
    match at {
        Some(at) => tokio::time::sleep_until(at).await,
        None => std::future::pending().await,
    }
}

fn jittered(backoff: Duration) -> Duration {
    backoff.mul_f64(rand::thread_rng().gen_range(0.8..=1.2))
}
