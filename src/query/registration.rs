//! Handle to a live radius query.

use std::collections::BTreeMap;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::sync::{mpsc, oneshot};
use tracing::info;

use crate::location::Coordinate;
use crate::store::LocationStore;

use super::actor::{Command, QueryActor};
use super::error::{QueryError, QueryResult};
use super::stream::EventStream;
use super::types::{EventKind, QueryConfig, QueryCriteria, QueryState};

static NEXT_QUERY_ID: AtomicU64 = AtomicU64::new(1);

/// A live "keys within radius of a point" subscription.
///
/// Created with [`LocationStore::query`] or [`QueryRegistration::create`].
/// The query runs on its own task until [`unsubscribe`](Self::unsubscribe)
/// is called or the registration is dropped.
///
/// # Example
///
/// ```
/// use std::sync::Arc;
/// use futures::StreamExt;
/// use sightings_core::location::Coordinate;
/// use sightings_core::query::{EventKind, QueryEvent};
/// use sightings_core::store::{LocationStore, MemoryBackend, StoreConfig};
///
/// # tokio_test_block_on(async {
/// let store = LocationStore::new(Arc::new(MemoryBackend::new()), StoreConfig::default())?;
/// let query = store.query(Coordinate::new(0.0, 0.0)?, 2_000.0).await?;
/// let mut entered = query.observe(EventKind::Entered).await?;
///
/// store.set_location("1", Coordinate::new(0.0, 0.0)?).await?;
/// assert_eq!(
///     entered.next().await,
///     Some(QueryEvent::entered("1", Coordinate::new(0.0, 0.0)?))
/// );
/// # Ok::<(), Box<dyn std::error::Error>>(())
/// # });
/// # fn tokio_test_block_on<F: std::future::Future>(f: F) -> F::Output {
/// #     tokio::runtime::Builder::new_current_thread().enable_all().build().unwrap().block_on(f)
/// # }
/// ```
#[derive(Debug)]
pub struct QueryRegistration {
    id: u64,
    commands: mpsc::Sender<Command>,
    criteria: QueryCriteria,
    state: QueryState,
}

impl QueryRegistration {
    /// Starts a query over `store`.
    ///
    /// The current members are loaded before this returns; observers added
    /// later receive them as `Entered` events. The coverage precision in
    /// `config` is capped at the store's geohash precision.
    ///
    /// Must be called within a Tokio runtime.
    ///
    /// # Errors
    ///
    /// - [`QueryError::Validation`] / [`QueryError::Index`] for a bad centre,
    ///   radius or coverage configuration
    /// - [`QueryError::Store`] if the initial load fails
    pub async fn create(
        store: &LocationStore,
        center: Coordinate,
        radius_m: f64,
        mut config: QueryConfig,
    ) -> QueryResult<Self> {
        let criteria = QueryCriteria::new(center, radius_m)?;
        // Prefixes longer than the stored geohashes would match nothing.
        config.coverage.max_precision = config
            .coverage
            .max_precision
            .min(store.config().geohash_precision);
        let id = NEXT_QUERY_ID.fetch_add(1, Ordering::Relaxed);
        let buffer = config.command_buffer.max(1);

        let actor = QueryActor::start(id, store.clone(), criteria, config).await?;
        let (commands, rx) = mpsc::channel(buffer);
        tokio::spawn(actor.run(rx));

        info!(
            query = id,
            latitude = center.latitude,
            longitude = center.longitude,
            radius_m,
            "query started"
        );
        Ok(Self {
            id,
            commands,
            criteria,
            state: QueryState::Active,
        })
    }

    /// Process-unique id, used in log fields.
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Current centre.
    #[must_use]
    pub const fn center(&self) -> Coordinate {
        self.criteria.center
    }

    /// Current radius in meters.
    #[must_use]
    pub const fn radius(&self) -> f64 {
        self.criteria.radius_m
    }

    /// Lifecycle state.
    #[must_use]
    pub const fn state(&self) -> QueryState {
        self.state
    }

    /// Subscribes to events of one kind.
    ///
    /// Observing `Entered` first replays every key currently inside.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::AlreadyUnsubscribed`] after unsubscribe.
    pub async fn observe(&self, kind: EventKind) -> QueryResult<EventStream> {
        self.request(|resp| Command::Observe {
            filter: Some(kind),
            resp,
        })
        .await
    }

    /// Subscribes to every event kind, starting with the replay.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::AlreadyUnsubscribed`] after unsubscribe.
    pub async fn observe_all(&self) -> QueryResult<EventStream> {
        self.request(|resp| Command::Observe { filter: None, resp })
            .await
    }

    /// Moves the query to `center`, keeping the radius.
    ///
    /// # Errors
    ///
    /// See [`update_criteria`](Self::update_criteria).
    pub async fn recenter(&mut self, center: Coordinate) -> QueryResult<()> {
        self.update_criteria(center, self.criteria.radius_m).await
    }

    /// Changes the radius, keeping the centre.
    ///
    /// # Errors
    ///
    /// See [`update_criteria`](Self::update_criteria).
    pub async fn set_radius(&mut self, radius_m: f64) -> QueryResult<()> {
        self.update_criteria(self.criteria.center, radius_m).await
    }

    /// Replaces centre and radius.
    ///
    /// Emits `Exited` for keys no longer inside, then `Entered` for new ones
    /// and `Moved` for members whose location changed. Applying the current
    /// criteria again emits nothing. On failure nothing changes and the call
    /// may be retried.
    ///
    /// # Errors
    ///
    /// - [`QueryError::AlreadyUnsubscribed`] after unsubscribe
    /// - [`QueryError::Validation`] / [`QueryError::Index`] for bad criteria
    /// - [`QueryError::Store`] if the store could not be read
    pub async fn update_criteria(&mut self, center: Coordinate, radius_m: f64) -> QueryResult<()> {
        self.ensure_active()?;
        let criteria = QueryCriteria::new(center, radius_m)?;
        self.request(|resp| Command::Update { criteria, resp })
            .await??;
        self.criteria = criteria;
        Ok(())
    }

    /// Keys currently inside the circle with their locations.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::AlreadyUnsubscribed`] after unsubscribe.
    pub async fn active_keys(&self) -> QueryResult<BTreeMap<String, Coordinate>> {
        self.request(|resp| Command::ActiveKeys { resp }).await
    }

    /// Stops the query. Open event streams end; later calls fail.
    ///
    /// # Errors
    ///
    /// Returns [`QueryError::AlreadyUnsubscribed`] if called twice.
    pub async fn unsubscribe(&mut self) -> QueryResult<()> {
        self.ensure_active()?;
        self.state = QueryState::Unsubscribed;

        let (resp, done) = oneshot::channel();
        if self.commands.send(Command::Unsubscribe { resp }).await.is_ok() {
            let _ = done.await;
        }
        info!(query = self.id, "query unsubscribed");
        Ok(())
    }

    const fn ensure_active(&self) -> QueryResult<()> {
        match self.state {
            QueryState::Active => Ok(()),
            QueryState::Unsubscribed => Err(QueryError::AlreadyUnsubscribed),
        }
    }

    async fn request<T>(
        &self,
        make: impl FnOnce(oneshot::Sender<T>) -> Command,
    ) -> QueryResult<T> {
        self.ensure_active()?;
        let (resp, rx) = oneshot::channel();
        self.commands
            .send(make(resp))
            .await
            .map_err(|_| QueryError::AlreadyUnsubscribed)?;
        rx.await.map_err(|_| QueryError::AlreadyUnsubscribed)
    }
}
