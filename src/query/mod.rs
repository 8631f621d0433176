//! Live radius queries.
//!
//! A query tracks which keys lie within a radius of a centre and reports
//! membership changes as they happen:
//!
//! - `Entered` when a key comes inside (including every member already
//!   inside when an observer subscribes)
//! - `Exited` when a key leaves or is removed
//! - `Moved` when a member changes location but stays inside
//!
//! # Architecture
//!
//! ```text
//! QueryRegistration ──commands──▶ query task ◀──changes── store watch
//!                                    │
//!                                    ├──▶ EventStream (observer 1)
//!                                    └──▶ EventStream (observer 2)
//! ```
//!
//! Each query is owned by a single task. The circle is covered with geohash
//! cells, the task watches those cells and filters every candidate by exact
//! distance, so cell corners outside the circle never produce events.
//!
//! If the store watch is lost the task resubscribes with exponential
//! backoff, re-reads its cells and emits whatever changed in the meantime.

mod actor;
mod error;
mod registration;
mod stream;
mod types;

pub use error::{QueryError, QueryResult};
pub use registration::QueryRegistration;
pub use stream::EventStream;
pub use types::{EventKind, QueryConfig, QueryCriteria, QueryEvent, QueryState};
