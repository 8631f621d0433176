//! Sightings Core Library
//!
//! Live geospatial proximity queries over a realtime key-value store.
//! Callers publish a location per key and subscribe to "keys within R
//! meters of a point", receiving an event whenever a key enters, leaves or
//! moves inside the circle.
//!
//! - [`location`]: coordinates, validation and great-circle distance
//! - [`index`]: geohash encoding and radius covering
//! - [`store`]: the location store client and its backends
//! - [`query`]: live radius queries and their event streams

#![warn(clippy::all)]
#![warn(clippy::pedantic)]
#![warn(clippy::nursery)]
#![deny(unsafe_code)]

pub mod index;
pub mod location;
pub mod query;
pub mod store;

pub use location::Coordinate;
pub use query::{EventKind, EventStream, QueryError, QueryEvent, QueryRegistration, QueryState};
pub use store::{LocationStore, MemoryBackend, StoreBackend, StoreConfig, StoreError};
