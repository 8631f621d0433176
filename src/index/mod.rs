//! Geohash index.
//!
//! Turns coordinates into sortable string keys and circles into the key
//! ranges that must be scanned to find every point inside them.
//!
//! # Architecture
//!
//! ```text
//! Coordinate ──encode──▶ "u2ecqg7k3p"  (stored geohash, precision 10)
//!
//! (center, radius) ──covering_prefixes──▶ {"u2ecq", "u2ecr", ...}
//!                                              │
//!                                        prefix_range
//!                                              ▼
//!                                   ["u2ecq", "u2ecq~") range scans
//! ```
//!
//! Cells are rectangles, so range scans return a superset of the circle;
//! the query layer removes the extra points by haversine distance.

mod codec;
mod covering;
mod error;

pub use codec::{
    cell_size, decode, decode_bounds, encode, prefix_range, validate_geohash, validate_precision,
    CellBounds, CellSize, BASE32, MAX_PRECISION, RANGE_SENTINEL,
};
pub use covering::{covering_prefixes, BoundingBox, CoverageConfig};
pub use error::{IndexError, IndexResult};
