//! Coordinates and distances.
//!
//! Every coordinate that reaches the store or a query goes through
//! [`Coordinate::validate`]: latitude in [-90, 90], longitude in [-180, 180],
//! both finite. Distances are great-circle (haversine) on a sphere of radius
//! [`EARTH_RADIUS_M`].
//!
//! # Example Usage
//!
//! ```
//! use sightings_core::location::Coordinate;
//!
//! let belgrade = Coordinate::new(44.8125, 20.4612).unwrap();
//! let novi_sad = Coordinate::new(45.2671, 19.8335).unwrap();
//!
//! let km = belgrade.distance_to(&novi_sad) / 1000.0;
//! assert!(km > 70.0 && km < 75.0);
//! ```

pub mod distance;
pub mod error;
pub mod types;

pub use distance::{haversine_distance, EARTH_RADIUS_M, METERS_PER_DEGREE_LATITUDE};
pub use error::{ValidationError, ValidationResult};
pub use types::Coordinate;
