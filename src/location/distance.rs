//! Great-circle distance on a spherical Earth.

use super::types::Coordinate;

/// Mean Earth radius in meters (IUGG).
pub const EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Meters spanned by one degree of latitude on the sphere.
pub const METERS_PER_DEGREE_LATITUDE: f64 = EARTH_RADIUS_M * std::f64::consts::PI / 180.0;

/// Haversine distance between two coordinates, in meters.
///
/// # Examples
///
/// ```
/// use sightings_core::location::{haversine_distance, Coordinate};
///
/// let a = Coordinate::new(0.0, 0.0).unwrap();
/// let b = Coordinate::new(0.0, 1.0).unwrap();
/// let d = haversine_distance(&a, &b);
/// assert!((d - 111_195.0).abs() < 1.0);
/// ```
#[must_use]
pub fn haversine_distance(a: &Coordinate, b: &Coordinate) -> f64 {
    let lat1 = a.latitude.to_radians();
    let lat2 = b.latitude.to_radians();
    let d_lat = (b.latitude - a.latitude).to_radians();
    let d_lon = (b.longitude - a.longitude).to_radians();

    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lon / 2.0).sin().powi(2);
    // Rounding can push h a hair past 1.0 for antipodal points.
    let h = h.clamp(0.0, 1.0);

    2.0 * EARTH_RADIUS_M * h.sqrt().asin()
}
