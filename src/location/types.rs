//! Location data types.

use serde::{Deserialize, Serialize};

use super::distance::haversine_distance;
use super::error::{ValidationError, ValidationResult};

/// A point on the Earth's surface in decimal degrees.
///
/// Fields are public so callers can build coordinates directly, but nothing
/// is stored or queried before [`Coordinate::validate`] has accepted it.
///
/// # Example
///
/// ```
/// use sightings_core::location::Coordinate;
///
/// let coord = Coordinate::new(44.8125, 20.4612).unwrap();
/// assert_eq!(coord.latitude, 44.8125);
///
/// assert!(Coordinate::new(91.0, 0.0).is_err());
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Coordinate {
    /// Latitude in degrees, -90.0 to 90.0.
    pub latitude: f64,

    /// Longitude in degrees, -180.0 to 180.0.
    pub longitude: f64,
}

impl Coordinate {
    /// Creates a validated coordinate.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] if either component is non-finite or out
    /// of range. Boundary values (poles, antimeridian) are accepted.
    pub fn new(latitude: f64, longitude: f64) -> ValidationResult<Self> {
        let coord = Self {
            latitude,
            longitude,
        };
        coord.validate()?;
        Ok(coord)
    }

    /// Checks that the coordinate is finite and within range.
    ///
    /// # Errors
    ///
    /// Returns a [`ValidationError`] describing the first offending component.
    pub fn validate(&self) -> ValidationResult<()> {
        if !self.latitude.is_finite() || !self.longitude.is_finite() {
            return Err(ValidationError::NonFinite {
                latitude: self.latitude,
                longitude: self.longitude,
            });
        }
        if !(-90.0..=90.0).contains(&self.latitude) {
            return Err(ValidationError::LatitudeOutOfRange(self.latitude));
        }
        if !(-180.0..=180.0).contains(&self.longitude) {
            return Err(ValidationError::LongitudeOutOfRange(self.longitude));
        }
        Ok(())
    }

    /// Great-circle distance to `other` in meters.
    #[must_use]
    pub fn distance_to(&self, other: &Self) -> f64 {
        haversine_distance(self, other)
    }

    /// Returns whether `other` lies within `radius_m` of this coordinate.
    ///
    /// The boundary is inclusive: a point at exactly `radius_m` is within.
    #[must_use]
    pub fn is_within(&self, other: &Self, radius_m: f64) -> bool {
        self.distance_to(other) <= radius_m
    }
}

impl TryFrom<(f64, f64)> for Coordinate {
    type Error = ValidationError;

    fn try_from((latitude, longitude): (f64, f64)) -> ValidationResult<Self> {
        Self::new(latitude, longitude)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn new_accepts_valid_coordinate() {
        let coord = Coordinate::new(37.7749, -122.4194).unwrap();
        assert_eq!(coord.latitude, 37.7749);
        assert_eq!(coord.longitude, -122.4194);
    }

    #[test]
    fn new_accepts_boundaries() {
        assert!(Coordinate::new(90.0, 0.0).is_ok());
        assert!(Coordinate::new(-90.0, 0.0).is_ok());
        assert!(Coordinate::new(0.0, 180.0).is_ok());
        assert!(Coordinate::new(0.0, -180.0).is_ok());
    }

    #[test]
    fn new_rejects_out_of_range_latitude() {
        assert_eq!(
            Coordinate::new(90.000_1, 0.0),
            Err(ValidationError::LatitudeOutOfRange(90.000_1))
        );
        assert_eq!(
            Coordinate::new(-91.0, 0.0),
            Err(ValidationError::LatitudeOutOfRange(-91.0))
        );
    }

    #[test]
    fn new_rejects_out_of_range_longitude() {
        assert_eq!(
            Coordinate::new(0.0, 181.0),
            Err(ValidationError::LongitudeOutOfRange(181.0))
        );
    }

    #[test]
    fn new_rejects_nan_and_infinity() {
        assert!(matches!(
            Coordinate::new(f64::NAN, 0.0),
            Err(ValidationError::NonFinite { .. })
        ));
        assert!(matches!(
            Coordinate::new(0.0, f64::INFINITY),
            Err(ValidationError::NonFinite { .. })
        ));
    }

    #[test]
    fn validate_catches_hand_built_coordinates() {
        let coord = Coordinate {
            latitude: 12.0,
            longitude: -200.0,
        };
        assert!(coord.validate().is_err());
    }

    #[test]
    fn try_from_tuple() {
        let coord = Coordinate::try_from((1.5, 2.5)).unwrap();
        assert_eq!(coord, Coordinate::new(1.5, 2.5).unwrap());
        assert!(Coordinate::try_from((100.0, 0.0)).is_err());
    }

    #[test]
    fn is_within_is_inclusive() {
        let center = Coordinate::new(0.0, 0.0).unwrap();
        let point = Coordinate::new(0.0, 0.01).unwrap();
        let distance = center.distance_to(&point);

        assert!(center.is_within(&point, distance));
        assert!(!center.is_within(&point, distance - 0.001));
    }

    #[test]
    fn serde_roundtrip() {
        let coord = Coordinate::new(-33.8688, 151.2093).unwrap();
        let json = serde_json::to_string(&coord).unwrap();
        let back: Coordinate = serde_json::from_str(&json).unwrap();
        assert_eq!(coord, back);
    }
}
