//! Geohash encoding, decoding and cell geometry.
//!
//! A geohash interleaves longitude and latitude bisection bits (longitude
//! first) and writes them five at a time in a base32 alphabet. Two useful
//! properties follow:
//!
//! - A point's geohash at precision `p` is a prefix of its geohash at any
//!   precision greater than `p`.
//! - Lexicographic order of geohashes groups each cell's points into one
//!   contiguous range, so "every point in this cell" is a single range scan.
//!
//! # Geohash Precision Table
//!
//! | Length | Cell Height | Cell Width (equator) |
//! |--------|-------------|----------------------|
//! | 4      | 19.5 km     | 39.1 km              |
//! | 5      | 4.9 km      | 4.9 km               |
//! | 6      | 0.61 km     | 1.2 km               |
//! | 7      | 153 m       | 153 m                |
//! | 8      | 19 m        | 38 m                 |
//! | 10     | 0.6 m       | 1.2 m                |

use crate::location::Coordinate;

use super::error::{IndexError, IndexResult};

/// The geohash base32 alphabet, in sort order.
pub const BASE32: &[u8; 32] = b"0123456789bcdefghjkmnpqrstuvwxyz";

/// Longest geohash supported (60 bits).
pub const MAX_PRECISION: usize = 12;

/// Sentinel that sorts after every base32 character.
///
/// `prefix + RANGE_SENTINEL` is the exclusive upper bound of every geohash
/// starting with `prefix`.
pub const RANGE_SENTINEL: char = '~';

/// Latitude/longitude extents of a geohash cell.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellBounds {
    /// Southern edge in degrees.
    pub min_latitude: f64,
    /// Northern edge in degrees.
    pub max_latitude: f64,
    /// Western edge in degrees.
    pub min_longitude: f64,
    /// Eastern edge in degrees.
    pub max_longitude: f64,
}

impl CellBounds {
    /// Centre of the cell.
    #[must_use]
    pub fn center(&self) -> Coordinate {
        Coordinate {
            latitude: (self.min_latitude + self.max_latitude) / 2.0,
            longitude: (self.min_longitude + self.max_longitude) / 2.0,
        }
    }

    /// Returns whether the coordinate lies inside the cell (edges included).
    #[must_use]
    pub fn contains(&self, coord: &Coordinate) -> bool {
        (self.min_latitude..=self.max_latitude).contains(&coord.latitude)
            && (self.min_longitude..=self.max_longitude).contains(&coord.longitude)
    }
}

/// Size of one cell at a given precision, in degrees.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CellSize {
    /// Cell height in degrees of latitude.
    pub latitude_deg: f64,
    /// Cell width in degrees of longitude.
    pub longitude_deg: f64,
}

/// Number of (longitude, latitude) bits encoded by a geohash of `precision`.
#[must_use]
pub const fn bits_for_precision(precision: usize) -> (u32, u32) {
    #[allow(clippy::cast_possible_truncation)]
    let bits = (precision * 5) as u32;
    (bits.div_ceil(2), bits / 2)
}

/// Checks that a precision is within 1..=12.
///
/// # Errors
///
/// Returns [`IndexError::InvalidPrecision`] otherwise.
pub const fn validate_precision(precision: usize) -> IndexResult<()> {
    if precision == 0 || precision > MAX_PRECISION {
        return Err(IndexError::InvalidPrecision(precision));
    }
    Ok(())
}

/// Checks that a geohash is 1..=12 characters of the base32 alphabet.
///
/// # Errors
///
/// Returns [`IndexError::InvalidGeohash`] otherwise.
pub fn validate_geohash(geohash: &str) -> IndexResult<()> {
    let valid = !geohash.is_empty()
        && geohash.len() <= MAX_PRECISION
        && geohash.bytes().all(|b| BASE32.contains(&b));
    if valid {
        Ok(())
    } else {
        Err(IndexError::InvalidGeohash(geohash.to_string()))
    }
}

/// Cell dimensions at a given precision.
///
/// # Errors
///
/// Returns [`IndexError::InvalidPrecision`] for precisions outside 1..=12.
///
/// # Examples
///
/// ```
/// use sightings_core::index::cell_size;
///
/// let size = cell_size(1).unwrap();
/// assert_eq!(size.longitude_deg, 45.0);
/// assert_eq!(size.latitude_deg, 45.0);
/// ```
pub fn cell_size(precision: usize) -> IndexResult<CellSize> {
    validate_precision(precision)?;
    let (lon_bits, lat_bits) = bits_for_precision(precision);
    Ok(CellSize {
        latitude_deg: 180.0 / f64::from(1_u32 << lat_bits),
        longitude_deg: 360.0 / f64::from(1_u32 << lon_bits),
    })
}

/// Encodes a coordinate to a geohash of `precision` characters.
///
/// # Errors
///
/// Returns an error if the coordinate is invalid or the precision is outside
/// 1..=12.
///
/// # Examples
///
/// ```
/// use sightings_core::index::encode;
/// use sightings_core::location::Coordinate;
///
/// let coord = Coordinate::new(37.7749, -122.4194).unwrap();
/// assert_eq!(encode(&coord, 5).unwrap(), "9q8yy");
/// ```
pub fn encode(coord: &Coordinate, precision: usize) -> IndexResult<String> {
    validate_precision(precision)?;
    coord.validate()?;
    geohash::encode(
        geohash::Coord {
            x: coord.longitude,
            y: coord.latitude,
        },
        precision,
    )
    .map_err(|_| IndexError::InvalidPrecision(precision))
}

/// Decodes a geohash to the centre of its cell.
///
/// Decoding is lossy: the original point is somewhere in the cell, and the
/// centre is within half a cell of it in each axis. Use [`decode_bounds`] for
/// the exact extents.
///
/// # Errors
///
/// Returns [`IndexError::InvalidGeohash`] for malformed input.
pub fn decode(geohash: &str) -> IndexResult<Coordinate> {
    Ok(decode_bounds(geohash)?.center())
}

/// Decodes a geohash to the bounds of its cell.
///
/// # Errors
///
/// Returns [`IndexError::InvalidGeohash`] for malformed input.
pub fn decode_bounds(geohash: &str) -> IndexResult<CellBounds> {
    validate_geohash(geohash)?;
    let (center, lon_err, lat_err) = geohash::decode(geohash)
        .map_err(|_| IndexError::InvalidGeohash(geohash.to_string()))?;
    Ok(CellBounds {
        min_latitude: center.y - lat_err,
        max_latitude: center.y + lat_err,
        min_longitude: center.x - lon_err,
        max_longitude: center.x + lon_err,
    })
}

/// Start (inclusive) and end (exclusive) keys of every geohash under `prefix`.
///
/// The empty prefix spans the whole index.
///
/// # Examples
///
/// ```
/// use sightings_core::index::prefix_range;
///
/// let (start, end) = prefix_range("u2");
/// assert_eq!(start, "u2");
/// assert_eq!(end, "u2~");
/// assert!("u2zzzz".as_bytes() < end.as_bytes());
/// ```
#[must_use]
pub fn prefix_range(prefix: &str) -> (String, String) {
    let mut end = String::with_capacity(prefix.len() + 1);
    end.push_str(prefix);
    end.push(RANGE_SENTINEL);
    (prefix.to_string(), end)
}

/// Encodes the centre of grid cell `(x, y)` at `precision`.
///
/// `x` counts cells eastward from -180, `y` northward from -90.
pub(crate) fn encode_cell(x: u64, y: u64, precision: usize) -> IndexResult<String> {
    let size = cell_size(precision)?;
    #[allow(clippy::cast_precision_loss)]
    let center = Coordinate {
        latitude: (y as f64 + 0.5).mul_add(size.latitude_deg, -90.0),
        longitude: (x as f64 + 0.5).mul_add(size.longitude_deg, -180.0),
    };
    encode(&center, precision)
}
