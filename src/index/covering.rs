//! Covering a circle with geohash prefixes.
//!
//! A radius query cannot scan "a circle" in an ordered key space; it scans
//! geohash cells. [`covering_prefixes`] picks a precision and a set of cells
//! whose union contains the whole circle, so every point inside the circle
//! has a stored geohash starting with one of the returned prefixes. Cells are
//! rectangles, so the union also contains points outside the circle; those are
//! removed afterwards by exact distance.
//!
//! # Precision choice
//!
//! Finer cells hug the circle more tightly (fewer false candidates to filter)
//! but need more range scans. The covering uses the finest precision at which
//! the circle's bounding box needs at most [`CoverageConfig::max_cells`]
//! cells, never finer than [`CoverageConfig::max_precision`].
//!
//! # Poles and the antimeridian
//!
//! - A bounding box that crosses ±180° longitude is split into two longitude
//!   intervals, one on each side.
//! - A circle that reaches a pole is covered as a polar cap: every longitude
//!   from its far latitude to the pole.
//! - A circle that reaches both poles, or whose radius is at least half the
//!   Earth's circumference, is covered by the empty prefix (the whole index).

use std::collections::{BTreeMap, BTreeSet};
use std::ops::RangeInclusive;

use serde::{Deserialize, Serialize};

use crate::location::{Coordinate, EARTH_RADIUS_M};

use super::codec::{bits_for_precision, encode_cell, validate_precision, BASE32, MAX_PRECISION};
use super::error::{IndexError, IndexResult};

/// Padding in degrees added around the bounding box.
///
/// Keeps points lying exactly on the circle inside the covering even when
/// the grid arithmetic and the geohash bisection round differently.
const EDGE_PADDING_DEG: f64 = 1e-9;

/// Tuning for [`covering_prefixes`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CoverageConfig {
    /// Upper bound on the number of cells before merging (range-scan fanout).
    pub max_cells: usize,

    /// Finest precision a covering may use.
    ///
    /// Must not exceed the precision stored geohashes are written at, or
    /// prefixes would be longer than the keys they are matched against.
    pub max_precision: usize,
}

impl Default for CoverageConfig {
    fn default() -> Self {
        Self {
            max_cells: 16,
            max_precision: 10,
        }
    }
}

/// Latitude span plus one or two longitude intervals enclosing a circle.
#[derive(Debug, Clone, PartialEq)]
pub struct BoundingBox {
    /// Southern edge in degrees.
    pub min_latitude: f64,
    /// Northern edge in degrees.
    pub max_latitude: f64,
    /// Disjoint `(west, east)` longitude intervals, each within [-180, 180].
    pub longitudes: Vec<(f64, f64)>,
}

impl BoundingBox {
    /// Bounding box of the spherical cap of `radius_m` around `center`.
    ///
    /// # Errors
    ///
    /// Returns an error if the centre is invalid or the radius is negative or
    /// not finite.
    pub fn around(center: &Coordinate, radius_m: f64) -> IndexResult<Self> {
        center.validate()?;
        if !radius_m.is_finite() || radius_m < 0.0 {
            return Err(IndexError::InvalidRadius(radius_m));
        }

        let angular = radius_m / EARTH_RADIUS_M;
        let lat = center.latitude.to_radians();
        let min_latitude = (lat - angular).to_degrees() - EDGE_PADDING_DEG;
        let max_latitude = (lat + angular).to_degrees() + EDGE_PADDING_DEG;

        let reaches_pole = min_latitude <= -90.0 || max_latitude >= 90.0;
        let half_width = if reaches_pole {
            None
        } else {
            let ratio = angular.sin() / lat.cos();
            (ratio < 1.0).then(|| ratio.asin().to_degrees() + EDGE_PADDING_DEG)
        };

        let longitudes = match half_width {
            Some(dlon) if dlon < 180.0 => split_longitudes(center.longitude, dlon),
            _ => vec![(-180.0, 180.0)],
        };

        Ok(Self {
            min_latitude: min_latitude.max(-90.0),
            max_latitude: max_latitude.min(90.0),
            longitudes,
        })
    }

    /// Returns whether the box spans the whole globe.
    #[must_use]
    pub fn is_whole_world(&self) -> bool {
        self.min_latitude <= -90.0
            && self.max_latitude >= 90.0
            && self.longitudes.iter().any(|&(w, e)| w <= -180.0 && e >= 180.0)
    }

    /// Number of grid cells at `precision` needed to cover the box.
    fn cell_count(&self, precision: usize) -> u128 {
        let grid = Grid::new(precision);
        let rows = span(&grid.rows(self.min_latitude, self.max_latitude));
        self.longitudes
            .iter()
            .map(|&(w, e)| span(&grid.columns(w, e)) * rows)
            .sum()
    }
}

/// Wraps `[lon - dlon, lon + dlon]` into [-180, 180].
fn split_longitudes(lon: f64, dlon: f64) -> Vec<(f64, f64)> {
    let west = lon - dlon;
    let east = lon + dlon;
    if west < -180.0 {
        vec![(west + 360.0, 180.0), (-180.0, east)]
    } else if east > 180.0 {
        vec![(west, 180.0), (-180.0, east - 360.0)]
    } else {
        vec![(west, east)]
    }
}

/// The uniform cell grid of one geohash precision.
struct Grid {
    columns: u64,
    rows: u64,
    cell_width: f64,
    cell_height: f64,
}

impl Grid {
    fn new(precision: usize) -> Self {
        let (lon_bits, lat_bits) = bits_for_precision(precision);
        let columns = 1_u64 << lon_bits;
        let rows = 1_u64 << lat_bits;
        #[allow(clippy::cast_precision_loss)]
        let (cell_width, cell_height) = (360.0 / columns as f64, 180.0 / rows as f64);
        Self {
            columns,
            rows,
            cell_width,
            cell_height,
        }
    }

    fn columns(&self, west: f64, east: f64) -> RangeInclusive<u64> {
        index_of(west + 180.0, self.cell_width, self.columns)
            ..=index_of(east + 180.0, self.cell_width, self.columns)
    }

    fn rows(&self, south: f64, north: f64) -> RangeInclusive<u64> {
        index_of(south + 90.0, self.cell_height, self.rows)
            ..=index_of(north + 90.0, self.cell_height, self.rows)
    }
}

/// Number of indices in a non-empty inclusive range.
fn span(range: &RangeInclusive<u64>) -> u128 {
    u128::from(range.end() - range.start()) + 1
}

/// Cell index of `offset` degrees, clamped to the grid.
#[allow(
    clippy::cast_possible_truncation,
    clippy::cast_sign_loss,
    clippy::cast_precision_loss
)]
fn index_of(offset: f64, cell: f64, count: u64) -> u64 {
    let idx = (offset / cell).floor();
    if idx <= 0.0 {
        0
    } else if idx >= count as f64 {
        count - 1
    } else {
        idx as u64
    }
}

/// Picks the covering precision for a bounding box.
///
/// Cell counts only grow with precision, so this walks from coarse to fine and
/// stops at the first precision over budget. Precision 1 is used even if it
/// exceeds `max_cells` (it has at most 32 cells).
fn choose_precision(bbox: &BoundingBox, config: &CoverageConfig) -> usize {
    let finest = config.max_precision.clamp(1, MAX_PRECISION);
    let budget = u128::try_from(config.max_cells.max(1)).unwrap_or(u128::MAX);
    let mut chosen = 1;
    for precision in 2..=finest {
        if bbox.cell_count(precision) > budget {
            break;
        }
        chosen = precision;
    }
    chosen
}

/// Computes the geohash prefixes whose union contains the circle.
///
/// The result is sorted and has no prefix that is a prefix of another.
///
/// # Errors
///
/// Returns an error if the centre is invalid, the radius is negative or not
/// finite, or `config.max_precision` is outside 1..=12.
///
/// # Examples
///
/// ```
/// use sightings_core::index::{covering_prefixes, encode, CoverageConfig};
/// use sightings_core::location::Coordinate;
///
/// let center = Coordinate::new(44.8125, 20.4612).unwrap();
/// let prefixes = covering_prefixes(&center, 2_500.0, &CoverageConfig::default()).unwrap();
///
/// let hash = encode(&center, 10).unwrap();
/// assert!(prefixes.iter().any(|p| hash.starts_with(p.as_str())));
/// ```
pub fn covering_prefixes(
    center: &Coordinate,
    radius_m: f64,
    config: &CoverageConfig,
) -> IndexResult<BTreeSet<String>> {
    validate_precision(config.max_precision)?;
    let bbox = BoundingBox::around(center, radius_m)?;
    if bbox.is_whole_world() {
        return Ok(BTreeSet::from([String::new()]));
    }

    let precision = choose_precision(&bbox, config);
    let grid = Grid::new(precision);
    let mut cells = BTreeSet::new();
    for &(west, east) in &bbox.longitudes {
        for x in grid.columns(west, east) {
            for y in grid.rows(bbox.min_latitude, bbox.max_latitude) {
                cells.insert(encode_cell(x, y, precision)?);
            }
        }
    }

    Ok(merge_siblings(cells))
}

/// Replaces every complete group of 32 sibling cells with their parent.
fn merge_siblings(mut cells: BTreeSet<String>) -> BTreeSet<String> {
    loop {
        let mut by_parent: BTreeMap<String, usize> = BTreeMap::new();
        for cell in cells.iter().filter(|c| !c.is_empty()) {
            *by_parent.entry(cell[..cell.len() - 1].to_string()).or_default() += 1;
        }

        let complete: Vec<String> = by_parent
            .into_iter()
            .filter(|&(_, n)| n == BASE32.len())
            .map(|(parent, _)| parent)
            .collect();
        if complete.is_empty() {
            return cells;
        }

        for parent in complete {
            cells.retain(|c| !(c.len() == parent.len() + 1 && c.starts_with(&parent)));
            cells.insert(parent);
        }
    }
}
