//! Coordinate reference systems, bounds, and world extents.
//!
//! ## CRS used in this core:
//!
//! - **Web Mercator (EPSG:3857)**: the web-projected metric CRS (x, y in
//!   meters). The grid that map tiles snap to; target CRS for tile renders
//!   and for the DEM grid-snapping special case.
//!
//! - **WGS84 (EPSG:4326)**: geographic coordinates (lon, lat in degrees).
//!   Typical native CRS for catalog footprints and unprojected sources.
//!
//! Sources may carry any other CRS; reprojection between them is the raster
//! library's job. This module only identifies a CRS and answers whether it is
//! degree-based.
//!
//! ## Coordinate order convention:
//!
//! - Bounds: `(west, south, east, north)` = `(min_x, min_y, max_x, max_y)`
//! - For WGS84: `(min_lon, min_lat, max_lon, max_lat)`

use std::collections::HashMap;
use std::fmt;
use std::sync::LazyLock;

use serde::{Deserialize, Serialize};

use crate::error::{RenderError, RenderResult};

/// Radius of the spherical Earth model underlying web mercator, in meters.
/// Zoom-level arithmetic and the web-mercator world extent derive from it.
pub const EARTH_RADIUS: f64 = 6378137.0;

/// Common CRS identifiers used throughout the core.
pub mod codes {
    use super::{Crs, CrsKind};

    /// Web Mercator / spherical mercator (x/y in meters).
    pub const WEB_MERCATOR: Crs = Crs::new(3857, CrsKind::Projected);

    /// WGS84 geographic coordinate system (lon/lat in degrees).
    pub const WGS84: Crs = Crs::new(4326, CrsKind::Geographic);
}

/// Whether a CRS measures coordinates in degrees or in linear units.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CrsKind {
    /// Degree-based (lon/lat).
    Geographic,
    /// Linear units (meters for every CRS this core meets).
    Projected,
}

/// Canonical CRS identifier: an EPSG code plus its unit kind.
///
/// The kind travels with the code because ground-resolution math must know
/// whether a given bounds is degree-based without consulting a CRS database,
/// which lives on the raster library's side of the seam.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Crs {
    code: u32,
    kind: CrsKind,
}

impl Crs {
    /// Create a CRS identifier from an EPSG code and unit kind.
    pub const fn new(code: u32, kind: CrsKind) -> Self {
        Self { code, kind }
    }

    /// Shorthand for a geographic (degree-based) CRS.
    pub const fn geographic(code: u32) -> Self {
        Self::new(code, CrsKind::Geographic)
    }

    /// Shorthand for a projected (metric) CRS.
    pub const fn projected(code: u32) -> Self {
        Self::new(code, CrsKind::Projected)
    }

    /// The EPSG code.
    pub const fn epsg(&self) -> u32 {
        self.code
    }

    /// Check if this is a geographic (lon/lat degree) CRS.
    pub const fn is_geographic(&self) -> bool {
        matches!(self.kind, CrsKind::Geographic)
    }
}

impl fmt::Display for Crs {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "EPSG:{}", self.code)
    }
}

/// A geographic rectangle in a specific CRS.
///
/// Immutable value type. Two bounds are only comparable or combinable when
/// their CRS identifiers are equal; reprojecting one side first is the
/// caller's job.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct Bounds {
    pub west: f64,
    pub south: f64,
    pub east: f64,
    pub north: f64,
    pub crs: Crs,
}

impl Bounds {
    /// Create bounds from edge coordinates and their CRS.
    pub const fn new(west: f64, south: f64, east: f64, north: f64, crs: Crs) -> Self {
        Self {
            west,
            south,
            east,
            north,
            crs,
        }
    }

    /// Horizontal span in CRS units.
    pub fn width(&self) -> f64 {
        self.east - self.west
    }

    /// Vertical span in CRS units.
    pub fn height(&self) -> f64 {
        self.north - self.south
    }

    /// True when every coordinate is finite.
    pub fn is_finite(&self) -> bool {
        self.west.is_finite()
            && self.south.is_finite()
            && self.east.is_finite()
            && self.north.is_finite()
    }

    /// True when west < east and south < north.
    pub fn is_ordered(&self) -> bool {
        self.west < self.east && self.south < self.north
    }
}

impl fmt::Display for Bounds {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "({}, {}, {}, {}) {}",
            self.west, self.south, self.east, self.north, self.crs
        )
    }
}

/// World extents per CRS. Built once, never mutated afterwards; lookups need
/// no locking.
static WORLD_EXTENTS: LazyLock<HashMap<Crs, Bounds>> = LazyLock::new(|| {
    let mercator_max = std::f64::consts::PI * EARTH_RADIUS;
    HashMap::from([
        (
            codes::WEB_MERCATOR,
            Bounds::new(
                -mercator_max,
                -mercator_max,
                mercator_max,
                mercator_max,
                codes::WEB_MERCATOR,
            ),
        ),
        (
            codes::WGS84,
            Bounds::new(-180.0, -90.0, 180.0, 90.0, codes::WGS84),
        ),
    ])
});

/// Look up the full-world bounds for a CRS.
///
/// Only the CRS the core renders into are tabulated; anything else fails
/// with `UnsupportedCrs`.
pub fn extent_for_crs(crs: Crs) -> RenderResult<Bounds> {
    WORLD_EXTENTS
        .get(&crs)
        .copied()
        .ok_or(RenderError::UnsupportedCrs(crs))
}
