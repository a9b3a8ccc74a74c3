//! Resolution and zoom-level arithmetic.
//!
//! Three notions of resolution meet here:
//!
//! - **Affine resolution**: bounds span divided by pixel count, in whatever
//!   units the bounds' CRS uses (degrees or meters).
//! - **Ground resolution**: meters per pixel. Equal to the affine resolution
//!   for metric CRS; derived from great-circle edge distances for degree CRS.
//! - **Zoom level**: position on the global power-of-two tile pyramid, where
//!   zoom 0 covers the web-mercator world extent with 256 pixels.

use crate::crs::{Bounds, EARTH_RADIUS};

/// IUGG mean Earth radius in meters, for great-circle distances.
const MEAN_EARTH_RADIUS_M: f64 = 6_371_008.8;

/// Pixels per tile edge at every zoom level.
pub const TILE_SIZE: f64 = 256.0;

/// Rounding policy for `zoom_for_resolution`.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ZoomRounding {
    /// Round to the nearest zoom level.
    Nearest,
    /// Round up (finer zoom). Used where undershooting the source detail
    /// would discard data, e.g. the DEM grid-snapping branch.
    Up,
}

/// Affine pixel size for a bounds rendered at a shape, as absolute values.
///
/// `shape` is (height, width) in pixels; the result is (x_res, y_res) in the
/// bounds' CRS units.
pub fn resolution_from_bounds(bounds: &Bounds, shape: (usize, usize)) -> (f64, f64) {
    let (height, width) = shape;
    let x_res = (bounds.width() / width as f64).abs();
    let y_res = (bounds.height() / height as f64).abs();
    (x_res, y_res)
}

/// Ground resolution in meters per pixel.
///
/// For degree-based CRS the east-west size is measured along the bounds'
/// mid-latitude and the north-south size along its mid-longitude, both as
/// great-circle distances. Metric CRS delegate to the affine resolution.
pub fn ground_resolution_meters(bounds: &Bounds, shape: (usize, usize)) -> (f64, f64) {
    if !bounds.crs.is_geographic() {
        return resolution_from_bounds(bounds, shape);
    }

    let (height, width) = shape;
    let mid_lat = (bounds.south + bounds.north) / 2.0;
    let mid_lon = (bounds.west + bounds.east) / 2.0;

    let x_meters = haversine_distance(bounds.west, mid_lat, bounds.east, mid_lat);
    let y_meters = haversine_distance(mid_lon, bounds.south, mid_lon, bounds.north);

    (x_meters / width as f64, y_meters / height as f64)
}

/// Great-circle distance between two lon/lat points in meters.
///
/// Uses the haversine formula on a spherical Earth.
pub fn haversine_distance(lon1: f64, lat1: f64, lon2: f64, lat2: f64) -> f64 {
    let lat1_rad = lat1.to_radians();
    let lat2_rad = lat2.to_radians();
    let delta_lat = (lat2 - lat1).to_radians();
    let delta_lon = (lon2 - lon1).to_radians();

    let a = (delta_lat / 2.0).sin().powi(2)
        + lat1_rad.cos() * lat2_rad.cos() * (delta_lon / 2.0).sin().powi(2);
    let c = 2.0 * a.sqrt().asin();

    MEAN_EARTH_RADIUS_M * c
}

/// Zoom level whose tile resolution matches a ground resolution.
///
/// Zoom 0 resolution is `2 * pi * EARTH_RADIUS / 256` meters per pixel and
/// each level halves it. The result may be negative for resolutions coarser
/// than zoom 0; callers that index pyramids clamp as needed.
pub fn zoom_for_resolution(resolution_m: f64, rounding: ZoomRounding) -> i32 {
    debug_assert!(resolution_m > 0.0, "resolution must be positive");
    let zoom = ((2.0 * std::f64::consts::PI * EARTH_RADIUS) / (resolution_m * TILE_SIZE)).log2();
    match rounding {
        ZoomRounding::Nearest => zoom.round() as i32,
        ZoomRounding::Up => zoom.ceil() as i32,
    }
}
