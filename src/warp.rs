//! Destination grid planning for reprojected reads.
//!
//! Given a source, the requested bounds, and the requested output shape,
//! [`plan_warp`] decides the grid (affine transform plus pixel dimensions)
//! the source is warped onto before windowing. Two paths:
//!
//! 1. **Grid-snapped**: coarse web-mercator renders of DEM sources land on
//!    the global power-of-two pyramid, so neighboring renders share pixel
//!    edges. Extent-fitted grids resample elevation slightly differently per
//!    request, which shows up as crosshatch seams in hillshades.
//! 2. **Generic**: ask the source's transform calculator to fit a grid to
//!    the source extent, retrying with a downsampled source whenever the
//!    calculation runs out of memory.

use crate::crs::{codes, extent_for_crs, Bounds, Crs};
use crate::error::{RenderError, RenderResult};
use crate::recipe::Recipe;
use crate::resolution::{
    ground_resolution_meters, resolution_from_bounds, zoom_for_resolution, ZoomRounding, TILE_SIZE,
};
use crate::source::RasterSource;

/// Finest zoom level the grid-snapping path will plan for.
const MAX_SNAP_ZOOM: i32 = 22;

/// Affine geotransform for converting between pixel and world coordinates.
///
/// The transform is defined by 6 coefficients from the GDAL-style affine:
/// ```text
/// x_world = a * col + b * row + c
/// y_world = d * col + e * row + f
/// ```
///
/// For the north-up grids this core plans:
/// - `a` is the pixel width (x resolution)
/// - `e` is the pixel height (y resolution, negative for top-down grids)
/// - `c` is the x coordinate of the upper-left corner
/// - `f` is the y coordinate of the upper-left corner
/// - `b` and `d` are 0 (no rotation/shear)
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeoTransform {
    /// Pixel width (x scale)
    pub a: f64,
    /// Row rotation (typically 0)
    pub b: f64,
    /// X origin (upper-left x coordinate)
    pub c: f64,
    /// Column rotation (typically 0)
    pub d: f64,
    /// Pixel height (y scale, negative for top-down)
    pub e: f64,
    /// Y origin (upper-left y coordinate)
    pub f: f64,
}

impl GeoTransform {
    /// The north-up transform that maps a `(height, width)` pixel grid
    /// exactly onto `bounds`.
    pub fn from_bounds(bounds: &Bounds, shape: (usize, usize)) -> Self {
        let (height, width) = shape;
        Self {
            a: bounds.width() / width as f64,
            b: 0.0,
            c: bounds.west,
            d: 0.0,
            e: -bounds.height() / height as f64,
            f: bounds.north,
        }
    }

    /// A north-up transform anchored at `(origin_x, origin_y)` with the given
    /// positive pixel sizes. `y_res` is stored negated (top-down rows).
    pub fn north_up(origin_x: f64, origin_y: f64, x_res: f64, y_res: f64) -> Self {
        Self {
            a: x_res,
            b: 0.0,
            c: origin_x,
            d: 0.0,
            e: -y_res,
            f: origin_y,
        }
    }

    /// The same pixel sizes re-anchored at a new upper-left corner.
    pub fn with_origin(&self, x: f64, y: f64) -> Self {
        Self { c: x, f: y, ..*self }
    }

    /// Convert world coordinates to pixel coordinates.
    ///
    /// Returns (column, row) as floating point for sub-pixel precision.
    #[inline]
    pub fn world_to_pixel(&self, x: f64, y: f64) -> (f64, f64) {
        // Inverse of affine transform (assuming no rotation, b=0, d=0)
        let col = (x - self.c) / self.a;
        let row = (y - self.f) / self.e;
        (col, row)
    }

    /// Convert pixel coordinates to world coordinates.
    ///
    /// Takes (column, row) and returns (x, y) in the CRS.
    #[inline]
    pub fn pixel_to_world(&self, col: f64, row: f64) -> (f64, f64) {
        let x = self.a * col + self.b * row + self.c;
        let y = self.d * col + self.e * row + self.f;
        (x, y)
    }

    /// Geographic bounds of a pixel window on this grid.
    ///
    /// Offsets and sizes are fractional, measured from the grid's upper-left
    /// corner.
    pub fn window_bounds(
        &self,
        col_off: f64,
        row_off: f64,
        width: f64,
        height: f64,
        crs: Crs,
    ) -> Bounds {
        let (west, north) = self.pixel_to_world(col_off, row_off);
        let (east, south) = self.pixel_to_world(col_off + width, row_off + height);
        Bounds::new(west, south, east, north, crs)
    }
}

/// A planned destination grid: the affine transform plus pixel dimensions of
/// the warped view to build.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpPlan {
    pub transform: GeoTransform,
    /// Grid width in pixels.
    pub width: usize,
    /// Grid height in pixels.
    pub height: usize,
}

impl WarpPlan {
    /// Undo a planning-time source downscale: pixel sizes shrink by the
    /// factor and dimensions grow by it. The origin is unchanged.
    fn upscaled(mut self, factor: usize) -> Self {
        if factor > 1 {
            let k = factor as f64;
            self.transform.a /= k;
            self.transform.b /= k;
            self.transform.d /= k;
            self.transform.e /= k;
            self.width *= factor;
            self.height *= factor;
        }
        self
    }
}

/// Plan the grid `source` should be warped onto to serve `bounds` at
/// `target_shape` (height, width).
///
/// DEM sources rendered into web mercator coarser than their native
/// resolution snap onto the global power-of-two pyramid (capped at zoom 22).
/// Everything else gets a source-extent-fitted grid from the source's own
/// transform calculator, with a resolution hint when the request is finer
/// than the source so the calculator does not simplify detail away.
pub fn plan_warp(
    source: &dyn RasterSource,
    bounds: &Bounds,
    target_shape: (usize, usize),
    recipe: &Recipe,
) -> RenderResult<WarpPlan> {
    let src_bounds = source.bounds();
    let (src_height, src_width) = source.shape();
    let source_resolution = ground_resolution_meters(&src_bounds, (src_height, src_width));
    let target_resolution = ground_resolution_meters(bounds, target_shape);

    if recipe.dem
        && bounds.crs == codes::WEB_MERCATOR
        && target_resolution.0 > source_resolution.0
        && target_resolution.1 > source_resolution.1
    {
        let max_source_resolution = source_resolution.0.max(source_resolution.1);
        let zoom = zoom_for_resolution(max_source_resolution, ZoomRounding::Up)
            .clamp(0, MAX_SNAP_ZOOM);
        let dst_size = (TILE_SIZE as usize) << zoom;
        let extent = extent_for_crs(bounds.crs)?;
        let x_res = extent.width() / dst_size as f64;
        let y_res = extent.height() / dst_size as f64;
        tracing::debug!("Snapping DEM warp to zoom {} ({}px global grid)", zoom, dst_size);
        return Ok(WarpPlan {
            transform: GeoTransform::north_up(extent.west, extent.north, x_res, y_res),
            width: dst_size,
            height: dst_size,
        });
    }

    // When the request is finer than the source (overzoom), hint the
    // calculator with the requested pixel size so the plan keeps that
    // resolution instead of the source's.
    let resolution_hint = if target_resolution.0 < source_resolution.0
        || target_resolution.1 < source_resolution.1
    {
        Some(resolution_from_bounds(bounds, target_shape))
    } else {
        None
    };

    let mut attempts = 0usize;
    let mut scale_factor = 1usize;
    loop {
        let scaled_shape = (src_height / scale_factor, src_width / scale_factor);
        if scaled_shape.0 == 0 || scaled_shape.1 == 0 {
            return Err(RenderError::ResourceExhausted);
        }
        match source.suggest_transform(bounds.crs, scaled_shape, resolution_hint) {
            Ok(plan) => return Ok(plan.upscaled(scale_factor)),
            Err(err) if err.is_resource_exhausted() => {
                attempts += 1;
                scale_factor = 2 * attempts;
                tracing::warn!(
                    "Transform calculation ran out of memory, retrying at 1/{} source size",
                    scale_factor
                );
            }
            Err(err) => return Err(err),
        }
    }
}
