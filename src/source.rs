//! The seam between this core and the raster source library.
//!
//! Everything that touches actual pixels lives on the far side of these
//! traits: file and protocol I/O, coordinate reprojection math, and
//! resampling kernels. The core consumes an opened source through
//! [`RasterSource`], plans a destination grid with its transform calculator,
//! and reads exact-shape windows through a scoped [`WarpedView`].

use ndarray::Array3;

use crate::crs::{Bounds, Crs};
use crate::error::RenderResult;
use crate::recipe::Resampling;
use crate::warp::{GeoTransform, WarpPlan};

/// Pixel sample types a source can declare.
///
/// Samples always arrive in the core as `f64`; the declared type only drives
/// synthetic-nodata selection and float-tolerant masking.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DataType {
    Byte,
    UInt16,
    Int16,
    UInt32,
    Int32,
    Float32,
    Float64,
}

impl DataType {
    /// The synthetic nodata value for sources that declare none: the minimum
    /// representable value of the type. For unsigned types that is 0, so
    /// legitimate zero pixels in such sources come out masked.
    pub fn synthetic_nodata(&self) -> f64 {
        match self {
            DataType::Byte => f64::from(u8::MIN),
            DataType::UInt16 => f64::from(u16::MIN),
            DataType::Int16 => f64::from(i16::MIN),
            DataType::UInt32 => f64::from(u32::MIN),
            DataType::Int32 => f64::from(i32::MIN),
            DataType::Float32 => f64::from(f32::MIN),
            DataType::Float64 => f64::MIN,
        }
    }

    /// True for floating-point sample types, which get tolerance-based
    /// nodata matching instead of exact equality.
    pub fn is_floating(&self) -> bool {
        matches!(self, DataType::Float32 | DataType::Float64)
    }
}

/// Color role of a band, as declared by the source.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColorRole {
    Undefined,
    Gray,
    /// Indexed color; resampling must not blend indices.
    Palette,
    Red,
    Green,
    Blue,
    /// Opacity channel. In a warped view this is the mask for the data bands.
    Alpha,
}

/// Per-band metadata the masking rules consult.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BandInfo {
    pub color: ColorRole,
    /// The band's validity is defined by a dataset-internal mask band.
    pub per_dataset_mask: bool,
    /// The band's validity is defined by an alpha band.
    pub alpha_mask: bool,
}

impl BandInfo {
    /// A band with the given color role and no mask metadata.
    pub fn plain(color: ColorRole) -> Self {
        Self {
            color,
            per_dataset_mask: false,
            alpha_mask: false,
        }
    }
}

/// A fractional pixel window within a warped view.
///
/// Offsets and sizes are floating point: the window is the exact footprint
/// of a geographic bounds on the view's grid, and reads resample it to an
/// integer output shape.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PixelWindow {
    /// Column offset from the view's left edge.
    pub col_off: f64,
    /// Row offset from the view's top edge.
    pub row_off: f64,
    /// Width in view pixels.
    pub width: f64,
    /// Height in view pixels.
    pub height: f64,
}

impl PixelWindow {
    /// The window covering `bounds` on the grid described by `transform`.
    pub fn from_bounds(bounds: &Bounds, transform: &GeoTransform) -> Self {
        let (col_off, row_off) = transform.world_to_pixel(bounds.west, bounds.north);
        Self {
            col_off,
            row_off,
            width: bounds.width() / transform.a,
            // e is negative for top-down grids, so this comes out positive.
            height: (bounds.south - bounds.north) / transform.e,
        }
    }
}

/// Everything needed to build a reprojected virtual view of a source.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct WarpParams {
    /// CRS of the view's grid.
    pub crs: Crs,
    /// Affine transform of the view's grid.
    pub transform: GeoTransform,
    /// View width in pixels.
    pub width: usize,
    /// View height in pixels.
    pub height: usize,
    /// Kernel for the source-to-view resample.
    pub resampling: Resampling,
    /// Source nodata to honor while warping. `None` disables nodata-based
    /// masking (used when an alpha band is synthesized instead).
    pub src_nodata: Option<f64>,
    /// Ask the view to synthesize an alpha band from the source's
    /// per-dataset mask.
    pub add_alpha: bool,
}

/// An opened raster source.
///
/// Implementations front a raster library dataset handle. All metadata is
/// native (pre-warp); the transform calculator and view constructor do the
/// CRS work.
pub trait RasterSource {
    /// Native bounds, in the source's own CRS.
    fn bounds(&self) -> Bounds;

    /// Native pixel dimensions as (height, width).
    fn shape(&self) -> (usize, usize);

    /// Declared sample type.
    fn dtype(&self) -> DataType;

    /// Declared nodata value, if any.
    fn nodata(&self) -> Option<f64>;

    /// Per-band metadata, one entry per band.
    fn bands(&self) -> &[BandInfo];

    /// Compute the destination grid for reprojecting this source into
    /// `dst_crs`, treating the source as having `src_shape` (height, width)
    /// pixels. `resolution` is an optional target-CRS-unit pixel size to
    /// honor instead of a library-chosen one.
    ///
    /// Must fail with `RenderError::ResourceExhausted` when the calculation
    /// runs out of memory; the transform planner retries those with reduced
    /// `src_shape`.
    fn suggest_transform(
        &self,
        dst_crs: Crs,
        src_shape: (usize, usize),
        resolution: Option<(f64, f64)>,
    ) -> RenderResult<WarpPlan>;

    /// Build a reprojected virtual view of this source on the grid described
    /// by `params`. The view borrows the source and is dropped (releasing
    /// library resources) as soon as the read finishes.
    fn warped_view(&self, params: &WarpParams) -> RenderResult<Box<dyn WarpedView + '_>>;
}

/// A reprojected, read-only view over a source.
pub trait WarpedView {
    /// Band metadata of the view. May differ from the source's when an
    /// alpha band was synthesized.
    fn bands(&self) -> &[BandInfo];

    /// Nodata value of the view, if nodata-based masking is active.
    fn nodata(&self) -> Option<f64>;

    /// Read `window` resampled to `out_shape` (height, width). The result is
    /// shaped `(bands, height, width)` and covers the window exactly.
    fn read(&self, window: &PixelWindow, out_shape: (usize, usize)) -> RenderResult<Array3<f64>>;
}
