//! Windowed raster rendering core.
//!
//! Turns "a target bounds/shape/CRS plus overlapping raster sources" into an
//! exact-shape masked pixel buffer with response headers: reprojection grid
//! planning, nodata/alpha mask resolution, margin-aware transformations, and
//! per-stage timing.
//!
//! # Architecture
//!
//! - **crs / resolution**: CRS identifiers, world extents, resolution and
//!   zoom arithmetic
//! - **source / warp / reader**: the raster-library seam, destination grid
//!   planning, and exact-shape windowed reads
//! - **pixels**: the `PixelCollection` buffer type and margin cropping
//! - **render / tile / stats**: request orchestration, XYZ tile addressing,
//!   stage timing and response headers
//!
//! # Usage
//!
//! ```
//! use tileforge::{zoom_for_resolution, Tile, ZoomRounding};
//!
//! let world = Tile::new(0, 0, 0).bounds();
//! assert_eq!(world.width(), world.height());
//!
//! // One 256px tile covering the world renders at roughly 156km per pixel.
//! let zoom = zoom_for_resolution(world.width() / 256.0, ZoomRounding::Nearest);
//! assert_eq!(zoom, 0);
//! ```

pub mod crs;
pub mod error;
pub mod pixels;
pub mod reader;
pub mod recipe;
pub mod render;
pub mod resolution;
pub mod source;
pub mod stats;
pub mod tile;
pub mod warp;


pub use crs::{codes, extent_for_crs, Bounds, Crs, CrsKind, EARTH_RADIUS};
pub use error::{RenderError, RenderResult};
pub use pixels::{crop, CropOffsets, PixelCollection, PixelLayout};
pub use reader::read_window;
pub use recipe::{Recipe, Resampling};
pub use render::{
    Catalog, Compositor, Formatter, RenderOutput, RenderRequest, Renderer, SourceEntry,
    SourceUsed, Transformation, RAW_FORMAT,
};
pub use resolution::{
    ground_resolution_meters, haversine_distance, resolution_from_bounds, zoom_for_resolution,
    ZoomRounding, TILE_SIZE,
};
pub use source::{
    BandInfo, ColorRole, DataType, PixelWindow, RasterSource, WarpParams, WarpedView,
};
pub use stats::{RenderStats, ResponseHeaders};
pub use tile::Tile;
pub use warp::{plan_warp, GeoTransform, WarpPlan};
