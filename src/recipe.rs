//! Per-source render options.
//!
//! A recipe travels with each catalog entry and tunes how that source is
//! read: which resampling kernel to use, what value marks missing pixels,
//! and whether the DEM grid-snapping path applies. Recipes are strict:
//! a key this version does not recognize is a deserialization error, not
//! something to silently drop.

use serde::{Deserialize, Serialize};

/// Resampling kernels the reprojected view can be asked for.
///
/// Names follow the warp-kernel vocabulary of the raster libraries the
/// `RasterSource` seam fronts.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Resampling {
    Nearest,
    Bilinear,
    Cubic,
    CubicSpline,
    Lanczos,
    Average,
    Mode,
}

/// Options controlling how a single source is read and warped.
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
#[serde(deny_unknown_fields, default)]
pub struct Recipe {
    /// Resampling kernel override. When absent, the windowed reader picks
    /// nearest-neighbor for paletted sources and bilinear for everything
    /// else.
    pub resample: Option<Resampling>,

    /// Nodata override. Replaces both the source-declared nodata and the
    /// synthetic fallback outright.
    pub nodata: Option<f64>,

    /// Snap coarse web-mercator renders of this source onto the global
    /// power-of-two grid (elevation sources show crosshatch artifacts under
    /// generic extent fitting).
    pub dem: bool,
}

impl Recipe {
    /// Parse a recipe from its JSON representation in catalog metadata.
    pub fn from_json(json: &str) -> anyhow::Result<Self> {
        let recipe: Recipe = serde_json::from_str(json)?;
        Ok(recipe)
    }
}
