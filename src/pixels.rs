//! Pixel buffers and margin cropping.
//!
//! A `PixelCollection` is the unit of exchange between pipeline stages: an
//! owned multi-band sample buffer, a per-pixel validity mask, and the bounds
//! the buffer covers. Stages never mutate a collection they were handed;
//! each stage consumes its input and returns a fresh one.

use ndarray::{s, Array2, Array3};
use serde_json::json;

use crate::crs::Bounds;
use crate::error::{RenderError, RenderResult};
use crate::warp::GeoTransform;

/// Axis ordering of a pixel buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PixelLayout {
    /// `(bands, rows, cols)`, the order windowed reads and compositing
    /// produce.
    BandMajor,
    /// `(rows, cols, bands)`, image-style interleaved order produced by
    /// transformations that encode for display.
    Interleaved,
}

/// An owned multi-band pixel buffer paired with its bounds.
///
/// Samples are carried as `f64` regardless of the source data type; the
/// source's `DataType` only drives nodata synthesis and float-tolerant
/// masking at read time. The mask has one flag per pixel (not per band) and
/// `true` marks a valid pixel.
#[derive(Debug, Clone, PartialEq)]
pub struct PixelCollection {
    pub data: Array3<f64>,
    pub mask: Array2<bool>,
    pub bounds: Bounds,
    pub layout: PixelLayout,
}

impl PixelCollection {
    /// Wrap a `(bands, rows, cols)` buffer.
    pub fn band_major(data: Array3<f64>, mask: Array2<bool>, bounds: Bounds) -> Self {
        debug_assert_eq!(
            (data.dim().1, data.dim().2),
            mask.dim(),
            "mask extent must match pixel extent"
        );
        Self {
            data,
            mask,
            bounds,
            layout: PixelLayout::BandMajor,
        }
    }

    /// Wrap a `(rows, cols, bands)` buffer.
    pub fn interleaved(data: Array3<f64>, mask: Array2<bool>, bounds: Bounds) -> Self {
        debug_assert_eq!(
            (data.dim().0, data.dim().1),
            mask.dim(),
            "mask extent must match pixel extent"
        );
        Self {
            data,
            mask,
            bounds,
            layout: PixelLayout::Interleaved,
        }
    }

    /// Number of bands.
    pub fn bands(&self) -> usize {
        match self.layout {
            PixelLayout::BandMajor => self.data.dim().0,
            PixelLayout::Interleaved => self.data.dim().2,
        }
    }

    /// Number of pixel rows.
    pub fn rows(&self) -> usize {
        match self.layout {
            PixelLayout::BandMajor => self.data.dim().1,
            PixelLayout::Interleaved => self.data.dim().0,
        }
    }

    /// Number of pixel columns.
    pub fn cols(&self) -> usize {
        match self.layout {
            PixelLayout::BandMajor => self.data.dim().2,
            PixelLayout::Interleaved => self.data.dim().1,
        }
    }
}

/// Pixel margins to remove from each edge of a buffer.
///
/// Offsets follow the (left, bottom, right, top) order transformations
/// report them in.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub struct CropOffsets {
    pub left: usize,
    pub bottom: usize,
    pub right: usize,
    pub top: usize,
}

impl CropOffsets {
    pub const ZERO: Self = Self {
        left: 0,
        bottom: 0,
        right: 0,
        top: 0,
    };

    /// The same margin on all four edges.
    pub fn uniform(margin: usize) -> Self {
        Self {
            left: margin,
            bottom: margin,
            right: margin,
            top: margin,
        }
    }

    pub fn is_zero(&self) -> bool {
        *self == Self::ZERO
    }
}

/// Remove pixel margins from a collection and shrink its bounds to match.
///
/// The new bounds are those of the retained pixel window under an affine
/// transform fitted to the original bounds and dimensions, so every cropped
/// edge moves inward by exactly its offset times the pixel size.
///
/// Zero offsets are an identity, bit-exact on both data and bounds. Offsets
/// that consume an entire axis fail with `InvalidRequest`.
pub fn crop(pixels: PixelCollection, offsets: &CropOffsets) -> RenderResult<PixelCollection> {
    if offsets.is_zero() {
        return Ok(pixels);
    }

    let rows = pixels.rows();
    let cols = pixels.cols();
    let retained_rows = rows
        .checked_sub(offsets.top + offsets.bottom)
        .filter(|r| *r > 0);
    let retained_cols = cols
        .checked_sub(offsets.left + offsets.right)
        .filter(|c| *c > 0);
    let (retained_rows, retained_cols) = match (retained_rows, retained_cols) {
        (Some(r), Some(c)) => (r, c),
        _ => {
            return Err(RenderError::invalid_request_with(
                "crop offsets consume the entire buffer",
                json!({
                    "shape": [rows, cols],
                    "offsets": [offsets.left, offsets.bottom, offsets.right, offsets.top],
                }),
            ))
        }
    };

    let row_range = offsets.top..rows - offsets.bottom;
    let col_range = offsets.left..cols - offsets.right;

    let data = match pixels.layout {
        PixelLayout::BandMajor => pixels
            .data
            .slice(s![.., row_range.clone(), col_range.clone()])
            .to_owned(),
        PixelLayout::Interleaved => pixels
            .data
            .slice(s![row_range.clone(), col_range.clone(), ..])
            .to_owned(),
    };
    let mask = pixels.mask.slice(s![row_range, col_range]).to_owned();

    let transform = GeoTransform::from_bounds(&pixels.bounds, (rows, cols));
    let bounds = transform.window_bounds(
        offsets.left as f64,
        offsets.top as f64,
        retained_cols as f64,
        retained_rows as f64,
        pixels.bounds.crs,
    );

    Ok(PixelCollection {
        data,
        mask,
        bounds,
        layout: pixels.layout,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::codes;

    fn band_major_fixture() -> PixelCollection {
        // 4x4 single-band buffer over a unit-resolution grid.
        let data = Array3::from_shape_fn((1, 4, 4), |(_, r, c)| (r * 4 + c) as f64);
        let mask = Array2::from_elem((4, 4), true);
        let bounds = Bounds::new(0.0, 0.0, 4.0, 4.0, codes::WEB_MERCATOR);
        PixelCollection::band_major(data, mask, bounds)
    }

    fn interleaved_fixture() -> PixelCollection {
        let data = Array3::from_shape_fn((4, 4, 3), |(r, c, b)| (r * 100 + c * 10 + b) as f64);
        let mask = Array2::from_elem((4, 4), true);
        let bounds = Bounds::new(0.0, 0.0, 4.0, 4.0, codes::WEB_MERCATOR);
        PixelCollection::interleaved(data, mask, bounds)
    }

    #[test]
    fn test_dims_per_layout() {
        let bm = band_major_fixture();
        assert_eq!((bm.bands(), bm.rows(), bm.cols()), (1, 4, 4));

        let il = interleaved_fixture();
        assert_eq!((il.bands(), il.rows(), il.cols()), (3, 4, 4));
    }

    #[test]
    fn test_crop_zero_offsets_is_identity() {
        for pixels in [band_major_fixture(), interleaved_fixture()] {
            let original = pixels.clone();
            let cropped = crop(pixels, &CropOffsets::ZERO).unwrap();
            assert_eq!(cropped, original);
        }
    }

    #[test]
    fn test_crop_left_edge_band_major() {
        let pixels = band_major_fixture();
        let offsets = CropOffsets {
            left: 1,
            ..CropOffsets::ZERO
        };
        let cropped = crop(pixels, &offsets).unwrap();

        assert_eq!(cropped.data.dim(), (1, 4, 3));
        assert_eq!(cropped.mask.dim(), (4, 3));
        // Row 0 was [0, 1, 2, 3]; the left column is gone.
        assert_eq!(cropped.data[[0, 0, 0]], 1.0);

        // Only the west edge moves, inward by one pixel.
        assert_eq!(cropped.bounds.west, 1.0);
        assert_eq!(cropped.bounds.east, 4.0);
        assert_eq!(cropped.bounds.south, 0.0);
        assert_eq!(cropped.bounds.north, 4.0);
    }

    #[test]
    fn test_crop_top_edge_interleaved() {
        let pixels = interleaved_fixture();
        let offsets = CropOffsets {
            top: 2,
            ..CropOffsets::ZERO
        };
        let cropped = crop(pixels, &offsets).unwrap();

        assert_eq!(cropped.data.dim(), (2, 4, 3));
        // First retained row was row 2 of the original.
        assert_eq!(cropped.data[[0, 0, 0]], 200.0);

        // Only the north edge moves, inward by two pixels.
        assert_eq!(cropped.bounds.north, 2.0);
        assert_eq!(cropped.bounds.south, 0.0);
        assert_eq!(cropped.bounds.west, 0.0);
        assert_eq!(cropped.bounds.east, 4.0);
    }

    #[test]
    fn test_crop_uniform_margin_both_layouts() {
        let offsets = CropOffsets::uniform(1);
        for pixels in [band_major_fixture(), interleaved_fixture()] {
            let cropped = crop(pixels, &offsets).unwrap();
            assert_eq!((cropped.rows(), cropped.cols()), (2, 2));
            assert_eq!(
                (
                    cropped.bounds.west,
                    cropped.bounds.south,
                    cropped.bounds.east,
                    cropped.bounds.north
                ),
                (1.0, 1.0, 3.0, 3.0)
            );
        }
    }

    #[test]
    fn test_crop_mask_follows_data() {
        let mut pixels = band_major_fixture();
        pixels.mask[[0, 0]] = false;
        pixels.mask[[2, 2]] = false;
        let cropped = crop(
            pixels,
            &CropOffsets {
                left: 1,
                top: 1,
                ..CropOffsets::ZERO
            },
        )
        .unwrap();
        // (0,0) was cropped away; (2,2) is now (1,1).
        assert!(!cropped.mask[[1, 1]]);
        assert!(cropped.mask[[0, 0]]);
    }

    #[test]
    fn test_crop_consuming_buffer_fails() {
        let pixels = band_major_fixture();
        let err = crop(
            pixels,
            &CropOffsets {
                left: 2,
                right: 2,
                ..CropOffsets::ZERO
            },
        )
        .unwrap_err();
        assert!(matches!(err, RenderError::InvalidRequest { .. }));
    }
}
