//! Windowed reads of reprojected sources.
//!
//! Turns "an opened source + target bounds/shape" into an exact-shape masked
//! pixel buffer. Algorithm:
//! 1. Pick the resampling kernel: nearest for paletted sources, bilinear
//!    otherwise, recipe override wins
//! 2. Resolve the nodata value: declared, else synthesized from the data
//!    type, recipe override wins
//! 3. Prefer a dataset-internal mask over nodata masking when no alpha band
//!    already encodes validity
//! 4. Build a warped view on the planned grid, re-anchored at the requested
//!    bounds
//! 5. Read the bounds window resampled to exactly the target shape
//! 6. Mask from the alpha band, or the nodata value, or not at all

use ndarray::{Array2, Array3, Axis};

use crate::crs::Bounds;
use crate::error::RenderResult;
use crate::pixels::PixelCollection;
use crate::recipe::{Recipe, Resampling};
use crate::source::{ColorRole, PixelWindow, RasterSource, WarpParams};
use crate::warp::plan_warp;

/// Alpha value marking a fully opaque (valid) pixel.
const OPAQUE: f64 = 255.0;

/// Tolerances for nodata comparison on floating-point sources. Warping can
/// perturb float nodata values by an ulp or two, so exact equality would
/// leave speckles unmasked.
const NODATA_ABS_TOL: f64 = 1e-8;
const NODATA_REL_TOL: f64 = 1e-5;

/// Read the portion of `source` covering `bounds`, reprojected and resampled
/// to exactly `target_shape` (height, width).
///
/// The returned collection is band-major, masked per the source's alpha or
/// nodata semantics, and paired with the requested bounds.
pub fn read_window(
    source: &dyn RasterSource,
    bounds: &Bounds,
    target_shape: (usize, usize),
    recipe: &Recipe,
) -> RenderResult<PixelCollection> {
    let plan = plan_warp(source, bounds, target_shape, recipe)?;

    let resampling = recipe.resample.unwrap_or_else(|| {
        if source.bands().iter().any(|band| band.color == ColorRole::Palette) {
            Resampling::Nearest
        } else {
            Resampling::Bilinear
        }
    });

    let nodata = match recipe.nodata {
        Some(value) => value,
        None => source
            .nodata()
            .unwrap_or_else(|| source.dtype().synthetic_nodata()),
    };

    // A dataset-internal mask beats nodata matching: nodata values resampled
    // with anything but nearest-neighbor smear into the valid range. Turn
    // nodata masking off for the warp and have the view expose the mask as a
    // synthesized alpha band instead.
    let has_dataset_mask = source.bands().iter().any(|band| band.per_dataset_mask);
    let has_alpha_mask = source.bands().iter().any(|band| band.alpha_mask);
    let (src_nodata, add_alpha) = if has_dataset_mask && !has_alpha_mask {
        (None, true)
    } else {
        (Some(nodata), false)
    };
    tracing::debug!(
        "Masking via {}",
        if add_alpha {
            "synthesized alpha band"
        } else {
            "nodata matching"
        }
    );

    // Anchor the view's grid at the requested bounds rather than using the
    // plan's own extent: extent-fitted grids can sit a fraction of a pixel
    // off near the edges of projected bounds.
    let view_transform = plan.transform.with_origin(bounds.west, bounds.north);
    let view_width = (bounds.width() / plan.transform.a).ceil() as usize;
    let view_height = ((bounds.south - bounds.north) / plan.transform.e).ceil() as usize;

    let params = WarpParams {
        crs: bounds.crs,
        transform: view_transform,
        width: view_width,
        height: view_height,
        resampling,
        src_nodata,
        add_alpha,
    };

    // The view borrows library resources; it lives exactly as long as the
    // read below.
    let view = source.warped_view(&params)?;
    let window = PixelWindow::from_bounds(bounds, &view_transform);
    let data = view.read(&window, target_shape)?;

    let alpha_index = view
        .bands()
        .iter()
        .position(|band| band.color == ColorRole::Alpha);

    let pixels = match alpha_index {
        Some(alpha_index) => mask_with_alpha(data, alpha_index, *bounds),
        None => match view.nodata() {
            Some(view_nodata) => {
                mask_with_nodata(data, view_nodata, source.dtype().is_floating(), *bounds)
            }
            None => {
                let mask = Array2::from_elem(target_shape, true);
                PixelCollection::band_major(data, mask, *bounds)
            }
        },
    };

    Ok(pixels)
}

/// Use the alpha band as the validity mask for every other band, then drop
/// it from the data.
fn mask_with_alpha(data: Array3<f64>, alpha_index: usize, bounds: Bounds) -> PixelCollection {
    let band_count = data.dim().0;
    let mask = data
        .index_axis(Axis(0), alpha_index)
        .mapv(|alpha| alpha == OPAQUE);
    let keep: Vec<usize> = (0..band_count).filter(|band| *band != alpha_index).collect();
    let data = data.select(Axis(0), &keep);
    PixelCollection::band_major(data, mask, bounds)
}

/// Mask pixels whose value in any band matches the nodata value.
fn mask_with_nodata(
    data: Array3<f64>,
    nodata: f64,
    floating: bool,
    bounds: Bounds,
) -> PixelCollection {
    let (_, height, width) = data.dim();
    let mut mask = Array2::from_elem((height, width), true);
    for ((_, row, col), sample) in data.indexed_iter() {
        if is_nodata(*sample, nodata, floating) {
            mask[[row, col]] = false;
        }
    }
    PixelCollection::band_major(data, mask, bounds)
}

fn is_nodata(sample: f64, nodata: f64, floating: bool) -> bool {
    if floating {
        (sample - nodata).abs() <= NODATA_ABS_TOL + NODATA_REL_TOL * nodata.abs()
    } else {
        sample == nodata
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::codes;
    use crate::source::{BandInfo, DataType, WarpedView};
    use crate::warp::{GeoTransform, WarpPlan};
    use ndarray::array;
    use std::cell::RefCell;

    /// A source whose warped view replays canned data and records what the
    /// reader asked for.
    struct FakeSource {
        bounds: Bounds,
        shape: (usize, usize),
        dtype: DataType,
        nodata: Option<f64>,
        bands: Vec<BandInfo>,
        view_bands: Vec<BandInfo>,
        data: Array3<f64>,
        last_params: RefCell<Option<WarpParams>>,
        last_read: RefCell<Option<(PixelWindow, (usize, usize))>>,
    }

    impl FakeSource {
        fn byte(data: Array3<f64>) -> Self {
            Self {
                bounds: Bounds::new(0.0, 0.0, 256.0, 256.0, codes::WEB_MERCATOR),
                shape: (256, 256),
                dtype: DataType::Byte,
                nodata: None,
                bands: vec![BandInfo::plain(ColorRole::Gray)],
                view_bands: vec![BandInfo::plain(ColorRole::Gray)],
                data,
                last_params: RefCell::new(None),
                last_read: RefCell::new(None),
            }
        }

        fn params(&self) -> WarpParams {
            self.last_params.borrow().unwrap()
        }
    }

    impl RasterSource for FakeSource {
        fn bounds(&self) -> Bounds {
            self.bounds
        }

        fn shape(&self) -> (usize, usize) {
            self.shape
        }

        fn dtype(&self) -> DataType {
            self.dtype
        }

        fn nodata(&self) -> Option<f64> {
            self.nodata
        }

        fn bands(&self) -> &[BandInfo] {
            &self.bands
        }

        fn suggest_transform(
            &self,
            _dst_crs: crate::crs::Crs,
            src_shape: (usize, usize),
            _resolution: Option<(f64, f64)>,
        ) -> RenderResult<WarpPlan> {
            Ok(WarpPlan {
                transform: GeoTransform::from_bounds(&self.bounds, src_shape),
                width: src_shape.1,
                height: src_shape.0,
            })
        }

        fn warped_view(&self, params: &WarpParams) -> RenderResult<Box<dyn WarpedView + '_>> {
            *self.last_params.borrow_mut() = Some(*params);
            Ok(Box::new(FakeView {
                source: self,
                nodata: params.src_nodata,
            }))
        }
    }

    struct FakeView<'a> {
        source: &'a FakeSource,
        nodata: Option<f64>,
    }

    impl WarpedView for FakeView<'_> {
        fn bands(&self) -> &[BandInfo] {
            &self.source.view_bands
        }

        fn nodata(&self) -> Option<f64> {
            self.nodata
        }

        fn read(
            &self,
            window: &PixelWindow,
            out_shape: (usize, usize),
        ) -> RenderResult<Array3<f64>> {
            *self.source.last_read.borrow_mut() = Some((*window, out_shape));
            Ok(self.source.data.clone())
        }
    }

    fn full_bounds() -> Bounds {
        Bounds::new(0.0, 0.0, 256.0, 256.0, codes::WEB_MERCATOR)
    }

    fn sample_data() -> Array3<f64> {
        Array3::from_shape_fn((1, 2, 2), |(_, r, c)| (r * 2 + c + 1) as f64)
    }

    #[test]
    fn test_kernel_defaults_to_bilinear() {
        let source = FakeSource::byte(sample_data());
        read_window(&source, &full_bounds(), (2, 2), &Recipe::default()).unwrap();
        assert_eq!(source.params().resampling, Resampling::Bilinear);
    }

    #[test]
    fn test_kernel_nearest_for_paletted_sources() {
        let mut source = FakeSource::byte(sample_data());
        source.bands = vec![BandInfo::plain(ColorRole::Palette)];
        read_window(&source, &full_bounds(), (2, 2), &Recipe::default()).unwrap();
        assert_eq!(source.params().resampling, Resampling::Nearest);
    }

    #[test]
    fn test_recipe_kernel_override() {
        let mut source = FakeSource::byte(sample_data());
        source.bands = vec![BandInfo::plain(ColorRole::Palette)];
        let recipe = Recipe {
            resample: Some(Resampling::Cubic),
            ..Recipe::default()
        };
        read_window(&source, &full_bounds(), (2, 2), &recipe).unwrap();
        assert_eq!(source.params().resampling, Resampling::Cubic);
    }

    #[test]
    fn test_synthetic_nodata_when_undeclared() {
        let mut source = FakeSource::byte(sample_data());
        source.dtype = DataType::Int16;
        read_window(&source, &full_bounds(), (2, 2), &Recipe::default()).unwrap();
        assert_eq!(source.params().src_nodata, Some(-32768.0));
    }

    #[test]
    fn test_declared_nodata_wins_over_synthetic() {
        let mut source = FakeSource::byte(sample_data());
        source.nodata = Some(42.0);
        read_window(&source, &full_bounds(), (2, 2), &Recipe::default()).unwrap();
        assert_eq!(source.params().src_nodata, Some(42.0));
    }

    #[test]
    fn test_recipe_nodata_overrides_declared() {
        let mut source = FakeSource::byte(sample_data());
        source.nodata = Some(0.0);
        let recipe = Recipe {
            nodata: Some(-9999.0),
            ..Recipe::default()
        };
        read_window(&source, &full_bounds(), (2, 2), &recipe).unwrap();
        assert_eq!(source.params().src_nodata, Some(-9999.0));
    }

    #[test]
    fn test_dataset_mask_preferred_over_nodata() {
        let mut source = FakeSource::byte(sample_data());
        source.bands = vec![BandInfo {
            color: ColorRole::Gray,
            per_dataset_mask: true,
            alpha_mask: false,
        }];
        read_window(&source, &full_bounds(), (2, 2), &Recipe::default()).unwrap();

        let params = source.params();
        assert_eq!(params.src_nodata, None);
        assert!(params.add_alpha);
    }

    #[test]
    fn test_existing_alpha_disables_mask_preference() {
        let mut source = FakeSource::byte(sample_data());
        source.bands = vec![
            BandInfo {
                color: ColorRole::Gray,
                per_dataset_mask: true,
                alpha_mask: false,
            },
            BandInfo {
                color: ColorRole::Alpha,
                per_dataset_mask: false,
                alpha_mask: true,
            },
        ];
        read_window(&source, &full_bounds(), (2, 2), &Recipe::default()).unwrap();

        let params = source.params();
        assert_eq!(params.src_nodata, Some(0.0));
        assert!(!params.add_alpha);
    }

    #[test]
    fn test_view_anchored_at_request_bounds() {
        let source = FakeSource::byte(sample_data());
        let bounds = Bounds::new(64.0, 64.0, 192.0, 192.0, codes::WEB_MERCATOR);
        read_window(&source, &bounds, (2, 2), &Recipe::default()).unwrap();

        // The plan fits the full source at 1m/px; the view reuses that pixel
        // size anchored at the request's top-left corner.
        let params = source.params();
        assert_eq!(params.transform.c, 64.0);
        assert_eq!(params.transform.f, 192.0);
        assert_eq!(params.transform.a, 1.0);
        assert_eq!((params.width, params.height), (128, 128));

        // The window into the anchored view starts at its origin.
        let (window, out_shape) = source.last_read.borrow().unwrap();
        assert_eq!((window.col_off, window.row_off), (0.0, 0.0));
        assert_eq!((window.width, window.height), (128.0, 128.0));
        assert_eq!(out_shape, (2, 2));
    }

    #[test]
    fn test_fractional_window_rounds_view_up() {
        let source = FakeSource::byte(sample_data());
        let bounds = Bounds::new(0.0, 0.0, 100.5, 50.25, codes::WEB_MERCATOR);
        read_window(&source, &bounds, (2, 2), &Recipe::default()).unwrap();

        // View dimensions cover the fractional spans; the window keeps them
        // fractional.
        let params = source.params();
        assert_eq!((params.width, params.height), (101, 51));
        let (window, _) = source.last_read.borrow().unwrap();
        assert_eq!(window.width, 100.5);
        assert_eq!(window.height, 50.25);
    }

    #[test]
    fn test_nodata_masks_matching_pixels() {
        let mut source = FakeSource::byte(array![[[0.0, 5.0], [7.0, 0.0]]]);
        source.nodata = Some(0.0);
        let pixels = read_window(&source, &full_bounds(), (2, 2), &Recipe::default()).unwrap();

        assert_eq!(pixels.mask, array![[false, true], [true, false]]);
        assert_eq!(pixels.data[[0, 0, 1]], 5.0);
    }

    #[test]
    fn test_float_nodata_uses_tolerance() {
        let mut source = FakeSource::byte(array![[[-9999.00001, -9998.0]]]);
        source.dtype = DataType::Float32;
        source.nodata = Some(-9999.0);
        let pixels = read_window(&source, &full_bounds(), (1, 2), &Recipe::default()).unwrap();

        // Within rtol of the nodata value: masked. One whole unit away: kept.
        assert_eq!(pixels.mask, array![[false, true]]);
    }

    #[test]
    fn test_integer_nodata_is_exact() {
        let mut source = FakeSource::byte(array![[[41.999, 42.0]]]);
        source.nodata = Some(42.0);
        let pixels = read_window(&source, &full_bounds(), (1, 2), &Recipe::default()).unwrap();
        assert_eq!(pixels.mask, array![[true, false]]);
    }

    #[test]
    fn test_alpha_band_masks_and_is_dropped() {
        let mut source = FakeSource::byte(array![
            [[10.0, 20.0], [30.0, 40.0]],
            [[255.0, 0.0], [255.0, 128.0]],
        ]);
        source.view_bands = vec![
            BandInfo::plain(ColorRole::Gray),
            BandInfo::plain(ColorRole::Alpha),
        ];
        let pixels = read_window(&source, &full_bounds(), (2, 2), &Recipe::default()).unwrap();

        assert_eq!(pixels.bands(), 1);
        assert_eq!(pixels.data, array![[[10.0, 20.0], [30.0, 40.0]]]);
        // Only fully opaque pixels are valid.
        assert_eq!(pixels.mask, array![[true, false], [true, false]]);
    }

    #[test]
    fn test_unmasked_when_view_has_no_nodata() {
        // Dataset-mask preference turns nodata off, but this view does not
        // synthesize the alpha band it was asked for; the read falls back to
        // fully valid.
        let mut source = FakeSource::byte(sample_data());
        source.bands = vec![BandInfo {
            color: ColorRole::Gray,
            per_dataset_mask: true,
            alpha_mask: false,
        }];
        let pixels = read_window(&source, &full_bounds(), (2, 2), &Recipe::default()).unwrap();
        assert!(pixels.mask.iter().all(|valid| *valid));
    }

    #[test]
    fn test_result_carries_request_bounds() {
        let source = FakeSource::byte(sample_data());
        let bounds = Bounds::new(64.0, 0.0, 192.0, 128.0, codes::WEB_MERCATOR);
        let pixels = read_window(&source, &bounds, (2, 2), &Recipe::default()).unwrap();
        assert_eq!(pixels.bounds, bounds);
    }
}
