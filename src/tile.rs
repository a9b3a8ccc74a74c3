//! XYZ tile addressing.
//!
//! Web-mercator slippy-map tiles: at zoom `z` the world extent splits into
//! `2^z` tiles per axis, addressed left-to-right and top-to-bottom. Tile
//! renders go through the attached catalog.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::crs::{codes, Bounds, EARTH_RADIUS};
use crate::error::{RenderError, RenderResult};
use crate::render::{Formatter, RenderOutput, RenderRequest, Renderer, Transformation};
use crate::resolution::TILE_SIZE;

/// An XYZ tile address.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Tile {
    pub x: u32,
    pub y: u32,
    pub z: u8,
}

impl Tile {
    pub fn new(x: u32, y: u32, z: u8) -> Self {
        Self { x, y, z }
    }

    /// Web-mercator bounds of this tile.
    pub fn bounds(&self) -> Bounds {
        let world = std::f64::consts::PI * EARTH_RADIUS;
        let span = 2.0 * world / 2f64.powi(i32::from(self.z));
        let west = -world + f64::from(self.x) * span;
        let north = world - f64::from(self.y) * span;
        Bounds::new(west, north - span, west + span, north, codes::WEB_MERCATOR)
    }
}

impl fmt::Display for Tile {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}/{}", self.z, self.x, self.y)
    }
}

impl Renderer {
    /// Render one tile through the attached catalog at `256 * scale` pixels
    /// per edge.
    ///
    /// Fails with `NoCatalogAvailable` when no catalog is attached.
    pub fn render_tile(
        &self,
        tile: Tile,
        scale: u32,
        formatter: &dyn Formatter,
        transformation: Option<&dyn Transformation>,
    ) -> RenderResult<RenderOutput> {
        if self.catalog.is_none() {
            return Err(RenderError::NoCatalogAvailable);
        }
        tracing::debug!("Rendering tile {} at scale {}", tile, scale);

        let size = TILE_SIZE as usize * scale as usize;
        let request = RenderRequest::new(tile.bounds(), (size, size), codes::WEB_MERCATOR);
        self.render(&request, formatter, transformation, None)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::crs::{extent_for_crs, Crs};
    use crate::pixels::PixelCollection;
    use crate::render::{Catalog, Compositor, SourceEntry, SourceUsed};
    use crate::recipe::Recipe;
    use ndarray::{Array2, Array3};
    use std::sync::{Arc, Mutex};

    #[test]
    fn test_zoom_zero_covers_the_world() {
        let bounds = Tile::new(0, 0, 0).bounds();
        let world = extent_for_crs(codes::WEB_MERCATOR).unwrap();
        assert_eq!(bounds, world);
    }

    #[test]
    fn test_zoom_one_quadrants() {
        let world = extent_for_crs(codes::WEB_MERCATOR).unwrap();

        let nw = Tile::new(0, 0, 1).bounds();
        assert_eq!((nw.west, nw.north), (world.west, world.north));
        assert_eq!((nw.east, nw.south), (0.0, 0.0));

        let se = Tile::new(1, 1, 1).bounds();
        assert_eq!((se.west, se.north), (0.0, 0.0));
        assert_eq!((se.east, se.south), (world.east, world.south));
    }

    #[test]
    fn test_tile_spans_halve_per_zoom() {
        let z5 = Tile::new(0, 0, 5).bounds();
        let z6 = Tile::new(0, 0, 6).bounds();
        assert_eq!(z5.width(), 2.0 * z6.width());
        assert_eq!(z5.height(), z5.width());
    }

    #[test]
    fn test_display_is_slippy_path() {
        assert_eq!(Tile::new(1, 3, 2).to_string(), "2/1/3");
    }

    struct RecordingCompositor {
        calls: Mutex<Vec<(Bounds, (usize, usize))>>,
    }

    impl Compositor for RecordingCompositor {
        fn composite(
            &self,
            _sources: &[SourceEntry],
            bounds: &Bounds,
            shape: (usize, usize),
            _crs: Crs,
            _expand: bool,
        ) -> RenderResult<(Vec<SourceUsed>, Option<PixelCollection>)> {
            self.calls.lock().unwrap().push((*bounds, shape));
            let data = Array3::from_elem((1, shape.0, shape.1), 1.0);
            let mask = Array2::from_elem(shape, true);
            Ok((Vec::new(), Some(PixelCollection::band_major(data, mask, *bounds))))
        }
    }

    struct OneSourceCatalog;

    impl Catalog for OneSourceCatalog {
        fn get_sources(
            &self,
            _bounds: &Bounds,
            _resolution: (f64, f64),
        ) -> RenderResult<Vec<SourceEntry>> {
            Ok(vec![SourceEntry {
                name: "test".to_string(),
                url: "file:///test.tif".to_string(),
                recipe: Recipe::default(),
            }])
        }
    }

    struct RawFormatter;

    impl Formatter for RawFormatter {
        fn format(&self, _pixels: &PixelCollection, _format: &str) -> RenderResult<(String, Vec<u8>)> {
            Ok(("application/octet-stream".to_string(), Vec::new()))
        }
    }

    #[test]
    fn test_render_tile_requires_catalog() {
        let renderer = Renderer::new(Arc::new(RecordingCompositor {
            calls: Mutex::new(Vec::new()),
        }));
        let err = renderer
            .render_tile(Tile::new(0, 0, 0), 1, &RawFormatter, None)
            .unwrap_err();
        assert!(matches!(err, RenderError::NoCatalogAvailable));
    }

    #[test]
    fn test_render_tile_shape_scales() {
        let compositor = Arc::new(RecordingCompositor {
            calls: Mutex::new(Vec::new()),
        });
        let renderer = Renderer::new(compositor.clone()).with_catalog(Arc::new(OneSourceCatalog));

        renderer
            .render_tile(Tile::new(0, 0, 0), 2, &RawFormatter, None)
            .unwrap();

        let calls = compositor.calls.lock().unwrap();
        assert_eq!(calls[0].1, (512, 512));
        assert_eq!(calls[0].0, Tile::new(0, 0, 0).bounds());
    }
}
