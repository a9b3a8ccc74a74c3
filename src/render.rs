//! Render orchestration.
//!
//! [`Renderer::render`] sequences a request end to end: validate, expand for
//! processing margin, acquire sources, composite, transform, crop the margin
//! back out, format, and assemble response headers. The catalog, compositor,
//! transformation, and formatter all sit behind traits so hosting services
//! bring their own implementations; this module owns only the sequencing,
//! timing, and error policy between them.

use std::sync::Arc;
use std::time::Instant;

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::crs::{Bounds, Crs};
use crate::error::{RenderError, RenderResult};
use crate::pixels::{crop, CropOffsets, PixelCollection};
use crate::recipe::Recipe;
use crate::resolution::{ground_resolution_meters, resolution_from_bounds};
use crate::stats::{RenderStats, ResponseHeaders};

/// Format tag carried by a composited buffer that no transformation shaped.
pub const RAW_FORMAT: &str = "raw";

/// A catalog entry describing one candidate source.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceEntry {
    /// Human-readable provenance name.
    pub name: String,
    /// Locator the compositor opens the source by.
    pub url: String,
    /// Per-source read options.
    #[serde(default)]
    pub recipe: Recipe,
}

/// Provenance of a source that actually contributed pixels to a render.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceUsed {
    pub name: String,
    pub url: String,
}

/// Source discovery over a footprint index.
pub trait Catalog: Send + Sync {
    /// Candidate sources intersecting `bounds`, best-first for the given
    /// ground resolution (x, y meters per pixel).
    fn get_sources(&self, bounds: &Bounds, resolution: (f64, f64))
        -> RenderResult<Vec<SourceEntry>>;
}

/// Merges overlapping sources onto one target grid.
pub trait Compositor: Send + Sync {
    /// Composite `sources` over `bounds` at `shape` (height, width) in the
    /// target `crs`. Returns the provenance of the sources that contributed
    /// and the composited buffer, or `None` when nothing intersected.
    fn composite(
        &self,
        sources: &[SourceEntry],
        bounds: &Bounds,
        shape: (usize, usize),
        crs: Crs,
        expand: bool,
    ) -> RenderResult<(Vec<SourceUsed>, Option<PixelCollection>)>;
}

/// A pixel-space transformation applied between compositing and formatting,
/// e.g. hillshading or color mapping.
pub trait Transformation: Send + Sync {
    /// Context pixels this transformation needs on every edge.
    fn margin(&self) -> usize {
        0
    }

    /// Grow the request so the transformation sees `margin()` context pixels
    /// per edge, at the request's own resolution. Returns the grown bounds
    /// and shape plus the offsets [`Self::postprocess`] later crops back out.
    fn expand(&self, bounds: &Bounds, shape: (usize, usize)) -> (Bounds, (usize, usize), CropOffsets) {
        let margin = self.margin();
        if margin == 0 {
            return (*bounds, shape, CropOffsets::ZERO);
        }
        let (height, width) = shape;
        let (x_res, y_res) = resolution_from_bounds(bounds, shape);
        let buffered = Bounds::new(
            bounds.west - margin as f64 * x_res,
            bounds.south - margin as f64 * y_res,
            bounds.east + margin as f64 * x_res,
            bounds.north + margin as f64 * y_res,
            bounds.crs,
        );
        (
            buffered,
            (height + 2 * margin, width + 2 * margin),
            CropOffsets::uniform(margin),
        )
    }

    /// Turn a composited buffer into its output form, tagging the format the
    /// formatter should encode.
    fn transform(&self, pixels: PixelCollection) -> RenderResult<(PixelCollection, String)>;

    /// Undo the expansion margin after transforming. `format` is available
    /// for implementations whose cropping depends on the output form.
    fn postprocess(
        &self,
        pixels: PixelCollection,
        _format: &str,
        offsets: &CropOffsets,
    ) -> RenderResult<PixelCollection> {
        crop(pixels, offsets)
    }
}

/// Encodes a pixel buffer into response bytes.
pub trait Formatter: Send + Sync {
    /// Encode `pixels` according to `format`, returning the content type and
    /// the payload.
    fn format(&self, pixels: &PixelCollection, format: &str) -> RenderResult<(String, Vec<u8>)>;
}

/// One render request: the target footprint and output grid.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderRequest {
    pub bounds: Bounds,
    /// Output shape as (height, width) pixels.
    pub shape: (usize, usize),
    /// CRS the output grid lives in. May differ from `bounds.crs`; the
    /// compositor reprojects.
    pub crs: Crs,
    /// Opaque flag forwarded to the compositor (e.g. palette expansion).
    pub expand: bool,
}

impl RenderRequest {
    pub fn new(bounds: Bounds, shape: (usize, usize), crs: Crs) -> Self {
        Self {
            bounds,
            shape,
            crs,
            expand: false,
        }
    }

    fn validate(&self) -> RenderResult<()> {
        if !self.bounds.is_finite() {
            return Err(RenderError::invalid_request_with(
                "bounds coordinates must be finite",
                json!({ "bounds": self.bounds.to_string() }),
            ));
        }
        if !self.bounds.is_ordered() {
            return Err(RenderError::invalid_request_with(
                "bounds must be ordered west < east and south < north",
                json!({ "bounds": self.bounds.to_string() }),
            ));
        }
        if self.shape.0 == 0 || self.shape.1 == 0 {
            return Err(RenderError::invalid_request_with(
                "shape must be non-zero in both axes",
                json!({ "shape": [self.shape.0, self.shape.1] }),
            ));
        }
        Ok(())
    }
}

/// A finished render: headers plus the encoded payload.
#[derive(Debug, Clone, PartialEq)]
pub struct RenderOutput {
    pub headers: ResponseHeaders,
    pub body: Vec<u8>,
}

/// Orchestrates the render pipeline over pluggable collaborators.
///
/// The compositor is mandatory; a catalog is optional and only consulted for
/// requests that do not carry their own source list.
#[derive(Clone)]
pub struct Renderer {
    pub(crate) compositor: Arc<dyn Compositor>,
    pub(crate) catalog: Option<Arc<dyn Catalog>>,
}

impl Renderer {
    pub fn new(compositor: Arc<dyn Compositor>) -> Self {
        Self {
            compositor,
            catalog: None,
        }
    }

    /// Attach the catalog consulted when a request carries no source list.
    pub fn with_catalog(mut self, catalog: Arc<dyn Catalog>) -> Self {
        self.catalog = Some(catalog);
        self
    }

    /// Render a request end to end.
    ///
    /// Exactly one of `sources` or an attached catalog must provide the
    /// source list; supplying neither is a configuration error. Stage
    /// timings and source provenance end up in the returned headers.
    pub fn render(
        &self,
        request: &RenderRequest,
        formatter: &dyn Formatter,
        transformation: Option<&dyn Transformation>,
        sources: Option<Vec<SourceEntry>>,
    ) -> RenderResult<RenderOutput> {
        request.validate()?;

        // Ground resolution of the request as asked, before any margin.
        let resolution = ground_resolution_meters(&request.bounds, request.shape);

        let mut stats = RenderStats::new();

        let (bounds, shape, offsets) = match transformation {
            Some(transformation) => transformation.expand(&request.bounds, request.shape),
            None => (request.bounds, request.shape, CropOffsets::ZERO),
        };

        let sources = match (sources, self.catalog.as_deref()) {
            (Some(sources), _) => sources,
            (None, Some(catalog)) => {
                let start = Instant::now();
                let found = catalog.get_sources(&bounds, resolution)?;
                stats.record("Get Sources", start.elapsed());
                tracing::debug!("Catalog returned {} candidate sources", found.len());
                found
            }
            (None, None) => {
                return Err(RenderError::Configuration(
                    "either sources or a catalog must be provided".to_string(),
                ))
            }
        };

        if sources.is_empty() {
            return Err(RenderError::NoDataAvailable);
        }

        let start = Instant::now();
        let (sources_used, composited) =
            self.compositor
                .composite(&sources, &bounds, shape, request.crs, request.expand)?;
        stats.record("Composite", start.elapsed());

        let mut pixels = match composited {
            Some(pixels) => pixels,
            None => return Err(RenderError::NoDataAvailable),
        };

        let mut format = RAW_FORMAT.to_string();

        if let Some(transformation) = transformation {
            let start = Instant::now();
            let (transformed, tag) = transformation.transform(pixels)?;
            stats.record("Transform", start.elapsed());
            pixels = transformed;
            format = tag;

            let start = Instant::now();
            pixels = transformation.postprocess(pixels, &format, &offsets)?;
            stats.record("Post-process", start.elapsed());
        }

        let start = Instant::now();
        let (content_type, body) = formatter.format(&pixels, &format)?;
        stats.record("Format", start.elapsed());

        let provenance = sources_used
            .iter()
            .map(|source| (source.name.as_str(), source.url.as_str()));
        let headers = ResponseHeaders::assemble(content_type, &stats, provenance);

        Ok(RenderOutput { headers, body })
    }
}
