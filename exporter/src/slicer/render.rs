//! Isolated per-slice rendering

use std::sync::Arc;

use async_trait::async_trait;
use metrics::counter;
use tracing::debug;

use crate::document::{Document, OffscreenContainer, Rgba};
use crate::raster::{CaptureError, CaptureOptions, RasterEngine, RasterImage, ScalingPolicy};

use super::geometry::SliceGeometry;

/// Something that can produce the image for one slice
#[async_trait]
pub trait SliceRenderer: Send + Sync {
    async fn render(&self, geometry: &SliceGeometry) -> Result<RasterImage, CaptureError>;
}

/// Renders slices of a document through a raster engine
///
/// Every slice is captured from its own off-screen container so the engine
/// only ever sees a box of exactly the slice's size.
#[derive(Clone)]
pub struct DomSlicer {
    engine: Arc<dyn RasterEngine>,
    background: Rgba,
    pixel_ratio: f32,
    scaling: ScalingPolicy,
}

impl DomSlicer {
    pub fn new(engine: Arc<dyn RasterEngine>, background: Rgba) -> Self {
        Self {
            engine,
            background,
            pixel_ratio: 1.0,
            scaling: ScalingPolicy::default(),
        }
    }

    pub fn with_pixel_ratio(self, pixel_ratio: f32) -> Self {
        Self {
            pixel_ratio,
            ..self
        }
    }

    pub fn with_scaling(self, scaling: ScalingPolicy) -> Self {
        Self { scaling, ..self }
    }

    /// Render one slice of `document`
    ///
    /// The off-screen container is detached when this returns, whether the
    /// capture succeeded or not.
    pub async fn render_slice(
        &self,
        document: &Document,
        geometry: &SliceGeometry,
    ) -> Result<RasterImage, CaptureError> {
        if geometry.width == 0 || geometry.height == 0 {
            return Err(CaptureError::InvalidDimensions {
                width: geometry.width,
                height: geometry.height,
            });
        }

        let container = document.attach_offscreen(OffscreenContainer::window(
            document.root(),
            geometry.x,
            geometry.y,
            geometry.width,
            geometry.height,
            self.background,
        ));

        let options = CaptureOptions {
            background: container.background,
            width: container.width,
            height: container.height,
            pixel_ratio: self.pixel_ratio,
            scaling: self.scaling,
        };
        let image = self.engine.capture(&container.content, &options).await?;

        counter!("lineage_export_slices_rendered_total").increment(1);
        debug!(
            "Rendered slice {} at x={} ({}x{})",
            geometry.index, geometry.x, geometry.width, geometry.height
        );
        Ok(image)
    }

    /// Bind this slicer to a document
    pub fn for_document<'a>(&'a self, document: &'a Document) -> DocumentSlices<'a> {
        DocumentSlices {
            slicer: self,
            document,
        }
    }
}

/// A slicer bound to one document
pub struct DocumentSlices<'a> {
    slicer: &'a DomSlicer,
    document: &'a Document,
}

#[async_trait]
impl SliceRenderer for DocumentSlices<'_> {
    async fn render(&self, geometry: &SliceGeometry) -> Result<RasterImage, CaptureError> {
        self.slicer.render_slice(self.document, geometry).await
    }
}
