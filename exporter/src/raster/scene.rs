//! Default raster engine painting scenes with the `image` crate

use std::time::Instant;

use async_trait::async_trait;
use bytes::Bytes;
use image::codecs::png::PngEncoder;
use image::{ImageEncoder, RgbaImage};
use metrics::{counter, histogram};
use tracing::debug;

use crate::document::{NodeKind, Rgba, Scene};

use super::service::RasterEngine;
use super::types::{CaptureError, CaptureOptions, RasterImage, ScalingPolicy};

/// Default canvas limit, per side
pub const DEFAULT_MAX_CANVAS_DIMENSION: u32 = 16384;

/// Fraction of a text box covered by its glyph band
const TEXT_BAND_RATIO: f64 = 0.6;

/// Raster engine that paints a scene's display list onto an RGBA canvas
///
/// Like browser canvases, the surface has a maximum side length; requests
/// beyond it either get their pixel ratio reduced (`ScalingPolicy::AutoScale`)
/// or fail with `CaptureError::CanvasTooLarge`.
#[derive(Debug, Clone)]
pub struct SceneRasterizer {
    max_canvas_dimension: u32,
}

impl Default for SceneRasterizer {
    fn default() -> Self {
        Self::new(DEFAULT_MAX_CANVAS_DIMENSION)
    }
}

impl SceneRasterizer {
    pub fn new(max_canvas_dimension: u32) -> Self {
        Self {
            max_canvas_dimension,
        }
    }

    pub fn max_canvas_dimension(&self) -> u32 {
        self.max_canvas_dimension
    }

    /// Pick the effective pixel ratio for a capture
    fn resolve_ratio(&self, options: &CaptureOptions) -> Result<f64, CaptureError> {
        if options.width == 0 || options.height == 0 {
            return Err(CaptureError::InvalidDimensions {
                width: options.width,
                height: options.height,
            });
        }
        let ratio = options.pixel_ratio as f64;
        if !(ratio.is_finite() && ratio > 0.0) {
            return Err(CaptureError::Engine(format!(
                "invalid pixel ratio {}",
                options.pixel_ratio
            )));
        }

        let limit = self.max_canvas_dimension;
        let width = scaled(options.width, ratio);
        let height = scaled(options.height, ratio);
        if width <= limit && height <= limit {
            return Ok(ratio);
        }

        match options.scaling {
            ScalingPolicy::Exact => Err(CaptureError::CanvasTooLarge {
                width,
                height,
                limit,
            }),
            ScalingPolicy::AutoScale => {
                let largest = options.width.max(options.height) as f64;
                let reduced = limit as f64 / largest;
                debug!(
                    "Canvas {}x{} exceeds {}px, scaling pixel ratio {} -> {:.4}",
                    width, height, limit, ratio, reduced
                );
                Ok(reduced)
            }
        }
    }

    /// Encode RGBA canvas to PNG
    fn encode_png(canvas: &RgbaImage) -> Result<Vec<u8>, CaptureError> {
        let mut buffer = Vec::new();
        let encoder = PngEncoder::new(&mut buffer);
        encoder
            .write_image(
                canvas.as_raw(),
                canvas.width(),
                canvas.height(),
                image::ExtendedColorType::Rgba8,
            )
            .map_err(|e| CaptureError::Encode(format!("PNG encoding failed: {}", e)))?;
        Ok(buffer)
    }
}

#[async_trait]
impl RasterEngine for SceneRasterizer {
    async fn capture(
        &self,
        scene: &Scene,
        options: &CaptureOptions,
    ) -> Result<RasterImage, CaptureError> {
        let start = Instant::now();
        counter!("lineage_export_captures_total").increment(1);

        let ratio = self.resolve_ratio(options)?;
        let width = scaled(options.width, ratio);
        let height = scaled(options.height, ratio);
        let background = options.background;
        let scene = scene.clone();

        let png = tokio::task::spawn_blocking(move || {
            let canvas = paint(&scene, background, width, height, ratio);
            SceneRasterizer::encode_png(&canvas)
        })
        .await
        .map_err(|e| CaptureError::Engine(format!("paint task failed: {}", e)))??;

        histogram!("lineage_export_capture_duration_seconds").record(start.elapsed());
        debug!(
            "Captured {}x{} canvas ({} PNG bytes) in {:?}",
            width,
            height,
            png.len(),
            start.elapsed()
        );

        Ok(RasterImage {
            width,
            height,
            png: Bytes::from(png),
        })
    }
}

fn scaled(v: u32, ratio: f64) -> u32 {
    ((v as f64) * ratio).round().max(1.0) as u32
}

/// Paint the scene onto a fresh canvas filled with `background`
fn paint(scene: &Scene, background: Rgba, width: u32, height: u32, ratio: f64) -> RgbaImage {
    let mut canvas = RgbaImage::from_pixel(width, height, image::Rgba(background.0));

    for node in &scene.nodes {
        let x0 = (node.x as f64 * ratio).floor() as i64;
        let y0 = (node.y as f64 * ratio).floor() as i64;
        let x1 = (node.right() as f64 * ratio).ceil() as i64;
        let y1 = (node.bottom() as f64 * ratio).ceil() as i64;

        match &node.kind {
            NodeKind::Block | NodeKind::Line => {
                fill_rect(&mut canvas, x0, y0, x1, y1, node.fill);
            }
            NodeKind::Text { .. } => {
                let band = ((y1 - y0) as f64 * TEXT_BAND_RATIO).round() as i64;
                let top = y0 + ((y1 - y0) - band) / 2;
                fill_rect(&mut canvas, x0, top, x1, top + band, node.fill);
            }
        }

        if let Some(border) = &node.border
            && border.width > 0
        {
            let bw = ((border.width as f64 * ratio).round() as i64).max(1);
            fill_rect(&mut canvas, x0, y0, x1, y0 + bw, border.color);
            fill_rect(&mut canvas, x0, y1 - bw, x1, y1, border.color);
            fill_rect(&mut canvas, x0, y0 + bw, x0 + bw, y1 - bw, border.color);
            fill_rect(&mut canvas, x1 - bw, y0 + bw, x1, y1 - bw, border.color);
        }
    }

    canvas
}

/// Fill `[x0, x1) x [y0, y1)` clipped to the canvas, blending source-over
fn fill_rect(canvas: &mut RgbaImage, x0: i64, y0: i64, x1: i64, y1: i64, color: Rgba) {
    if color.alpha() == 0 {
        return;
    }
    let (w, h) = (canvas.width() as i64, canvas.height() as i64);
    let (x0, x1) = (x0.clamp(0, w), x1.clamp(0, w));
    let (y0, y1) = (y0.clamp(0, h), y1.clamp(0, h));

    for y in y0..y1 {
        for x in x0..x1 {
            blend(canvas.get_pixel_mut(x as u32, y as u32), color);
        }
    }
}

fn blend(dst: &mut image::Rgba<u8>, src: Rgba) {
    let a = src.0[3] as u32;
    if a == 255 {
        dst.0 = src.0;
        return;
    }
    let inv = 255 - a;
    for i in 0..3 {
        dst.0[i] = ((src.0[i] as u32 * a + dst.0[i] as u32 * inv + 127) / 255) as u8;
    }
    dst.0[3] = (a + dst.0[3] as u32 * inv / 255).min(255) as u8;
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::document::{Border, Node};

    fn options(width: u32, height: u32) -> CaptureOptions {
        CaptureOptions {
            background: Rgba::WHITE,
            width,
            height,
            pixel_ratio: 1.0,
            scaling: ScalingPolicy::AutoScale,
        }
    }

    fn block(x: i32, y: i32, width: u32, height: u32, fill: Rgba) -> Node {
        Node {
            x,
            y,
            width,
            height,
            fill,
            border: None,
            kind: NodeKind::Block,
        }
    }

    fn decode(image: &RasterImage) -> RgbaImage {
        image::load_from_memory(&image.png).unwrap().to_rgba8()
    }

    #[tokio::test]
    async fn test_capture_produces_png_of_requested_size() {
        let engine = SceneRasterizer::default();
        let scene = Scene::new(vec![block(10, 10, 20, 20, Rgba::BLACK)]);

        let image = engine.capture(&scene, &options(64, 32)).await.unwrap();
        assert_eq!((image.width, image.height), (64, 32));
        assert_eq!(&image.png[0..8], b"\x89PNG\r\n\x1a\n");

        let decoded = decode(&image);
        assert_eq!(decoded.dimensions(), (64, 32));
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 255, 255, 255]);
        assert_eq!(decoded.get_pixel(15, 15).0, [0, 0, 0, 255]);
    }

    #[tokio::test]
    async fn test_content_outside_box_is_clipped() {
        let engine = SceneRasterizer::default();
        let red = Rgba([255, 0, 0, 255]);
        // straddles the right edge and lies partly at negative x
        let scene = Scene::new(vec![block(-5, 0, 10, 4, red), block(28, 0, 10, 4, red)]);

        let decoded = decode(&engine.capture(&scene, &options(32, 4)).await.unwrap());
        assert_eq!(decoded.get_pixel(0, 0).0, [255, 0, 0, 255]);
        assert_eq!(decoded.get_pixel(5, 0).0, [255, 255, 255, 255]);
        assert_eq!(decoded.get_pixel(31, 3).0, [255, 0, 0, 255]);
    }

    #[tokio::test]
    async fn test_border_and_alpha_blending() {
        let engine = SceneRasterizer::default();
        let mut node = block(0, 0, 10, 10, Rgba([0, 0, 255, 128]));
        node.border = Some(Border {
            color: Rgba::BLACK,
            width: 1,
        });
        let image = engine
            .capture(&Scene::new(vec![node]), &options(10, 10))
            .await
            .unwrap();
        let decoded = decode(&image);

        assert_eq!(decoded.get_pixel(0, 5).0, [0, 0, 0, 255]);
        let inner = decoded.get_pixel(5, 5).0;
        assert_eq!(inner[2], 255);
        assert!((126..=128).contains(&inner[0]));
    }

    #[tokio::test]
    async fn test_exact_policy_rejects_oversized_canvas() {
        let engine = SceneRasterizer::new(100);
        let mut opts = options(150, 50);
        opts.scaling = ScalingPolicy::Exact;

        let err = engine.capture(&Scene::default(), &opts).await.unwrap_err();
        assert!(matches!(
            err,
            CaptureError::CanvasTooLarge { limit: 100, .. }
        ));
    }

    #[tokio::test]
    async fn test_auto_scale_shrinks_to_limit() {
        let engine = SceneRasterizer::new(100);
        let image = engine.capture(&Scene::default(), &options(200, 50)).await.unwrap();
        assert_eq!((image.width, image.height), (100, 25));
    }

    #[tokio::test]
    async fn test_pixel_ratio_scales_canvas() {
        let engine = SceneRasterizer::default();
        let mut opts = options(40, 10);
        opts.pixel_ratio = 2.0;
        let image = engine.capture(&Scene::default(), &opts).await.unwrap();
        assert_eq!((image.width, image.height), (80, 20));
    }

    #[tokio::test]
    async fn test_zero_size_is_rejected() {
        let engine = SceneRasterizer::default();
        let err = engine.capture(&Scene::default(), &options(0, 10)).await.unwrap_err();
        assert!(matches!(err, CaptureError::InvalidDimensions { .. }));
    }
}
