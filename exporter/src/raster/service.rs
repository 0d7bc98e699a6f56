//! RasterEngine trait definition

use async_trait::async_trait;

use crate::document::Scene;

use super::types::{CaptureError, CaptureOptions, RasterImage};

/// Trait for engines that turn a scene into an image
///
/// Implementations must render the box `[0, width) x [0, height)` of the
/// given scene regardless of where the scene sits in any visible layout.
#[async_trait]
pub trait RasterEngine: Send + Sync {
    /// Capture `scene` with the given options and return an encoded PNG
    async fn capture(
        &self,
        scene: &Scene,
        options: &CaptureOptions,
    ) -> Result<RasterImage, CaptureError>;
}
