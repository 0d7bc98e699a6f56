//! Raster engine module
//!
//! This module provides:
//! - `RasterEngine` trait for abstracting the scene-to-image capture step
//! - `SceneRasterizer`, the default engine painting scenes with `image`
//! - PNG data URL helpers used for slice payloads

mod scene;
mod service;
mod types;

pub use scene::{DEFAULT_MAX_CANVAS_DIMENSION, SceneRasterizer};
pub use service::RasterEngine;
pub use types::{
    CaptureError, CaptureOptions, DataUrlError, RasterImage, ScalingPolicy, decode_data_url,
};
