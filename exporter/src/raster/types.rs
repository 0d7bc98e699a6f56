//! Raster-related types and error definitions

use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use bytes::Bytes;
use thiserror::Error;

use crate::document::Rgba;

const PNG_DATA_URL_PREFIX: &str = "data:image/png;base64,";

/// Errors that can occur while capturing a scene
#[derive(Debug, Error)]
pub enum CaptureError {
    #[error("invalid capture size {width}x{height}")]
    InvalidDimensions { width: u32, height: u32 },

    #[error("canvas {width}x{height} exceeds the {limit}px limit")]
    CanvasTooLarge { width: u32, height: u32, limit: u32 },

    #[error("image encoding failed: {0}")]
    Encode(String),

    #[error("raster engine error: {0}")]
    Engine(String),
}

/// Errors for malformed data URLs
#[derive(Debug, Error)]
pub enum DataUrlError {
    #[error("not a data URL")]
    MissingScheme,

    #[error("data URL is not base64 encoded")]
    NotBase64,

    #[error("invalid base64 payload: {0}")]
    Decode(#[from] base64::DecodeError),
}

/// How the engine handles a requested size that exceeds its canvas limit
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ScalingPolicy {
    /// Lower the pixel ratio until the canvas fits
    #[default]
    AutoScale,
    /// Fail instead of scaling
    Exact,
}

/// Options passed to a raster engine capture
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureOptions {
    pub background: Rgba,
    /// Logical width of the captured box; overrides intrinsic layout
    pub width: u32,
    /// Logical height of the captured box; overrides intrinsic layout
    pub height: u32,
    pub pixel_ratio: f32,
    pub scaling: ScalingPolicy,
}

/// An encoded PNG produced by a capture
#[derive(Debug, Clone, PartialEq)]
pub struct RasterImage {
    /// Pixel width of the encoded image
    pub width: u32,
    /// Pixel height of the encoded image
    pub height: u32,
    pub png: Bytes,
}

impl RasterImage {
    /// Encode as a `data:image/png;base64,...` URL
    pub fn to_data_url(&self) -> String {
        let mut url = String::with_capacity(PNG_DATA_URL_PREFIX.len() + self.png.len() * 4 / 3 + 4);
        url.push_str(PNG_DATA_URL_PREFIX);
        STANDARD.encode_string(&self.png, &mut url);
        url
    }
}

/// Decode a base64 data URL, returning its media type and payload
pub fn decode_data_url(url: &str) -> Result<(String, Bytes), DataUrlError> {
    let rest = url.strip_prefix("data:").ok_or(DataUrlError::MissingScheme)?;
    let (header, payload) = rest.split_once(',').ok_or(DataUrlError::NotBase64)?;
    let media_type = header
        .strip_suffix(";base64")
        .ok_or(DataUrlError::NotBase64)?;
    let bytes = STANDARD.decode(payload)?;
    Ok((media_type.to_string(), Bytes::from(bytes)))
}
