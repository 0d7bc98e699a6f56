//! Size inspection ahead of an export

use serde::Serialize;

use crate::config::SlicingConfig;
use crate::store::round2;

/// Whether a region of `width` needs the sliced path
pub fn needs_slicing(width: u32, max_width: u32) -> bool {
    width > max_width
}

/// Result of inspecting a document before exporting it
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct SizeCheck {
    pub width: u32,
    pub height: u32,
    pub needs_slicing: bool,
    pub estimated_slices: u32,
    /// Uncompressed RGBA size
    #[serde(rename = "estimatedSizeMB")]
    pub estimated_size_mb: f64,
    pub aspect_ratio: f64,
    pub recommendation: String,
}

impl SizeCheck {
    pub fn new(width: u32, height: u32, slicing: &SlicingConfig) -> Self {
        let needs_slicing = needs_slicing(width, slicing.max_width);
        let estimated_slices = if needs_slicing {
            width.div_ceil(slicing.slice_width.max(1))
        } else {
            1
        };
        let estimated_size_mb = round2(width as f64 * height as f64 * 4.0 / 1024.0 / 1024.0);
        let aspect_ratio = if height == 0 {
            0.0
        } else {
            round2(width as f64 / height as f64)
        };
        let recommendation = if needs_slicing {
            format!(
                "use the sliced export, about {} slices will be generated",
                estimated_slices
            )
        } else {
            "the regular export can be used".to_string()
        };

        Self {
            width,
            height,
            needs_slicing,
            estimated_slices,
            estimated_size_mb,
            aspect_ratio,
            recommendation,
        }
    }
}
