//! Slice store types and error definitions

use serde::{Deserialize, Serialize};
use thiserror::Error;

use crate::slicer::{SliceGeometry, SliceLayout};

/// Errors that can occur in the slice store
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("IO error: {0}")]
    IoError(#[from] std::io::Error),

    #[error("failed to encode or decode slice record: {0}")]
    Serialize(#[from] serde_json::Error),

    #[error("corrupt slice record {record}: {reason}")]
    Corrupt { record: String, reason: String },

    #[error("expected {expected} persisted slices, found {found}")]
    Incomplete { expected: usize, found: usize },
}

/// Placement of a slice within its export, stored alongside the payload
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceMetadata {
    pub total_width: u32,
    pub total_height: u32,
    pub slice_count: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub is_last_slice: bool,
}

impl SliceMetadata {
    pub fn new(layout: &SliceLayout, geometry: &SliceGeometry) -> Self {
        Self {
            total_width: layout.total_width,
            total_height: layout.total_height,
            slice_count: layout.slice_count,
            x: geometry.x,
            y: geometry.y,
            width: geometry.width,
            height: geometry.height,
            is_last_slice: geometry.is_last_slice,
        }
    }
}

/// A persisted slice; never modified once saved
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceArtifact {
    pub id: u64,
    pub export_id: String,
    pub slice_index: usize,
    pub data_url: String,
    pub metadata: SliceMetadata,
    /// Unix milliseconds at save time
    pub timestamp: i64,
}

/// Aggregate store usage
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageUsage {
    pub count: usize,
    #[serde(rename = "totalSizeMB")]
    pub total_size_mb: f64,
}

/// Usage checked against a soft limit
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StorageReport {
    pub count: usize,
    #[serde(rename = "totalSizeMB")]
    pub total_size_mb: f64,
    pub is_over_limit: bool,
    pub usage_percentage: u32,
    pub recommendation: String,
}

/// Round to two decimals
pub(crate) fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}

/// Convert a byte count to megabytes, two decimals
pub(crate) fn bytes_to_mb(bytes: u64) -> f64 {
    round2(bytes as f64 / 1024.0 / 1024.0)
}
