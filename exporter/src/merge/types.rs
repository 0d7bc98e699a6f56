//! Merge service wire types and error definitions

use std::time::Duration;

use serde::{Deserialize, Serialize};
use thiserror::Error;

/// Errors talking to the merge service
#[derive(Debug, Error)]
pub enum MergeError {
    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("merge service returned {status}: {body}")]
    Status { status: u16, body: String },

    #[error("merge service rejected the request: {0}")]
    Rejected(String),

    #[error("merge did not complete within {0:?}")]
    Timeout(Duration),

    #[error("invalid merge service response: {0}")]
    Decode(String),
}

/// Reply to a slice upload
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct UploadReceipt {
    pub success: bool,
    pub slice_id: String,
    /// Unix milliseconds
    pub upload_time: i64,
}

/// Final result of a successful merge
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeResult {
    pub success: bool,
    pub download_url: String,
    pub export_id: String,
    /// Human readable size, e.g. "12.4MB"
    pub file_size: String,
    /// Unix milliseconds
    pub merge_time: i64,
}

/// Body of a merge request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeRequest {
    pub slice_count: usize,
}

/// Merge status as reported by the service
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct MergeStatus {
    /// 0-100
    pub progress: u8,
    pub completed: bool,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub result: Option<MergeResult>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}
