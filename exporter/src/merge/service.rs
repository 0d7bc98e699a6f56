//! MergeService trait definition

use async_trait::async_trait;
use bytes::Bytes;

use super::types::{MergeError, MergeResult, UploadReceipt};

/// Remote service that stitches uploaded slices into one image
///
/// Slices must be uploaded in ascending index order; the service joins them
/// left to right and blends the overlapping strips.
#[async_trait]
pub trait MergeService: Send + Sync {
    /// Upload one encoded slice
    async fn upload_slice(
        &self,
        export_id: &str,
        slice_index: usize,
        payload: Bytes,
    ) -> Result<UploadReceipt, MergeError>;

    /// Merge all uploaded slices, reporting service progress (0-100)
    async fn merge(
        &self,
        export_id: &str,
        slice_count: usize,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<MergeResult, MergeError>;
}
