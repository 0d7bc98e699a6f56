//! SliceStore trait definition

use async_trait::async_trait;

use super::types::{SliceArtifact, SliceMetadata, StorageUsage, StoreError};

/// Trait for durable slice persistence
///
/// Artifacts are insert-only: they are saved, listed and deleted, never
/// rewritten. Implementations initialise lazily, so calling `init` up front
/// is optional.
#[async_trait]
pub trait SliceStore: Send + Sync {
    /// Open the backing storage; idempotent
    async fn init(&self) -> Result<(), StoreError>;

    /// Persist one slice and return its generated id
    async fn save(
        &self,
        export_id: &str,
        slice_index: usize,
        data_url: &str,
        metadata: SliceMetadata,
    ) -> Result<u64, StoreError>;

    /// All artifacts of one export, ascending by slice index
    async fn list_by_job(&self, export_id: &str) -> Result<Vec<SliceArtifact>, StoreError>;

    /// Remove every artifact of one export
    async fn clear(&self, export_id: &str) -> Result<(), StoreError>;

    /// Remove every artifact of every export
    async fn clear_all(&self) -> Result<(), StoreError>;

    /// Count and total payload size of stored artifacts
    async fn usage(&self) -> Result<StorageUsage, StoreError>;
}
