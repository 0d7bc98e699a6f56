//! Directory-backed slice store
//!
//! Layout: `<root>/<export_id>/<slice_index:06>-<id>.json`, one JSON record
//! per artifact. Records are written to a hidden temporary file first and
//! renamed into place, so a listed record is always complete.

use std::io::ErrorKind;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use async_trait::async_trait;
use chrono::Utc;
use metrics::{counter, histogram};
use tokio::fs;
use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::service::SliceStore;
use super::types::{SliceArtifact, SliceMetadata, StorageUsage, StoreError, bytes_to_mb};

const RECORD_EXTENSION: &str = ".json";

/// Open store state, created on first use
#[derive(Debug)]
struct StoreHandle {
    next_id: AtomicU64,
}

/// Slice store persisting artifacts as files under a root directory
pub struct FsSliceStore {
    root: PathBuf,
    handle: RwLock<Option<Arc<StoreHandle>>>,
}

impl FsSliceStore {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self {
            root: root.into(),
            handle: RwLock::new(None),
        }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Get the open handle, opening the store if needed
    async fn handle(&self) -> Result<Arc<StoreHandle>, StoreError> {
        // Fast path: already open
        if let Some(handle) = self.handle.read().await.as_ref() {
            return Ok(Arc::clone(handle));
        }

        // Slow path: take the write lock and double-check
        let mut guard = self.handle.write().await;
        if let Some(handle) = guard.as_ref() {
            return Ok(Arc::clone(handle));
        }

        fs::create_dir_all(&self.root).await?;
        let last_id = self.scan_last_id().await?;
        let handle = Arc::new(StoreHandle {
            next_id: AtomicU64::new(last_id + 1),
        });
        *guard = Some(Arc::clone(&handle));

        info!(
            "Opened slice store at {:?} (next id {})",
            self.root,
            last_id + 1
        );
        Ok(handle)
    }

    fn job_dir(&self, export_id: &str) -> PathBuf {
        self.root.join(sanitize_id(export_id))
    }

    /// Highest record id present under the root, 0 when empty
    async fn scan_last_id(&self) -> Result<u64, StoreError> {
        let mut last = 0;
        for dir in job_dirs(&self.root).await? {
            for (_, id, _) in record_files(&dir).await? {
                last = last.max(id);
            }
        }
        Ok(last)
    }

    async fn read_record(path: &Path) -> Result<SliceArtifact, StoreError> {
        let bytes = fs::read(path).await?;
        serde_json::from_slice(&bytes).map_err(|e| StoreError::Corrupt {
            record: path.display().to_string(),
            reason: e.to_string(),
        })
    }
}

#[async_trait]
impl SliceStore for FsSliceStore {
    async fn init(&self) -> Result<(), StoreError> {
        self.handle().await.map(|_| ())
    }

    async fn save(
        &self,
        export_id: &str,
        slice_index: usize,
        data_url: &str,
        metadata: SliceMetadata,
    ) -> Result<u64, StoreError> {
        let start = Instant::now();
        let handle = self.handle().await?;
        let id = handle.next_id.fetch_add(1, Ordering::SeqCst);

        let artifact = SliceArtifact {
            id,
            export_id: export_id.to_string(),
            slice_index,
            data_url: data_url.to_string(),
            metadata,
            timestamp: Utc::now().timestamp_millis(),
        };
        let record = serde_json::to_vec(&artifact)?;

        let dir = self.job_dir(export_id);
        fs::create_dir_all(&dir).await?;
        let name = format!("{:06}-{}{}", slice_index, id, RECORD_EXTENSION);
        let tmp = dir.join(format!(".{}.tmp", name));

        fs::write(&tmp, &record).await?;
        if let Err(e) = fs::rename(&tmp, dir.join(&name)).await {
            let _ = fs::remove_file(&tmp).await;
            return Err(e.into());
        }

        counter!("lineage_export_slices_persisted_total").increment(1);
        histogram!("lineage_export_store_save_duration_seconds").record(start.elapsed());
        debug!(
            "Saved slice {} of {} as record {} ({} bytes)",
            slice_index,
            export_id,
            id,
            record.len()
        );
        Ok(id)
    }

    async fn list_by_job(&self, export_id: &str) -> Result<Vec<SliceArtifact>, StoreError> {
        self.handle().await?;

        // record_files sorts by (slice_index, id)
        let mut artifacts = Vec::new();
        for (_, _, path) in record_files(&self.job_dir(export_id)).await? {
            let artifact = Self::read_record(&path).await?;
            if artifact.export_id == export_id {
                artifacts.push(artifact);
            }
        }
        Ok(artifacts)
    }

    async fn clear(&self, export_id: &str) -> Result<(), StoreError> {
        self.handle().await?;
        let dir = self.job_dir(export_id);

        // Distinct ids can share a sanitized directory; only this job's records go
        let mut removed = 0usize;
        for (_, _, path) in record_files(&dir).await? {
            let artifact = match Self::read_record(&path).await {
                Ok(artifact) => artifact,
                Err(StoreError::IoError(e)) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => {
                    warn!("Skipping unreadable slice record while clearing: {}", e);
                    continue;
                }
            };
            if artifact.export_id != export_id {
                continue;
            }
            match fs::remove_file(&path).await {
                Ok(()) => removed += 1,
                Err(e) if e.kind() == ErrorKind::NotFound => {}
                Err(e) => return Err(e.into()),
            }
        }

        match fs::remove_dir(&dir).await {
            Ok(()) => {}
            Err(e)
                if matches!(
                    e.kind(),
                    ErrorKind::NotFound | ErrorKind::DirectoryNotEmpty
                ) => {}
            Err(e) => warn!("Failed to remove slice directory {:?}: {}", dir, e),
        }

        debug!("Cleared {} slice records of {}", removed, export_id);
        Ok(())
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.handle().await?;
        for dir in job_dirs(&self.root).await? {
            fs::remove_dir_all(&dir).await?;
        }
        info!("Cleared all slice records under {:?}", self.root);
        Ok(())
    }

    async fn usage(&self) -> Result<StorageUsage, StoreError> {
        self.handle().await?;

        let mut count = 0;
        let mut total_bytes = 0u64;
        for dir in job_dirs(&self.root).await? {
            for (_, _, path) in record_files(&dir).await? {
                let artifact = Self::read_record(&path).await?;
                count += 1;
                total_bytes += artifact.data_url.len() as u64;
            }
        }

        Ok(StorageUsage {
            count,
            total_size_mb: bytes_to_mb(total_bytes),
        })
    }
}

/// Subdirectories of the store root
async fn job_dirs(root: &Path) -> Result<Vec<PathBuf>, StoreError> {
    let mut entries = match fs::read_dir(root).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut dirs = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        if entry.file_type().await?.is_dir() {
            dirs.push(entry.path());
        }
    }
    Ok(dirs)
}

/// Record files of one job directory, sorted by (slice_index, id)
async fn record_files(dir: &Path) -> Result<Vec<(usize, u64, PathBuf)>, StoreError> {
    let mut entries = match fs::read_dir(dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Vec::new()),
        Err(e) => return Err(e.into()),
    };

    let mut records = Vec::new();
    while let Some(entry) = entries.next_entry().await? {
        let name = entry.file_name();
        if let Some((index, id)) = name.to_str().and_then(parse_record_name) {
            records.push((index, id, entry.path()));
        }
    }
    records.sort_by_key(|&(index, id, _)| (index, id));
    Ok(records)
}

/// Parse `<slice_index>-<id>.json`; temporary files do not match
fn parse_record_name(name: &str) -> Option<(usize, u64)> {
    let stem = name.strip_suffix(RECORD_EXTENSION)?;
    let (index, id) = stem.split_once('-')?;
    Some((index.parse().ok()?, id.parse().ok()?))
}

/// Sanitize an ID for safe use as a directory name
fn sanitize_id(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c.is_alphanumeric() || c == '-' || c == '_' {
                c
            } else {
                '_'
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_root(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "lineage_export_test_{}_{}",
            name,
            uuid::Uuid::new_v4().simple()
        ))
    }

    fn metadata(x: u32) -> SliceMetadata {
        SliceMetadata {
            total_width: 6000,
            total_height: 900,
            slice_count: 3,
            x,
            y: 0,
            width: 2000,
            height: 900,
            is_last_slice: false,
        }
    }

    #[test]
    fn test_parse_record_name() {
        assert_eq!(parse_record_name("000002-17.json"), Some((2, 17)));
        assert_eq!(parse_record_name(".000002-17.json.tmp"), None);
        assert_eq!(parse_record_name("notes.txt"), None);
    }

    #[test]
    fn test_sanitize_id() {
        assert_eq!(sanitize_id("export_1_abc"), "export_1_abc");
        assert_eq!(sanitize_id("../../etc"), "______etc");
    }

    #[tokio::test]
    async fn test_list_is_ordered_by_slice_index() {
        let root = temp_root("order");
        let store = FsSliceStore::new(&root);

        // saved out of order on purpose
        for index in [2usize, 0, 1] {
            store
                .save(
                    "export_a",
                    index,
                    &format!("data:image/png;base64,{}", index),
                    metadata(index as u32),
                )
                .await
                .unwrap();
        }
        store.save("export_b", 0, "data:,", metadata(0)).await.unwrap();

        let listed = store.list_by_job("export_a").await.unwrap();
        let indices: Vec<usize> = listed.iter().map(|a| a.slice_index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        assert!(listed.iter().all(|a| a.export_id == "export_a"));
        assert_eq!(listed[1].metadata.x, 1);

        assert!(store.list_by_job("missing").await.unwrap().is_empty());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_clear_removes_only_one_job() {
        let root = temp_root("clear");
        let store = FsSliceStore::new(&root);
        for index in 0..3 {
            store.save("export_a", index, "data:,", metadata(0)).await.unwrap();
        }
        store.save("export_b", 0, "data:,", metadata(0)).await.unwrap();

        store.clear("export_a").await.unwrap();
        assert!(store.list_by_job("export_a").await.unwrap().is_empty());
        assert_eq!(store.list_by_job("export_b").await.unwrap().len(), 1);
        assert!(!root.join("export_a").exists());

        // clearing again is a no-op
        store.clear("export_a").await.unwrap();

        store.clear_all().await.unwrap();
        assert_eq!(store.usage().await.unwrap().count, 0);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_clear_spares_job_sharing_a_directory() {
        let root = temp_root("shared_dir");
        let store = FsSliceStore::new(&root);
        // both ids sanitize to "job_1"
        store.save("job_1", 0, "data:,", metadata(0)).await.unwrap();
        store.save("job.1", 0, "data:,", metadata(0)).await.unwrap();
        assert_eq!(sanitize_id("job.1"), sanitize_id("job_1"));

        store.clear("job.1").await.unwrap();
        assert!(store.list_by_job("job.1").await.unwrap().is_empty());
        let survivors = store.list_by_job("job_1").await.unwrap();
        assert_eq!(survivors.len(), 1);
        assert_eq!(survivors[0].export_id, "job_1");
        assert!(root.join("job_1").exists());

        store.clear("job_1").await.unwrap();
        assert!(!root.join("job_1").exists());
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_usage_reports_megabytes() {
        let root = temp_root("usage");
        let store = FsSliceStore::new(&root);
        let payload = "a".repeat(512 * 1024);
        store.save("export_a", 0, &payload, metadata(0)).await.unwrap();
        store.save("export_a", 1, &payload, metadata(0)).await.unwrap();
        store.save("export_b", 0, &payload, metadata(0)).await.unwrap();

        let usage = store.usage().await.unwrap();
        assert_eq!(usage.count, 3);
        assert!((usage.total_size_mb - 1.5).abs() < 0.01);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_ids_survive_reopen() {
        let root = temp_root("reopen");
        let first = {
            let store = FsSliceStore::new(&root);
            store.init().await.unwrap();
            store.init().await.unwrap();
            store.save("export_a", 0, "data:,", metadata(0)).await.unwrap();
            store.save("export_a", 1, "data:,", metadata(0)).await.unwrap()
        };

        let reopened = FsSliceStore::new(&root);
        let next = reopened.save("export_a", 2, "data:,", metadata(0)).await.unwrap();
        assert!(next > first);
        assert_eq!(reopened.list_by_job("export_a").await.unwrap().len(), 3);
        let _ = std::fs::remove_dir_all(&root);
    }

    #[tokio::test]
    async fn test_corrupt_record_is_reported() {
        let root = temp_root("corrupt");
        let store = FsSliceStore::new(&root);
        store.save("export_a", 0, "data:,", metadata(0)).await.unwrap();
        std::fs::write(root.join("export_a").join("000001-99.json"), b"{not json").unwrap();

        let err = store.list_by_job("export_a").await.unwrap_err();
        assert!(matches!(err, StoreError::Corrupt { .. }));
        let _ = std::fs::remove_dir_all(&root);
    }
}
