//! Common Test Utilities for Integration Tests
//!
//! Shared fakes and helpers used across integration test modules.

#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::body::Bytes as BodyBytes;
use axum::extract::{Path as UrlPath, State};
use axum::http::{HeaderMap, StatusCode};
use axum::routing::post;
use axum::{Json, Router};
use bytes::Bytes;
use lineage_export::config::{ExportConfig, OutputConfig, SlicingConfig, StoreConfig};
use lineage_export::document::{Document, Node, NodeKind, Rgba, Scene};
use lineage_export::merge::{MergeError, MergeResult, MergeService, MergeStatus, UploadReceipt};
use lineage_export::progress::{ProgressEvent, ProgressSink};
use lineage_export::raster::{
    CaptureError, CaptureOptions, RasterEngine, RasterImage, SceneRasterizer,
};
use lineage_export::store::{
    FsSliceStore, SliceArtifact, SliceMetadata, SliceStore, StorageUsage, StoreError,
};

/// Unique scratch directory under the system temp dir
pub fn temp_root(name: &str) -> PathBuf {
    std::env::temp_dir().join(format!(
        "lineage_export_it_{}_{}",
        name,
        uuid::Uuid::new_v4().simple()
    ))
}

/// Config writing into `root`, with no deferred-cleanup delay
pub fn test_config(root: &Path) -> ExportConfig {
    ExportConfig::default()
        .with_output(OutputConfig {
            output_dir: root.join("out"),
            document_title: "family-tree".to_string(),
        })
        .with_store(StoreConfig {
            store_dir: root.join("slices"),
            cleanup_delay: std::time::Duration::ZERO,
            max_size_mb: 100.0,
        })
}

/// Config with padding disabled, so the measured width is the decision width
pub fn unpadded_config(root: &Path) -> ExportConfig {
    let config = test_config(root);
    let slicing = SlicingConfig {
        padding: 0,
        ..config.slicing.clone()
    };
    config.with_slicing(slicing)
}

/// A document whose content extent is exactly `width` x `height`
pub fn wide_document(width: u32, height: u32) -> Document {
    let mut nodes = Vec::new();
    let mut x = 0;
    while x + 120 <= width as i32 {
        nodes.push(Node {
            x,
            y: 20,
            width: 100,
            height: 60,
            fill: Rgba([59, 130, 246, 255]),
            border: None,
            kind: NodeKind::Block,
        });
        x += 400;
    }
    Document::new(
        "family-tree",
        Scene {
            nodes,
            min_width: width,
            min_height: height,
        },
    )
}

/// Sink recording every event it receives
pub fn recording_sink() -> (ProgressSink, Arc<Mutex<Vec<ProgressEvent>>>) {
    let events = Arc::new(Mutex::new(Vec::new()));
    let recorded = events.clone();
    let sink: ProgressSink = Arc::new(move |event: &ProgressEvent| {
        recorded.lock().unwrap().push(event.clone());
    });
    (sink, events)
}

/// Raster engine that fails on one specific call (1-based)
pub struct FailingEngine {
    inner: SceneRasterizer,
    fail_on_call: usize,
    calls: AtomicUsize,
}

impl FailingEngine {
    pub fn new(fail_on_call: usize) -> Self {
        Self {
            inner: SceneRasterizer::default(),
            fail_on_call,
            calls: AtomicUsize::new(0),
        }
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl RasterEngine for FailingEngine {
    async fn capture(
        &self,
        scene: &Scene,
        options: &CaptureOptions,
    ) -> Result<RasterImage, CaptureError> {
        let call = self.calls.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_on_call {
            return Err(CaptureError::Engine(format!("injected failure on call {}", call)));
        }
        self.inner.capture(scene, options).await
    }
}

/// In-process merge service recording what it receives
///
/// The merged image is written to `merged_dir` and referenced by a
/// `file://` download URL.
pub struct FakeMergeService {
    merged_dir: PathBuf,
    pub uploads: Mutex<Vec<(String, usize, usize)>>,
    pub merges: Mutex<Vec<(String, usize)>>,
    pub fail_upload_at: Option<usize>,
    pub fail_merge: bool,
    /// Report a download URL that points nowhere
    pub missing_download: bool,
}

impl FakeMergeService {
    pub fn new(merged_dir: impl Into<PathBuf>) -> Self {
        Self {
            merged_dir: merged_dir.into(),
            uploads: Mutex::new(Vec::new()),
            merges: Mutex::new(Vec::new()),
            fail_upload_at: None,
            fail_merge: false,
            missing_download: false,
        }
    }

    pub fn uploaded_indices(&self) -> Vec<usize> {
        self.uploads.lock().unwrap().iter().map(|u| u.1).collect()
    }
}

#[async_trait]
impl MergeService for FakeMergeService {
    async fn upload_slice(
        &self,
        export_id: &str,
        slice_index: usize,
        payload: Bytes,
    ) -> Result<UploadReceipt, MergeError> {
        if self.fail_upload_at == Some(slice_index) {
            return Err(MergeError::Status {
                status: 503,
                body: "upload rejected".to_string(),
            });
        }
        self.uploads
            .lock()
            .unwrap()
            .push((export_id.to_string(), slice_index, payload.len()));
        Ok(UploadReceipt {
            success: true,
            slice_id: format!("{}-{}", export_id, slice_index),
            upload_time: 0,
        })
    }

    async fn merge(
        &self,
        export_id: &str,
        slice_count: usize,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<MergeResult, MergeError> {
        self.merges
            .lock()
            .unwrap()
            .push((export_id.to_string(), slice_count));
        if self.fail_merge {
            return Err(MergeError::Rejected("merge crashed".to_string()));
        }
        for pct in [0, 40, 100] {
            on_progress(pct);
        }

        let merged = self.merged_dir.join(format!("{}.png", export_id));
        if !self.missing_download {
            std::fs::create_dir_all(&self.merged_dir)
                .map_err(|e| MergeError::Decode(e.to_string()))?;
            std::fs::write(&merged, b"merged image")
                .map_err(|e| MergeError::Decode(e.to_string()))?;
        }

        Ok(MergeResult {
            success: true,
            download_url: format!("file://{}", merged.display()),
            export_id: export_id.to_string(),
            file_size: "0.01MB".to_string(),
            merge_time: 0,
        })
    }
}

/// Directory-backed store whose `save` fails on one specific call (1-based)
pub struct FlakyStore {
    inner: FsSliceStore,
    fail_save_on_call: usize,
    saves: AtomicUsize,
    pub cleared: Mutex<Vec<String>>,
}

impl FlakyStore {
    pub fn new(root: impl Into<PathBuf>, fail_save_on_call: usize) -> Self {
        Self {
            inner: FsSliceStore::new(root),
            fail_save_on_call,
            saves: AtomicUsize::new(0),
            cleared: Mutex::new(Vec::new()),
        }
    }
}

#[async_trait]
impl SliceStore for FlakyStore {
    async fn init(&self) -> Result<(), StoreError> {
        self.inner.init().await
    }

    async fn save(
        &self,
        export_id: &str,
        slice_index: usize,
        data_url: &str,
        metadata: SliceMetadata,
    ) -> Result<u64, StoreError> {
        let call = self.saves.fetch_add(1, Ordering::SeqCst) + 1;
        if call == self.fail_save_on_call {
            return Err(std::io::Error::other("quota exceeded").into());
        }
        self.inner
            .save(export_id, slice_index, data_url, metadata)
            .await
    }

    async fn list_by_job(&self, export_id: &str) -> Result<Vec<SliceArtifact>, StoreError> {
        self.inner.list_by_job(export_id).await
    }

    async fn clear(&self, export_id: &str) -> Result<(), StoreError> {
        self.cleared.lock().unwrap().push(export_id.to_string());
        self.inner.clear(export_id).await
    }

    async fn clear_all(&self) -> Result<(), StoreError> {
        self.inner.clear_all().await
    }

    async fn usage(&self) -> Result<StorageUsage, StoreError> {
        self.inner.usage().await
    }
}

// ============================================================================
// Fake merge service over HTTP
// ============================================================================

/// State of the HTTP fake
#[derive(Default)]
pub struct MergeServerState {
    /// (export id, slice index, body length, content type)
    pub uploads: Mutex<Vec<(String, usize, usize, String)>>,
    pub merge_requests: Mutex<Vec<serde_json::Value>>,
    pub polls: AtomicUsize,
    pub fail_uploads: bool,
}

async fn upload_slice(
    State(state): State<Arc<MergeServerState>>,
    UrlPath((export_id, index)): UrlPath<(String, usize)>,
    headers: HeaderMap,
    body: BodyBytes,
) -> Result<Json<serde_json::Value>, (StatusCode, String)> {
    if state.fail_uploads {
        return Err((StatusCode::INTERNAL_SERVER_ERROR, "disk full".to_string()));
    }
    let content_type = headers
        .get("content-type")
        .and_then(|v| v.to_str().ok())
        .unwrap_or_default()
        .to_string();
    state
        .uploads
        .lock()
        .unwrap()
        .push((export_id.clone(), index, body.len(), content_type));
    Ok(Json(serde_json::json!({
        "success": true,
        "sliceId": format!("{}-{}", export_id, index),
        "uploadTime": 1_700_000_000_000i64,
    })))
}

async fn start_merge(
    State(state): State<Arc<MergeServerState>>,
    Json(request): Json<serde_json::Value>,
) -> Json<MergeStatus> {
    state.merge_requests.lock().unwrap().push(request);
    Json(MergeStatus {
        progress: 0,
        completed: false,
        result: None,
        error: None,
    })
}

async fn merge_status(
    State(state): State<Arc<MergeServerState>>,
    UrlPath(export_id): UrlPath<String>,
) -> Json<MergeStatus> {
    let poll = state.polls.fetch_add(1, Ordering::SeqCst) + 1;
    if poll < 3 {
        return Json(MergeStatus {
            progress: (poll * 30) as u8,
            completed: false,
            result: None,
            error: None,
        });
    }
    Json(MergeStatus {
        progress: 100,
        completed: true,
        result: Some(MergeResult {
            success: true,
            download_url: format!("http://merge.invalid/download/{}.png", export_id),
            export_id,
            file_size: "12.4MB".to_string(),
            merge_time: 1_700_000_000_000,
        }),
        error: None,
    })
}

/// Start the fake merge service on an ephemeral port, returning its base URL
pub async fn spawn_merge_server(state: Arc<MergeServerState>) -> String {
    let app = Router::new()
        .route("/api/exports/:export_id/slices/:index", post(upload_slice))
        .route(
            "/api/exports/:export_id/merge",
            post(start_merge).get(merge_status),
        )
        .with_state(state);

    let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = listener.local_addr().unwrap();
    tokio::spawn(async move {
        axum::serve(listener, app).await.unwrap();
    });
    format!("http://{}", addr)
}
