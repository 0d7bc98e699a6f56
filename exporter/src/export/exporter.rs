//! Export orchestrator
//!
//! Picks between the direct path (one capture of the whole region) and the
//! sliced path (slice, persist, upload, merge) based on the padded width of
//! the document, then saves the resulting image.

use std::path::PathBuf;
use std::sync::Arc;

use metrics::counter;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::config::{ConfigError, ExportConfig};
use crate::document::{Document, Rgba};
use crate::download::{DownloadTarget, FileDownloader, export_file_name, merged_file_name};
use crate::error::{ExportError, Result, Stage};
use crate::merge::{HttpMergeClient, MergeResult, MergeService, UploadMergeCoordinator};
use crate::progress::{ProgressReporter, ProgressSink};
use crate::raster::{CaptureOptions, RasterEngine, ScalingPolicy, SceneRasterizer};
use crate::slicer::{DomSlicer, compute_geometry};
use crate::store::{FsSliceStore, SliceStore};

use super::job::ExportJob;
use super::size::{SizeCheck, needs_slicing};

/// Which pipeline produced an export
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExportPath {
    Direct,
    Sliced,
}

/// Outcome of a successful export
#[derive(Debug)]
pub struct ExportOutcome {
    pub path: ExportPath,
    /// Saved image
    pub file: PathBuf,
    /// Merge service result, sliced path only
    pub merge: Option<MergeResult>,
    /// Deferred removal of the job's local slices, sliced path only
    pub cleanup: Option<JoinHandle<()>>,
}

/// Exports documents to a single image
pub struct Exporter {
    config: Arc<ExportConfig>,
    engine: Arc<dyn RasterEngine>,
    store: Arc<dyn SliceStore>,
    merge: Arc<dyn MergeService>,
    downloader: Arc<dyn DownloadTarget>,
}

impl Exporter {
    /// Create an exporter from explicit collaborators
    pub fn new(
        config: ExportConfig,
        engine: Arc<dyn RasterEngine>,
        store: Arc<dyn SliceStore>,
        merge: Arc<dyn MergeService>,
        downloader: Arc<dyn DownloadTarget>,
    ) -> Result<Self> {
        config.validate()?;
        Ok(Self {
            config: Arc::new(config),
            engine,
            store,
            merge,
            downloader,
        })
    }

    /// Create an exporter with the default collaborators for `config`
    pub fn from_config(config: ExportConfig) -> Result<Self> {
        config.validate()?;
        let engine = Arc::new(SceneRasterizer::new(config.capture.max_canvas_dimension));
        let store = Arc::new(FsSliceStore::new(config.store.store_dir.clone()));
        let merge = Arc::new(HttpMergeClient::new(&config.merge)?);
        let downloader = Arc::new(FileDownloader::new(config.output.output_dir.clone()));
        Self::new(config, engine, store, merge, downloader)
    }

    /// Same collaborators, different configuration
    pub fn with_config(&self, config: ExportConfig) -> Result<Self> {
        Self::new(
            config,
            Arc::clone(&self.engine),
            Arc::clone(&self.store),
            Arc::clone(&self.merge),
            Arc::clone(&self.downloader),
        )
    }

    pub fn config(&self) -> &ExportConfig {
        &self.config
    }

    pub fn store(&self) -> &Arc<dyn SliceStore> {
        &self.store
    }

    /// Inspect the document's raw extent without rendering anything
    pub fn check_size(&self, document: &Document) -> Result<SizeCheck> {
        let (width, height) = document.scroll_size();
        if width == 0 || height == 0 {
            return Err(empty_document(width, height).in_stage(Stage::Measure));
        }
        Ok(SizeCheck::new(width, height, &self.config.slicing))
    }

    /// Export the full content of `document` to one image
    ///
    /// `background_color` falls back to the configured background. Progress
    /// events go to `progress` synchronously; the last one is always the
    /// `Completed` event at 100%.
    pub async fn export_region(
        &self,
        document: &Document,
        background_color: Option<&str>,
        progress: Option<ProgressSink>,
    ) -> Result<ExportOutcome> {
        let background = self.resolve_background(background_color)?;
        let (width, height) = self.measure(document)?;
        let reporter = ProgressReporter::new(progress);

        if needs_slicing(width, self.config.slicing.max_width) {
            info!(
                "Exporting {:?} via sliced path ({}x{} > {})",
                document.title(),
                width,
                height,
                self.config.slicing.max_width
            );
            self.export_sliced(document, width, height, background, &reporter)
                .await
        } else {
            info!(
                "Exporting {:?} via direct path ({}x{})",
                document.title(),
                width,
                height
            );
            self.export_direct(document, width, height, background, &reporter)
                .await
        }
    }

    /// Padded content extent
    fn measure(&self, document: &Document) -> Result<(u32, u32)> {
        let (width, height) = document.scroll_size();
        if width == 0 || height == 0 {
            return Err(empty_document(width, height).in_stage(Stage::Measure));
        }
        let padding = self.config.slicing.padding;
        let padded = (width.saturating_add(padding), height.saturating_add(padding));
        debug!(
            "Measured {}x{}, padded to {}x{}",
            width, height, padded.0, padded.1
        );
        Ok(padded)
    }

    fn resolve_background(&self, requested: Option<&str>) -> Result<Rgba> {
        match requested {
            Some(color) => Rgba::parse(color).map_err(|e| ExportError::InvalidInput(e.to_string())),
            None => Rgba::parse(&self.config.capture.background_color)
                .map_err(|e| ConfigError::Background(e.to_string()).into()),
        }
    }

    async fn export_direct(
        &self,
        document: &Document,
        width: u32,
        height: u32,
        background: Rgba,
        reporter: &ProgressReporter,
    ) -> Result<ExportOutcome> {
        let options = CaptureOptions {
            background,
            width,
            height,
            pixel_ratio: self.config.capture.pixel_ratio,
            scaling: ScalingPolicy::AutoScale,
        };
        let image = self
            .engine
            .capture(document.root(), &options)
            .await
            .map_err(|e| ExportError::from(e).in_stage(Stage::Capture))?;

        let file_name = export_file_name(&self.config.output.document_title, "png");
        let file = self
            .downloader
            .save_data_url(&image.to_data_url(), &file_name)
            .await
            .map_err(|e| ExportError::from(e).in_stage(Stage::Download))?;

        counter!("lineage_export_exports_total", "path" => "direct").increment(1);
        reporter.complete(1, "Export finished", None);
        Ok(ExportOutcome {
            path: ExportPath::Direct,
            file,
            merge: None,
            cleanup: None,
        })
    }

    async fn export_sliced(
        &self,
        document: &Document,
        width: u32,
        height: u32,
        background: Rgba,
        reporter: &ProgressReporter,
    ) -> Result<ExportOutcome> {
        let settings = self.config.slicing.settings()?;
        let job = ExportJob::new(width, height, background);
        let layout = compute_geometry(width, height, settings);

        let slicer = DomSlicer::new(Arc::clone(&self.engine), background)
            .with_pixel_ratio(self.config.capture.pixel_ratio);
        let coordinator = UploadMergeCoordinator::new(
            Arc::clone(&self.store),
            Arc::clone(&self.merge),
            self.config.progress,
        );
        let result = coordinator
            .run(&job, &layout, &slicer.for_document(document), reporter)
            .await?;

        let file_name = merged_file_name(&self.config.output.document_title, &result.download_url);
        let file = match self
            .downloader
            .save_remote(&result.download_url, &file_name)
            .await
        {
            Ok(file) => file,
            Err(e) => {
                if let Err(clear_err) = self.store.clear(&job.id).await {
                    warn!("Failed to clear slices of {}: {}", job.id, clear_err);
                }
                return Err(ExportError::from(e).in_stage(Stage::Download));
            }
        };

        counter!("lineage_export_exports_total", "path" => "sliced").increment(1);
        reporter.complete(
            layout.slice_count,
            format!("Export finished ({})", result.file_size),
            Some(result.clone()),
        );
        let cleanup = self.schedule_cleanup(job.id.clone());
        Ok(ExportOutcome {
            path: ExportPath::Sliced,
            file,
            merge: Some(result),
            cleanup: Some(cleanup),
        })
    }

    /// Remove the job's local slices after the configured delay
    fn schedule_cleanup(&self, export_id: String) -> JoinHandle<()> {
        let store = Arc::clone(&self.store);
        let delay = self.config.store.cleanup_delay;
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            match store.clear(&export_id).await {
                Ok(()) => debug!("Cleaned up slices of {}", export_id),
                Err(e) => warn!("Deferred cleanup of {} failed: {}", export_id, e),
            }
        })
    }
}

fn empty_document(width: u32, height: u32) -> ExportError {
    ExportError::InvalidInput(format!("document has no content ({}x{})", width, height))
}
