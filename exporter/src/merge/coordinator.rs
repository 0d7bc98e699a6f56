//! Upload/merge coordinator
//!
//! Drives one sliced export through `Rendering -> Uploading -> Merging` and
//! ends in `Completed` or `Failed`. Every step is sequential: a slice is
//! rendered and persisted before the next one starts, and uploads go out one
//! at a time in ascending slice order. Progress stays below 100 here; the
//! orchestrator emits the terminal event once the merged image is saved.

use std::sync::Arc;
use std::time::Instant;

use metrics::{counter, histogram};
use tracing::{error, info, warn};

use crate::config::ProgressWeights;
use crate::error::{ExportError, Result, Stage};
use crate::export::ExportJob;
use crate::progress::{Phase, ProgressBands, ProgressReporter};
use crate::raster::decode_data_url;
use crate::slicer::{SliceLayout, SliceRenderer};
use crate::store::{SliceMetadata, SliceStore, StoreError};

use super::service::MergeService;
use super::types::MergeResult;

/// Coordinator states, logged on every transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CoordinatorState {
    Rendering,
    Uploading,
    Merging,
    Completed,
    Failed,
}

/// Runs the render, persist, upload and merge sequence for sliced exports
pub struct UploadMergeCoordinator {
    store: Arc<dyn SliceStore>,
    merge: Arc<dyn MergeService>,
    bands: ProgressBands,
}

impl UploadMergeCoordinator {
    pub fn new(
        store: Arc<dyn SliceStore>,
        merge: Arc<dyn MergeService>,
        weights: ProgressWeights,
    ) -> Self {
        Self {
            store,
            merge,
            bands: ProgressBands::from(weights),
        }
    }

    /// Run one job through merging
    ///
    /// The terminal `Completed` event is left to the caller, which still has
    /// to fetch the merged image. On failure the job's persisted slices are
    /// cleared (best effort) and the error is returned tagged with the stage
    /// it came from. Slices already uploaded are left to the merge service.
    pub async fn run(
        &self,
        job: &ExportJob,
        layout: &SliceLayout,
        renderer: &dyn SliceRenderer,
        progress: &ProgressReporter,
    ) -> Result<MergeResult> {
        let start = Instant::now();
        info!(
            "Starting sliced export {} ({}x{}, {} slices)",
            job.id, layout.total_width, layout.total_height, layout.slice_count
        );

        match self.run_stages(job, layout, renderer, progress).await {
            Ok(result) => {
                self.transition(job, CoordinatorState::Completed);
                counter!("lineage_export_jobs_completed_total").increment(1);
                histogram!("lineage_export_job_duration_seconds").record(start.elapsed());
                Ok(result)
            }
            Err(e) => {
                self.transition(job, CoordinatorState::Failed);
                counter!("lineage_export_jobs_failed_total").increment(1);
                error!("Sliced export {} failed: {}", job.id, e);
                self.discard(&job.id).await;
                Err(e)
            }
        }
    }

    async fn run_stages(
        &self,
        job: &ExportJob,
        layout: &SliceLayout,
        renderer: &dyn SliceRenderer,
        progress: &ProgressReporter,
    ) -> Result<MergeResult> {
        if layout.is_empty() {
            return Err(ExportError::InvalidInput("no slices to export".to_string())
                .in_stage(Stage::Rendering));
        }

        self.transition(job, CoordinatorState::Rendering);
        self.timed(Stage::Rendering, self.render_all(job, layout, renderer, progress))
            .await?;

        self.transition(job, CoordinatorState::Uploading);
        self.timed(Stage::Uploading, self.upload_all(job, layout, progress))
            .await?;

        self.transition(job, CoordinatorState::Merging);
        self.timed(Stage::Merging, self.merge_all(job, layout, progress))
            .await
    }

    /// Render and persist every slice, in index order
    async fn render_all(
        &self,
        job: &ExportJob,
        layout: &SliceLayout,
        renderer: &dyn SliceRenderer,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let total = layout.slice_count;
        progress.report(
            Phase::Slicing,
            0,
            total,
            0,
            format!("Preparing {} slices", total),
        );

        for geometry in &layout.slices {
            let image = renderer.render(geometry).await?;
            self.store
                .save(
                    &job.id,
                    geometry.index,
                    &image.to_data_url(),
                    SliceMetadata::new(layout, geometry),
                )
                .await?;

            let done = geometry.index + 1;
            progress.report(
                Phase::Slicing,
                done,
                total,
                self.bands.rendering(done, total),
                format!("Rendered slice {}/{}", done, total),
            );
        }
        Ok(())
    }

    /// Read persisted slices back and upload them in ascending order
    async fn upload_all(
        &self,
        job: &ExportJob,
        layout: &SliceLayout,
        progress: &ProgressReporter,
    ) -> Result<()> {
        let artifacts = self.store.list_by_job(&job.id).await?;
        let total = layout.slice_count;
        if artifacts.len() != total {
            return Err(StoreError::Incomplete {
                expected: total,
                found: artifacts.len(),
            }
            .into());
        }

        progress.report(
            Phase::Uploading,
            0,
            total,
            self.bands.uploading(0, total),
            format!("Uploading {} slices", total),
        );

        for (i, artifact) in artifacts.iter().enumerate() {
            let (_, payload) =
                decode_data_url(&artifact.data_url).map_err(|e| StoreError::Corrupt {
                    record: format!("{}/{}", artifact.export_id, artifact.id),
                    reason: e.to_string(),
                })?;
            self.merge
                .upload_slice(&job.id, artifact.slice_index, payload)
                .await?;

            progress.report(
                Phase::Uploading,
                i + 1,
                total,
                self.bands.uploading(i + 1, total),
                format!("Uploaded slice {}/{}", i + 1, total),
            );
        }
        Ok(())
    }

    async fn merge_all(
        &self,
        job: &ExportJob,
        layout: &SliceLayout,
        progress: &ProgressReporter,
    ) -> Result<MergeResult> {
        let total = layout.slice_count;
        let bands = self.bands;
        let on_progress = |service_percentage: u8| {
            progress.report(
                Phase::Merging,
                total,
                total,
                bands.merging(service_percentage),
                format!("Merging slices ({}%)", service_percentage),
            );
        };

        let result = self.merge.merge(&job.id, total, &on_progress).await?;
        Ok(result)
    }

    /// Tag a stage's error and record its duration
    async fn timed<T>(
        &self,
        stage: Stage,
        fut: impl Future<Output = Result<T>>,
    ) -> Result<T> {
        let start = Instant::now();
        let result = fut.await.map_err(|e| e.in_stage(stage));
        histogram!("lineage_export_stage_duration_seconds", "stage" => stage.as_str())
            .record(start.elapsed());
        result
    }

    /// Best-effort removal of a failed job's slices
    async fn discard(&self, export_id: &str) {
        match self.store.clear(export_id).await {
            Ok(()) => info!("Cleared persisted slices of failed export {}", export_id),
            Err(e) => warn!(
                "Failed to clear persisted slices of {}: {}",
                export_id, e
            ),
        }
    }

    fn transition(&self, job: &ExportJob, state: CoordinatorState) {
        info!("Export {} -> {:?}", job.id, state);
    }
}
