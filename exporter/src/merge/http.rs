//! HTTP client for the remote merge service

use std::time::{Duration, Instant};

use async_trait::async_trait;
use bytes::Bytes;
use metrics::{counter, histogram};
use reqwest::header::CONTENT_TYPE;
use serde::de::DeserializeOwned;
use tracing::{debug, info};

use crate::config::MergeServiceConfig;

use super::service::MergeService;
use super::types::{MergeError, MergeRequest, MergeResult, MergeStatus, UploadReceipt};

/// `MergeService` implementation speaking JSON over HTTP
///
/// Endpoints, relative to the configured base URL:
/// - `POST /api/exports/{id}/slices/{index}` with a PNG body
/// - `POST /api/exports/{id}/merge` to start merging
/// - `GET /api/exports/{id}/merge` to poll merge status
#[derive(Debug, Clone)]
pub struct HttpMergeClient {
    client: reqwest::Client,
    base_url: String,
    poll_interval: Duration,
    merge_timeout: Duration,
}

impl HttpMergeClient {
    pub fn new(config: &MergeServiceConfig) -> Result<Self, MergeError> {
        let client = reqwest::Client::builder()
            .timeout(config.request_timeout)
            .build()?;
        Ok(Self {
            client,
            base_url: config.base_url.trim_end_matches('/').to_string(),
            poll_interval: config.poll_interval,
            merge_timeout: config.merge_timeout,
        })
    }

    pub fn base_url(&self) -> &str {
        &self.base_url
    }

    fn slice_url(&self, export_id: &str, slice_index: usize) -> String {
        format!(
            "{}/api/exports/{}/slices/{}",
            self.base_url, export_id, slice_index
        )
    }

    fn merge_url(&self, export_id: &str) -> String {
        format!("{}/api/exports/{}/merge", self.base_url, export_id)
    }

    async fn poll_until_done(
        &self,
        export_id: &str,
        mut status: MergeStatus,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<MergeResult, MergeError> {
        loop {
            on_progress(status.progress);
            if let Some(result) = finished(status)? {
                return Ok(result);
            }
            tokio::time::sleep(self.poll_interval).await;

            let response = self.client.get(self.merge_url(export_id)).send().await?;
            status = decode(response).await?;
        }
    }
}

#[async_trait]
impl MergeService for HttpMergeClient {
    async fn upload_slice(
        &self,
        export_id: &str,
        slice_index: usize,
        payload: Bytes,
    ) -> Result<UploadReceipt, MergeError> {
        let start = Instant::now();
        let size = payload.len();

        let response = self
            .client
            .post(self.slice_url(export_id, slice_index))
            .header(CONTENT_TYPE, "image/png")
            .body(payload)
            .send()
            .await?;
        let receipt: UploadReceipt = decode(response).await?;
        if !receipt.success {
            return Err(MergeError::Rejected(format!(
                "upload of slice {} was not accepted",
                slice_index
            )));
        }

        counter!("lineage_export_slice_uploads_total").increment(1);
        histogram!("lineage_export_slice_upload_duration_seconds").record(start.elapsed());
        debug!(
            "Uploaded slice {} of {} ({} bytes) as {}",
            slice_index, export_id, size, receipt.slice_id
        );
        Ok(receipt)
    }

    async fn merge(
        &self,
        export_id: &str,
        slice_count: usize,
        on_progress: &(dyn Fn(u8) + Send + Sync),
    ) -> Result<MergeResult, MergeError> {
        let start = Instant::now();
        info!("Requesting merge of {} slices for {}", slice_count, export_id);

        let merged = tokio::time::timeout(self.merge_timeout, async {
            let response = self
                .client
                .post(self.merge_url(export_id))
                .json(&MergeRequest { slice_count })
                .send()
                .await?;
            let status: MergeStatus = decode(response).await?;
            self.poll_until_done(export_id, status, on_progress).await
        })
        .await
        .map_err(|_| MergeError::Timeout(self.merge_timeout))??;

        histogram!("lineage_export_merge_duration_seconds").record(start.elapsed());
        info!(
            "Merge of {} finished in {:?}: {} ({})",
            export_id,
            start.elapsed(),
            merged.download_url,
            merged.file_size
        );
        Ok(merged)
    }
}

/// Decode a JSON body, turning non-2xx statuses into errors
async fn decode<T: DeserializeOwned>(response: reqwest::Response) -> Result<T, MergeError> {
    let status = response.status();
    if !status.is_success() {
        let body = response.text().await.unwrap_or_default();
        return Err(MergeError::Status {
            status: status.as_u16(),
            body,
        });
    }
    let body = response.bytes().await?;
    serde_json::from_slice(&body).map_err(|e| MergeError::Decode(e.to_string()))
}

/// The merge result once the service reports completion
fn finished(status: MergeStatus) -> Result<Option<MergeResult>, MergeError> {
    if let Some(error) = status.error {
        return Err(MergeError::Rejected(error));
    }
    if !status.completed {
        return Ok(None);
    }
    match status.result {
        Some(result) if result.success => Ok(Some(result)),
        Some(_) => Err(MergeError::Rejected("merge reported failure".to_string())),
        None => Err(MergeError::Decode(
            "completed merge status without a result".to_string(),
        )),
    }
}
