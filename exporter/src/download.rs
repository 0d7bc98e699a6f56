//! Saving finished images
//!
//! The download step writes the exported image into an output directory. Files
//! are written under a `.part` name and renamed once complete, so a failed
//! download never leaves a truncated image behind.

use std::io;
use std::path::{Path, PathBuf};

use async_trait::async_trait;
use chrono::Local;
use metrics::counter;
use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};

use crate::raster::{DataUrlError, decode_data_url};

/// Extension used when none can be inferred
pub const DEFAULT_EXTENSION: &str = "png";

const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H.%M.%S";

/// Errors that can occur while saving an image
#[derive(Debug, Error)]
pub enum DownloadError {
    #[error("invalid image data: {0}")]
    InvalidDataUrl(#[from] DataUrlError),

    #[error("IO error: {0}")]
    IoError(#[from] io::Error),

    #[error("HTTP error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("fetching {url} returned {status}")]
    Status { url: String, status: u16 },
}

/// Destination for exported images
#[async_trait]
pub trait DownloadTarget: Send + Sync {
    /// Save an inline `data:` URL
    async fn save_data_url(&self, data_url: &str, file_name: &str)
    -> Result<PathBuf, DownloadError>;

    /// Fetch and save an image by reference
    async fn save_remote(&self, url: &str, file_name: &str) -> Result<PathBuf, DownloadError>;
}

/// Saves images as files in a directory
#[derive(Debug, Clone)]
pub struct FileDownloader {
    output_dir: PathBuf,
    client: reqwest::Client,
}

impl FileDownloader {
    pub fn new(output_dir: impl Into<PathBuf>) -> Self {
        Self::with_client(output_dir, reqwest::Client::new())
    }

    pub fn with_client(output_dir: impl Into<PathBuf>, client: reqwest::Client) -> Self {
        Self {
            output_dir: output_dir.into(),
            client,
        }
    }

    pub fn output_dir(&self) -> &Path {
        &self.output_dir
    }

    async fn write_file(&self, file_name: &str, bytes: &[u8]) -> Result<PathBuf, DownloadError> {
        fs::create_dir_all(&self.output_dir).await?;
        let target = self.output_dir.join(file_name);
        let part = self.output_dir.join(format!("{}.part", file_name));

        let written = match fs::write(&part, bytes).await {
            Ok(()) => fs::rename(&part, &target).await,
            Err(e) => Err(e),
        };
        if let Err(e) = written {
            let _ = fs::remove_file(&part).await;
            return Err(e.into());
        }

        counter!("lineage_export_downloads_total").increment(1);
        info!("Saved {} ({} bytes)", target.display(), bytes.len());
        Ok(target)
    }

    async fn fetch(&self, url: &str) -> Result<Vec<u8>, DownloadError> {
        if url.starts_with("http://") || url.starts_with("https://") {
            let response = self.client.get(url).send().await?;
            let status = response.status();
            if !status.is_success() {
                return Err(DownloadError::Status {
                    url: url.to_string(),
                    status: status.as_u16(),
                });
            }
            return Ok(response.bytes().await?.to_vec());
        }

        let path = url.strip_prefix("file://").unwrap_or(url);
        debug!("Copying merged image from {}", path);
        Ok(fs::read(path).await?)
    }
}

#[async_trait]
impl DownloadTarget for FileDownloader {
    async fn save_data_url(
        &self,
        data_url: &str,
        file_name: &str,
    ) -> Result<PathBuf, DownloadError> {
        let (_, bytes) = decode_data_url(data_url)?;
        self.write_file(file_name, &bytes).await
    }

    async fn save_remote(&self, url: &str, file_name: &str) -> Result<PathBuf, DownloadError> {
        let bytes = self.fetch(url).await?;
        self.write_file(file_name, &bytes).await
    }
}

/// Local time, formatted for file names
pub fn file_timestamp() -> String {
    Local::now().format(TIMESTAMP_FORMAT).to_string()
}

/// `<title>-<timestamp>.<ext>`
pub fn export_file_name(title: &str, extension: &str) -> String {
    format!(
        "{}-{}.{}",
        sanitize_file_component(title),
        file_timestamp(),
        extension
    )
}

/// `<title>-merged-<timestamp>.<ext>`, with the extension taken from the URL
pub fn merged_file_name(title: &str, download_url: &str) -> String {
    format!(
        "{}-merged-{}.{}",
        sanitize_file_component(title),
        file_timestamp(),
        extension_from_url(download_url).unwrap_or_else(|| DEFAULT_EXTENSION.to_string())
    )
}

/// File extension of the last path segment of a URL, lowercased
pub fn extension_from_url(url: &str) -> Option<String> {
    let path = url.split(['?', '#']).next().unwrap_or(url);
    let segment = path.rsplit('/').next()?;
    let (_, ext) = segment.rsplit_once('.')?;
    if ext.is_empty() || ext.len() > 5 || !ext.chars().all(|c| c.is_ascii_alphanumeric()) {
        return None;
    }
    Some(ext.to_ascii_lowercase())
}

fn sanitize_file_component(s: &str) -> String {
    s.chars()
        .map(|c| {
            if c == '/' || c == '\\' || c == ':' || c.is_control() {
                '_'
            } else {
                c
            }
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn temp_dir(name: &str) -> PathBuf {
        std::env::temp_dir().join(format!(
            "lineage_export_test_download_{}_{}",
            name,
            uuid::Uuid::new_v4().simple()
        ))
    }

    #[test]
    fn test_extension_from_url() {
        assert_eq!(
            extension_from_url("https://merge/download/a.JPG?sig=1"),
            Some("jpg".to_string())
        );
        assert_eq!(extension_from_url("https://merge/download/export_1"), None);
        assert_eq!(extension_from_url("https://merge.example.com/"), None);
        assert_eq!(extension_from_url("/tmp/out.webp"), Some("webp".to_string()));
    }

    #[test]
    fn test_file_names() {
        let name = export_file_name("family/tree", "png");
        assert!(name.starts_with("family_tree-"));
        assert!(name.ends_with(".png"));
        assert!(!name.contains(':'));

        let merged = merged_file_name("tree", "https://merge/download/export_1");
        assert!(merged.starts_with("tree-merged-"));
        assert!(merged.ends_with(".png"));
    }

    #[tokio::test]
    async fn test_save_data_url() {
        let dir = temp_dir("data");
        let downloader = FileDownloader::new(&dir);
        let path = downloader
            .save_data_url("data:image/png;base64,iVBORw==", "out.png")
            .await
            .unwrap();

        assert_eq!(path, dir.join("out.png"));
        assert_eq!(std::fs::read(&path).unwrap(), vec![0x89, b'P', b'N', b'G']);
        assert!(!dir.join("out.png.part").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_invalid_data_url_writes_nothing() {
        let dir = temp_dir("invalid");
        let downloader = FileDownloader::new(&dir);
        let err = downloader
            .save_data_url("not-a-data-url", "out.png")
            .await
            .unwrap_err();

        assert!(matches!(err, DownloadError::InvalidDataUrl(_)));
        assert!(!dir.join("out.png").exists());
        let _ = std::fs::remove_dir_all(&dir);
    }

    #[tokio::test]
    async fn test_save_remote_copies_local_file() {
        let dir = temp_dir("remote");
        std::fs::create_dir_all(&dir).unwrap();
        let source = dir.join("merged-source.png");
        std::fs::write(&source, b"merged").unwrap();

        let downloader = FileDownloader::new(dir.join("out"));
        let url = format!("file://{}", source.display());
        let path = downloader.save_remote(&url, "merged.png").await.unwrap();
        assert_eq!(std::fs::read(path).unwrap(), b"merged");

        let missing = downloader
            .save_remote("/definitely/not/here.png", "x.png")
            .await
            .unwrap_err();
        assert!(matches!(missing, DownloadError::IoError(_)));
        let _ = std::fs::remove_dir_all(&dir);
    }
}
