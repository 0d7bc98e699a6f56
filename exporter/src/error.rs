//! Crate-level error type for export jobs

use std::fmt;

use thiserror::Error;

use crate::config::ConfigError;
use crate::download::DownloadError;
use crate::merge::MergeError;
use crate::raster::CaptureError;
use crate::store::StoreError;

/// Result alias for export operations
pub type Result<T> = std::result::Result<T, ExportError>;

/// Pipeline stage an error escaped from
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Stage {
    Measure,
    Capture,
    Rendering,
    Uploading,
    Merging,
    Download,
}

impl Stage {
    pub fn as_str(self) -> &'static str {
        match self {
            Stage::Measure => "measure",
            Stage::Capture => "capture",
            Stage::Rendering => "rendering",
            Stage::Uploading => "uploading",
            Stage::Merging => "merging",
            Stage::Download => "download",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Root cause classification, independent of stage wrapping
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    Config,
    CaptureFailure,
    StorageFailure,
    TransportFailure,
    DownloadFailure,
}

/// Errors surfaced to callers of the exporter
#[derive(Debug, Error)]
pub enum ExportError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("capture failed: {0}")]
    Capture(#[from] CaptureError),

    #[error("storage failure: {0}")]
    Storage(#[from] StoreError),

    #[error("transport failure: {0}")]
    Transport(#[from] MergeError),

    #[error("download failed: {0}")]
    Download(#[from] DownloadError),

    #[error("{stage} stage failed: {source}")]
    Stage {
        stage: Stage,
        #[source]
        source: Box<ExportError>,
    },
}

impl ExportError {
    /// Wrap this error with the stage it escaped from
    pub fn in_stage(self, stage: Stage) -> Self {
        ExportError::Stage {
            stage,
            source: Box::new(self),
        }
    }

    /// Outermost stage recorded on this error, if any
    pub fn stage(&self) -> Option<Stage> {
        match self {
            ExportError::Stage { stage, .. } => Some(*stage),
            _ => None,
        }
    }

    /// Root cause kind, looking through stage wrappers
    pub fn kind(&self) -> ErrorKind {
        match self {
            ExportError::InvalidInput(_) => ErrorKind::InvalidInput,
            ExportError::Config(_) => ErrorKind::Config,
            ExportError::Capture(_) => ErrorKind::CaptureFailure,
            ExportError::Storage(_) => ErrorKind::StorageFailure,
            ExportError::Transport(_) => ErrorKind::TransportFailure,
            ExportError::Download(_) => ErrorKind::DownloadFailure,
            ExportError::Stage { source, .. } => source.kind(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stage_prefix_in_message() {
        let err = ExportError::InvalidInput("empty".into()).in_stage(Stage::Rendering);
        assert_eq!(err.to_string(), "rendering stage failed: invalid input: empty");
        assert_eq!(err.stage(), Some(Stage::Rendering));
        assert_eq!(err.kind(), ErrorKind::InvalidInput);
    }

    #[test]
    fn test_kind_looks_through_nested_stages() {
        let err = ExportError::Capture(CaptureError::Engine("boom".into()))
            .in_stage(Stage::Capture)
            .in_stage(Stage::Rendering);
        assert_eq!(err.kind(), ErrorKind::CaptureFailure);
        assert_eq!(err.stage(), Some(Stage::Rendering));
    }
}
