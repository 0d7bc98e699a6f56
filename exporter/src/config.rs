//! Export configuration
//!
//! Configuration is loaded from environment variables on top of defaults and is
//! treated as an immutable value: the `with_*` helpers return an updated copy
//! instead of mutating shared state.

use std::env;
use std::path::PathBuf;
use std::time::Duration;

use thiserror::Error;

use crate::document::Rgba;

/// Invalid configuration values, rejected before any job starts
#[derive(Debug, Clone, PartialEq, Error)]
pub enum ConfigError {
    #[error("slice width {slice_width} must be greater than overlap width {overlap_width}")]
    SliceOverlap { slice_width: u32, overlap_width: u32 },

    #[error("max width must be greater than zero")]
    MaxWidth,

    #[error("render weight must be at most 100, got {0}")]
    RenderWeight(u8),

    #[error("upload share must be within [0, 1], got {0}")]
    UploadShare(f64),

    #[error("pixel ratio must be a positive number, got {0}")]
    PixelRatio(f32),

    #[error("invalid background color: {0}")]
    Background(String),
}

/// Top-level export configuration
#[derive(Debug, Clone, Default)]
pub struct ExportConfig {
    /// Fast/slow path threshold and tile geometry
    pub slicing: SlicingConfig,
    /// Raster engine options
    pub capture: CaptureConfig,
    /// Progress weighting between stages
    pub progress: ProgressWeights,
    /// Where finished images land
    pub output: OutputConfig,
    /// Local slice persistence
    pub store: StoreConfig,
    /// Remote merge service
    pub merge: MergeServiceConfig,
}

/// Slicing-related configuration
#[derive(Debug, Clone, PartialEq)]
pub struct SlicingConfig {
    /// Padded widths above this take the sliced path
    pub max_width: u32,
    /// Width of each tile
    pub slice_width: u32,
    /// Strip shared by neighbouring tiles
    pub overlap_width: u32,
    /// Margin added to the measured extent on both axes
    pub padding: u32,
}

/// Capture-related configuration
#[derive(Debug, Clone, PartialEq)]
pub struct CaptureConfig {
    /// Used when the caller supplies no background
    pub background_color: String,
    /// Device pixel ratio passed to the raster engine
    pub pixel_ratio: f32,
    /// Largest canvas side the default rasterizer accepts
    pub max_canvas_dimension: u32,
}

/// Overall-progress split between rendering, uploading and merging
///
/// Rendering covers `0..render_weight`; the remainder is divided between
/// uploading and merging according to `upload_share`.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressWeights {
    pub render_weight: u8,
    pub upload_share: f64,
}

/// Output-related configuration
#[derive(Debug, Clone, PartialEq)]
pub struct OutputConfig {
    /// Directory receiving downloaded images
    pub output_dir: PathBuf,
    /// Leading part of every generated file name
    pub document_title: String,
}

/// Slice store configuration
#[derive(Debug, Clone, PartialEq)]
pub struct StoreConfig {
    /// Root directory for persisted slices
    pub store_dir: PathBuf,
    /// Delay before a finished job's slices are removed
    pub cleanup_delay: Duration,
    /// Soft limit used by usage monitoring
    pub max_size_mb: f64,
}

/// Merge service configuration
#[derive(Debug, Clone, PartialEq)]
pub struct MergeServiceConfig {
    /// Base URL of the merge service
    pub base_url: String,
    /// Interval between merge status polls
    pub poll_interval: Duration,
    /// Upper bound for the whole merge step
    pub merge_timeout: Duration,
    /// Per-request timeout
    pub request_timeout: Duration,
}

/// Validated tile parameters
///
/// Construction enforces `slice_width > overlap_width`, so the tiling loop
/// always advances.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SliceSettings {
    slice_width: u32,
    overlap_width: u32,
}

impl SliceSettings {
    pub fn new(slice_width: u32, overlap_width: u32) -> Result<Self, ConfigError> {
        if slice_width == 0 || slice_width <= overlap_width {
            return Err(ConfigError::SliceOverlap {
                slice_width,
                overlap_width,
            });
        }
        Ok(Self {
            slice_width,
            overlap_width,
        })
    }

    pub fn slice_width(&self) -> u32 {
        self.slice_width
    }

    pub fn overlap_width(&self) -> u32 {
        self.overlap_width
    }

    /// Distance between the origins of consecutive tiles
    pub fn stride(&self) -> u32 {
        self.slice_width - self.overlap_width
    }
}

impl Default for SlicingConfig {
    fn default() -> Self {
        Self {
            max_width: 5000,
            slice_width: 2000,
            overlap_width: 20,
            padding: 100,
        }
    }
}

impl Default for CaptureConfig {
    fn default() -> Self {
        Self {
            background_color: "#f9fafb".to_string(),
            pixel_ratio: 1.0,
            max_canvas_dimension: 16384,
        }
    }
}

impl Default for ProgressWeights {
    fn default() -> Self {
        Self {
            render_weight: 30,
            upload_share: 0.5,
        }
    }
}

impl Default for OutputConfig {
    fn default() -> Self {
        Self {
            output_dir: PathBuf::from("exports"),
            document_title: "family-tree-export".to_string(),
        }
    }
}

impl Default for StoreConfig {
    fn default() -> Self {
        Self {
            store_dir: env::temp_dir().join("lineage-export").join("slices"),
            cleanup_delay: Duration::from_secs(5),
            max_size_mb: 100.0,
        }
    }
}

impl Default for MergeServiceConfig {
    fn default() -> Self {
        Self {
            base_url: "http://localhost:8090".to_string(),
            poll_interval: Duration::from_millis(200),
            merge_timeout: Duration::from_secs(120),
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl SlicingConfig {
    /// Tile parameters, validated
    pub fn settings(&self) -> Result<SliceSettings, ConfigError> {
        SliceSettings::new(self.slice_width, self.overlap_width)
    }
}

impl ExportConfig {
    /// Load configuration from environment variables
    pub fn from_env() -> Self {
        let mut config = Self::default();

        // Slicing config
        if let Ok(val) = env::var("EXPORT_MAX_WIDTH")
            && let Ok(v) = val.parse()
        {
            config.slicing.max_width = v;
        }
        if let Ok(val) = env::var("EXPORT_SLICE_WIDTH")
            && let Ok(v) = val.parse()
        {
            config.slicing.slice_width = v;
        }
        if let Ok(val) = env::var("EXPORT_OVERLAP_WIDTH")
            && let Ok(v) = val.parse()
        {
            config.slicing.overlap_width = v;
        }
        if let Ok(val) = env::var("EXPORT_PADDING")
            && let Ok(v) = val.parse()
        {
            config.slicing.padding = v;
        }

        // Progress weights
        if let Ok(val) = env::var("EXPORT_RENDER_WEIGHT")
            && let Ok(v) = val.parse()
        {
            config.progress.render_weight = v;
        }
        if let Ok(val) = env::var("EXPORT_UPLOAD_SHARE")
            && let Ok(v) = val.parse()
        {
            config.progress.upload_share = v;
        }

        // Capture config
        if let Ok(val) = env::var("EXPORT_PIXEL_RATIO")
            && let Ok(v) = val.parse()
        {
            config.capture.pixel_ratio = v;
        }
        if let Ok(color) = env::var("EXPORT_BACKGROUND")
            && !color.is_empty()
        {
            config.capture.background_color = color;
        }

        // Output config
        if let Ok(title) = env::var("EXPORT_TITLE")
            && !title.is_empty()
        {
            config.output.document_title = title;
        }
        if let Ok(dir) = env::var("EXPORT_OUTPUT_DIR") {
            config.output.output_dir = PathBuf::from(dir);
        }

        // Store config
        if let Ok(dir) = env::var("EXPORT_STORE_DIR") {
            config.store.store_dir = PathBuf::from(dir);
        }
        if let Ok(val) = env::var("EXPORT_CLEANUP_DELAY_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.store.cleanup_delay = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("EXPORT_STORE_MAX_MB")
            && let Ok(mb) = val.parse()
        {
            config.store.max_size_mb = mb;
        }

        // Merge service config
        if let Ok(url) = env::var("MERGE_SERVICE_URL")
            && !url.is_empty()
        {
            config.merge.base_url = url;
        }
        if let Ok(val) = env::var("MERGE_POLL_INTERVAL_MS")
            && let Ok(ms) = val.parse::<u64>()
        {
            config.merge.poll_interval = Duration::from_millis(ms);
        }
        if let Ok(val) = env::var("MERGE_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.merge.merge_timeout = Duration::from_secs(secs);
        }
        if let Ok(val) = env::var("MERGE_REQUEST_TIMEOUT_SECS")
            && let Ok(secs) = val.parse::<u64>()
        {
            config.merge.request_timeout = Duration::from_secs(secs);
        }

        config
    }

    /// Check every invariant the pipeline relies on
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.slicing.max_width == 0 {
            return Err(ConfigError::MaxWidth);
        }
        self.slicing.settings()?;
        if self.progress.render_weight > 100 {
            return Err(ConfigError::RenderWeight(self.progress.render_weight));
        }
        if !(0.0..=1.0).contains(&self.progress.upload_share) {
            return Err(ConfigError::UploadShare(self.progress.upload_share));
        }
        if !(self.capture.pixel_ratio.is_finite() && self.capture.pixel_ratio > 0.0) {
            return Err(ConfigError::PixelRatio(self.capture.pixel_ratio));
        }
        Rgba::parse(&self.capture.background_color)
            .map_err(|e| ConfigError::Background(e.to_string()))?;
        Ok(())
    }

    pub fn with_slicing(self, slicing: SlicingConfig) -> Self {
        Self { slicing, ..self }
    }

    pub fn with_capture(self, capture: CaptureConfig) -> Self {
        Self { capture, ..self }
    }

    pub fn with_progress(self, progress: ProgressWeights) -> Self {
        Self { progress, ..self }
    }

    pub fn with_output(self, output: OutputConfig) -> Self {
        Self { output, ..self }
    }

    pub fn with_store(self, store: StoreConfig) -> Self {
        Self { store, ..self }
    }

    pub fn with_merge(self, merge: MergeServiceConfig) -> Self {
        Self { merge, ..self }
    }
}
