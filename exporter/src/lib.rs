//! Lineage Export Library
//!
//! Exports very wide family-tree documents to a single image. Small documents
//! are captured in one shot; oversized ones go through a slice, persist,
//! upload and merge pipeline backed by a remote merge service.

pub mod config;
pub mod debounce;
pub mod document;
pub mod download;
pub mod error;
pub mod export;
pub mod merge;
pub mod progress;
pub mod raster;
pub mod slicer;
pub mod store;

// Re-export commonly used types
pub use config::ExportConfig;
pub use document::Document;
pub use error::{ErrorKind, ExportError, Stage};
pub use export::{CleanupTasks, ExportOutcome, ExportPath, Exporter};
pub use merge::{HttpMergeClient, MergeService};
pub use progress::{Phase, ProgressEvent, ProgressSink};
pub use raster::{RasterEngine, SceneRasterizer};
pub use store::{FsSliceStore, SliceStore};
