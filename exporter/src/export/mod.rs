//! Export orchestration
//!
//! This module provides:
//! - `Exporter`, which selects the direct or sliced path and saves the result
//! - `ExportJob` identity for sliced exports
//! - `SizeCheck` for inspecting a document before exporting it
//! - `CleanupTasks` for waiting on deferred slice cleanups

mod cleanup;
mod exporter;
mod job;
mod size;

pub use cleanup::CleanupTasks;
pub use exporter::{ExportOutcome, ExportPath, Exporter};
pub use job::{ExportJob, generate_export_id};
pub use size::{SizeCheck, needs_slicing};
