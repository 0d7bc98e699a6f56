//! Durable slice storage
//!
//! This module provides:
//! - `SliceStore` trait for insert-only slice persistence
//! - `FsSliceStore`, a directory-backed implementation
//! - `monitor_usage` for checking usage against a soft limit

mod fs;
mod monitor;
mod service;
mod types;

pub use fs::FsSliceStore;
pub use monitor::monitor_usage;
pub use service::SliceStore;
pub use types::{SliceArtifact, SliceMetadata, StorageReport, StorageUsage, StoreError};

pub(crate) use types::round2;
