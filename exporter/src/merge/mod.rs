//! Upload and merge of sliced exports
//!
//! This module provides:
//! - `MergeService` trait for the remote stitching service
//! - `HttpMergeClient`, the reqwest-based client for it
//! - `UploadMergeCoordinator`, the state machine driving a sliced export

mod coordinator;
mod http;
mod service;
mod types;

pub use coordinator::{CoordinatorState, UploadMergeCoordinator};
pub use http::HttpMergeClient;
pub use service::MergeService;
pub use types::{MergeError, MergeRequest, MergeResult, MergeStatus, UploadReceipt};
