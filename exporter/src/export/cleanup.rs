//! Deferred slice cleanups that must finish before the process exits

use tokio::task::JoinHandle;
use tracing::{debug, warn};

use super::exporter::ExportOutcome;

/// Pending cleanup tasks of finished sliced exports
///
/// A cleanup sleeps for the configured delay before clearing slices, so a
/// process exiting inside that window would drop it. Track every outcome here
/// and call [`CleanupTasks::wait_all`] before shutting down.
#[derive(Debug, Default)]
pub struct CleanupTasks {
    handles: Vec<JoinHandle<()>>,
}

impl CleanupTasks {
    pub fn new() -> Self {
        Self::default()
    }

    /// Take over the outcome's cleanup handle, if it has one
    pub fn track(&mut self, outcome: &mut ExportOutcome) {
        self.handles.retain(|handle| !handle.is_finished());
        if let Some(handle) = outcome.cleanup.take() {
            self.handles.push(handle);
        }
    }

    pub fn len(&self) -> usize {
        self.handles.len()
    }

    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }

    /// Await every tracked cleanup; returns how many were awaited
    pub async fn wait_all(&mut self) -> usize {
        let handles = std::mem::take(&mut self.handles);
        let count = handles.len();
        for handle in handles {
            if let Err(e) = handle.await {
                warn!("Slice cleanup task failed: {}", e);
            }
        }
        debug!("Waited for {} slice cleanups", count);
        count
    }
}
