//! Progress reporting for export jobs
//!
//! Overall progress is a single percentage across three bands: rendering,
//! uploading and merging. The reporter keeps it monotonic and reserves 100
//! for the terminal `Completed` event.

use std::sync::Arc;
use std::sync::atomic::{AtomicU8, Ordering};

use serde::Serialize;
use tracing::trace;

use crate::config::ProgressWeights;
use crate::merge::MergeResult;

/// Highest percentage a non-terminal event may carry
const MAX_IN_FLIGHT: u8 = 99;

/// Pipeline phase an event belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum Phase {
    Slicing,
    Uploading,
    Merging,
    Completed,
}

/// One progress notification
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct ProgressEvent {
    pub phase: Phase,
    pub current: usize,
    pub total: usize,
    pub percentage: u8,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub result: Option<MergeResult>,
}

/// Callback receiving progress events, invoked synchronously
pub type ProgressSink = Arc<dyn Fn(&ProgressEvent) + Send + Sync>;

/// Delivers progress events for one job
pub struct ProgressReporter {
    sink: Option<ProgressSink>,
    last: AtomicU8,
}

impl ProgressReporter {
    pub fn new(sink: Option<ProgressSink>) -> Self {
        Self {
            sink,
            last: AtomicU8::new(0),
        }
    }

    /// Reporter that drops every event
    pub fn silent() -> Self {
        Self::new(None)
    }

    /// Emit a non-terminal event
    ///
    /// The percentage is raised to the last reported value and capped at 99.
    pub fn report(
        &self,
        phase: Phase,
        current: usize,
        total: usize,
        percentage: u8,
        message: impl Into<String>,
    ) {
        let capped = percentage.min(MAX_IN_FLIGHT);
        let previous = self.last.fetch_max(capped, Ordering::SeqCst);
        self.emit(ProgressEvent {
            phase,
            current,
            total,
            percentage: capped.max(previous),
            message: message.into(),
            result: None,
        });
    }

    /// Emit the terminal event at 100%
    pub fn complete(&self, total: usize, message: impl Into<String>, result: Option<MergeResult>) {
        self.last.store(100, Ordering::SeqCst);
        self.emit(ProgressEvent {
            phase: Phase::Completed,
            current: total,
            total,
            percentage: 100,
            message: message.into(),
            result,
        });
    }

    pub fn last_percentage(&self) -> u8 {
        self.last.load(Ordering::SeqCst)
    }

    fn emit(&self, event: ProgressEvent) {
        trace!(
            "Progress {:?} {}/{} {}%",
            event.phase, event.current, event.total, event.percentage
        );
        if let Some(sink) = &self.sink {
            sink(&event);
        }
    }
}

/// Maps per-stage completion onto overall percentages
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct ProgressBands {
    render_end: f64,
    upload_end: f64,
}

impl From<ProgressWeights> for ProgressBands {
    fn from(weights: ProgressWeights) -> Self {
        let render_end = weights.render_weight.min(100) as f64;
        let upload_end = render_end + (100.0 - render_end) * weights.upload_share.clamp(0.0, 1.0);
        Self {
            render_end,
            upload_end,
        }
    }
}

impl ProgressBands {
    /// Overall percentage after `done` of `total` slices were rendered
    pub fn rendering(&self, done: usize, total: usize) -> u8 {
        to_percent(fraction(done, total) * self.render_end)
    }

    /// Overall percentage after `done` of `total` slices were uploaded
    pub fn uploading(&self, done: usize, total: usize) -> u8 {
        to_percent(self.render_end + fraction(done, total) * (self.upload_end - self.render_end))
    }

    /// Overall percentage for a merge service progress value (0-100)
    pub fn merging(&self, service_percentage: u8) -> u8 {
        let f = service_percentage.min(100) as f64 / 100.0;
        to_percent(self.upload_end + f * (100.0 - self.upload_end))
    }

    pub fn render_end(&self) -> u8 {
        to_percent(self.render_end)
    }

    pub fn upload_end(&self) -> u8 {
        to_percent(self.upload_end)
    }
}

fn fraction(done: usize, total: usize) -> f64 {
    if total == 0 {
        return 1.0;
    }
    (done.min(total) as f64) / (total as f64)
}

fn to_percent(v: f64) -> u8 {
    v.round().clamp(0.0, 100.0) as u8
}
