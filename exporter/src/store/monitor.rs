//! Storage usage monitoring against a soft limit

use tracing::warn;

use super::service::SliceStore;
use super::types::{StorageReport, StorageUsage, round2};

/// Share of the limit above which clearing is recommended
const WARN_RATIO: f64 = 0.8;

/// Check store usage against `max_size_mb`
///
/// A failing store reports zero usage rather than an error.
pub async fn monitor_usage(store: &dyn SliceStore, max_size_mb: f64) -> StorageReport {
    let usage = match store.usage().await {
        Ok(usage) => usage,
        Err(e) => {
            warn!("Failed to read slice store usage: {}", e);
            StorageUsage::default()
        }
    };
    report(usage, max_size_mb)
}

fn report(usage: StorageUsage, max_size_mb: f64) -> StorageReport {
    let usage_percentage = if max_size_mb > 0.0 {
        (usage.total_size_mb / max_size_mb * 100.0).round() as u32
    } else {
        0
    };
    let recommendation = if usage.total_size_mb > max_size_mb * WARN_RATIO {
        "consider clearing exported slices"
    } else {
        "storage space is sufficient"
    };

    StorageReport {
        count: usage.count,
        total_size_mb: round2(usage.total_size_mb),
        is_over_limit: usage.total_size_mb > max_size_mb,
        usage_percentage,
        recommendation: recommendation.to_string(),
    }
}
