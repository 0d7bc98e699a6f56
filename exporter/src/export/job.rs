//! Export job identity

use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::document::Rgba;

/// Length of the random suffix of an export id
const ID_SUFFIX_LEN: usize = 9;

/// One end-to-end sliced export request
#[derive(Debug, Clone, PartialEq)]
pub struct ExportJob {
    pub id: String,
    /// Padded region width
    pub width: u32,
    /// Padded region height
    pub height: u32,
    pub background: Rgba,
    pub created_at: DateTime<Utc>,
}

impl ExportJob {
    pub fn new(width: u32, height: u32, background: Rgba) -> Self {
        let created_at = Utc::now();
        Self {
            id: generate_export_id(created_at),
            width,
            height,
            background,
            created_at,
        }
    }
}

/// `export_<unix millis>_<9 random lowercase alphanumerics>`
pub fn generate_export_id(at: DateTime<Utc>) -> String {
    let random = Uuid::new_v4().simple().to_string();
    format!(
        "export_{}_{}",
        at.timestamp_millis(),
        &random[..ID_SUFFIX_LEN]
    )
}
