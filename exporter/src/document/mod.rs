//! Document model for exportable content
//!
//! This module provides:
//! - `Scene`, the retained display list a layout component produces
//! - `Document`, which owns the root scene and tracks attached off-screen
//!   containers
//! - `OffscreenContainer` for rendering an isolated window of a scene

mod offscreen;
mod types;

use std::path::Path;
use std::sync::Mutex;
use std::sync::atomic::{AtomicU64, Ordering};

use tracing::debug;

pub use offscreen::{AttachedContainer, OffscreenContainer};
pub use types::{Border, DocumentError, Node, NodeKind, Rgba, Scene};

/// An exportable document: a title plus the root scene to capture
#[derive(Debug)]
pub struct Document {
    title: String,
    root: Scene,
    /// Ids of containers currently attached off-screen. Rendering reads the
    /// container itself; this only records what is still attached, so a
    /// leaked container shows up in `attached_count`.
    offscreen: Mutex<Vec<u64>>,
    next_container_id: AtomicU64,
}

impl Document {
    pub fn new(title: impl Into<String>, root: Scene) -> Self {
        Self {
            title: title.into(),
            root,
            offscreen: Mutex::new(Vec::new()),
            next_container_id: AtomicU64::new(1),
        }
    }

    /// Parse a scene from JSON
    pub fn from_json(title: impl Into<String>, json: &str) -> Result<Self, DocumentError> {
        let root: Scene = serde_json::from_str(json)?;
        Ok(Self::new(title, root))
    }

    /// Load a scene file; the file stem becomes the title
    pub async fn load(path: &Path) -> Result<Self, DocumentError> {
        let json = tokio::fs::read_to_string(path).await?;
        let title = path
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or("document")
            .to_string();
        debug!("Loaded scene {:?} ({} bytes)", path, json.len());
        Self::from_json(title, &json)
    }

    pub fn title(&self) -> &str {
        &self.title
    }

    pub fn root(&self) -> &Scene {
        &self.root
    }

    /// Full scrollable content size of the root, not just a visible viewport
    pub fn scroll_size(&self) -> (u32, u32) {
        self.root.extent()
    }

    /// Attach a container off-screen for the lifetime of the returned guard
    pub fn attach_offscreen(&self, container: OffscreenContainer) -> AttachedContainer<'_> {
        let id = self.next_container_id.fetch_add(1, Ordering::Relaxed);
        self.offscreen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push(id);
        debug!(
            "Attached off-screen container {} ({}x{})",
            id, container.width, container.height
        );
        AttachedContainer::new(self, id, container)
    }

    /// Number of containers currently attached
    pub fn attached_count(&self) -> usize {
        self.offscreen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .len()
    }

    fn detach(&self, id: u64) {
        let mut attached = self
            .offscreen
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        attached.retain(|&other| other != id);
        debug!("Detached off-screen container {}", id);
    }
}
