//! Off-screen render containers
//!
//! A container isolates a rectangular window of the document: it holds a deep
//! copy of the scene shifted so the window origin lands on (0, 0), has an
//! explicit size and clips everything outside it. Containers are attached to
//! the owning [`Document`] while they are being captured and detached again
//! when the [`AttachedContainer`] guard is dropped.

use std::ops::Deref;

use super::{Document, Rgba, Scene};

/// Isolated, explicitly sized render target
#[derive(Debug, Clone, PartialEq)]
pub struct OffscreenContainer {
    pub width: u32,
    pub height: u32,
    pub background: Rgba,
    /// Shifted copy of the source scene; anything outside
    /// `[0, width) x [0, height)` is clipped
    pub content: Scene,
}

impl OffscreenContainer {
    /// Build a container showing the window at `(x, y)` of `source`
    pub fn window(
        source: &Scene,
        x: u32,
        y: u32,
        width: u32,
        height: u32,
        background: Rgba,
    ) -> Self {
        Self {
            width,
            height,
            background,
            content: source.translated(-(x as i64), -(y as i64)),
        }
    }
}

/// A container currently attached to a document
///
/// Dropping the guard detaches the container, on success and failure alike.
#[derive(Debug)]
pub struct AttachedContainer<'a> {
    document: &'a Document,
    id: u64,
    container: OffscreenContainer,
}

impl<'a> AttachedContainer<'a> {
    pub(super) fn new(document: &'a Document, id: u64, container: OffscreenContainer) -> Self {
        Self {
            document,
            id,
            container,
        }
    }

    pub fn id(&self) -> u64 {
        self.id
    }
}

impl Deref for AttachedContainer<'_> {
    type Target = OffscreenContainer;

    fn deref(&self) -> &Self::Target {
        &self.container
    }
}

impl Drop for AttachedContainer<'_> {
    fn drop(&mut self) {
        self.document.detach(self.id);
    }
}
