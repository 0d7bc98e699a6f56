//! Slicing of oversized documents
//!
//! This module provides:
//! - `compute_geometry` for overlap-aware tiling of a region
//! - `DomSlicer` for rendering one tile in an isolated off-screen container
//! - `SliceRenderer`, the seam the upload/merge coordinator renders through

mod geometry;
mod render;

pub use geometry::{SliceGeometry, SliceLayout, compute_geometry};
pub use render::{DocumentSlices, DomSlicer, SliceRenderer};
