//! Tile geometry for sliced exports

use serde::{Deserialize, Serialize};

use crate::config::SliceSettings;

/// One tile of a sliced export, in content coordinates
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SliceGeometry {
    pub index: usize,
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
    pub is_last_slice: bool,
}

impl SliceGeometry {
    /// Exclusive right edge
    pub fn right(&self) -> u32 {
        self.x + self.width
    }
}

/// Full tiling of a region
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SliceLayout {
    pub total_width: u32,
    pub total_height: u32,
    pub slice_count: usize,
    pub slices: Vec<SliceGeometry>,
}

impl SliceLayout {
    pub fn is_empty(&self) -> bool {
        self.slices.is_empty()
    }
}

/// Tile `[0, total_width)` into overlapping full-height slices
///
/// Each slice starts `stride` pixels after the previous one and spans
/// `min(slice_width, total_width - x)`. The slice that reaches the right edge
/// is the last one, so `x + width == total_width` holds for it.
pub fn compute_geometry(
    total_width: u32,
    total_height: u32,
    settings: SliceSettings,
) -> SliceLayout {
    let mut slices = Vec::new();
    let mut x = 0u32;

    while x < total_width {
        let width = settings.slice_width().min(total_width - x);
        let is_last_slice = x + width >= total_width;

        slices.push(SliceGeometry {
            index: slices.len(),
            x,
            y: 0,
            width,
            height: total_height,
            is_last_slice,
        });

        if is_last_slice {
            break;
        }
        x += settings.stride();
    }

    SliceLayout {
        total_width,
        total_height,
        slice_count: slices.len(),
        slices,
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn settings(slice_width: u32, overlap_width: u32) -> SliceSettings {
        SliceSettings::new(slice_width, overlap_width).unwrap()
    }

    fn assert_covers(layout: &SliceLayout, overlap: u32) {
        let slices = &layout.slices;
        assert_eq!(slices[0].x, 0);
        for pair in slices.windows(2) {
            assert!(pair[1].x > pair[0].x, "origins must increase");
            // neighbours share exactly the overlap strip
            assert_eq!(pair[0].right() - pair[1].x, overlap);
            assert!(!pair[0].is_last_slice);
        }
        let last = slices.last().unwrap();
        assert!(last.is_last_slice);
        assert_eq!(last.right(), layout.total_width);
        assert_eq!(layout.slice_count, slices.len());
    }

    #[test]
    fn test_default_settings_wide_region() {
        let layout = compute_geometry(6100, 900, settings(2000, 20));
        let xs: Vec<u32> = layout.slices.iter().map(|s| s.x).collect();
        assert_eq!(xs, vec![0, 1980, 3960, 5940]);
        assert_eq!(layout.slices[3].width, 160);
        assert!(layout.slices.iter().all(|s| s.height == 900 && s.y == 0));
        assert_covers(&layout, 20);
    }

    #[test]
    fn test_coverage_across_many_widths() {
        for &(slice, overlap) in &[(2000, 20), (100, 1), (7, 3), (5, 0), (1000, 999)] {
            let s = settings(slice, overlap);
            for total in (1..3000).step_by(37).chain([slice, slice + 1, 2 * slice]) {
                let layout = compute_geometry(total, 10, s);
                assert_covers(&layout, overlap);
                for (i, g) in layout.slices.iter().enumerate() {
                    assert_eq!(g.index, i);
                    assert!(g.width <= slice && g.width > 0);
                }
            }
        }
    }

    #[test]
    fn test_narrow_region_is_single_slice() {
        for total in [1, 500, 1999, 2000] {
            let layout = compute_geometry(total, 50, settings(2000, 20));
            assert_eq!(layout.slice_count, 1);
            assert_eq!(layout.slices[0].width, total);
            assert!(layout.slices[0].is_last_slice);
        }
    }

    #[test]
    fn test_zero_width_is_empty() {
        let layout = compute_geometry(0, 100, settings(2000, 20));
        assert!(layout.is_empty());
        assert_eq!(layout.slice_count, 0);
    }

    #[test]
    fn test_geometry_is_pure() {
        let s = settings(2000, 20);
        assert_eq!(compute_geometry(12345, 700, s), compute_geometry(12345, 700, s));
    }

    #[test]
    fn test_geometry_serializes_camel_case() {
        let layout = compute_geometry(10, 10, settings(20, 2));
        let json = serde_json::to_value(layout.slices[0]).unwrap();
        assert_eq!(json["isLastSlice"], true);
    }
}
