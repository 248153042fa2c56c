//! Normalized box geometry
//!
//! Detector and tracker output enters the crate through [`BBox::from_corners`]
//! and leaves pixel space through [`BBox::clip`]. Association, overlays and
//! cropping all work on this one type in between.

use serde::{Deserialize, Serialize};

/// Axis-aligned box in frame coordinates, corner-normalized
/// (`x1 <= x2`, `y1 <= y2`).
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct BBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

/// Integer pixel rectangle inside frame bounds, produced by [`BBox::clip`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PixelRect {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

impl BBox {
    /// Build a box from wire corners.
    ///
    /// Corners may arrive in any order; they are swapped into normal form.
    /// Non-finite coordinates are rejected.
    pub fn from_corners(x1: f32, y1: f32, x2: f32, y2: f32) -> Option<Self> {
        if !(x1.is_finite() && y1.is_finite() && x2.is_finite() && y2.is_finite()) {
            return None;
        }
        Some(Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        })
    }

    /// Center point of the box.
    pub fn centroid(&self) -> (f32, f32) {
        ((self.x1 + self.x2) / 2.0, (self.y1 + self.y2) / 2.0)
    }

    /// Whether a point lies inside the box, edges inclusive.
    pub fn contains(&self, x: f32, y: f32) -> bool {
        x >= self.x1 && x <= self.x2 && y >= self.y1 && y <= self.y2
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width() * self.height()
    }

    /// Clip to a frame of the given pixel dimensions and round down to a
    /// pixel rectangle. Returns `None` when the clipped region is empty.
    pub fn clip(&self, frame_width: u32, frame_height: u32) -> Option<PixelRect> {
        if frame_width == 0 || frame_height == 0 {
            return None;
        }
        let max_x = (frame_width - 1) as f32;
        let max_y = (frame_height - 1) as f32;
        let x1 = self.x1.clamp(0.0, max_x) as u32;
        let y1 = self.y1.clamp(0.0, max_y) as u32;
        let x2 = self.x2.clamp(0.0, max_x) as u32;
        let y2 = self.y2.clamp(0.0, max_y) as u32;
        if x2 <= x1 || y2 <= y1 {
            return None;
        }
        Some(PixelRect {
            x: x1,
            y: y1,
            width: x2 - x1,
            height: y2 - y1,
        })
    }
}
