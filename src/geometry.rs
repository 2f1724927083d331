//! Axis-aligned boxes and Intersection-over-Union

use serde::{Deserialize, Serialize};

/// Unions smaller than this are treated as empty
pub const UNION_EPSILON: f64 = 1e-7;

/// Axis-aligned box in absolute pixel coordinates, `(x, y)` is the top-left corner
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize, Deserialize)]
pub struct BBox {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl BBox {
    pub fn new(x: f64, y: f64, width: f64, height: f64) -> Self {
        Self {
            x,
            y,
            width,
            height,
        }
    }

    /// Build a box from a COCO `bbox` array `[x, y, width, height]`
    pub fn from_xywh(bbox: [f64; 4]) -> Self {
        Self::new(bbox[0], bbox[1], bbox[2], bbox[3])
    }

    /// Denormalize a YOLO-style centre box against the image size
    pub fn from_normalized_center(
        cx: f64,
        cy: f64,
        w: f64,
        h: f64,
        image_width: u32,
        image_height: u32,
    ) -> Self {
        let iw = image_width as f64;
        let ih = image_height as f64;
        Self {
            x: (cx - w / 2.0) * iw,
            y: (cy - h / 2.0) * ih,
            width: w * iw,
            height: h * ih,
        }
    }

    pub fn to_xywh(&self) -> [f64; 4] {
        [self.x, self.y, self.width, self.height]
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// Pixel area; negative extents count as zero
    pub fn area(&self) -> f64 {
        self.width.max(0.0) * self.height.max(0.0)
    }

    pub fn is_finite(&self) -> bool {
        self.x.is_finite()
            && self.y.is_finite()
            && self.width.is_finite()
            && self.height.is_finite()
    }

    pub fn iou(&self, other: &Self) -> f64 {
        iou(self, other)
    }
}

/// Intersection-over-Union of two boxes, always within `[0, 1]`.
///
/// Boxes that only share an edge or a corner do not overlap. A box with a
/// non-finite coordinate overlaps nothing.
pub fn iou(a: &BBox, b: &BBox) -> f64 {
    if !a.is_finite() || !b.is_finite() {
        return 0.0;
    }

    let x_left = a.x.max(b.x);
    let y_top = a.y.max(b.y);
    let x_right = a.right().min(b.right());
    let y_bottom = a.bottom().min(b.bottom());

    if x_right <= x_left || y_bottom <= y_top {
        return 0.0;
    }

    let intersection = (x_right - x_left) * (y_bottom - y_top);
    let union = a.area() + b.area() - intersection;
    if union < UNION_EPSILON {
        return 0.0;
    }

    (intersection / union).min(1.0)
}
