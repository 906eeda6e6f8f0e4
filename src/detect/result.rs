use serde::{Deserialize, Serialize};

/// Axis-aligned box in corner form.
///
/// Coordinates are in whatever space the producer documents: model-input
/// pixels after decode, original-frame pixels in a `DetectionResult`.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct BoundingBox {
    pub x_min: f32,
    pub y_min: f32,
    pub x_max: f32,
    pub y_max: f32,
}

impl BoundingBox {
    pub fn new(x_min: f32, y_min: f32, x_max: f32, y_max: f32) -> Self {
        Self {
            x_min,
            y_min,
            x_max,
            y_max,
        }
    }

    /// Converts a center-form box `(cx, cy, w, h)` to corner form.
    pub fn from_center(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        let half_w = w / 2.0;
        let half_h = h / 2.0;
        Self::new(cx - half_w, cy - half_h, cx + half_w, cy + half_h)
    }

    /// Finite and strictly positive in both extents.
    pub fn is_valid(&self) -> bool {
        [self.x_min, self.y_min, self.x_max, self.y_max]
            .iter()
            .all(|v| v.is_finite())
            && self.x_min < self.x_max
            && self.y_min < self.y_max
    }

    pub fn width(&self) -> f32 {
        self.x_max - self.x_min
    }

    pub fn height(&self) -> f32 {
        self.y_max - self.y_min
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    /// Intersection over union. Zero for disjoint or touching boxes.
    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter_w = self.x_max.min(other.x_max) - self.x_min.max(other.x_min);
        let inter_h = self.y_max.min(other.y_max) - self.y_min.max(other.y_min);
        if inter_w <= 0.0 || inter_h <= 0.0 {
            return 0.0;
        }

        let inter_area = inter_w * inter_h;
        let union = self.area() + other.area() - inter_area;
        if union > 0.0 {
            inter_area / union
        } else {
            0.0
        }
    }

    pub fn scaled(&self, sx: f32, sy: f32) -> Self {
        Self::new(
            self.x_min * sx,
            self.y_min * sy,
            self.x_max * sx,
            self.y_max * sy,
        )
    }

    /// Clamps into `[0, width] x [0, height]`.
    pub fn clamped(&self, width: f32, height: f32) -> Self {
        Self::new(
            self.x_min.clamp(0.0, width),
            self.y_min.clamp(0.0, height),
            self.x_max.clamp(0.0, width),
            self.y_max.clamp(0.0, height),
        )
    }

    /// Corners rounded to whole pixels, for display.
    pub fn rounded(&self) -> [i64; 4] {
        [
            self.x_min.round() as i64,
            self.y_min.round() as i64,
            self.x_max.round() as i64,
            self.y_max.round() as i64,
        ]
    }
}

/// A decoded detection before suppression.
///
/// `index` is the position of the detection in the raw model output and
/// breaks confidence ties during suppression.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct DetectionCandidate {
    pub index: usize,
    pub class_id: u32,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl DetectionCandidate {
    /// Same candidate with its box replaced.
    pub fn with_bbox(self, bbox: BoundingBox) -> Self {
        Self { bbox, ..self }
    }
}

/// Final detection in original-frame pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct DetectionResult {
    pub class_id: u32,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn approx(a: f32, b: f32) -> bool {
        (a - b).abs() < 1e-6
    }

    #[test]
    fn iou_of_partially_overlapping_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(5.0, 5.0, 15.0, 15.0);
        assert!(approx(a.iou(&b), 25.0 / 175.0));
        assert!(approx(b.iou(&a), 25.0 / 175.0));
    }

    #[test]
    fn iou_of_disjoint_and_identical_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let far = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        let touching = BoundingBox::new(10.0, 0.0, 20.0, 10.0);
        assert_eq!(a.iou(&far), 0.0);
        assert_eq!(a.iou(&touching), 0.0);
        assert_eq!(a.iou(&a), 1.0);
    }

    #[test]
    fn center_form_converts_to_corners() {
        let bbox = BoundingBox::from_center(0.5, 0.5, 0.2, 0.4);
        assert_eq!(bbox, BoundingBox::new(0.4, 0.3, 0.6, 0.7));
    }

    #[test]
    fn degenerate_boxes_are_invalid() {
        assert!(BoundingBox::new(0.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!BoundingBox::new(1.0, 0.0, 1.0, 1.0).is_valid());
        assert!(!BoundingBox::new(0.0, 2.0, 1.0, 1.0).is_valid());
        assert!(!BoundingBox::new(0.0, 0.0, f32::NAN, 1.0).is_valid());
    }

    #[test]
    fn scaling_uses_independent_axes() {
        let bbox = BoundingBox::new(100.0, 100.0, 300.0, 300.0).scaled(2.0, 1.125);
        assert_eq!(bbox, BoundingBox::new(200.0, 112.5, 600.0, 337.5));
    }
}
