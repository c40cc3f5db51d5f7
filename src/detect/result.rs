use serde::Serialize;

/// Axis-aligned box in pixel coordinates of the source frame.
#[derive(Clone, Copy, Debug, PartialEq, Serialize)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Self {
        Self {
            x1: x1.min(x2),
            y1: y1.min(y2),
            x2: x1.max(x2),
            y2: y1.max(y2),
        }
    }

    /// Box from center, width and height.
    pub fn from_cxcywh(cx: f32, cy: f32, w: f32, h: f32) -> Self {
        Self::new(cx - w / 2.0, cy - h / 2.0, cx + w / 2.0, cy + h / 2.0)
    }

    pub fn width(&self) -> f32 {
        self.x2 - self.x1
    }

    pub fn height(&self) -> f32 {
        self.y2 - self.y1
    }

    pub fn area(&self) -> f32 {
        self.width().max(0.0) * self.height().max(0.0)
    }

    pub fn intersection_area(&self, other: &BoundingBox) -> f32 {
        let w = (self.x2.min(other.x2) - self.x1.max(other.x1)).max(0.0);
        let h = (self.y2.min(other.y2) - self.y1.max(other.y1)).max(0.0);
        w * h
    }

    pub fn iou(&self, other: &BoundingBox) -> f32 {
        let inter = self.intersection_area(other);
        let union = self.area() + other.area() - inter;
        if union <= 0.0 {
            0.0
        } else {
            inter / union
        }
    }

    /// Clamp into a `width` x `height` frame.
    pub fn clamped(&self, width: u32, height: u32) -> Self {
        let (w, h) = (width as f32, height as f32);
        Self {
            x1: self.x1.clamp(0.0, w),
            y1: self.y1.clamp(0.0, h),
            x2: self.x2.clamp(0.0, w),
            y2: self.y2.clamp(0.0, h),
        }
    }
}

/// One detected object.
#[derive(Clone, Debug, PartialEq, Serialize)]
pub struct Detection {
    pub class_id: usize,
    pub class_name: String,
    pub confidence: f32,
    pub bbox: BoundingBox,
}

impl Detection {
    pub fn new(
        class_id: usize,
        class_name: impl Into<String>,
        confidence: f32,
        bbox: BoundingBox,
    ) -> Self {
        Self {
            class_id,
            class_name: class_name.into(),
            confidence,
            bbox,
        }
    }

    /// Overlay label, e.g. `fire 0.87`.
    pub fn label(&self) -> String {
        format!("{} {:.2}", self.class_name, self.confidence)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn iou_of_identical_and_disjoint_boxes() {
        let a = BoundingBox::new(0.0, 0.0, 10.0, 10.0);
        let b = BoundingBox::new(20.0, 20.0, 30.0, 30.0);
        assert!((a.iou(&a) - 1.0).abs() < 1e-6);
        assert_eq!(a.iou(&b), 0.0);

        let half = BoundingBox::new(5.0, 0.0, 15.0, 10.0);
        assert!((a.iou(&half) - 50.0 / 150.0).abs() < 1e-6);
    }

    #[test]
    fn new_normalizes_corner_order() {
        let b = BoundingBox::new(10.0, 8.0, 2.0, 1.0);
        assert_eq!((b.x1, b.y1, b.x2, b.y2), (2.0, 1.0, 10.0, 8.0));
        let c = BoundingBox::from_cxcywh(5.0, 5.0, 4.0, 2.0).clamped(6, 5);
        assert_eq!((c.x1, c.y1, c.x2, c.y2), (3.0, 4.0, 6.0, 5.0));
    }

    #[test]
    fn label_has_two_decimals() {
        let det = Detection::new(1, "fire", 0.8765, BoundingBox::new(0.0, 0.0, 1.0, 1.0));
        assert_eq!(det.label(), "fire 0.88");
    }
}
