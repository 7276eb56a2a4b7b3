use serde::Serialize;
use thiserror::Error;

use crate::model::VehicleClass;

#[derive(Debug, Error, PartialEq)]
pub enum DetectionError {
    #[error("confidence {0} outside [0, 1]")]
    Confidence(f32),
    #[error("bounding box ({0}, {1}, {2}, {3}) is not normalized")]
    BoundingBox(f32, f32, f32, f32),
}

/// Axis-aligned box in normalized image coordinates (0..=1, origin top-left).
#[derive(Clone, Copy, Debug, Serialize, PartialEq)]
pub struct BoundingBox {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
}

impl BoundingBox {
    pub fn new(x1: f32, y1: f32, x2: f32, y2: f32) -> Result<Self, DetectionError> {
        let in_unit = |v: f32| (0.0..=1.0).contains(&v);
        if ![x1, y1, x2, y2].into_iter().all(in_unit) || x1 > x2 || y1 > y2 {
            return Err(DetectionError::BoundingBox(x1, y1, x2, y2));
        }
        Ok(Self { x1, y1, x2, y2 })
    }

    /// Normalize a pixel-space box against the image it was detected in.
    /// Corners are reordered and clamped so detector jitter at the border
    /// does not reject an otherwise valid detection. Non-finite coordinates
    /// are rejected.
    pub fn from_pixels(x1: f32, y1: f32, x2: f32, y2: f32, width: u32, height: u32) -> Result<Self, DetectionError> {
        if ![x1, y1, x2, y2].iter().all(|v| v.is_finite()) {
            return Err(DetectionError::BoundingBox(x1, y1, x2, y2));
        }
        let w = width.max(1) as f32;
        let h = height.max(1) as f32;
        let nx = |v: f32| (v / w).clamp(0.0, 1.0);
        let ny = |v: f32| (v / h).clamp(0.0, 1.0);
        let (ax, bx) = (nx(x1), nx(x2));
        let (ay, by) = (ny(y1), ny(y2));
        Ok(Self {
            x1: ax.min(bx),
            y1: ay.min(by),
            x2: ax.max(bx),
            y2: ay.max(by),
        })
    }

    /// Pixel rectangle `(x, y, w, h)` in an image of the given size.
    pub fn to_pixels(&self, width: u32, height: u32) -> (u32, u32, u32, u32) {
        let px = |v: f32, extent: u32| ((v * extent as f32).round() as u32).min(extent.saturating_sub(1));
        let x = px(self.x1, width);
        let y = px(self.y1, height);
        let x2 = px(self.x2, width);
        let y2 = px(self.y2, height);
        (x, y, x2.saturating_sub(x), y2.saturating_sub(y))
    }
}

#[derive(Clone, Debug, Serialize, PartialEq)]
pub struct Detection {
    pub class: VehicleClass,
    pub confidence: f32,
    pub bounding_box: BoundingBox,
}

impl Detection {
    pub fn new(class: VehicleClass, confidence: f32, bounding_box: BoundingBox) -> Result<Self, DetectionError> {
        // NaN fails the range check too
        if !(0.0..=1.0).contains(&confidence) {
            return Err(DetectionError::Confidence(confidence));
        }
        Ok(Self { class, confidence, bounding_box })
    }

    pub fn class_label(&self) -> &'static str {
        self.class.label()
    }
}

/// Detections in detector output order. Membership in the vehicle allow-list
/// is guaranteed by `VehicleClass`.
#[derive(Clone, Debug, Default, Serialize, PartialEq)]
pub struct DetectionSet {
    detections: Vec<Detection>,
}

impl DetectionSet {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn push(&mut self, detection: Detection) {
        self.detections.push(detection);
    }

    pub fn len(&self) -> usize {
        self.detections.len()
    }

    pub fn is_empty(&self) -> bool {
        self.detections.is_empty()
    }

    pub fn first(&self) -> Option<&Detection> {
        self.detections.first()
    }

    pub fn iter(&self) -> std::slice::Iter<'_, Detection> {
        self.detections.iter()
    }
}

impl FromIterator<Detection> for DetectionSet {
    fn from_iter<T: IntoIterator<Item = Detection>>(iter: T) -> Self {
        Self { detections: iter.into_iter().collect() }
    }
}

impl<'a> IntoIterator for &'a DetectionSet {
    type Item = &'a Detection;
    type IntoIter = std::slice::Iter<'a, Detection>;

    fn into_iter(self) -> Self::IntoIter {
        self.detections.iter()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn rejects_out_of_range_confidence() {
        let bbox = BoundingBox::new(0.1, 0.1, 0.5, 0.5).unwrap();
        assert_eq!(
            Detection::new(VehicleClass::Car, 1.5, bbox),
            Err(DetectionError::Confidence(1.5))
        );
    }

    #[test]
    fn rejects_inverted_box() {
        assert!(BoundingBox::new(0.6, 0.1, 0.5, 0.5).is_err());
        assert!(BoundingBox::new(0.0, 0.0, 1.2, 0.5).is_err());
    }

    #[test]
    fn pixel_boxes_are_normalized_and_clamped() {
        let b = BoundingBox::from_pixels(600.0, -4.0, 100.0, 300.0, 800, 600).unwrap();
        assert_eq!(b, BoundingBox { x1: 0.125, y1: 0.0, x2: 0.75, y2: 0.5 });
        assert_eq!(b.to_pixels(800, 600), (100, 0, 500, 300));
    }

    #[test]
    fn non_finite_pixel_coordinates_are_rejected() {
        assert!(BoundingBox::from_pixels(f32::NAN, 0.0, 10.0, 10.0, 100, 100).is_err());
        assert!(BoundingBox::from_pixels(0.0, 0.0, f32::INFINITY, 10.0, 100, 100).is_err());
        assert!(Detection::new(VehicleClass::Car, f32::NAN, BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap()).is_err());
    }

    #[test]
    fn keeps_insertion_order() {
        let bbox = BoundingBox::new(0.0, 0.0, 1.0, 1.0).unwrap();
        let set: DetectionSet = [VehicleClass::Truck, VehicleClass::Car]
            .into_iter()
            .map(|c| Detection::new(c, 0.5, bbox).unwrap())
            .collect();
        let classes: Vec<_> = set.iter().map(|d| d.class).collect();
        assert_eq!(classes, vec![VehicleClass::Truck, VehicleClass::Car]);
        assert_eq!(set.first().map(|d| d.class_label()), Some("truck"));
    }
}
