//! Per-image alignment metadata derived from an eye pair.

use crate::types::{EyePair, Point};
use serde::Serialize;

/// Rotation, interocular distance, relative scale and eye-centre of one image.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct ImageMetadata {
    /// Tilt of the eye line in degrees, single-argument arctangent (±90°).
    pub rotation_deg: f64,
    /// `right_eye.x - left_eye.x`, signed.
    pub distance: f64,
    /// `distance / image_width`.
    pub scale: f64,
    pub eye_center: Point,
}

impl ImageMetadata {
    /// Compute metadata for an eye pair found in an image `image_width` pixels wide.
    ///
    /// Vertical eye pairs produce ±90°; coincident eyes produce NaN, which the
    /// rotation geometry rejects.
    pub fn compute(eyes: &EyePair, image_width: u32) -> Self {
        let EyePair { left_eye, right_eye } = *eyes;

        let rotation_deg =
            ((left_eye.y - right_eye.y) / (left_eye.x - right_eye.x)).atan().to_degrees();
        let distance = right_eye.x - left_eye.x;
        let scale = distance / f64::from(image_width);

        // Anchor y is min + max/2, not the midpoint of the two eyes.
        let eye_center = Point::new(
            left_eye.x + distance / 2.0,
            left_eye.y.min(right_eye.y) + left_eye.y.max(right_eye.y) / 2.0,
        );

        Self {
            rotation_deg,
            distance,
            scale,
            eye_center,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn eyes(left: (f64, f64), right: (f64, f64)) -> EyePair {
        EyePair {
            left_eye: Point::new(left.0, left.1),
            right_eye: Point::new(right.0, right.1),
        }
    }

    #[test]
    fn test_level_eyes() {
        let meta = ImageMetadata::compute(&eyes((100.0, 150.0), (200.0, 150.0)), 400);
        assert!(meta.rotation_deg.abs() < 1e-12, "rotation = {}", meta.rotation_deg);
        assert_eq!(meta.distance, 100.0);
        assert!((meta.scale - 0.25).abs() < 1e-12);
    }

    #[test]
    fn test_tilted_eyes() {
        let meta = ImageMetadata::compute(&eyes((100.0, 140.0), (200.0, 160.0)), 400);
        let expected = ((140.0f64 - 160.0) / (100.0 - 200.0)).atan() * 180.0 / std::f64::consts::PI;
        assert!((meta.rotation_deg - expected).abs() < 1e-12);
        assert!((meta.rotation_deg - 11.31).abs() < 0.01, "rotation = {}", meta.rotation_deg);
        assert_eq!(meta.distance, 100.0);
    }

    #[test]
    fn test_eye_center_formula() {
        let meta = ImageMetadata::compute(&eyes((100.0, 140.0), (200.0, 160.0)), 400);
        assert_eq!(meta.eye_center.x, 150.0);
        // 140 + 160 / 2
        assert_eq!(meta.eye_center.y, 220.0);
    }

    #[test]
    fn test_inverted_labels_give_negative_distance() {
        let meta = ImageMetadata::compute(&eyes((200.0, 150.0), (100.0, 150.0)), 400);
        assert_eq!(meta.distance, -100.0);
        assert!(meta.scale < 0.0);
        assert_eq!(meta.eye_center.x, 150.0);
    }

    #[test]
    fn test_vertical_eyes_saturate_at_ninety() {
        let meta = ImageMetadata::compute(&eyes((100.0, 100.0), (100.0, 200.0)), 400);
        assert!((meta.rotation_deg.abs() - 90.0).abs() < 1e-9, "rotation = {}", meta.rotation_deg);
    }

    #[test]
    fn test_coincident_eyes_are_nan() {
        let meta = ImageMetadata::compute(&eyes((100.0, 100.0), (100.0, 100.0)), 400);
        assert!(meta.rotation_deg.is_nan());
    }
}
