use serde::Serialize;

/// A 2D point in image pixel coordinates (x right, y down).
#[derive(Debug, Clone, Copy, PartialEq, Default, Serialize)]
pub struct Point {
    pub x: f64,
    pub y: f64,
}

impl Point {
    pub const fn new(x: f64, y: f64) -> Self {
        Self { x, y }
    }
}

impl std::ops::Sub for Point {
    type Output = Self;

    fn sub(self, rhs: Self) -> Self::Output {
        Self::new(self.x - rhs.x, self.y - rhs.y)
    }
}

/// Face rectangle reported by the detector.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct FaceRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl FaceRect {
    pub fn area(&self) -> f64 {
        self.width * self.height
    }
}

/// One detector hit: the face rectangle and the landmark points predicted inside it.
///
/// `points` is empty when the landmark predictor yielded nothing for `rect`.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FaceCandidate {
    pub rect: FaceRect,
    pub points: Vec<Point>,
}

/// Landmarks of the face chosen for an image, with the rectangle it was selected by.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct LandmarkShape {
    pub rect: FaceRect,
    pub points: Vec<Point>,
}

/// Eye positions in image order: `left_eye` is the eye with the smaller x
/// when the face is upright.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct EyePair {
    pub left_eye: Point,
    pub right_eye: Point,
}

/// Axis-aligned crop rectangle in floating-point pixels.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct CropRect {
    pub x: f64,
    pub y: f64,
    pub width: f64,
    pub height: f64,
}

impl CropRect {
    pub fn full(width: f64, height: f64) -> Self {
        Self { x: 0.0, y: 0.0, width, height }
    }

    pub fn right(&self) -> f64 {
        self.x + self.width
    }

    pub fn bottom(&self) -> f64 {
        self.y + self.height
    }

    /// The whole pixels lying entirely inside this rectangle: the origin
    /// rounds up, the far edges round down.
    pub fn snapped_inward(&self) -> Self {
        let x = (self.x - SNAP_EPS).ceil();
        let y = (self.y - SNAP_EPS).ceil();
        let right = (self.right() + SNAP_EPS).floor();
        let bottom = (self.bottom() + SNAP_EPS).floor();
        Self {
            x,
            y,
            width: (right - x).max(0.0),
            height: (bottom - y).max(0.0),
        }
    }
}

/// Float noise tolerated before an edge is moved to the next pixel.
const SNAP_EPS: f64 = 1e-9;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_point_difference() {
        let a = Point::new(3.0, 4.0);
        let b = Point::new(1.0, 6.0);
        assert_eq!(a - b, Point::new(2.0, -2.0));
    }

    #[test]
    fn test_face_rect_area() {
        let rect = FaceRect { x: 10.0, y: 20.0, width: 30.0, height: 40.0 };
        assert_eq!(rect.area(), 1200.0);
    }

    #[test]
    fn test_crop_rect_edges() {
        let crop = CropRect { x: 5.0, y: 7.0, width: 10.0, height: 20.0 };
        assert_eq!(crop.right(), 15.0);
        assert_eq!(crop.bottom(), 27.0);
        assert_eq!(CropRect::full(64.0, 48.0), CropRect { x: 0.0, y: 0.0, width: 64.0, height: 48.0 });
    }

    #[test]
    fn test_snapped_inward() {
        let crop = CropRect { x: 7.3, y: 6.6, width: 35.1, height: 36.0 };
        // 7.3..42.4 keeps columns 8..42, 6.6..42.6 keeps rows 7..42.
        assert_eq!(crop.snapped_inward(), CropRect { x: 8.0, y: 7.0, width: 34.0, height: 35.0 });

        let whole = CropRect { x: 2.0000000000001, y: 0.0, width: 9.9999999999998, height: 48.0 };
        assert_eq!(whole.snapped_inward(), CropRect { x: 2.0, y: 0.0, width: 10.0, height: 48.0 });

        let sliver = CropRect { x: 3.2, y: 3.2, width: 0.5, height: 0.5 };
        assert_eq!(sliver.snapped_inward().width, 0.0);
    }
}
