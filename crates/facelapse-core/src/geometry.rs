//! Largest axis-aligned crop inside a rotated rectangle.
//!
//! Rotating an image by an arbitrary angle grows the canvas to the rotated
//! bounding box and leaves blank triangles in its corners. [`rotation_crop`]
//! returns the rectangle, in rotated-canvas coordinates, that keeps only
//! pixels covered by the source image.

use crate::types::CropRect;
use std::f64::consts::{FRAC_PI_2, PI};
use thiserror::Error;

/// `sin(delta)` below this is treated as zero.
const MIN_SIN_DELTA: f64 = 1e-12;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum GeometryError {
    #[error("rotation angle is not finite: {0}")]
    NonFiniteAngle(f64),
    #[error("image has no area: {width}x{height}")]
    EmptyImage { width: f64, height: f64 },
    #[error("rotation crop denominator vanished at {angle_deg}°")]
    DegenerateDenominator { angle_deg: f64 },
    #[error("no blank-free crop exists at {angle_deg}° for {width}x{height}")]
    EmptyCrop { angle_deg: f64, width: f64, height: f64 },
}

/// Size of the canvas produced by rotating a `width`×`height` image by `angle_deg`.
pub fn rotated_bounds(angle_deg: f64, width: f64, height: f64) -> (f64, f64) {
    let alpha = fold_angle(angle_deg.to_radians());
    (
        width * alpha.cos() + height * alpha.sin(),
        width * alpha.sin() + height * alpha.cos(),
    )
}

/// Fold an angle in radians into `[0, π)` using its quadrant, so that the
/// result is the acute angle the rotated rectangle's sides make with the axes.
fn fold_angle(angle: f64) -> f64 {
    let quadrant = ((angle / FRAC_PI_2).floor() as i64) & 3;
    let signed = if quadrant & 1 == 0 { angle } else { PI - angle };
    ((signed % PI) + PI) % PI
}

/// Crop rectangle for an image of `width`×`height` rotated by `angle_deg`.
///
/// At 0° this is the whole image. The result always satisfies
/// `0 <= x`, `0 <= y`, `x + w <= bb.w`, `y + h <= bb.h` where `bb` is
/// [`rotated_bounds`].
pub fn rotation_crop(angle_deg: f64, width: f64, height: f64) -> Result<CropRect, GeometryError> {
    if !angle_deg.is_finite() {
        return Err(GeometryError::NonFiniteAngle(angle_deg));
    }
    if !(width > 0.0 && height > 0.0) {
        return Err(GeometryError::EmptyImage { width, height });
    }

    let alpha = fold_angle(angle_deg.to_radians());
    let (bb_w, bb_h) = rotated_bounds(angle_deg, width, height);

    let portrait = width < height;
    let gamma = if portrait { bb_w.atan2(bb_h) } else { bb_h.atan2(bb_w) };
    let delta = PI - alpha - gamma;

    let sin_delta = delta.sin();
    if sin_delta.abs() < MIN_SIN_DELTA {
        if alpha.sin().abs() < MIN_SIN_DELTA {
            return Ok(CropRect::full(bb_w, bb_h));
        }
        return Err(GeometryError::DegenerateDenominator { angle_deg });
    }

    let length = if portrait { height } else { width };
    let d = length * alpha.cos();
    let a = d * alpha.sin() / sin_delta;

    let y = a * gamma.cos();
    let x = y * gamma.tan();

    let crop = CropRect {
        x,
        y,
        width: bb_w - 2.0 * x,
        height: bb_h - 2.0 * y,
    };

    if !(crop.width > 0.0 && crop.height > 0.0) {
        return Err(GeometryError::EmptyCrop { angle_deg, width, height });
    }

    Ok(crop)
}
