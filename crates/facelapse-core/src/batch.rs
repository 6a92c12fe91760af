//! Batch-wide scale normalization.
//!
//! Pass 1 measures every image; [`BatchStatistics::aggregate`] folds the
//! surviving measurements into an average eye-centre and interocular
//! distance; pass 2 turns each image's own measurement into a
//! [`NormalizePlan`].

use crate::error::AlignError;
use crate::metadata::ImageMetadata;
use crate::types::{CropRect, Point};
use serde::Serialize;

/// Mean eye-centre and interocular distance over a batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct BatchStatistics {
    pub avg_center: Point,
    pub avg_distance: f64,
    /// Number of measurements the means were taken over.
    pub samples: usize,
}

impl BatchStatistics {
    /// Arithmetic means over the measured entries; `None` entries (images
    /// without landmarks) are ignored. Returns `None` when nothing survived.
    pub fn aggregate<'a, I>(entries: I) -> Option<Self>
    where
        I: IntoIterator<Item = Option<&'a ImageMetadata>>,
    {
        let mut sum_x = 0.0;
        let mut sum_y = 0.0;
        let mut sum_distance = 0.0;
        let mut samples = 0usize;

        for meta in entries.into_iter().flatten() {
            sum_x += meta.eye_center.x;
            sum_y += meta.eye_center.y;
            sum_distance += meta.distance;
            samples += 1;
        }

        if samples == 0 {
            return None;
        }

        let n = samples as f64;
        Some(Self {
            avg_center: Point::new(sum_x / n, sum_y / n),
            avg_distance: sum_distance / n,
            samples,
        })
    }
}

/// How one image is brought in line with the batch.
#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct NormalizePlan {
    /// Resize factor that makes the interocular distance equal the batch average.
    pub scale: f64,
    /// `avg_center - eye_center`. Reported, not applied.
    pub offset: Point,
    /// Window centred on the image's own eye-centre, as wide and tall as
    /// the canvas allows on both sides.
    pub crop: CropRect,
}

impl NormalizePlan {
    /// Plan the rescale and crop for an image measured as `meta` on a
    /// `width`×`height` canvas.
    ///
    /// A zero, non-finite or negative scale (eye labels disagreeing in sign
    /// with the batch) cannot be applied and is reported as degenerate.
    pub fn for_image(
        stats: &BatchStatistics,
        meta: &ImageMetadata,
        width: u32,
        height: u32,
    ) -> Result<Self, AlignError> {
        let scale = stats.avg_distance / meta.distance;
        if !scale.is_finite() || scale <= 0.0 {
            return Err(AlignError::GeometryDegenerate(format!(
                "scale {scale} from average distance {} over image distance {}",
                stats.avg_distance, meta.distance
            )));
        }

        let offset = stats.avg_center - meta.eye_center;
        let crop = centered_window(meta.eye_center, f64::from(width), f64::from(height));

        if !(crop.width > 0.0 && crop.height > 0.0) {
            return Err(AlignError::GeometryDegenerate(format!(
                "eye-centre ({}, {}) leaves no crop inside {width}x{height}",
                meta.eye_center.x, meta.eye_center.y
            )));
        }

        Ok(Self { scale, offset, crop })
    }
}

/// Largest window symmetric around `center` that stays inside the canvas.
fn centered_window(center: Point, width: f64, height: f64) -> CropRect {
    let half_width = center.x.min(width - center.x);
    let half_height = center.y.min(height - center.y);
    CropRect {
        x: center.x - half_width,
        y: center.y - half_height,
        width: 2.0 * half_width,
        height: 2.0 * half_height,
    }
}
