//! Face selection and eye-pair resolution.

use crate::detector::DetectorError;
use crate::error::AlignError;
use crate::types::{EyePair, FaceCandidate, LandmarkShape};
use image::DynamicImage;

/// Index of the right eye in a 5-point shape.
const RIGHT_EYE_INDEX: usize = 0;
/// Offset of the left eye from the end of a 5-point shape.
const LEFT_EYE_FROM_END: usize = 3;

/// Face detector + landmark predictor.
///
/// Returns one candidate per detected face rectangle, in detector order.
/// An empty list means no face was found.
pub trait LandmarkDetector {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceCandidate>, DetectorError>;
}

impl<T: LandmarkDetector + ?Sized> LandmarkDetector for Box<T> {
    fn detect(&mut self, image: &DynamicImage) -> Result<Vec<FaceCandidate>, DetectorError> {
        (**self).detect(image)
    }
}

/// Detect faces and keep the landmark shape whose face rectangle is largest.
///
/// `Ok(None)` when the detector finds no face at all. Equal areas keep the
/// first candidate. If the predictor produced no points for the chosen
/// rectangle the result is [`AlignError::NoLandmarkShape`].
pub fn extract_landmarks<D: LandmarkDetector + ?Sized>(
    detector: &mut D,
    image: &DynamicImage,
) -> Result<Option<LandmarkShape>, AlignError> {
    let candidates = detector.detect(image)?;
    let Some(best) = select_largest(candidates) else {
        return Ok(None);
    };
    if best.points.is_empty() {
        return Err(AlignError::NoLandmarkShape);
    }
    Ok(Some(LandmarkShape {
        rect: best.rect,
        points: best.points,
    }))
}

fn select_largest(candidates: Vec<FaceCandidate>) -> Option<FaceCandidate> {
    let mut best: Option<FaceCandidate> = None;
    for candidate in candidates {
        let better = match &best {
            None => true,
            Some(current) => candidate.rect.area() > current.rect.area(),
        };
        if better {
            best = Some(candidate);
        }
    }
    best
}

impl EyePair {
    /// Resolve the eyes from a 5-point shape: the right eye is the first
    /// point, the left eye the third from last.
    ///
    /// The shape must hold at least three points; shorter shapes yield `None`.
    pub fn resolve(shape: &LandmarkShape) -> Option<Self> {
        let parts = &shape.points;
        let left_index = parts.len().checked_sub(LEFT_EYE_FROM_END)?;
        Some(Self {
            left_eye: *parts.get(left_index)?,
            right_eye: *parts.get(RIGHT_EYE_INDEX)?,
        })
    }
}
