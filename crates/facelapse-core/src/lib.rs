//! facelapse-core: Geometry for aligning a batch of face photos.
//!
//! Stage 1 levels each image's eyes with a rotation followed by the largest
//! crop free of blank corners. Stage 2 rescales every image so its
//! interocular distance matches the batch average.

pub mod batch;
pub mod codec;
pub mod detector;
pub mod error;
pub mod geometry;
pub mod landmarks;
pub mod metadata;
pub mod types;

pub use batch::{BatchStatistics, NormalizePlan};
pub use codec::{CodecError, ImageCodec, RasterCodec};
pub use detector::{DetectorError, ScrfdDetector, SCRFD_MODEL_FILE};
pub use error::AlignError;
pub use geometry::{rotated_bounds, rotation_crop, GeometryError};
pub use landmarks::{extract_landmarks, LandmarkDetector};
pub use metadata::ImageMetadata;
pub use types::{CropRect, EyePair, FaceCandidate, FaceRect, LandmarkShape, Point};

use std::path::PathBuf;

/// Default model directory: `$XDG_DATA_HOME/facelapse/models`, falling back
/// to `~/.local/share/facelapse/models`.
pub fn default_model_dir() -> PathBuf {
    std::env::var("XDG_DATA_HOME")
        .map(PathBuf::from)
        .unwrap_or_else(|_| {
            let home = std::env::var("HOME").unwrap_or_else(|_| "/tmp".to_string());
            PathBuf::from(home).join(".local/share")
        })
        .join("facelapse")
        .join("models")
}
