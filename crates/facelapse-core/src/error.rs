use crate::codec::CodecError;
use crate::detector::DetectorError;
use crate::geometry::GeometryError;
use thiserror::Error;

/// Why a single image could not be aligned.
///
/// Every variant is recoverable at file granularity: the pipeline copies the
/// original and moves on.
#[derive(Error, Debug)]
pub enum AlignError {
    #[error("no face detected")]
    NoFaceDetected,
    #[error("no landmark shape predicted for any detected face")]
    NoLandmarkShape,
    #[error("degenerate geometry: {0}")]
    GeometryDegenerate(String),
    #[error("codec: {0}")]
    Codec(#[from] CodecError),
    #[error("detector: {0}")]
    Detector(#[from] DetectorError),
}

impl From<GeometryError> for AlignError {
    fn from(err: GeometryError) -> Self {
        AlignError::GeometryDegenerate(err.to_string())
    }
}
