//! Per-file outcomes and run summaries.

use crate::config::Stage;
use facelapse_core::{AlignError, BatchStatistics, ImageMetadata, NormalizePlan};
use serde::Serialize;
use std::path::PathBuf;

/// Which of the failure kinds stopped a file.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureKind {
    NoFaceDetected,
    NoLandmarkShape,
    GeometryDegenerate,
    Codec,
    Detector,
    /// The worker handling the file went away before replying.
    WorkerLost,
}

impl From<&AlignError> for FailureKind {
    fn from(err: &AlignError) -> Self {
        match err {
            AlignError::NoFaceDetected => FailureKind::NoFaceDetected,
            AlignError::NoLandmarkShape => FailureKind::NoLandmarkShape,
            AlignError::GeometryDegenerate(_) => FailureKind::GeometryDegenerate,
            AlignError::Codec(_) => FailureKind::Codec,
            AlignError::Detector(_) => FailureKind::Detector,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Failure {
    pub kind: FailureKind,
    pub reason: String,
}

impl From<&AlignError> for Failure {
    fn from(err: &AlignError) -> Self {
        Self {
            kind: err.into(),
            reason: err.to_string(),
        }
    }
}

/// Terminal state of one file in one stage.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "status", rename_all = "snake_case")]
pub enum Outcome {
    Aligned { output: PathBuf },
    /// The input was copied verbatim to `copied_to`.
    Failed { copied_to: PathBuf, failure: Failure },
    /// Alignment failed and so did the fallback copy.
    Unrecoverable { failure: Failure, copy_error: String },
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct FileReport {
    pub source: PathBuf,
    pub outcome: Outcome,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ImageMetadata>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub plan: Option<NormalizePlan>,
}

impl FileReport {
    pub fn new(source: PathBuf, outcome: Outcome) -> Self {
        Self {
            source,
            outcome,
            metadata: None,
            plan: None,
        }
    }

    pub fn is_aligned(&self) -> bool {
        matches!(self.outcome, Outcome::Aligned { .. })
    }

    pub fn failure(&self) -> Option<&Failure> {
        match &self.outcome {
            Outcome::Aligned { .. } => None,
            Outcome::Failed { failure, .. } | Outcome::Unrecoverable { failure, .. } => Some(failure),
        }
    }
}

/// Everything one stage did, in input order.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct StageReport {
    pub stage: Stage,
    pub files: Vec<FileReport>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub statistics: Option<BatchStatistics>,
}

impl StageReport {
    pub fn aligned(&self) -> usize {
        self.files.iter().filter(|f| f.is_aligned()).count()
    }

    pub fn failed(&self) -> usize {
        self.files.len() - self.aligned()
    }

    /// Output paths of the aligned files, in input order.
    pub fn aligned_outputs(&self) -> Vec<PathBuf> {
        self.files
            .iter()
            .filter_map(|f| match &f.outcome {
                Outcome::Aligned { output } => Some(output.clone()),
                _ => None,
            })
            .collect()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct RunReport {
    /// Number of files the input pattern matched.
    pub matched: usize,
    pub stages: Vec<StageReport>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn aligned(name: &str) -> FileReport {
        FileReport::new(
            PathBuf::from(name),
            Outcome::Aligned { output: PathBuf::from(format!("stage1/{name}")) },
        )
    }

    fn failed(name: &str) -> FileReport {
        FileReport::new(
            PathBuf::from(name),
            Outcome::Failed {
                copied_to: PathBuf::from(format!("stage1/failed/{name}")),
                failure: Failure::from(&AlignError::NoFaceDetected),
            },
        )
    }

    #[test]
    fn test_stage_counts() {
        let report = StageReport {
            stage: Stage::Rotate,
            files: vec![aligned("a.png"), failed("b.png"), aligned("c.png")],
            statistics: None,
        };
        assert_eq!(report.aligned(), 2);
        assert_eq!(report.failed(), 1);
        assert_eq!(
            report.aligned_outputs(),
            vec![PathBuf::from("stage1/a.png"), PathBuf::from("stage1/c.png")]
        );
    }

    #[test]
    fn test_failure_kind_mapping() {
        let failure = Failure::from(&AlignError::GeometryDegenerate("scale 0".into()));
        assert_eq!(failure.kind, FailureKind::GeometryDegenerate);
        assert!(failure.reason.contains("scale 0"));
        assert_eq!(failed("x.png").failure().map(|f| f.kind), Some(FailureKind::NoFaceDetected));
        assert!(aligned("x.png").failure().is_none());
    }

    #[test]
    fn test_outcome_serialization() {
        let json = serde_json::to_value(failed("b.png")).unwrap();
        assert_eq!(json["outcome"]["status"], "failed");
        assert_eq!(json["outcome"]["failure"]["kind"], "no_face_detected");
        assert!(json.get("metadata").is_none());
    }
}
