use crate::config::ConfigError;
use facelapse_core::DetectorError;
use thiserror::Error;

/// Errors that stop a whole run. Per-file problems never surface here.
#[derive(Error, Debug)]
pub enum PipelineError {
    #[error("invalid input pattern: {0}")]
    Pattern(#[from] glob::PatternError),
    #[error("failed to enumerate input files: {0}")]
    Enumeration(#[from] glob::GlobError),
    #[error("configuration: {0}")]
    Config(#[from] ConfigError),
    #[error("failed to start worker: {0}")]
    Detector(#[from] DetectorError),
    #[error("failed to spawn worker thread: {0}")]
    Spawn(#[source] std::io::Error),
}
