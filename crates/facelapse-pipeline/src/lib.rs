//! facelapse-pipeline: Batch orchestration for face alignment.
//!
//! Enumerates inputs, runs the configured stages through a pool of detector
//! workers, copies every file that cannot be aligned into the stage's
//! `failed/` directory, and reports what happened to each file.

pub mod align;
pub mod config;
pub mod error;
pub mod executor;
pub mod layout;
pub mod orchestrator;
pub mod report;
pub mod sink;

pub use align::Measurement;
pub use config::{parse_stages, ConfigError, OutputLayout, PipelineConfig, Stage};
pub use error::PipelineError;
pub use executor::{Job, JobResult, Pending, TaskExecutor, WorkerPool};
pub use layout::StageOutput;
pub use orchestrator::{enumerate, Pipeline};
pub use report::{Failure, FailureKind, FileReport, Outcome, RunReport, StageReport};
pub use sink::{Event, EventSink, Level, MemorySink, TracingSink};
