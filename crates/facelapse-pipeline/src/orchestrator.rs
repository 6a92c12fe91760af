//! Staged batch runs: enumerate, fan out to the executor, join, report.

use crate::align::{self, Measurement};
use crate::config::{OutputLayout, PipelineConfig, Stage};
use crate::error::PipelineError;
use crate::executor::{Job, JobResult, Pending, TaskExecutor};
use crate::layout::StageOutput;
use crate::report::{Failure, FailureKind, FileReport, Outcome, RunReport, StageReport};
use crate::sink::{EventSink, Level};
use facelapse_core::{BatchStatistics, RasterCodec};
use std::path::{Path, PathBuf};
use std::sync::Arc;

/// Files matched by `pattern`, in the order the glob yields them.
/// Directories are skipped.
pub fn enumerate(pattern: &str) -> Result<Vec<PathBuf>, PipelineError> {
    let mut files = Vec::new();
    for entry in glob::glob(pattern)? {
        let path = entry?;
        if path.is_file() {
            files.push(path);
        }
    }
    Ok(files)
}

/// Stage 2 slot between the measure and normalize passes.
enum Slot {
    Measured(PathBuf, Measurement),
    Settled(FileReport),
}

pub struct Pipeline<E> {
    stages: Vec<Stage>,
    layout: OutputLayout,
    executor: E,
    sink: Arc<dyn EventSink>,
}

impl<E: TaskExecutor> Pipeline<E> {
    pub fn new(stages: Vec<Stage>, layout: OutputLayout, executor: E, sink: Arc<dyn EventSink>) -> Self {
        Self {
            stages,
            layout,
            executor,
            sink,
        }
    }

    pub fn from_config(config: &PipelineConfig, executor: E, sink: Arc<dyn EventSink>) -> Self {
        Self::new(config.stages.clone(), config.layout, executor, sink)
    }

    /// Hand the executor back, e.g. to shut a worker pool down.
    pub fn into_executor(self) -> E {
        self.executor
    }

    /// Run every configured stage over the files matching `pattern`.
    ///
    /// Each stage consumes the aligned outputs of the one before it. Per-file
    /// failures end up in the report; only a bad pattern or an unreadable
    /// directory fails the run.
    pub async fn run(&self, pattern: &str) -> Result<RunReport, PipelineError> {
        let inputs = enumerate(pattern)?;
        let mut report = RunReport {
            matched: inputs.len(),
            stages: Vec::with_capacity(self.stages.len()),
        };

        if inputs.is_empty() {
            self.sink.log(Level::Warn, "no files matched", &[("pattern", pattern.to_string())]);
            return Ok(report);
        }
        self.sink.log(
            Level::Info,
            "matched input files",
            &[("pattern", pattern.to_string()), ("count", inputs.len().to_string())],
        );

        let mut current = inputs;
        for &stage in &self.stages {
            self.sink.log(
                Level::Info,
                "stage started",
                &[("stage", stage.to_string()), ("files", current.len().to_string())],
            );
            let stage_report = match stage {
                Stage::Rotate => self.level(&current).await,
                Stage::Normalize => self.normalize(&current).await,
            };
            self.sink.log(
                Level::Info,
                "stage finished",
                &[
                    ("stage", stage.to_string()),
                    ("aligned", stage_report.aligned().to_string()),
                    ("failed", stage_report.failed().to_string()),
                ],
            );
            current = stage_report.aligned_outputs();
            report.stages.push(stage_report);
        }
        Ok(report)
    }

    async fn level(&self, inputs: &[PathBuf]) -> StageReport {
        let output = StageOutput::new(Stage::Rotate, self.layout);
        let pending = self.submit_all(inputs.iter().map(|source| Job::Level {
            source: source.clone(),
            output,
        }));

        let mut files = Vec::with_capacity(pending.len());
        for (source, pending) in pending {
            let report = settle(&source, output, pending.wait().await);
            self.record(&report);
            files.push(report);
        }
        StageReport {
            stage: Stage::Rotate,
            files,
            statistics: None,
        }
    }

    async fn normalize(&self, inputs: &[PathBuf]) -> StageReport {
        let output = StageOutput::new(Stage::Normalize, self.layout);

        // Pass 1: measure everything before any file is touched.
        let pending = self.submit_all(inputs.iter().map(|source| Job::Measure {
            source: source.clone(),
            output,
        }));
        let mut slots = Vec::with_capacity(pending.len());
        for (source, pending) in pending {
            let slot = match pending.wait().await {
                Some(JobResult::Measured { source, measurement }) => {
                    self.sink.log(
                        Level::Debug,
                        "measured",
                        &[
                            ("file", source.display().to_string()),
                            ("rotation_deg", format!("{:.3}", measurement.metadata.rotation_deg)),
                            ("distance", format!("{:.3}", measurement.metadata.distance)),
                            ("scale", format!("{:.5}", measurement.metadata.scale)),
                        ],
                    );
                    Slot::Measured(source, measurement)
                }
                other => {
                    let report = settle(&source, output, other);
                    self.record(&report);
                    Slot::Settled(report)
                }
            };
            slots.push(slot);
        }

        let stats = BatchStatistics::aggregate(slots.iter().map(|slot| match slot {
            Slot::Measured(_, m) => Some(&m.metadata),
            Slot::Settled(_) => None,
        }));
        match &stats {
            Some(stats) => self.sink.log(
                Level::Info,
                "batch statistics",
                &[
                    ("samples", stats.samples.to_string()),
                    ("avg_distance", format!("{:.3}", stats.avg_distance)),
                    ("avg_center_x", format!("{:.3}", stats.avg_center.x)),
                    ("avg_center_y", format!("{:.3}", stats.avg_center.y)),
                ],
            ),
            None => self.sink.log(Level::Warn, "no measurable faces in batch", &[]),
        }

        // Pass 2: only measured files reach here, so `stats` is present.
        let mut pending: Vec<Option<(PathBuf, Pending)>> = Vec::with_capacity(slots.len());
        for slot in &slots {
            pending.push(match (slot, &stats) {
                (Slot::Measured(source, measurement), Some(stats)) => Some((
                    source.clone(),
                    self.executor.submit(Job::Normalize {
                        source: source.clone(),
                        output,
                        measurement: *measurement,
                        stats: *stats,
                    }),
                )),
                _ => None,
            });
        }

        let mut files = Vec::with_capacity(slots.len());
        for (slot, pending) in slots.into_iter().zip(pending) {
            let report = match (slot, pending) {
                (Slot::Settled(report), _) => report,
                (Slot::Measured(_, _), Some((source, pending))) => {
                    let report = settle(&source, output, pending.wait().await);
                    self.record(&report);
                    report
                }
                (Slot::Measured(source, _), None) => {
                    let report = lost(&source, output, "no batch statistics");
                    self.record(&report);
                    report
                }
            };
            files.push(report);
        }

        StageReport {
            stage: Stage::Normalize,
            files,
            statistics: stats,
        }
    }

    fn submit_all<I>(&self, jobs: I) -> Vec<(PathBuf, Pending)>
    where
        I: IntoIterator<Item = Job>,
    {
        jobs.into_iter()
            .map(|job| (job.source().clone(), self.executor.submit(job)))
            .collect()
    }

    fn record(&self, report: &FileReport) {
        let file = report.source.display().to_string();
        match &report.outcome {
            Outcome::Aligned { output } => {
                let mut fields = vec![("file", file), ("output", output.display().to_string())];
                if let Some(meta) = &report.metadata {
                    fields.push(("rotation_deg", format!("{:.3}", meta.rotation_deg)));
                }
                if let Some(plan) = &report.plan {
                    fields.push(("scale", format!("{:.5}", plan.scale)));
                }
                self.sink.log(Level::Info, "aligned", &fields);
            }
            Outcome::Failed { copied_to, failure } => self.sink.log(
                Level::Warn,
                "falling back to original copy",
                &[
                    ("file", file),
                    ("kind", format!("{:?}", failure.kind)),
                    ("reason", failure.reason.clone()),
                    ("copied_to", copied_to.display().to_string()),
                ],
            ),
            Outcome::Unrecoverable { failure, copy_error } => self.sink.log(
                Level::Error,
                "fallback copy failed",
                &[
                    ("file", file),
                    ("kind", format!("{:?}", failure.kind)),
                    ("reason", failure.reason.clone()),
                    ("copy_error", copy_error.clone()),
                ],
            ),
        }
    }
}

fn settle(source: &Path, output: StageOutput, reply: Option<JobResult>) -> FileReport {
    match reply {
        Some(JobResult::Settled(report)) => report,
        Some(JobResult::Measured { .. }) => lost(source, output, "unexpected measurement reply"),
        None => lost(source, output, "worker exited before replying"),
    }
}

/// Fallback for a job that produced no outcome of its own.
fn lost(source: &Path, output: StageOutput, reason: &str) -> FileReport {
    let failure = Failure {
        kind: FailureKind::WorkerLost,
        reason: reason.to_string(),
    };
    align::copy_to_failed(&RasterCodec, source, &output.failed_path(source), failure)
}
