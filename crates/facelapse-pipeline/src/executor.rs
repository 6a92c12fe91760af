//! Task executor: one request in, one reply out, per file.

use crate::align::{self, Measurement};
use crate::error::PipelineError;
use crate::layout::StageOutput;
use crate::report::{FileReport, Outcome};
use facelapse_core::{BatchStatistics, DetectorError, ImageCodec, LandmarkDetector, RasterCodec};
use std::panic::{self, AssertUnwindSafe};
use std::path::PathBuf;
use std::sync::{Arc, Mutex};
use tokio::sync::{mpsc, oneshot};

/// A unit of per-file work.
#[derive(Debug, Clone)]
pub enum Job {
    /// Stage 1: level the eyes of `source`.
    Level { source: PathBuf, output: StageOutput },
    /// Stage 2, first pass: measure `source`.
    Measure { source: PathBuf, output: StageOutput },
    /// Stage 2, second pass: rescale `source` against the batch.
    Normalize {
        source: PathBuf,
        output: StageOutput,
        measurement: Measurement,
        stats: BatchStatistics,
    },
}

impl Job {
    pub fn source(&self) -> &PathBuf {
        match self {
            Job::Level { source, .. } | Job::Measure { source, .. } | Job::Normalize { source, .. } => source,
        }
    }
}

/// Reply to a [`Job`].
#[derive(Debug, Clone)]
pub enum JobResult {
    /// The file reached a terminal outcome for its stage.
    Settled(FileReport),
    /// The file was measured and waits for the batch statistics.
    Measured { source: PathBuf, measurement: Measurement },
}

/// Reply handle for a submitted job.
pub struct Pending {
    reply: oneshot::Receiver<JobResult>,
}

impl Pending {
    pub fn from_receiver(reply: oneshot::Receiver<JobResult>) -> Self {
        Self { reply }
    }

    /// Wait for the job. `None` if the worker went away without replying.
    pub async fn wait(self) -> Option<JobResult> {
        self.reply.await.ok()
    }
}

/// Runs jobs somewhere and hands back their results.
pub trait TaskExecutor: Send + Sync {
    fn submit(&self, job: Job) -> Pending;
}

/// Does the work for one [`Job`] with a detector and codec owned by the caller.
pub fn run_job<D, C>(detector: &mut D, codec: &C, job: Job) -> JobResult
where
    D: LandmarkDetector + ?Sized,
    C: ImageCodec + ?Sized,
{
    match job {
        Job::Level { source, output } => {
            let aligned = output.aligned_path(&source);
            match align::level_file(detector, codec, &source, &aligned) {
                Ok(measurement) => {
                    let mut report = FileReport::new(source, Outcome::Aligned { output: aligned });
                    report.metadata = Some(measurement.metadata);
                    JobResult::Settled(report)
                }
                Err(err) => JobResult::Settled(align::fall_back(codec, &source, &output.failed_path(&source), &err)),
            }
        }
        Job::Measure { source, output } => match align::measure_file(detector, codec, &source) {
            Ok(measurement) => JobResult::Measured { source, measurement },
            Err(err) => JobResult::Settled(align::fall_back(codec, &source, &output.failed_path(&source), &err)),
        },
        Job::Normalize {
            source,
            output,
            measurement,
            stats,
        } => {
            let aligned = output.aligned_path(&source);
            let result = align::normalize_file(codec, &source, &aligned, &measurement, &stats);
            let mut report = match result {
                Ok(plan) => {
                    let mut report = FileReport::new(source, Outcome::Aligned { output: aligned });
                    report.plan = Some(plan);
                    report
                }
                Err(err) => align::fall_back(codec, &source, &output.failed_path(&source), &err),
            };
            report.metadata = Some(measurement.metadata);
            JobResult::Settled(report)
        }
    }
}

struct WorkRequest {
    job: Job,
    reply: oneshot::Sender<JobResult>,
}

/// Fixed set of OS threads, each owning its own detector.
///
/// Requests are pulled from one shared queue, so a slow file never holds up
/// work queued behind it on another thread.
pub struct WorkerPool {
    tx: mpsc::UnboundedSender<WorkRequest>,
    threads: Vec<std::thread::JoinHandle<()>>,
}

impl WorkerPool {
    /// Build `workers` detectors with `make_detector` and start one thread per
    /// detector. Fails before any thread starts if a detector cannot be built.
    pub fn spawn<D, F>(workers: usize, make_detector: F) -> Result<Self, PipelineError>
    where
        D: LandmarkDetector + Send + 'static,
        F: Fn(usize) -> Result<D, DetectorError>,
    {
        let detectors = (0..workers.max(1))
            .map(&make_detector)
            .collect::<Result<Vec<D>, DetectorError>>()?;

        let (tx, rx) = mpsc::unbounded_channel::<WorkRequest>();
        let rx = Arc::new(Mutex::new(rx));

        let mut threads = Vec::with_capacity(detectors.len());
        for (id, mut detector) in detectors.into_iter().enumerate() {
            let rx = Arc::clone(&rx);
            let handle = std::thread::Builder::new()
                .name(format!("facelapse-worker-{id}"))
                .spawn(move || {
                    tracing::debug!(worker = id, "worker started");
                    let codec = RasterCodec;
                    while let Some(req) = next_request(&rx) {
                        let source = req.job.source().clone();
                        let job = req.job;
                        match panic::catch_unwind(AssertUnwindSafe(|| run_job(&mut detector, &codec, job))) {
                            Ok(result) => {
                                let _ = req.reply.send(result);
                            }
                            // Dropping the reply reports the job as lost.
                            Err(_) => tracing::error!(worker = id, file = %source.display(), "job panicked"),
                        }
                    }
                    tracing::debug!(worker = id, "worker exiting");
                })
                .map_err(PipelineError::Spawn)?;
            threads.push(handle);
        }

        tracing::info!(workers = threads.len(), "worker pool started");
        Ok(Self { tx, threads })
    }

    pub fn size(&self) -> usize {
        self.threads.len()
    }

    /// Close the queue and wait for every thread to finish its current job.
    pub fn shutdown(self) {
        let Self { tx, threads } = self;
        drop(tx);
        for handle in threads {
            if handle.join().is_err() {
                tracing::warn!("worker thread panicked");
            }
        }
    }
}

fn next_request(rx: &Mutex<mpsc::UnboundedReceiver<WorkRequest>>) -> Option<WorkRequest> {
    let mut guard = match rx.lock() {
        Ok(guard) => guard,
        Err(poisoned) => poisoned.into_inner(),
    };
    guard.blocking_recv()
}

impl TaskExecutor for WorkerPool {
    fn submit(&self, job: Job) -> Pending {
        let (reply, rx) = oneshot::channel();
        if self.tx.send(WorkRequest { job, reply }).is_err() {
            tracing::error!("worker pool queue closed");
        }
        Pending { reply: rx }
    }
}
