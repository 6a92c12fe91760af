use anyhow::{Context, Result};
use clap::Parser;
use facelapse_core::ScrfdDetector;
use facelapse_pipeline::{
    parse_stages, OutputLayout, Pipeline, PipelineConfig, RunReport, TracingSink, WorkerPool,
};
use std::path::PathBuf;
use std::sync::Arc;
use tracing_subscriber::EnvFilter;

#[derive(Parser)]
#[command(name = "facelapse", about = "Align a batch of face photos for time-lapse montages")]
struct Cli {
    /// Glob matching the input photos (quote it), e.g. "photos/*.jpg"
    pattern: String,

    /// Stages to run, comma separated: rotate, normalize
    #[arg(long)]
    stages: Option<String>,

    /// Output layout: staged (stage1/, stage2/) or single (output/)
    #[arg(long)]
    layout: Option<String>,

    /// Number of worker threads, each with its own detector
    #[arg(short, long)]
    workers: Option<usize>,

    /// Directory containing det_10g.onnx
    #[arg(long)]
    model_dir: Option<PathBuf>,

    /// TOML configuration file
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Print the full run report as JSON
    #[arg(long)]
    json: bool,
}

impl Cli {
    fn resolve_config(&self) -> Result<PipelineConfig> {
        let mut config = PipelineConfig::load(self.config.as_deref())?;
        if let Some(stages) = &self.stages {
            config.stages = parse_stages(stages)?;
        }
        if let Some(layout) = &self.layout {
            config.layout = layout.parse::<OutputLayout>()?;
        }
        if let Some(workers) = self.workers {
            config.workers = workers;
        }
        if let Some(dir) = &self.model_dir {
            config.model_dir = dir.clone();
        }
        config.validate()?;
        Ok(config)
    }
}

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")))
        .init();

    let cli = Cli::parse();
    let config = cli.resolve_config()?;

    let model_path = config.detector_model_path();
    tracing::info!(
        model = %model_path.display(),
        workers = config.workers,
        stages = ?config.stages,
        layout = ?config.layout,
        "facelapse starting"
    );

    let threads = config.detector_threads;
    let pool = WorkerPool::spawn(config.workers, |_| ScrfdDetector::load(&model_path, threads))
        .context("failed to start detector workers")?;

    let pipeline = Pipeline::from_config(&config, pool, Arc::new(TracingSink));
    let result = pipeline.run(&cli.pattern).await;
    pipeline.into_executor().shutdown();
    let report = result?;

    if cli.json {
        println!("{}", serde_json::to_string_pretty(&report)?);
    } else {
        print_summary(&report);
    }
    Ok(())
}

fn print_summary(report: &RunReport) {
    println!("matched {} file(s)", report.matched);
    for stage in &report.stages {
        print!(
            "{:<10} {} aligned, {} failed",
            stage.stage.to_string(),
            stage.aligned(),
            stage.failed()
        );
        match &stage.statistics {
            Some(stats) => println!(
                " (average distance {:.2}px over {} image(s))",
                stats.avg_distance, stats.samples
            ),
            None => println!(),
        }
    }
}
