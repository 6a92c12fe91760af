//! Pipeline configuration: defaults, optional TOML file, `FACELAPSE_*` overrides.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {}: {source}", path.display())]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

/// One alignment stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Stage {
    /// De-rotate each image so the eyes are level.
    Rotate,
    /// Rescale each image to the batch's average interocular distance.
    Normalize,
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            Stage::Rotate => "rotate",
            Stage::Normalize => "normalize",
        })
    }
}

impl FromStr for Stage {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "rotate" | "stage1" | "1" => Ok(Stage::Rotate),
            "normalize" | "stage2" | "2" => Ok(Stage::Normalize),
            other => Err(ConfigError::Invalid(format!("unknown stage {other:?}"))),
        }
    }
}

/// Where a stage writes its results, relative to the input's directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputLayout {
    /// `stage1/` and `stage2/`, each with a `failed/` subdirectory.
    Staged,
    /// A single `output/` directory with `failed/`; one stage only.
    Single,
}

impl FromStr for OutputLayout {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "staged" => Ok(OutputLayout::Staged),
            "single" => Ok(OutputLayout::Single),
            other => Err(ConfigError::Invalid(format!("unknown layout {other:?}"))),
        }
    }
}

/// Runtime configuration for a batch run.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PipelineConfig {
    /// Directory containing `det_10g.onnx`.
    pub model_dir: PathBuf,
    /// Number of worker threads, each with its own detector session.
    pub workers: usize,
    /// ONNX Runtime intra-op threads per detector session.
    pub detector_threads: usize,
    /// Stages to run, in order.
    pub stages: Vec<Stage>,
    pub layout: OutputLayout,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            model_dir: facelapse_core::default_model_dir(),
            workers: std::thread::available_parallelism().map(|n| n.get()).unwrap_or(1),
            detector_threads: 2,
            stages: vec![Stage::Rotate, Stage::Normalize],
            layout: OutputLayout::Staged,
        }
    }
}

impl PipelineConfig {
    /// Defaults, then the TOML file at `path` (or `$FACELAPSE_CONFIG`), then
    /// `FACELAPSE_*` environment variables.
    ///
    /// Not validated: callers apply their own overrides first, then call
    /// [`validate`](Self::validate).
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        let path = path
            .map(Path::to_path_buf)
            .or_else(|| std::env::var_os("FACELAPSE_CONFIG").map(PathBuf::from));

        let mut config = match path {
            Some(path) => {
                let text = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
                    path: path.clone(),
                    source,
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };

        config.apply_env(|key| std::env::var(key).ok());
        Ok(config)
    }

    pub fn from_toml_str(text: &str) -> Result<Self, ConfigError> {
        Ok(toml::from_str(text)?)
    }

    /// Override fields from `FACELAPSE_*` variables. Unparseable values are ignored.
    pub fn apply_env<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(dir) = lookup("FACELAPSE_MODEL_DIR") {
            self.model_dir = PathBuf::from(dir);
        }
        if let Some(workers) = env_parse(&lookup, "FACELAPSE_WORKERS") {
            self.workers = workers;
        }
        if let Some(threads) = env_parse(&lookup, "FACELAPSE_DETECTOR_THREADS") {
            self.detector_threads = threads;
        }
        if let Some(layout) = env_parse(&lookup, "FACELAPSE_LAYOUT") {
            self.layout = layout;
        }
        if let Some(stages) = lookup("FACELAPSE_STAGES").and_then(|v| parse_stages(&v).ok()) {
            self.stages = stages;
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.workers == 0 {
            return Err(ConfigError::Invalid("workers must be at least 1".into()));
        }
        if self.detector_threads == 0 {
            return Err(ConfigError::Invalid("detector_threads must be at least 1".into()));
        }
        if self.stages.is_empty() {
            return Err(ConfigError::Invalid("at least one stage is required".into()));
        }
        if !self.stages.windows(2).all(|pair| pair[0] < pair[1]) {
            return Err(ConfigError::Invalid(format!(
                "stages must be distinct and in order rotate, normalize; got {:?}",
                self.stages
            )));
        }
        if self.layout == OutputLayout::Single && self.stages.len() != 1 {
            return Err(ConfigError::Invalid(
                "the single output layout holds one stage; select rotate or normalize".into(),
            ));
        }
        Ok(())
    }

    /// Path to the SCRFD detection model.
    pub fn detector_model_path(&self) -> PathBuf {
        self.model_dir.join(facelapse_core::SCRFD_MODEL_FILE)
    }
}

/// Parse a comma-separated stage list such as `rotate,normalize`.
pub fn parse_stages(list: &str) -> Result<Vec<Stage>, ConfigError> {
    list.split(',')
        .filter(|s| !s.trim().is_empty())
        .map(str::parse)
        .collect()
}

fn env_parse<F, T>(lookup: &F, key: &str) -> Option<T>
where
    F: Fn(&str) -> Option<String>,
    T: FromStr,
{
    lookup(key).and_then(|v| v.parse().ok())
}
