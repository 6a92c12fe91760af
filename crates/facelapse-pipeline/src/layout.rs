//! Output paths for each stage.

use crate::config::{OutputLayout, Stage};
use std::path::{Path, PathBuf};

const FAILED_DIR: &str = "failed";
const SINGLE_DIR: &str = "output";
const STAGE1_DIR: &str = "stage1";
const STAGE2_DIR: &str = "stage2";

/// Output directory naming for one stage.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct StageOutput {
    dir_name: &'static str,
    /// Input directory name that stands for its parent (stage-1 output fed to stage 2).
    collapse_input_dir: Option<&'static str>,
}

impl StageOutput {
    pub fn new(stage: Stage, layout: OutputLayout) -> Self {
        match (layout, stage) {
            (OutputLayout::Single, _) => Self { dir_name: SINGLE_DIR, collapse_input_dir: None },
            (OutputLayout::Staged, Stage::Rotate) => Self { dir_name: STAGE1_DIR, collapse_input_dir: None },
            (OutputLayout::Staged, Stage::Normalize) => Self {
                dir_name: STAGE2_DIR,
                collapse_input_dir: Some(STAGE1_DIR),
            },
        }
    }

    /// Directory the stage directory is created in.
    ///
    /// For stage 2 in the staged layout, an input already inside `stage1/`
    /// resolves to the directory above it, so `photos/stage1/a.jpg` writes to
    /// `photos/stage2/a.jpg`.
    fn base_dir(&self, source: &Path) -> PathBuf {
        let parent = source.parent().unwrap_or_else(|| Path::new(""));
        match (self.collapse_input_dir, parent.file_name()) {
            (Some(collapse), Some(name)) if name == collapse => {
                parent.parent().unwrap_or_else(|| Path::new("")).to_path_buf()
            }
            _ => parent.to_path_buf(),
        }
    }

    fn file_name(source: &Path) -> &std::ffi::OsStr {
        source.file_name().unwrap_or(source.as_os_str())
    }

    pub fn aligned_path(&self, source: &Path) -> PathBuf {
        self.base_dir(source).join(self.dir_name).join(Self::file_name(source))
    }

    pub fn failed_path(&self, source: &Path) -> PathBuf {
        self.base_dir(source)
            .join(self.dir_name)
            .join(FAILED_DIR)
            .join(Self::file_name(source))
    }
}
