//! Description of one video job handed to a worker process.

use crate::config::{Config, PipelineSettings};
use anyhow::{Context, Result};
use nvframes_common::paths::video_dir_name;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Everything a worker process needs to extract one video.
///
/// Serialized as JSON on the worker's command line.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerJob {
    pub video: PathBuf,
    /// Root output directory; frames go to `<output_root>/<video name>/`.
    pub output_root: PathBuf,
    #[serde(default)]
    pub log_root: Option<PathBuf>,
    pub device: usize,
    pub pipeline: PipelineSettings,
    #[serde(default)]
    pub turbojpeg_path: Option<PathBuf>,
}

impl WorkerJob {
    /// Job for `video` on `device` using the run's settings.
    pub fn new(video: &Path, device: usize, output_root: &Path, config: &Config) -> Self {
        Self {
            video: video.to_path_buf(),
            output_root: output_root.to_path_buf(),
            log_root: config.run.log_dir.clone(),
            device,
            pipeline: config.pipeline.clone(),
            turbojpeg_path: config.paths.turbojpeg_path.clone(),
        }
    }

    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string(self).context("Failed to encode worker job")
    }

    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json).context("Failed to decode worker job")
    }

    /// Directory receiving this video's frames.
    pub fn output_dir(&self) -> Result<PathBuf> {
        Ok(self.output_root.join(video_dir_name(&self.video)?))
    }

    /// Directory receiving this video's log and success marker.
    pub fn log_dir(&self) -> Result<Option<PathBuf>> {
        match &self.log_root {
            Some(root) => Ok(Some(root.join(video_dir_name(&self.video)?))),
            None => Ok(None),
        }
    }
}
