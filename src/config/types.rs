use nvframes_av::{CompressorKind, JpegQuality, SourceKind};
use nvframes_common::DeviceSelection;
use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct Config {
    #[serde(default)]
    pub pipeline: PipelineSettings,

    #[serde(default)]
    pub devices: DevicesConfig,

    #[serde(default)]
    pub run: RunConfig,

    #[serde(default)]
    pub paths: PathsConfig,
}

/// Per-video pipeline settings, fixed for the lifetime of each job.
#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct PipelineSettings {
    #[serde(default = "default_workers")]
    pub encode_workers: usize,

    #[serde(default = "default_workers")]
    pub write_workers: usize,

    /// Tasks a single worker may hold (queued or executing)
    #[serde(default = "default_queue_depth")]
    pub queue_depth: usize,

    #[serde(default)]
    pub quality: JpegQuality,

    /// Keep every n-th decoded frame
    #[serde(default = "default_interval")]
    pub interval: u32,

    #[serde(default)]
    pub compressor: CompressorKind,

    #[serde(default)]
    pub source: SourceKind,
}

fn default_workers() -> usize {
    4
}

fn default_queue_depth() -> usize {
    4
}

fn default_interval() -> u32 {
    1
}

impl Default for PipelineSettings {
    fn default() -> Self {
        Self {
            encode_workers: default_workers(),
            write_workers: default_workers(),
            queue_depth: default_queue_depth(),
            quality: JpegQuality::default(),
            interval: default_interval(),
            compressor: CompressorKind::default(),
            source: SourceKind::default(),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct DevicesConfig {
    /// `all` or a comma separated list of indices
    #[serde(default)]
    pub selection: DeviceSelection,

    /// Skip detection and assume this many devices
    #[serde(default)]
    pub count: Option<usize>,
}

#[derive(Debug, Clone, PartialEq, Eq, Deserialize, Serialize)]
pub struct RunConfig {
    /// Per-video wall clock limit in seconds; 0 disables it
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    #[serde(default)]
    pub log_dir: Option<PathBuf>,
}

fn default_timeout_secs() -> u64 {
    3600
}

impl Default for RunConfig {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            log_dir: None,
        }
    }
}

impl RunConfig {
    /// The per-video timeout, `None` when unlimited.
    pub fn timeout(&self) -> Option<Duration> {
        (self.timeout_secs > 0).then(|| Duration::from_secs(self.timeout_secs))
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Deserialize, Serialize)]
pub struct PathsConfig {
    /// Directory holding the accelerator runtime libraries
    #[serde(default)]
    pub runtime_path: Option<PathBuf>,

    /// Explicit libturbojpeg shared library
    #[serde(default)]
    pub turbojpeg_path: Option<PathBuf>,
}

impl PathsConfig {
    /// Directories to prepend to the worker's library search path.
    pub fn library_dirs(&self) -> Vec<PathBuf> {
        let mut dirs = Vec::new();
        if let Some(runtime) = &self.runtime_path {
            dirs.push(runtime.clone());
        }
        if let Some(parent) = self
            .turbojpeg_path
            .as_deref()
            .and_then(|p| p.parent())
            .filter(|p| !p.as_os_str().is_empty())
        {
            dirs.push(parent.to_path_buf());
        }
        dirs
    }
}
