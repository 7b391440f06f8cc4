use clap::{Args, Parser, Subcommand};
use nvframes::config::Config;
use nvframes_av::CompressorKind;
use nvframes_common::DeviceSelection;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "nvframes")]
#[command(author, version, about = "Extract sampled video frames as JPEG on every GPU")]
pub struct Cli {
    /// Path to config file
    #[arg(short, long, global = true)]
    pub config: Option<PathBuf>,

    /// Enable verbose logging
    #[arg(short, long, global = true)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Extract frames from every video in a list
    Run(RunArgs),

    /// List detected accelerator devices
    Devices,

    /// Extract a single video in this process
    #[command(hide = true)]
    Worker {
        /// JSON-encoded job description
        #[arg(long)]
        job: String,
    },
}

#[derive(Args)]
pub struct RunArgs {
    /// Text file with one video path per line
    pub video_list: PathBuf,

    /// Directory receiving one sub-directory of frames per video
    pub output_dir: PathBuf,

    /// Directory for per-video logs and the success / fail lists
    #[arg(long)]
    pub log_dir: Option<PathBuf>,

    /// Devices to use: `all` or a comma separated list of indices
    #[arg(long)]
    pub devices: Option<DeviceSelection>,

    /// Assume this many devices instead of detecting them
    #[arg(long)]
    pub device_count: Option<usize>,

    /// Encode workers per video
    #[arg(long)]
    pub encode_workers: Option<usize>,

    /// Write workers per video
    #[arg(long)]
    pub write_workers: Option<usize>,

    /// JPEG quality (1-100)
    #[arg(long, value_parser = clap::value_parser!(u8).range(1..=100))]
    pub quality: Option<u8>,

    /// Keep every n-th decoded frame
    #[arg(long)]
    pub interval: Option<u32>,

    /// Per-video time limit in seconds (0 = unlimited)
    #[arg(long)]
    pub timeout: Option<u64>,

    /// Tasks a single worker may hold
    #[arg(long)]
    pub queue_depth: Option<usize>,

    /// Directory with the accelerator runtime libraries
    #[arg(long)]
    pub runtime_path: Option<PathBuf>,

    /// Path to the libturbojpeg shared library
    #[arg(long)]
    pub turbojpeg_path: Option<PathBuf>,

    /// JPEG compressor: auto, turbojpeg or image
    #[arg(long)]
    pub compressor: Option<CompressorKind>,
}

impl RunArgs {
    /// Apply command line overrides on top of the file configuration.
    pub fn apply(&self, config: &mut Config) -> anyhow::Result<()> {
        if let Some(dir) = &self.log_dir {
            config.run.log_dir = Some(dir.clone());
        }
        if let Some(selection) = &self.devices {
            config.devices.selection = selection.clone();
        }
        if let Some(count) = self.device_count {
            config.devices.count = Some(count);
        }
        if let Some(n) = self.encode_workers {
            config.pipeline.encode_workers = n;
        }
        if let Some(n) = self.write_workers {
            config.pipeline.write_workers = n;
        }
        if let Some(quality) = self.quality {
            config.pipeline.quality = nvframes_av::JpegQuality::new(quality)?;
        }
        if let Some(interval) = self.interval {
            config.pipeline.interval = interval;
        }
        if let Some(secs) = self.timeout {
            config.run.timeout_secs = secs;
        }
        if let Some(depth) = self.queue_depth {
            config.pipeline.queue_depth = depth;
        }
        if let Some(path) = &self.runtime_path {
            config.paths.runtime_path = Some(path.clone());
        }
        if let Some(path) = &self.turbojpeg_path {
            config.paths.turbojpeg_path = Some(path.clone());
        }
        if let Some(kind) = self.compressor {
            config.pipeline.compressor = kind;
        }
        Ok(())
    }
}
