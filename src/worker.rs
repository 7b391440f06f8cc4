//! Worker process entry: extracts one video inside this process.

use crate::job::WorkerJob;
use anyhow::{Context, Result};
use nvframes_av::source::Y4mSource;
use nvframes_av::{open_compressor, SourceKind};
use nvframes_pipeline::{extract_frames, PipelineConfig, ProducerReport, SamplingInterval};
use std::fs::{File, OpenOptions};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use tracing_subscriber::fmt::writer::MakeWriterExt;
use tracing_subscriber::EnvFilter;

/// Marker file written into the per-video log directory after a clean run.
pub const SUCCESS_MARKER: &str = "success";

/// Log file inside the per-video log directory.
pub const LOG_FILE: &str = "output.log";

/// Where the worker's log output goes: stderr, optionally tee'd to a file.
pub struct LogSink {
    file: Option<File>,
}

impl LogSink {
    pub fn stderr() -> Self {
        Self { file: None }
    }

    /// Stderr plus `path`, appended to.
    pub fn tee(path: &Path) -> Result<Self> {
        let file = OpenOptions::new()
            .create(true)
            .append(true)
            .open(path)
            .with_context(|| format!("Failed to open log file: {:?}", path))?;
        Ok(Self { file: Some(file) })
    }

    /// Install the global subscriber writing to this sink.
    pub fn init(self, filter: EnvFilter) -> Result<()> {
        let installed = match self.file {
            Some(file) => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_ansi(false)
                .with_writer(std::io::stderr.and(Mutex::new(file)))
                .try_init(),
            None => tracing_subscriber::fmt()
                .with_env_filter(filter)
                .with_writer(std::io::stderr)
                .try_init(),
        };
        installed.map_err(|e| anyhow::anyhow!("Failed to install log subscriber: {e}"))
    }
}

/// Remove a stale success marker and make sure the log directory exists.
///
/// Returns the sink to log into.
pub fn prepare_log_dir(log_dir: Option<&Path>) -> Result<LogSink> {
    let Some(dir) = log_dir else {
        return Ok(LogSink::stderr());
    };
    std::fs::create_dir_all(dir)
        .with_context(|| format!("Failed to create log directory: {:?}", dir))?;

    let marker = dir.join(SUCCESS_MARKER);
    match std::fs::remove_file(&marker) {
        Ok(()) => {}
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => return Err(e).with_context(|| format!("Failed to remove {:?}", marker)),
    }
    LogSink::tee(&dir.join(LOG_FILE))
}

/// Extract the job's video. Does not touch logging or markers.
pub fn run_job(job: &WorkerJob) -> Result<ProducerReport> {
    let output_dir = job.output_dir()?;
    std::fs::create_dir_all(&output_dir)
        .with_context(|| format!("Failed to create output directory: {:?}", output_dir))?;

    let settings = &job.pipeline;
    let factory = open_compressor(
        settings.compressor,
        settings.quality,
        job.turbojpeg_path.as_deref(),
    )
    .context("Failed to set up JPEG compressor")?;
    let config = PipelineConfig {
        encode_workers: settings.encode_workers,
        write_workers: settings.write_workers,
        queue_depth: settings.queue_depth,
    };
    let interval = SamplingInterval::new(settings.interval)?;

    tracing::info!(
        "Extracting {:?} on device {} into {:?} ({} compressor, quality {})",
        job.video,
        job.device,
        output_dir,
        factory.name(),
        settings.quality.get()
    );

    let report = match settings.source.for_path(&job.video) {
        SourceKind::Y4m | SourceKind::Auto => {
            let mut source = Y4mSource::open(&job.video)?;
            extract_frames(&mut source, config, factory, &output_dir, interval)?
        }
        SourceKind::Ffmpeg => open_ffmpeg(job, config, factory, &output_dir, interval)?,
    };
    Ok(report)
}

#[cfg(feature = "native-ffmpeg")]
fn open_ffmpeg(
    job: &WorkerJob,
    config: PipelineConfig,
    factory: std::sync::Arc<dyn nvframes_av::CompressorFactory>,
    output_dir: &Path,
    interval: SamplingInterval,
) -> Result<ProducerReport> {
    let mut source = nvframes_av::source::ffmpeg::FfmpegSource::open(&job.video, job.device)?;
    Ok(extract_frames(&mut source, config, factory, output_dir, interval)?)
}

#[cfg(not(feature = "native-ffmpeg"))]
fn open_ffmpeg(
    job: &WorkerJob,
    _config: PipelineConfig,
    _factory: std::sync::Arc<dyn nvframes_av::CompressorFactory>,
    _output_dir: &Path,
    _interval: SamplingInterval,
) -> Result<ProducerReport> {
    anyhow::bail!(
        "{:?} needs hardware decoding; rebuild with the native-ffmpeg feature",
        job.video
    )
}

/// Full worker lifecycle. Returns the process exit code.
///
/// Exit 0 only when every frame was extracted and the pipeline drained
/// cleanly; the success marker is written only in that case.
pub fn main(job_json: &str, filter: EnvFilter) -> Result<i32> {
    let job = WorkerJob::from_json(job_json)?;
    let log_dir: Option<PathBuf> = job.log_dir()?;
    prepare_log_dir(log_dir.as_deref())?.init(filter)?;

    match run_job(&job) {
        Ok(report) if !report.truncated => {
            if let Some(dir) = &log_dir {
                File::create(dir.join(SUCCESS_MARKER))
                    .with_context(|| format!("Failed to write success marker in {:?}", dir))?;
            }
            tracing::info!("{:?} done: {} frames", job.video, report.submitted);
            Ok(0)
        }
        Ok(report) => {
            tracing::error!(
                "{:?} truncated after {} frames ({} submitted)",
                job.video,
                report.decoded,
                report.submitted
            );
            Ok(1)
        }
        Err(e) => {
            tracing::error!("{:?} failed: {:#}", job.video, e);
            Ok(1)
        }
    }
}
