//! One video, start to finish, inside the current process.

use crate::pipeline::{PipelineConfig, TranscodePipeline};
use crate::producer::{FrameProducer, ProducerReport, SamplingInterval};
use crate::ring::FrameRing;
use crate::Result;
use nvframes_av::{CompressorFactory, FrameSource};
use std::path::Path;
use std::sync::Arc;
use tracing::info;

/// Extract sampled frames of `source` as JPEG files into `output_dir`.
///
/// The pipeline is always drained and stopped, also when the producer fails;
/// the producer's error takes precedence over a stage fault.
pub fn extract_frames<S: FrameSource>(
    source: &mut S,
    config: PipelineConfig,
    factory: Arc<dyn CompressorFactory>,
    output_dir: &Path,
    interval: SamplingInterval,
) -> Result<ProducerReport> {
    let pipeline = TranscodePipeline::start(config, factory)?;
    let mut ring =
        FrameRing::for_pipeline(source.geometry().frame_len(), pipeline.in_flight_limit())?;

    let produced = FrameProducer::new(&mut ring, &pipeline, output_dir, interval).run(source);
    let joined = pipeline.join();
    let stopped = pipeline.stop();

    let report = produced?;
    joined?;
    stopped?;

    info!(
        "Wrote {} of {} decoded frames to {}{}",
        report.submitted,
        report.decoded,
        output_dir.display(),
        if report.truncated { " (truncated)" } else { "" }
    );
    Ok(report)
}
