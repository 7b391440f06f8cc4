//! The synchronous demux / decode / convert / download loop.
//!
//! Every decoded frame advances a counter starting at 1. Only frames where
//! `(counter - 1) % interval == 0` are converted, downloaded into the ring and
//! handed to the sink under the name `NNNNNN.jpg`. After the demuxer is
//! exhausted the decoder is flushed through the same counter and filter.

use crate::pipeline::FrameSink;
use crate::ring::FrameRing;
use crate::{Error, Result};
use nvframes_av::{Decoded, FrameSource};
use nvframes_common::paths::frame_file_name;
use std::num::NonZeroU32;
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

/// Keep every n-th decoded frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SamplingInterval(NonZeroU32);

impl SamplingInterval {
    pub fn new(interval: u32) -> Result<Self> {
        NonZeroU32::new(interval)
            .map(Self)
            .ok_or_else(|| Error::invalid_config("sampling interval must be at least 1"))
    }

    pub fn get(self) -> u32 {
        self.0.get()
    }

    /// Whether the frame with 1-based `counter` is kept.
    pub fn keeps(self, counter: u64) -> bool {
        counter > 0 && (counter - 1) % u64::from(self.get()) == 0
    }
}

impl Default for SamplingInterval {
    fn default() -> Self {
        Self(NonZeroU32::MIN)
    }
}

/// What one run of the producer did.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ProducerReport {
    /// Frames that came out of the decoder.
    pub decoded: u64,
    /// Frames handed to the sink.
    pub submitted: u64,
    /// A conversion or download failure ended the loop early.
    pub truncated: bool,
}

/// Drives a [`FrameSource`] into a [`FrameSink`] through a [`FrameRing`].
pub struct FrameProducer<'a, K: FrameSink> {
    ring: &'a mut FrameRing,
    sink: &'a K,
    output_dir: PathBuf,
    interval: SamplingInterval,
}

enum Step {
    Continue,
    Truncate,
}

impl<'a, K: FrameSink> FrameProducer<'a, K> {
    pub fn new(
        ring: &'a mut FrameRing,
        sink: &'a K,
        output_dir: impl AsRef<Path>,
        interval: SamplingInterval,
    ) -> Self {
        Self {
            ring,
            sink,
            output_dir: output_dir.as_ref().to_path_buf(),
            interval,
        }
    }

    /// Run until the source is drained or a transfer fails.
    ///
    /// Demux and decode errors are returned; conversion and download failures
    /// end the loop with `truncated` set. Frames already handed to the sink
    /// stay there either way.
    pub fn run<S: FrameSource>(&mut self, source: &mut S) -> Result<ProducerReport> {
        let geometry = source.geometry();
        if self.ring.frame_len() != geometry.frame_len() {
            return Err(Error::invalid_config(format!(
                "ring slots are {} bytes but frames are {}",
                self.ring.frame_len(),
                geometry.frame_len()
            )));
        }
        let color = source.color().resolve();
        debug!(
            "Producing {}x{} frames, interval {}, {:?}",
            geometry.width,
            geometry.height,
            self.interval.get(),
            color
        );

        let mut report = ProducerReport::default();
        loop {
            let surface = match source.decode_next()? {
                Decoded::Frame(surface) => surface,
                Decoded::Pending => continue,
                Decoded::EndOfStream => break,
            };
            if let Step::Truncate = self.forward(source, surface, &color, &mut report)? {
                return Ok(report);
            }
        }

        while let Some(surface) = source.flush_next()? {
            if let Step::Truncate = self.forward(source, surface, &color, &mut report)? {
                return Ok(report);
            }
        }

        debug!(
            "Producer finished: {} decoded, {} submitted",
            report.decoded, report.submitted
        );
        Ok(report)
    }

    fn forward<S: FrameSource>(
        &mut self,
        source: &mut S,
        surface: S::Surface,
        color: &nvframes_av::ColorParams,
        report: &mut ProducerReport,
    ) -> Result<Step> {
        report.decoded += 1;
        let counter = report.decoded;
        if !self.interval.keeps(counter) {
            return Ok(Step::Continue);
        }

        let converted = match source.convert(surface, color) {
            Ok(converted) => converted,
            Err(e) if e.is_transfer_failure() => return Ok(truncate(report, counter, &e)),
            Err(e) => return Err(e.into()),
        };
        match source.download(&converted, self.ring.current_mut()?) {
            Ok(()) => {}
            Err(e) if e.is_transfer_failure() => return Ok(truncate(report, counter, &e)),
            Err(e) => return Err(e.into()),
        }

        let destination = self.output_dir.join(frame_file_name(counter));
        self.sink
            .submit(self.ring.current().clone(), source.geometry(), destination)?;
        self.ring.advance();
        report.submitted += 1;
        Ok(Step::Continue)
    }
}

fn truncate(report: &mut ProducerReport, counter: u64, err: &nvframes_av::Error) -> Step {
    warn!("Stopping at frame {}: {}", counter, err);
    report.truncated = true;
    Step::Truncate
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_interval_three() {
        let interval = SamplingInterval::new(3).unwrap();
        let kept: Vec<u64> = (1..=10).filter(|&n| interval.keeps(n)).collect();
        assert_eq!(kept, vec![1, 4, 7, 10]);
    }

    #[test]
    fn test_interval_one_keeps_everything() {
        let interval = SamplingInterval::default();
        assert_eq!(interval.get(), 1);
        assert!((1..=50).all(|n| interval.keeps(n)));
    }

    #[test]
    fn test_zero_interval_rejected() {
        assert!(SamplingInterval::new(0).is_err());
    }
}
