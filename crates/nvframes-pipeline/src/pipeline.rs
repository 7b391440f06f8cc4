//! Two-stage encode / write pipeline.
//!
//! Frames submitted with [`TranscodePipeline::encode`] are compressed by the
//! encode pool; each compressed image is then handed to the write pool, which
//! writes it to its destination and drops it, releasing the buffer.

use crate::pool::{PoolConfig, StageHandler, WorkerPool};
use crate::ring::FrameSlot;
use crate::{Error, Result};
use nvframes_av::{CompressedImage, CompressorFactory, FrameCompressor, FrameGeometry};
use std::fs::File;
use std::io::Write;
use std::path::PathBuf;
use std::sync::Arc;
use tracing::debug;

/// Worker counts and queue depth for both stages.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PipelineConfig {
    pub encode_workers: usize,
    pub write_workers: usize,
    pub queue_depth: usize,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            encode_workers: 4,
            write_workers: 4,
            queue_depth: 4,
        }
    }
}

impl PipelineConfig {
    fn encode_pool(&self) -> Result<PoolConfig> {
        PoolConfig::new(self.encode_workers, self.queue_depth)
    }

    fn write_pool(&self) -> Result<PoolConfig> {
        PoolConfig::new(self.write_workers, self.queue_depth)
    }
}

/// A sampled frame waiting to be compressed.
pub struct EncodeTask {
    pub frame: Arc<FrameSlot>,
    pub geometry: FrameGeometry,
    pub destination: PathBuf,
}

/// A compressed frame waiting to be written.
pub struct WriteTask {
    pub image: CompressedImage,
    pub destination: PathBuf,
}

struct EncodeStage {
    factory: Arc<dyn CompressorFactory>,
    compressor: Option<Box<dyn FrameCompressor>>,
    write: Arc<WorkerPool<WriteTask>>,
}

impl StageHandler for EncodeStage {
    type Task = EncodeTask;

    fn setup(&mut self) -> Result<()> {
        self.compressor = Some(self.factory.create()?);
        Ok(())
    }

    fn handle(&mut self, task: EncodeTask) -> Result<()> {
        let EncodeTask {
            frame,
            geometry,
            destination,
        } = task;
        let compressor = self
            .compressor
            .as_mut()
            .ok_or_else(|| Error::invalid_config("encode worker has no compressor"))?;

        let image = compressor.compress(frame.as_bytes(), geometry.width, geometry.height)?;
        // Give the slot back before a possibly blocking hand-off.
        drop(frame);
        self.write.submit(WriteTask { image, destination })
    }

    fn teardown(&mut self) {
        self.compressor = None;
    }
}

struct WriteStage;

impl StageHandler for WriteStage {
    type Task = WriteTask;

    fn handle(&mut self, task: WriteTask) -> Result<()> {
        let WriteTask { image, destination } = task;
        let write = || -> std::io::Result<()> {
            let mut file = File::create(&destination)?;
            file.write_all(image.as_bytes())?;
            file.flush()
        };
        write().map_err(|source| Error::Write {
            path: destination.clone(),
            source,
        })
    }
}

/// Destination for sampled frames.
pub trait FrameSink {
    fn submit(
        &self,
        frame: Arc<FrameSlot>,
        geometry: FrameGeometry,
        destination: PathBuf,
    ) -> Result<()>;
}

/// The encode and write stages of one video.
pub struct TranscodePipeline {
    encode: WorkerPool<EncodeTask>,
    write: Arc<WorkerPool<WriteTask>>,
    compressor: &'static str,
}

impl TranscodePipeline {
    /// Start both pools. Every encode worker creates its own compressor from
    /// `factory`; quality and compressor choice are fixed from here on.
    pub fn start(config: PipelineConfig, factory: Arc<dyn CompressorFactory>) -> Result<Self> {
        let compressor = factory.name();
        let write = Arc::new(WorkerPool::start("write", config.write_pool()?, |_| {
            Ok(WriteStage)
        })?);

        let encode_write = write.clone();
        let encode = WorkerPool::start("encode", config.encode_pool()?, move |_| {
            Ok(EncodeStage {
                factory: factory.clone(),
                compressor: None,
                write: encode_write.clone(),
            })
        })?;

        debug!(
            "Pipeline started: {} encode ({}), {} write, queue depth {}",
            config.encode_workers, compressor, config.write_workers, config.queue_depth
        );
        Ok(Self {
            encode,
            write,
            compressor,
        })
    }

    /// Queue one frame for compression and writing to `destination`.
    ///
    /// Blocks while the target encode worker is full.
    pub fn encode(
        &self,
        frame: Arc<FrameSlot>,
        geometry: FrameGeometry,
        destination: PathBuf,
    ) -> Result<()> {
        self.encode.submit(EncodeTask {
            frame,
            geometry,
            destination,
        })
    }

    /// Frames the encode stage can hold at once.
    pub fn in_flight_limit(&self) -> usize {
        self.encode.config().in_flight_limit()
    }

    /// Name of the compressor in use.
    pub fn compressor(&self) -> &'static str {
        self.compressor
    }

    /// Wait until every submitted frame has been encoded and written.
    pub fn join(&self) -> Result<()> {
        self.encode.join()?;
        self.write.join()
    }

    /// Stop the encode stage, then the write stage.
    pub fn stop(&self) -> Result<()> {
        let encode = self.encode.stop();
        let write = self.write.stop();
        encode.and(write)
    }
}

impl FrameSink for TranscodePipeline {
    fn submit(
        &self,
        frame: Arc<FrameSlot>,
        geometry: FrameGeometry,
        destination: PathBuf,
    ) -> Result<()> {
        self.encode(frame, geometry, destination)
    }
}
