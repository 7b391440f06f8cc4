//! # nvframes-pipeline
//!
//! In-process frame extraction: a synchronous producer feeding two bounded
//! worker pools.
//!
//! ```text
//! FrameSource -> FrameProducer -> FrameRing slot -> encode pool -> write pool -> NNNNNN.jpg
//! ```
//!
//! - [`WorkerPool`]: N threads, each with a queue of depth Q, round robin
//!   dispatch and blocking submission
//! - [`TranscodePipeline`]: the encode and write stages
//! - [`FrameRing`]: reusable host buffers shared with the encode stage
//! - [`FrameProducer`]: the decode / sample / download loop
//!
//! ## Example
//!
//! ```no_run
//! use nvframes_av::source::Y4mSource;
//! use nvframes_av::{open_compressor, CompressorKind, JpegQuality};
//! use nvframes_pipeline::{extract_frames, PipelineConfig, SamplingInterval};
//! use std::path::Path;
//!
//! let mut source = Y4mSource::open(Path::new("clip.y4m"))?;
//! let factory = open_compressor(CompressorKind::Auto, JpegQuality::default(), None)?;
//! let report = extract_frames(
//!     &mut source,
//!     PipelineConfig::default(),
//!     factory,
//!     Path::new("frames"),
//!     SamplingInterval::new(10)?,
//! )?;
//! println!("{} frames written", report.submitted);
//! # Ok::<(), nvframes_pipeline::Error>(())
//! ```

mod error;
mod extract;
pub mod pipeline;
pub mod pool;
pub mod producer;
pub mod ring;

pub use error::{Error, Result};
pub use extract::extract_frames;
pub use pipeline::{EncodeTask, FrameSink, PipelineConfig, TranscodePipeline, WriteTask};
pub use pool::{PoolConfig, StageHandler, WorkerPool};
pub use producer::{FrameProducer, ProducerReport, SamplingInterval};
pub use ring::{FrameRing, FrameSlot};
