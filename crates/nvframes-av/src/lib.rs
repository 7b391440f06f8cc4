//! # nvframes-av
//!
//! The collaborators of the frame extraction pipeline.
//!
//! This crate provides:
//! - [`FrameSource`]: the decode / convert / download chain for one video,
//!   with a YUV4MPEG2 reader and, behind `native-ffmpeg`, a CUDA decoder
//! - [`FrameCompressor`]: stateful JPEG compressors producing
//!   [`CompressedImage`] buffers (libturbojpeg or pure Rust)
//! - [`devices`]: accelerator discovery
//!
//! ## Features
//!
//! - `native-ffmpeg` - hardware decoding through FFmpeg with a CUDA device
//! - `tracing` - Enable tracing support
//!
//! ## Example
//!
//! ```no_run
//! use nvframes_av::{open_compressor, CompressorKind, JpegQuality};
//!
//! let factory = open_compressor(CompressorKind::Auto, JpegQuality::new(85)?, None)?;
//! let mut compressor = factory.create()?;
//! let frame = vec![128u8; 64 * 48 * 3 / 2];
//! let jpeg = compressor.compress(&frame, 64, 48)?;
//! println!("{} bytes", jpeg.len());
//! # Ok::<(), nvframes_av::Error>(())
//! ```

pub mod color;
pub mod compress;
pub mod devices;
mod error;
pub mod frame;
pub mod source;

// Re-exports
pub use color::{ColorParams, ColorRange, ColorSpace};
pub use compress::{
    open_compressor, CompressedImage, CompressorFactory, CompressorKind, FrameCompressor,
    JpegQuality, NativeAllocator,
};
pub use devices::{list_devices, DeviceInfo};
pub use error::{Error, Result};
pub use frame::FrameGeometry;
pub use source::{Decoded, FrameSource, SourceKind};
