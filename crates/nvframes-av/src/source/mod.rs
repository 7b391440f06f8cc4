//! Frame sources: the demux / decode / convert / download chain.
//!
//! A [`FrameSource`] is driven synchronously by the producer loop one frame at
//! a time. Decoding and flushing yield opaque surfaces; only surfaces that
//! survive sampling are converted and downloaded into host memory.

#[cfg(feature = "native-ffmpeg")]
pub mod ffmpeg;
pub mod y4m;

use crate::color::ColorParams;
use crate::frame::FrameGeometry;
use crate::{Error, Result};
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::str::FromStr;

pub use y4m::{Y4mSource, Y4mWriter};

/// Result of one demux + decode step.
#[derive(Debug)]
pub enum Decoded<S> {
    /// The decoder produced a surface.
    Frame(S),
    /// A packet was consumed but no surface is ready yet.
    Pending,
    /// The demuxer is exhausted; remaining surfaces must be flushed.
    EndOfStream,
}

/// A decoder bound to one input video.
pub trait FrameSource {
    /// Decoded picture, possibly still in device memory.
    type Surface;

    /// Dimensions of every frame of the stream.
    fn geometry(&self) -> FrameGeometry;

    /// Colour metadata as signalled by the stream (may be unspecified).
    fn color(&self) -> ColorParams;

    /// Demux one packet and feed it to the decoder.
    fn decode_next(&mut self) -> Result<Decoded<Self::Surface>>;

    /// Pull one buffered surface after end of stream; `None` when drained.
    fn flush_next(&mut self) -> Result<Option<Self::Surface>>;

    /// Convert a surface to planar full-range YUV 4:2:0.
    ///
    /// Failures must be reported as [`Error::Conversion`].
    fn convert(&mut self, surface: Self::Surface, color: &ColorParams) -> Result<Self::Surface>;

    /// Copy a converted surface into `dst`, which is exactly
    /// [`FrameGeometry::frame_len`] bytes.
    ///
    /// Failures must be reported as [`Error::Download`].
    fn download(&mut self, surface: &Self::Surface, dst: &mut [u8]) -> Result<()>;
}

/// Which decoder backend opens a video.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum SourceKind {
    /// Pick by file extension: `.y4m` is read directly, anything else goes
    /// through FFmpeg.
    #[default]
    Auto,
    Y4m,
    Ffmpeg,
}

impl SourceKind {
    /// Resolve `Auto` for a concrete input path.
    pub fn for_path(self, path: &Path) -> Self {
        match self {
            Self::Auto => {
                let is_y4m = path
                    .extension()
                    .and_then(|ext| ext.to_str())
                    .map(|ext| ext.eq_ignore_ascii_case("y4m"))
                    .unwrap_or(false);
                if is_y4m {
                    Self::Y4m
                } else {
                    Self::Ffmpeg
                }
            }
            other => other,
        }
    }
}

impl FromStr for SourceKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.to_ascii_lowercase().as_str() {
            "auto" => Ok(Self::Auto),
            "y4m" => Ok(Self::Y4m),
            "ffmpeg" => Ok(Self::Ffmpeg),
            other => Err(Error::InvalidInput(format!("unknown source kind: {other}"))),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_auto_resolves_by_extension() {
        assert_eq!(SourceKind::Auto.for_path(Path::new("a.y4m")), SourceKind::Y4m);
        assert_eq!(SourceKind::Auto.for_path(Path::new("a.Y4M")), SourceKind::Y4m);
        assert_eq!(
            SourceKind::Auto.for_path(Path::new("a.mp4")),
            SourceKind::Ffmpeg
        );
        assert_eq!(SourceKind::Y4m.for_path(Path::new("a.mp4")), SourceKind::Y4m);
    }

    #[test]
    fn test_parse_source_kind() {
        assert_eq!("Y4M".parse::<SourceKind>().unwrap(), SourceKind::Y4m);
        assert!("vpf".parse::<SourceKind>().is_err());
    }
}
