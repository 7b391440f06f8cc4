//! Error types for nvframes-av.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by frame sources, compressors and device discovery.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A native library could not be located or loaded.
    #[error("library not available: {name}: {message}")]
    LibraryUnavailable { name: String, message: String },

    /// The specified file was not found.
    #[error("file not found: {}", path.display())]
    FileNotFound { path: PathBuf },

    /// Demuxing or decoding failed.
    #[error("decode failed: {0}")]
    Decode(String),

    /// Colorspace conversion of a decoded surface failed.
    #[error("conversion failed: {0}")]
    Conversion(String),

    /// Copying a converted surface to host memory failed.
    #[error("download failed: {0}")]
    Download(String),

    /// The compressor rejected a frame.
    #[error("compression failed: {0}")]
    Compress(String),

    /// An I/O error occurred.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Invalid input provided.
    #[error("invalid input: {0}")]
    InvalidInput(String),

    /// Unsupported operation or format.
    #[error("unsupported: {0}")]
    Unsupported(String),

    /// FFmpeg library error.
    #[cfg(feature = "native-ffmpeg")]
    #[error("FFmpeg error: {0}")]
    FFmpeg(String),
}

impl Error {
    /// Create a library unavailable error.
    pub fn library_unavailable(name: impl Into<String>, message: impl Into<String>) -> Self {
        Self::LibraryUnavailable {
            name: name.into(),
            message: message.into(),
        }
    }

    /// Create a file not found error.
    pub fn file_not_found(path: impl Into<PathBuf>) -> Self {
        Self::FileNotFound { path: path.into() }
    }

    /// Whether this error came from the convert or download step.
    ///
    /// The producer loop ends early on these instead of propagating them.
    pub fn is_transfer_failure(&self) -> bool {
        matches!(self, Self::Conversion(_) | Self::Download(_))
    }
}

#[cfg(feature = "native-ffmpeg")]
impl From<ffmpeg_the_third::Error> for Error {
    fn from(err: ffmpeg_the_third::Error) -> Self {
        Error::FFmpeg(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_transfer_failure_classification() {
        assert!(Error::Conversion("x".into()).is_transfer_failure());
        assert!(Error::Download("x".into()).is_transfer_failure());
        assert!(!Error::Decode("x".into()).is_transfer_failure());
        assert!(!Error::Compress("x".into()).is_transfer_failure());
    }

    #[test]
    fn test_library_unavailable_display() {
        let err = Error::library_unavailable("turbojpeg", "no such file");
        assert_eq!(
            err.to_string(),
            "library not available: turbojpeg: no such file"
        );
    }
}
