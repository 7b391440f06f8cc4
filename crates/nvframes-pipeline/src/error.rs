//! Error types for nvframes-pipeline.

use std::path::PathBuf;

/// Result type alias using our Error type.
pub type Result<T> = std::result::Result<T, Error>;

/// Errors raised by the worker pools, the frame ring and the producer loop.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    /// A worker of the stage failed or the stage was stopped; no further
    /// tasks are accepted.
    #[error("{stage} stage halted: {reason}")]
    StageHalted { stage: String, reason: String },

    /// A worker thread could not be spawned.
    #[error("failed to spawn worker thread {name}: {source}")]
    Spawn {
        name: String,
        #[source]
        source: std::io::Error,
    },

    /// A worker's handler could not be created or set up.
    #[error("{stage} worker {index} failed to start: {reason}")]
    Setup {
        stage: String,
        index: usize,
        reason: String,
    },

    /// The producer tried to overwrite a frame another stage still holds.
    #[error("frame slot {index} is still referenced by the pipeline")]
    SlotInUse { index: usize },

    /// Writing a compressed frame failed.
    #[error("failed to write {}: {source}", path.display())]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },

    /// Invalid pool, ring or pipeline configuration.
    #[error("invalid configuration: {0}")]
    InvalidConfig(String),

    /// Error from a frame source or compressor.
    #[error(transparent)]
    Av(#[from] nvframes_av::Error),

    /// Error from shared helpers.
    #[error(transparent)]
    Common(#[from] nvframes_common::Error),
}

impl Error {
    /// Create an invalid configuration error.
    pub fn invalid_config(msg: impl Into<String>) -> Self {
        Self::InvalidConfig(msg.into())
    }

    /// Create a stage halted error.
    pub fn halted(stage: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::StageHalted {
            stage: stage.into(),
            reason: reason.into(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_error_display() {
        let err = Error::halted("encode", "worker 2 panicked: boom");
        assert_eq!(err.to_string(), "encode stage halted: worker 2 panicked: boom");

        let err = Error::SlotInUse { index: 3 };
        assert!(err.to_string().contains("slot 3"));
    }

    #[test]
    fn test_av_error_is_transparent() {
        let err: Error = nvframes_av::Error::Decode("corrupt packet".into()).into();
        assert_eq!(err.to_string(), "decode failed: corrupt packet");
    }
}
