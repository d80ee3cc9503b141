use std::path::PathBuf;
use thiserror::Error;

/// Errors produced by the playback library.
///
/// Cancellation is deliberately absent: a stopped run is a normal outcome,
/// reported through [`crate::RunOutcome::Cancelled`].
#[derive(Debug, Error)]
pub enum PlayerError {
    /// The source path is missing, unsupported, or could not be probed.
    #[error("cannot open source {path}: {reason}")]
    SourceOpen { path: PathBuf, reason: String },

    /// A frame failed to decode (or convert) after the source was opened.
    #[error("decode failed at frame {frame}: {reason}")]
    Decode { frame: u64, reason: String },

    /// A configuration value is out of range.
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error(transparent)]
    Io(#[from] std::io::Error),
}

impl PlayerError {
    pub(crate) fn source_open(path: impl Into<PathBuf>, reason: impl Into<String>) -> Self {
        Self::SourceOpen { path: path.into(), reason: reason.into() }
    }

    pub(crate) fn decode(frame: u64, reason: impl Into<String>) -> Self {
        Self::Decode { frame, reason: reason.into() }
    }

    pub(crate) fn config(reason: impl Into<String>) -> Self {
        Self::Config(reason.into())
    }
}

pub type Result<T> = std::result::Result<T, PlayerError>;
