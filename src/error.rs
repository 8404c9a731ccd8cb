use std::path::PathBuf;

use thiserror::Error;

/// Errors from the chunked disk writer
#[derive(Debug, Error)]
pub enum WriterError {
    #[error("recording stream already open for {0}")]
    AlreadyOpen(PathBuf),

    #[error("recording stream not opened for {0}")]
    NotOpen(PathBuf),

    #[error("I/O error on {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
}

impl WriterError {
    pub(crate) fn io(path: impl Into<PathBuf>, source: std::io::Error) -> Self {
        Self::Io {
            path: path.into(),
            source,
        }
    }
}

/// Reasons a recording session cannot start
#[derive(Debug, Error)]
pub enum RecorderError {
    #[error("no capture source selected")]
    NoSourceSelected,

    #[error("a recording session is already active")]
    SessionActive,

    #[error("no supported encoding format among {0:?}")]
    NoSupportedFormat(Vec<String>),

    #[error("source with ID {0} not found")]
    SourceNotFound(String),

    #[error("invalid recording target: {0}")]
    InvalidTarget(String),

    #[error("primary capture stream has no video track")]
    NoVideoTrack,

    #[error("failed to start recording: {0}")]
    StartFailed(String),

    #[error("recorder controller is not running")]
    ControllerGone,
}
