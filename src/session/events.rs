use std::path::PathBuf;

use serde::{Deserialize, Serialize};

use super::stats::OutputMode;

/// Controller lifecycle state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RecorderState {
    Idle,
    Starting,
    Recording,
    Paused,
    Stopping,
    /// Transient: a fatal failure is being cleaned up
    Error,
}

impl RecorderState {
    /// Whether a session currently owns the capture devices
    pub fn is_active(&self) -> bool {
        !matches!(self, RecorderState::Idle)
    }
}

/// Notifications for the presentation layer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionEvent {
    Started { path: PathBuf, mode: OutputMode },
    Paused,
    Resumed,
    /// The recording is on disk at `path`
    Saved { path: PathBuf },
    /// Saving or post-processing failed; `path` is the raw file if one was kept
    SaveFailed { path: Option<PathBuf>, message: String },
    /// The session could not start or died mid-recording
    Failed { message: String },
    /// A start request was refused without side effects
    Rejected { reason: String },
    /// All resources are released and the controller is idle again
    Ended,
}
