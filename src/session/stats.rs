use std::path::PathBuf;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tokio::time::Instant;

/// Where encoded chunks go for the current session
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OutputMode {
    /// Appended to a partial file as they arrive
    Streaming,
    /// Held in memory and saved in one piece on stop
    Memory,
}

/// Statistics about a recording session
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct SessionStats {
    /// When the recording started
    pub started_at: DateTime<Utc>,

    /// Recorded time, excluding paused spans
    pub elapsed_secs: f64,

    /// `mm:ss` form of `elapsed_secs`
    pub elapsed_label: String,

    /// Number of encoded chunks received
    pub chunks: u64,

    /// Total encoded bytes received
    pub bytes: u64,

    pub mode: OutputMode,

    /// Final path of the recording
    pub path: PathBuf,

    pub paused: bool,
}

/// `mm:ss`, minutes not wrapped at the hour
pub fn format_elapsed(elapsed: Duration) -> String {
    let secs = elapsed.as_secs();
    format!("{:02}:{:02}", secs / 60, secs % 60)
}

/// Wall-clock recording time that stands still while paused
#[derive(Debug, Clone)]
pub(crate) struct SessionClock {
    started_at: DateTime<Utc>,
    started: Instant,
    paused_since: Option<Instant>,
    paused_total: Duration,
}

impl SessionClock {
    pub(crate) fn start() -> Self {
        Self {
            started_at: Utc::now(),
            started: Instant::now(),
            paused_since: None,
            paused_total: Duration::ZERO,
        }
    }

    pub(crate) fn started_at(&self) -> DateTime<Utc> {
        self.started_at
    }

    pub(crate) fn pause(&mut self) {
        if self.paused_since.is_none() {
            self.paused_since = Some(Instant::now());
        }
    }

    pub(crate) fn resume(&mut self) {
        if let Some(since) = self.paused_since.take() {
            self.paused_total += since.elapsed();
        }
    }

    pub(crate) fn is_paused(&self) -> bool {
        self.paused_since.is_some()
    }

    pub(crate) fn elapsed(&self) -> Duration {
        let now = Instant::now();
        let paused_now = self
            .paused_since
            .map(|since| now.duration_since(since))
            .unwrap_or_default();
        now.duration_since(self.started)
            .saturating_sub(self.paused_total + paused_now)
    }
}
