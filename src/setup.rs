// Recording target resolution: where the file goes and how to capture

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use async_trait::async_trait;
use chrono::Utc;
use serde::{Deserialize, Serialize};
use tracing::{debug, info};

use crate::capture::{CaptureBackend, CaptureConstraints};
use crate::error::RecorderError;

/// Output path and capture constraints for one recording
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RecordingTarget {
    pub source_id: String,
    pub source_name: String,
    pub file_path: PathBuf,
    pub constraints: CaptureConstraints,
}

impl RecordingTarget {
    /// Parse a target received over a message channel
    pub fn from_json(payload: &str) -> Result<Self> {
        let target: Self =
            serde_json::from_str(payload).context("Failed to parse recording target")?;
        target.validate()?;
        Ok(target)
    }

    pub fn validate(&self) -> Result<(), RecorderError> {
        let invalid = |reason: &str| Err(RecorderError::InvalidTarget(reason.to_string()));

        if self.source_id.is_empty() {
            return invalid("empty source id");
        }
        if self.constraints.source_id != self.source_id {
            return invalid("constraints refer to a different source");
        }
        if self.file_path.file_name().is_none() {
            return invalid("file path has no file name");
        }
        if self.constraints.min_frame_rate > self.constraints.max_frame_rate {
            return invalid("minimum frame rate above maximum");
        }
        if let Some((w, h)) = self.constraints.exact_size {
            if w == 0 || h == 0 {
                return invalid("zero capture size");
            }
        }
        Ok(())
    }
}

#[async_trait]
pub trait RecordingSetup: Send + Sync {
    async fn request_recording_target(&self, source_id: &str, source_name: &str) -> Result<RecordingTarget>;
}

/// `recording-<name>-<timestamp>.mp4` with non-alphanumerics in the name replaced by `_`
pub fn recording_file_name(source_name: &str, timestamp: &str) -> String {
    let sanitized: String = source_name
        .chars()
        .map(|c| if c.is_ascii_alphanumeric() { c } else { '_' })
        .collect();
    format!("recording-{}-{}.mp4", sanitized, timestamp)
}

/// Resolves targets against the capture backend's sources and displays
pub struct DefaultRecordingSetup {
    backend: Arc<dyn CaptureBackend>,
    recordings_path: PathBuf,
}

impl DefaultRecordingSetup {
    pub fn new(backend: Arc<dyn CaptureBackend>, recordings_path: PathBuf) -> Self {
        Self {
            backend,
            recordings_path,
        }
    }
}

#[async_trait]
impl RecordingSetup for DefaultRecordingSetup {
    async fn request_recording_target(&self, source_id: &str, source_name: &str) -> Result<RecordingTarget> {
        let sources = self.backend.list_sources().await?;
        let source = sources
            .iter()
            .find(|s| s.id == source_id)
            .ok_or_else(|| RecorderError::SourceNotFound(source_id.to_string()))?;

        let timestamp = Utc::now().format("%Y-%m-%dT%H-%M-%S-%3fZ").to_string();
        let file_path = self
            .recordings_path
            .join(recording_file_name(source_name, &timestamp));

        let mut constraints = CaptureConstraints::for_source(&source.id);
        if let Some(display_id) = source.display_id.as_deref().filter(|d| !d.is_empty()) {
            let displays = self.backend.displays().await?;
            match displays.iter().find(|d| d.id == display_id) {
                Some(display) => constraints.exact_size = Some(display.physical_size()),
                None => debug!("Display {} not found; capture size left open", display_id),
            }
        }

        info!("Recording {} to {:?}", source.name, file_path);
        Ok(RecordingTarget {
            source_id: source.id.clone(),
            source_name: source.name.clone(),
            file_path,
            constraints,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::capture::{CursorMode, SyntheticBackend, SyntheticConfig};

    #[test]
    fn test_file_name_sanitized() {
        assert_eq!(
            recording_file_name("Entire Screen: 1", "2026-01-02T03-04-05-678Z"),
            "recording-Entire_Screen__1-2026-01-02T03-04-05-678Z.mp4"
        );
    }

    #[tokio::test]
    async fn test_screen_source_pins_physical_size() -> Result<()> {
        let backend = Arc::new(SyntheticBackend::new(SyntheticConfig {
            screen_width: 1280,
            screen_height: 720,
            ..Default::default()
        }));
        let setup = DefaultRecordingSetup::new(backend, PathBuf::from("/rec"));

        let target = setup.request_recording_target("screen:0", "Entire Screen").await?;
        target.validate()?;
        assert_eq!(target.constraints.exact_size, Some((1280, 720)));
        assert_eq!(target.constraints.cursor, CursorMode::Always);
        assert_eq!(
            (target.constraints.min_frame_rate, target.constraints.max_frame_rate),
            (30, 60)
        );
        assert!(target.file_path.starts_with("/rec"));
        let name = target.file_path.file_name().unwrap().to_string_lossy().to_string();
        assert!(name.starts_with("recording-Entire_Screen-"));
        assert!(name.ends_with(".mp4"));
        Ok(())
    }

    #[tokio::test]
    async fn test_window_source_leaves_size_open() -> Result<()> {
        let setup = DefaultRecordingSetup::new(Arc::new(SyntheticBackend::default()), PathBuf::from("/rec"));
        let target = setup.request_recording_target("window:1", "Synthetic Window").await?;
        assert_eq!(target.constraints.exact_size, None);
        Ok(())
    }

    #[tokio::test]
    async fn test_unknown_source_rejected() {
        let setup = DefaultRecordingSetup::new(Arc::new(SyntheticBackend::default()), PathBuf::from("/rec"));
        let err = setup.request_recording_target("screen:9", "Nope").await.unwrap_err();
        assert!(err.to_string().contains("screen:9"));
    }

    #[test]
    fn test_json_target_validated() {
        let mut target = RecordingTarget {
            source_id: "screen:0".to_string(),
            source_name: "Entire Screen".to_string(),
            file_path: PathBuf::from("/rec/a.mp4"),
            constraints: CaptureConstraints::for_source("screen:0"),
        };
        let json = serde_json::to_string(&target).unwrap();
        assert_eq!(RecordingTarget::from_json(&json).unwrap(), target);

        target.constraints.min_frame_rate = 90;
        let json = serde_json::to_string(&target).unwrap();
        assert!(RecordingTarget::from_json(&json).is_err());
    }
}
