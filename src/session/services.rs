use std::sync::Arc;

use anyhow::Result;
use async_trait::async_trait;

use crate::audio::AudioGraphFactory;
use crate::capture::CaptureBackend;
use crate::encode::EncoderFactory;
use crate::postprocess::MetadataFixer;
use crate::setup::RecordingSetup;
use crate::storage::DiskSink;
use crate::video::{CameraMetrics, CameraPreview, OverlayMetrics};

/// Hides the application's own windows from screen capture
#[async_trait]
pub trait CaptureExclusion: Send + Sync {
    async fn set_self_capture_excluded(&self, excluded: bool) -> Result<()>;
}

/// Collaborators the session controller drives
#[derive(Clone)]
pub struct RecorderServices {
    pub backend: Arc<dyn CaptureBackend>,
    pub setup: Arc<dyn RecordingSetup>,
    pub sink: Arc<dyn DiskSink>,
    pub fixer: Arc<dyn MetadataFixer>,
    pub encoders: Arc<dyn EncoderFactory>,
    pub audio_graphs: Arc<dyn AudioGraphFactory>,
    pub camera_metrics: Arc<dyn CameraMetrics>,
    pub camera_preview: Arc<dyn CameraPreview>,
    pub exclusion: Arc<dyn CaptureExclusion>,
}

/// Headless stand-in for the camera window: fixed metrics, never open
pub struct HeadlessCameraWindow {
    metrics: Option<OverlayMetrics>,
}

impl HeadlessCameraWindow {
    pub fn new(metrics: Option<OverlayMetrics>) -> Self {
        Self { metrics }
    }
}

#[async_trait]
impl CameraMetrics for HeadlessCameraWindow {
    async fn overlay_metrics(&self) -> Result<Option<OverlayMetrics>> {
        Ok(self.metrics)
    }
}

#[async_trait]
impl CameraPreview for HeadlessCameraWindow {
    async fn is_open(&self) -> bool {
        false
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }

    async fn open(&self, _camera_id: &str) -> Result<()> {
        Ok(())
    }
}

/// For hosts without window exclusion support
pub struct NoCaptureExclusion;

#[async_trait]
impl CaptureExclusion for NoCaptureExclusion {
    async fn set_self_capture_excluded(&self, _excluded: bool) -> Result<()> {
        Ok(())
    }
}
