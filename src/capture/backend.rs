use anyhow::Result;
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;

use crate::devices::DeviceDescriptor;
use crate::media::{DisplayInfo, MediaSource, MediaStream};

/// Whether the pointer is rendered into the capture
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CursorMode {
    #[default]
    Always,
    Never,
}

/// Constraints for the primary screen/window capture
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CaptureConstraints {
    pub source_id: String,
    /// Request embedded desktop audio along with the video
    pub audio: bool,
    pub cursor: CursorMode,
    /// Force an exact capture size in physical pixels
    pub exact_size: Option<(u32, u32)>,
    pub min_frame_rate: u32,
    pub max_frame_rate: u32,
}

impl CaptureConstraints {
    pub fn for_source(source_id: &str) -> Self {
        Self {
            source_id: source_id.to_string(),
            audio: true,
            cursor: CursorMode::Always,
            exact_size: None,
            min_frame_rate: 30,
            max_frame_rate: 60,
        }
    }
}

/// Constraints for microphone capture
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct MicConstraints {
    pub device_id: String,
    pub echo_cancellation: bool,
    pub noise_suppression: bool,
    pub auto_gain_control: bool,
}

impl MicConstraints {
    /// Voice-oriented processing, all enabled
    pub fn voice(device_id: &str) -> Self {
        Self {
            device_id: device_id.to_string(),
            echo_cancellation: true,
            noise_suppression: true,
            auto_gain_control: true,
        }
    }
}

/// Constraints for camera capture (video only)
#[derive(Debug, Clone, PartialEq)]
pub struct CameraConstraints {
    pub device_id: String,
    pub ideal_frame_rate: f64,
}

/// Host media capture API.
///
/// Platform implementations wrap the OS screen-capture and device APIs;
/// `SyntheticBackend` provides generated media for demos and tests.
#[async_trait::async_trait]
pub trait CaptureBackend: Send + Sync {
    /// Capturable screens and windows
    async fn list_sources(&self) -> Result<Vec<MediaSource>>;

    /// Physical displays, used to pin capture size
    async fn displays(&self) -> Result<Vec<DisplayInfo>>;

    /// Raw (not deduplicated) audio and video input devices
    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>>;

    /// Fires whenever devices are plugged or unplugged
    fn device_changes(&self) -> broadcast::Receiver<()>;

    /// Primary screen/window capture, possibly with embedded audio
    async fn capture_display(&self, constraints: &CaptureConstraints) -> Result<MediaStream>;

    /// Desktop loopback audio
    async fn capture_system_audio(&self) -> Result<MediaStream>;

    async fn open_microphone(&self, constraints: &MicConstraints) -> Result<MediaStream>;

    async fn open_camera(&self, constraints: &CameraConstraints) -> Result<MediaStream>;
}
