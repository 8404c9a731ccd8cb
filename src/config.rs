use std::path::PathBuf;
use std::time::Duration;

use anyhow::Result;
use serde::Deserialize;

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    pub recording: RecordingConfig,
    pub encoding: EncodingConfig,
    pub compositor: CompositorConfig,
    pub postprocess: PostprocessConfig,
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct RecordingConfig {
    /// Directory new recordings are written into
    pub recordings_path: PathBuf,
    /// Encoder data-emission interval. Tuned for smooth cursor motion.
    pub chunk_interval_ms: u64,
    /// Inset of the camera overlay from the bottom-right corner
    pub overlay_padding_px: u32,
    /// How often overlay metrics are re-read from the camera window
    pub metrics_refresh_ms: u64,
}

impl Default for RecordingConfig {
    fn default() -> Self {
        Self {
            recordings_path: default_recordings_path(),
            chunk_interval_ms: 500,
            overlay_padding_px: 24,
            metrics_refresh_ms: 500,
        }
    }
}

impl RecordingConfig {
    pub fn chunk_interval(&self) -> Duration {
        Duration::from_millis(self.chunk_interval_ms)
    }

    pub fn metrics_refresh(&self) -> Duration {
        Duration::from_millis(self.metrics_refresh_ms.max(1))
    }
}

/// Encoder tunables. The bitrate formula constants are empirical.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct EncodingConfig {
    /// Container/codec candidates, most preferred first
    pub mime_candidates: Vec<String>,
    pub bits_per_pixel_per_frame: f64,
    pub min_video_bitrate: u64,
    pub max_video_bitrate: u64,
    pub audio_bitrate: u64,
    /// Used when the screen track does not report its settings
    pub fallback_width: u32,
    pub fallback_height: u32,
    pub fallback_fps: f64,
}

impl Default for EncodingConfig {
    fn default() -> Self {
        Self {
            mime_candidates: vec![
                "video/mp4;codecs=vp9".to_string(),
                "video/mp4;codecs=vp8".to_string(),
                "video/mp4;codecs=h264".to_string(),
            ],
            bits_per_pixel_per_frame: 0.1,
            min_video_bitrate: 8_000_000,
            max_video_bitrate: 25_000_000,
            audio_bitrate: 192_000,
            fallback_width: 1920,
            fallback_height: 1080,
            fallback_fps: 30.0,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct CompositorConfig {
    /// Upper bound on the compositing rate
    pub max_draw_fps: f64,
    /// Upper bound on the canvas capture rate
    pub max_capture_fps: f64,
    /// Canvas size when the screen stream exposes no metadata
    pub fallback_width: u32,
    pub fallback_height: u32,
    /// Tick of the refresh-driven loop when frame callbacks are unavailable
    pub refresh_interval_ms: u64,
}

impl Default for CompositorConfig {
    fn default() -> Self {
        Self {
            max_draw_fps: 24.0,
            max_capture_fps: 30.0,
            fallback_width: 1920,
            fallback_height: 1080,
            refresh_interval_ms: 16,
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct PostprocessConfig {
    pub enabled: bool,
    /// Locations searched for the ffmpeg binary, in order
    pub ffmpeg_paths: Vec<PathBuf>,
}

impl Default for PostprocessConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            ffmpeg_paths: vec![
                PathBuf::from("binaries/ffmpeg"),
                PathBuf::from("/usr/bin/ffmpeg"),
                PathBuf::from("/usr/local/bin/ffmpeg"),
            ],
        }
    }
}

#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// Filter used when RUST_LOG is not set
    pub filter: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            filter: "info".to_string(),
        }
    }
}

fn default_recordings_path() -> PathBuf {
    std::env::var_os("HOME")
        .map(PathBuf::from)
        .unwrap_or_else(std::env::temp_dir)
        .join("Videos")
        .join("Recordings")
}

impl Config {
    /// Load configuration from an optional file plus `SCREENCAST__` environment overrides
    pub fn load(path: &str) -> Result<Self> {
        let settings = config::Config::builder()
            .add_source(config::File::with_name(path).required(false))
            .add_source(config::Environment::with_prefix("SCREENCAST").separator("__"))
            .build()?;

        Ok(settings.try_deserialize()?)
    }
}
