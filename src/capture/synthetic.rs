//! Generated media for demos and tests
//!
//! Produces a flat-colour screen whose shade advances every frame, tone
//! audio, and a solid camera feed. Every source can be told to fail so
//! degradation paths are reachable without hardware.

use std::sync::Mutex;
use std::time::Duration;

use anyhow::{bail, Result};
use tokio::sync::broadcast;
use tokio::time::{interval, Instant, MissedTickBehavior};
use tracing::debug;

use super::backend::{CameraConstraints, CaptureBackend, CaptureConstraints, MicConstraints};
use crate::devices::{DeviceDescriptor, DeviceKind};
use crate::media::{
    AudioFrame, AudioStreamSource, DisplayInfo, MediaSource, MediaStream, MediaTrack, SourceKind,
    TrackSettings, VideoFrame,
};

/// Length of each generated audio frame
const AUDIO_FRAME_MS: u64 = 20;

#[derive(Debug, Clone)]
pub struct SyntheticConfig {
    pub screen_width: u32,
    pub screen_height: u32,
    pub screen_fps: f64,
    /// Whether the screen capture carries embedded desktop audio
    pub display_audio: bool,
    /// Whether the screen track offers frame-presentation callbacks
    pub frame_callbacks: bool,
    pub camera_width: u32,
    pub camera_height: u32,
    pub camera_rgba: [u8; 4],
    pub sample_rate: u32,
    pub channels: u16,
    pub fail_display: bool,
    pub fail_system_audio: bool,
    pub fail_mic: bool,
    pub fail_camera: bool,
    pub fail_enumeration: bool,
}

impl Default for SyntheticConfig {
    fn default() -> Self {
        Self {
            screen_width: 1280,
            screen_height: 720,
            screen_fps: 30.0,
            display_audio: false,
            frame_callbacks: true,
            camera_width: 640,
            camera_height: 480,
            camera_rgba: [0, 160, 80, 255],
            sample_rate: 48000,
            channels: 2,
            fail_display: false,
            fail_system_audio: false,
            fail_mic: false,
            fail_camera: false,
            fail_enumeration: false,
        }
    }
}

pub struct SyntheticBackend {
    config: Mutex<SyntheticConfig>,
    devices: Mutex<Vec<DeviceDescriptor>>,
    changes: broadcast::Sender<()>,
    requests: Mutex<Vec<String>>,
}

impl SyntheticBackend {
    pub fn new(config: SyntheticConfig) -> Self {
        Self {
            config: Mutex::new(config),
            devices: Mutex::new(default_devices()),
            changes: broadcast::channel(16).0,
            requests: Mutex::new(Vec::new()),
        }
    }

    /// Change the configuration used by subsequent captures
    pub fn reconfigure(&self, f: impl FnOnce(&mut SyntheticConfig)) {
        if let Ok(mut config) = self.config.lock() {
            f(&mut config);
        }
    }

    /// Simulate a device being connected
    pub fn plug(&self, device: DeviceDescriptor) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.push(device);
        }
        let _ = self.changes.send(());
    }

    /// Simulate a device being disconnected
    pub fn unplug(&self, device_id: &str) {
        if let Ok(mut devices) = self.devices.lock() {
            devices.retain(|d| d.device_id != device_id);
        }
        let _ = self.changes.send(());
    }

    /// Names of the capture calls made so far, in order
    pub fn requests(&self) -> Vec<String> {
        self.requests.lock().map(|r| r.clone()).unwrap_or_default()
    }

    fn record_request(&self, name: String) {
        if let Ok(mut requests) = self.requests.lock() {
            requests.push(name);
        }
    }

    fn config(&self) -> SyntheticConfig {
        self.config.lock().map(|c| c.clone()).unwrap_or_default()
    }
}

impl Default for SyntheticBackend {
    fn default() -> Self {
        Self::new(SyntheticConfig::default())
    }
}

fn default_devices() -> Vec<DeviceDescriptor> {
    let device = |id: &str, group: &str, kind: DeviceKind, label: &str| DeviceDescriptor {
        device_id: id.to_string(),
        group_id: group.to_string(),
        kind,
        label: label.to_string(),
    };

    vec![
        device("default", "mic-group-1", DeviceKind::AudioInput, "Default - Built-in Microphone"),
        device("communications", "mic-group-1", DeviceKind::AudioInput, "Communications - Built-in Microphone"),
        device("mic-1", "mic-group-1", DeviceKind::AudioInput, "Built-in Microphone"),
        device("mic-2", "", DeviceKind::AudioInput, "USB Microphone"),
        device("cam-1", "cam-group-1", DeviceKind::VideoInput, "Integrated Camera"),
    ]
}

#[async_trait::async_trait]
impl CaptureBackend for SyntheticBackend {
    async fn list_sources(&self) -> Result<Vec<MediaSource>> {
        Ok(vec![
            MediaSource {
                id: "screen:0".to_string(),
                name: "Entire Screen".to_string(),
                display_id: Some("0".to_string()),
                thumbnail: Vec::new(),
                kind: SourceKind::Screen,
            },
            MediaSource {
                id: "window:1".to_string(),
                name: "Synthetic Window".to_string(),
                display_id: None,
                thumbnail: Vec::new(),
                kind: SourceKind::Window,
            },
        ])
    }

    async fn displays(&self) -> Result<Vec<DisplayInfo>> {
        let config = self.config();
        Ok(vec![DisplayInfo {
            id: "0".to_string(),
            width: config.screen_width,
            height: config.screen_height,
            scale_factor: 1.0,
        }])
    }

    async fn enumerate_devices(&self) -> Result<Vec<DeviceDescriptor>> {
        if self.config().fail_enumeration {
            bail!("device enumeration unavailable");
        }
        Ok(self.devices.lock().map(|d| d.clone()).unwrap_or_default())
    }

    fn device_changes(&self) -> broadcast::Receiver<()> {
        self.changes.subscribe()
    }

    async fn capture_display(&self, constraints: &CaptureConstraints) -> Result<MediaStream> {
        self.record_request(format!("display:{}", constraints.source_id));
        let config = self.config();
        if config.fail_display {
            bail!("screen capture permission denied");
        }

        let (width, height) = constraints
            .exact_size
            .unwrap_or((config.screen_width, config.screen_height));
        let settings = TrackSettings {
            width: Some(width),
            height: Some(height),
            frame_rate: Some(config.screen_fps),
            ..Default::default()
        };
        let video = if config.frame_callbacks {
            MediaTrack::video("Synthetic Screen", settings)
        } else {
            MediaTrack::refresh_driven_video("Synthetic Screen", settings)
        };
        spawn_screen_producer(video.clone(), width, height, config.screen_fps);

        let mut tracks = vec![video];
        if constraints.audio && config.display_audio {
            let audio = audio_track("Synthetic Desktop Audio", &config);
            spawn_tone_producer(audio.clone(), &config, 440, AudioStreamSource::Display);
            tracks.push(audio);
        }

        Ok(MediaStream::new(tracks))
    }

    async fn capture_system_audio(&self) -> Result<MediaStream> {
        self.record_request("system-audio".to_string());
        let config = self.config();
        if config.fail_system_audio {
            bail!("loopback device busy");
        }
        let track = audio_track("Synthetic Loopback", &config);
        spawn_tone_producer(track.clone(), &config, 330, AudioStreamSource::Loopback);
        Ok(MediaStream::new(vec![track]))
    }

    async fn open_microphone(&self, constraints: &MicConstraints) -> Result<MediaStream> {
        self.record_request(format!("mic:{}", constraints.device_id));
        let config = self.config();
        if config.fail_mic {
            bail!("microphone permission denied");
        }
        let track = audio_track("Synthetic Microphone", &config);
        spawn_tone_producer(track.clone(), &config, 220, AudioStreamSource::Microphone);
        Ok(MediaStream::new(vec![track]))
    }

    async fn open_camera(&self, constraints: &CameraConstraints) -> Result<MediaStream> {
        self.record_request(format!("camera:{}", constraints.device_id));
        let config = self.config();
        if config.fail_camera {
            bail!("camera busy");
        }
        let settings = TrackSettings {
            width: Some(config.camera_width),
            height: Some(config.camera_height),
            frame_rate: Some(constraints.ideal_frame_rate),
            device_id: Some(constraints.device_id.clone()),
            ..Default::default()
        };
        let track = MediaTrack::video("Synthetic Camera", settings);
        spawn_solid_producer(
            track.clone(),
            config.camera_width,
            config.camera_height,
            constraints.ideal_frame_rate,
            config.camera_rgba,
        );
        Ok(MediaStream::new(vec![track]))
    }
}

fn audio_track(label: &str, config: &SyntheticConfig) -> MediaTrack {
    MediaTrack::audio(
        label,
        TrackSettings {
            sample_rate: Some(config.sample_rate),
            channels: Some(config.channels),
            ..Default::default()
        },
    )
}

fn frame_period(fps: f64) -> Duration {
    Duration::from_secs_f64(1.0 / fps.max(1.0))
}

/// Run `produce` on a fixed period until the track is stopped
fn spawn_periodic<F>(track: MediaTrack, period: Duration, mut produce: F)
where
    F: FnMut(&MediaTrack, u64, u64) + Send + 'static,
{
    tokio::spawn(async move {
        let started = Instant::now();
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        let mut index = 0u64;

        loop {
            tokio::select! {
                _ = track.ended() => break,
                _ = ticker.tick() => {
                    let elapsed_ms = started.elapsed().as_millis() as u64;
                    produce(&track, index, elapsed_ms);
                    index += 1;
                }
            }
        }
        debug!("Synthetic producer for {} stopped after {} frames", track.label(), index);
    });
}

fn spawn_screen_producer(track: MediaTrack, width: u32, height: u32, fps: f64) {
    spawn_periodic(track, frame_period(fps), move |track, index, ts| {
        let shade = (index % 200) as u8 + 40;
        track.push_video(VideoFrame::solid(width, height, ts, [shade, shade, shade, 255]));
    });
}

fn spawn_solid_producer(track: MediaTrack, width: u32, height: u32, fps: f64, rgba: [u8; 4]) {
    spawn_periodic(track, frame_period(fps), move |track, _, ts| {
        track.push_video(VideoFrame::solid(width, height, ts, rgba));
    });
}

fn spawn_tone_producer(
    track: MediaTrack,
    config: &SyntheticConfig,
    frequency_hz: u32,
    source: AudioStreamSource,
) {
    let sample_rate = config.sample_rate;
    let channels = config.channels;
    let frames_per_chunk = (sample_rate as u64 * AUDIO_FRAME_MS / 1000) as usize;
    let half_period = (sample_rate / frequency_hz.max(1) / 2).max(1) as u64;
    let mut position = 0u64;

    spawn_periodic(
        track,
        Duration::from_millis(AUDIO_FRAME_MS),
        move |track, _, ts| {
            let mut samples = Vec::with_capacity(frames_per_chunk * channels as usize);
            for _ in 0..frames_per_chunk {
                let value: i16 = if (position / half_period) % 2 == 0 { 2000 } else { -2000 };
                for _ in 0..channels {
                    samples.push(value);
                }
                position += 1;
            }
            track.push_audio(AudioFrame {
                samples,
                sample_rate,
                channels,
                timestamp_ms: ts,
                source,
            });
        },
    );
}
