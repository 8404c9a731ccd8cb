// Shared fakes for the integration tests
#![allow(dead_code)]

use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::{bail, Result};
use async_trait::async_trait;
use screencast_recorder::audio::{AudioGraph, AudioGraphFactory, PcmGraphFactory};
use screencast_recorder::capture::{CaptureConstraints, SyntheticBackend};
use screencast_recorder::encode::{Encoder, EncoderEvent, EncoderFactory, EncoderOptions, EncoderState};
use screencast_recorder::media::{MediaSource, MediaStream, SourceKind};
use screencast_recorder::postprocess::MetadataFixer;
use screencast_recorder::session::{CaptureExclusion, RecorderServices, SessionEvent};
use screencast_recorder::setup::{RecordingSetup, RecordingTarget};
use screencast_recorder::storage::{ChunkedDiskWriter, DiskSink};
use screencast_recorder::video::{CameraMetrics, CameraPreview, OverlayMetrics};
use screencast_recorder::WriterError;
use tokio::sync::{broadcast, mpsc};

pub fn screen_source() -> MediaSource {
    MediaSource {
        id: "screen:0".to_string(),
        name: "Entire Screen".to_string(),
        display_id: Some("0".to_string()),
        thumbnail: Vec::new(),
        kind: SourceKind::Screen,
    }
}

/// Wait for the next event matching `pred`, failing after a few seconds
pub async fn wait_for_event(
    events: &mut broadcast::Receiver<SessionEvent>,
    pred: impl Fn(&SessionEvent) -> bool,
) -> SessionEvent {
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) if pred(&event) => return event,
                Ok(_) | Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("timed out waiting for session event")
}

/// Collect every event up to and including `Ended`
pub async fn events_until_ended(events: &mut broadcast::Receiver<SessionEvent>) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    tokio::time::timeout(Duration::from_secs(5), async {
        loop {
            match events.recv().await {
                Ok(event) => {
                    let ended = event == SessionEvent::Ended;
                    seen.push(event);
                    if ended {
                        return;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(_)) => {}
                Err(broadcast::error::RecvError::Closed) => panic!("event channel closed"),
            }
        }
    })
    .await
    .expect("session did not end");
    seen
}

/// Everything emitted within `window`, for checking that nothing else follows
pub async fn events_within(
    events: &mut broadcast::Receiver<SessionEvent>,
    window: Duration,
) -> Vec<SessionEvent> {
    let mut seen = Vec::new();
    let _ = tokio::time::timeout(window, async {
        while let Ok(event) = events.recv().await {
            seen.push(event);
        }
    })
    .await;
    seen
}

/// Encoder driven by the test: chunks and errors are injected by hand
#[derive(Clone, Default)]
pub struct ScriptedEncoders {
    shared: Arc<Mutex<ScriptState>>,
}

#[derive(Default)]
struct ScriptState {
    sender: Option<mpsc::UnboundedSender<EncoderEvent>>,
    options: Vec<EncoderOptions>,
    streams: Vec<MediaStream>,
    supported: Option<Vec<String>>,
    fail_start: bool,
    final_chunk: Option<Vec<u8>>,
    hold_stopped: bool,
}

impl ScriptedEncoders {
    pub fn supporting(types: &[&str]) -> Self {
        let encoders = Self::default();
        encoders.shared.lock().unwrap().supported =
            Some(types.iter().map(|t| t.to_string()).collect());
        encoders
    }

    pub fn failing_start() -> Self {
        let encoders = Self::default();
        encoders.shared.lock().unwrap().fail_start = true;
        encoders
    }

    /// Chunk delivered between `stop()` and `Stopped`
    pub fn set_final_chunk(&self, bytes: &[u8]) {
        self.shared.lock().unwrap().final_chunk = Some(bytes.to_vec());
    }

    /// `stop()` no longer reports `Stopped`; the test sends it when it wants
    pub fn hold_stopped(&self) {
        self.shared.lock().unwrap().hold_stopped = true;
    }

    /// Send an event if the controller is still listening
    pub fn try_emit(&self, event: EncoderEvent) -> bool {
        let shared = self.shared.lock().unwrap();
        shared
            .sender
            .as_ref()
            .is_some_and(|sender| sender.send(event).is_ok())
    }

    pub fn emit(&self, event: EncoderEvent) {
        let shared = self.shared.lock().unwrap();
        let sender = shared.sender.as_ref().expect("encoder not started");
        sender.send(event).expect("controller dropped encoder events");
    }

    pub fn emit_chunk(&self, bytes: &[u8]) {
        self.emit(EncoderEvent::DataAvailable(bytes.to_vec()));
    }

    pub fn last_options(&self) -> Option<EncoderOptions> {
        self.shared.lock().unwrap().options.last().cloned()
    }

    pub fn last_stream(&self) -> Option<MediaStream> {
        self.shared.lock().unwrap().streams.last().cloned()
    }
}

impl EncoderFactory for ScriptedEncoders {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        match &self.shared.lock().unwrap().supported {
            Some(types) => types.iter().any(|t| t == mime_type),
            None => true,
        }
    }

    fn create(&self, stream: MediaStream, options: &EncoderOptions) -> Result<Box<dyn Encoder>> {
        let mut shared = self.shared.lock().unwrap();
        shared.options.push(options.clone());
        shared.streams.push(stream);
        Ok(Box::new(ScriptedEncoder {
            shared: self.shared.clone(),
            state: EncoderState::Inactive,
        }))
    }
}

struct ScriptedEncoder {
    shared: Arc<Mutex<ScriptState>>,
    state: EncoderState,
}

impl Encoder for ScriptedEncoder {
    fn state(&self) -> EncoderState {
        self.state
    }

    fn start(&mut self, _timeslice: Duration, events: mpsc::UnboundedSender<EncoderEvent>) -> Result<()> {
        let mut shared = self.shared.lock().unwrap();
        if shared.fail_start {
            bail!("constraints rejected by encoder");
        }
        shared.sender = Some(events);
        self.state = EncoderState::Recording;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        self.state = EncoderState::Paused;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        self.state = EncoderState::Recording;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        let shared = self.shared.lock().unwrap();
        if let Some(sender) = &shared.sender {
            if let Some(chunk) = &shared.final_chunk {
                let _ = sender.send(EncoderEvent::DataAvailable(chunk.clone()));
            }
            if !shared.hold_stopped {
                let _ = sender.send(EncoderEvent::Stopped);
            }
        }
        self.state = EncoderState::Inactive;
        Ok(())
    }
}

/// Real disk writer with per-chunk latency and optional open failure.
///
/// Chunk `n` (by its first byte) waits `(10 - n) * 5ms`, so earlier chunks
/// finish last if writes were ever run concurrently.
pub struct SlowSink {
    inner: ChunkedDiskWriter,
    pub fail_open: bool,
    saves: Mutex<Vec<(PathBuf, usize)>>,
}

impl SlowSink {
    pub fn new() -> Self {
        Self {
            inner: ChunkedDiskWriter::new(),
            fail_open: false,
            saves: Mutex::new(Vec::new()),
        }
    }

    pub fn refusing_open() -> Self {
        Self {
            fail_open: true,
            ..Self::new()
        }
    }

    pub fn saves(&self) -> Vec<(PathBuf, usize)> {
        self.saves.lock().unwrap().clone()
    }
}

#[async_trait]
impl DiskSink for SlowSink {
    async fn open(&self, path: &Path) -> Result<PathBuf, WriterError> {
        if self.fail_open {
            return Err(WriterError::Io {
                path: path.to_path_buf(),
                source: std::io::Error::new(std::io::ErrorKind::PermissionDenied, "read-only volume"),
            });
        }
        self.inner.open(path).await
    }

    async fn write(&self, path: &Path, bytes: &[u8]) -> Result<(), WriterError> {
        let n = bytes.first().copied().unwrap_or(0).min(10) as u64;
        tokio::time::sleep(Duration::from_millis((10 - n) * 5)).await;
        self.inner.write(path, bytes).await
    }

    async fn close(&self, path: &Path) -> Result<(), WriterError> {
        self.inner.close(path).await
    }

    async fn finalize(&self, path: &Path) -> Result<PathBuf, WriterError> {
        self.inner.finalize(path).await
    }

    async fn delete_partial(&self, path: &Path) -> Result<(), WriterError> {
        self.inner.delete_partial(path).await
    }

    async fn save(&self, path: &Path, bytes: &[u8]) -> Result<PathBuf, WriterError> {
        self.saves.lock().unwrap().push((path.to_path_buf(), bytes.len()));
        self.inner.save(path, bytes).await
    }
}

/// Fixed target inside a test directory
pub struct FixedSetup {
    pub file_path: PathBuf,
}

#[async_trait]
impl RecordingSetup for FixedSetup {
    async fn request_recording_target(&self, source_id: &str, source_name: &str) -> Result<RecordingTarget> {
        Ok(RecordingTarget {
            source_id: source_id.to_string(),
            source_name: source_name.to_string(),
            file_path: self.file_path.clone(),
            constraints: CaptureConstraints::for_source(source_id),
        })
    }
}

/// Camera window that can be open or closed and reports fixed metrics
pub struct FakeCameraWindow {
    open: Mutex<bool>,
    metrics: Option<OverlayMetrics>,
    calls: Mutex<Vec<String>>,
}

impl FakeCameraWindow {
    pub fn new(open: bool, metrics: Option<OverlayMetrics>) -> Self {
        Self {
            open: Mutex::new(open),
            metrics,
            calls: Mutex::new(Vec::new()),
        }
    }

    pub fn calls(&self) -> Vec<String> {
        self.calls.lock().unwrap().clone()
    }

    pub fn is_open_now(&self) -> bool {
        *self.open.lock().unwrap()
    }
}

#[async_trait]
impl CameraMetrics for FakeCameraWindow {
    async fn overlay_metrics(&self) -> Result<Option<OverlayMetrics>> {
        Ok(self.metrics)
    }
}

#[async_trait]
impl CameraPreview for FakeCameraWindow {
    async fn is_open(&self) -> bool {
        *self.open.lock().unwrap()
    }

    async fn close(&self) -> Result<()> {
        self.calls.lock().unwrap().push("close".to_string());
        *self.open.lock().unwrap() = false;
        Ok(())
    }

    async fn open(&self, camera_id: &str) -> Result<()> {
        self.calls.lock().unwrap().push(format!("open:{}", camera_id));
        *self.open.lock().unwrap() = true;
        Ok(())
    }
}

/// Remembers every exclusion toggle
#[derive(Default)]
pub struct ExclusionLog {
    history: Mutex<Vec<bool>>,
}

impl ExclusionLog {
    pub fn history(&self) -> Vec<bool> {
        self.history.lock().unwrap().clone()
    }
}

#[async_trait]
impl CaptureExclusion for ExclusionLog {
    async fn set_self_capture_excluded(&self, excluded: bool) -> Result<()> {
        self.history.lock().unwrap().push(excluded);
        Ok(())
    }
}

/// Records fixed paths; optionally fails
#[derive(Default)]
pub struct FakeFixer {
    pub fail: bool,
    fixed: Mutex<Vec<PathBuf>>,
}

impl FakeFixer {
    pub fn failing() -> Self {
        Self {
            fail: true,
            ..Default::default()
        }
    }

    pub fn fixed(&self) -> Vec<PathBuf> {
        self.fixed.lock().unwrap().clone()
    }
}

#[async_trait]
impl MetadataFixer for FakeFixer {
    async fn fix(&self, path: &Path) -> Result<PathBuf> {
        if self.fail {
            bail!("ffmpeg exited with code 1");
        }
        self.fixed.lock().unwrap().push(path.to_path_buf());
        Ok(path.to_path_buf())
    }
}

/// Graph factory whose context creation always fails
pub struct BrokenGraphs;

impl AudioGraphFactory for BrokenGraphs {
    fn create_context(&self) -> Result<Box<dyn AudioGraph>> {
        bail!("audio context unavailable")
    }
}

/// Everything a controller test needs, with handles kept for assertions
pub struct Harness {
    pub backend: Arc<SyntheticBackend>,
    pub sink: Arc<SlowSink>,
    pub encoders: ScriptedEncoders,
    pub camera: Arc<FakeCameraWindow>,
    pub exclusion: Arc<ExclusionLog>,
    pub fixer: Arc<FakeFixer>,
    pub file_path: PathBuf,
}

impl Harness {
    pub fn new(dir: &Path) -> Self {
        Self {
            backend: Arc::new(SyntheticBackend::default()),
            sink: Arc::new(SlowSink::new()),
            encoders: ScriptedEncoders::default(),
            camera: Arc::new(FakeCameraWindow::new(false, None)),
            exclusion: Arc::new(ExclusionLog::default()),
            fixer: Arc::new(FakeFixer::default()),
            file_path: dir.join("recording-Entire_Screen-test.mp4"),
        }
    }

    pub fn services(&self) -> RecorderServices {
        RecorderServices {
            backend: self.backend.clone(),
            setup: Arc::new(FixedSetup {
                file_path: self.file_path.clone(),
            }),
            sink: self.sink.clone(),
            fixer: self.fixer.clone(),
            encoders: Arc::new(self.encoders.clone()),
            audio_graphs: Arc::new(PcmGraphFactory::default()),
            camera_metrics: self.camera.clone(),
            camera_preview: self.camera.clone(),
            exclusion: self.exclusion.clone(),
        }
    }
}
