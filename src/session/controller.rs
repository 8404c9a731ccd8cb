// Recording session controller
//
// A single actor task owns the encoder, the acquired media and the output
// for the active session. Commands and encoder events are handled one at a
// time, so cleanup never races with chunk handling.

use std::path::PathBuf;
use std::sync::Arc;

use anyhow::{Context, Result};
use tokio::sync::{broadcast, mpsc, oneshot, watch};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};

use super::config::SessionConfig;
use super::events::{RecorderState, SessionEvent};
use super::resources::SessionResources;
use super::services::RecorderServices;
use super::stats::{format_elapsed, OutputMode, SessionClock, SessionStats};
use crate::audio::{mix_audio, MixRequest};
use crate::capture::{acquire_audio_sources, AudioSourceRequest};
use crate::config::Config;
use crate::encode::{encoder_options, Encoder, EncoderEvent};
use crate::error::RecorderError;
use crate::media::MediaStream;
use crate::setup::RecordingTarget;
use crate::storage::WriteQueue;
use crate::video::{CameraOverlay, CompositorOptions, OverlayOptions, VideoCompositor};

/// Frame rate assumed when the screen track does not report one
const DEFAULT_SCREEN_FPS: f64 = 30.0;

const EVENT_CAPACITY: usize = 64;

enum Command {
    Start {
        config: SessionConfig,
        reply: oneshot::Sender<Result<(), RecorderError>>,
    },
    Pause,
    Resume,
    Stop { discard: bool },
    Stats(oneshot::Sender<Option<SessionStats>>),
}

enum Output {
    Streaming(WriteQueue),
    Memory(Vec<Vec<u8>>),
}

impl Output {
    fn mode(&self) -> OutputMode {
        match self {
            Output::Streaming(_) => OutputMode::Streaming,
            Output::Memory(_) => OutputMode::Memory,
        }
    }
}

struct ActiveSession {
    target: RecordingTarget,
    output: Output,
    encoder: Box<dyn Encoder>,
    events: mpsc::UnboundedReceiver<EncoderEvent>,
    resources: SessionResources,
    clock: SessionClock,
    chunks: u64,
    bytes: u64,
    discard: bool,
}

impl ActiveSession {
    fn stats(&self) -> SessionStats {
        let elapsed = self.clock.elapsed();
        SessionStats {
            started_at: self.clock.started_at(),
            elapsed_secs: elapsed.as_secs_f64(),
            elapsed_label: format_elapsed(elapsed),
            chunks: self.chunks,
            bytes: self.bytes,
            mode: self.output.mode(),
            path: self.target.file_path.clone(),
            paused: self.clock.is_paused(),
        }
    }
}

/// Cloneable front end to the controller task
#[derive(Clone)]
pub struct RecorderHandle {
    commands: mpsc::UnboundedSender<Command>,
    state: watch::Receiver<RecorderState>,
    events: broadcast::Sender<SessionEvent>,
}

impl RecorderHandle {
    /// Start a session. Resolves once recording has begun or the attempt failed.
    pub async fn start(&self, config: SessionConfig) -> Result<(), RecorderError> {
        let (reply, rx) = oneshot::channel();
        if self.commands.send(Command::Start { config, reply }).is_err() {
            return Err(RecorderError::ControllerGone);
        }
        rx.await.unwrap_or(Err(RecorderError::ControllerGone))
    }

    /// Best-effort pause; ignored unless recording
    pub fn pause(&self) {
        self.send(Command::Pause);
    }

    /// Best-effort resume; ignored unless paused
    pub fn resume(&self) {
        self.send(Command::Resume);
    }

    /// Request a stop. Finalization happens asynchronously; watch for `SessionEvent::Ended`.
    pub fn stop(&self) {
        self.send(Command::Stop { discard: false });
    }

    /// Stop and throw the recording away
    pub fn discard(&self) {
        self.send(Command::Stop { discard: true });
    }

    pub async fn stats(&self) -> Option<SessionStats> {
        let (tx, rx) = oneshot::channel();
        self.send(Command::Stats(tx));
        rx.await.ok().flatten()
    }

    pub fn state(&self) -> RecorderState {
        *self.state.borrow()
    }

    pub fn watch_state(&self) -> watch::Receiver<RecorderState> {
        self.state.clone()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<SessionEvent> {
        self.events.subscribe()
    }

    fn send(&self, command: Command) {
        if self.commands.send(command).is_err() {
            warn!("Recorder controller is not running");
        }
    }
}

/// Spawn the controller task.
///
/// The task runs until every handle is dropped; an active session is then
/// stopped and finalized before it exits.
pub fn spawn_recorder(services: RecorderServices, config: Config) -> (RecorderHandle, JoinHandle<()>) {
    let (commands_tx, commands_rx) = mpsc::unbounded_channel();
    let (state_tx, state_rx) = watch::channel(RecorderState::Idle);
    let (events_tx, _) = broadcast::channel(EVENT_CAPACITY);

    let controller = Controller {
        services,
        config: Arc::new(config),
        state: state_tx,
        events: events_tx.clone(),
        session: None,
    };
    let task = tokio::spawn(controller.run(commands_rx));

    let handle = RecorderHandle {
        commands: commands_tx,
        state: state_rx,
        events: events_tx,
    };
    (handle, task)
}

struct Controller {
    services: RecorderServices,
    config: Arc<Config>,
    state: watch::Sender<RecorderState>,
    events: broadcast::Sender<SessionEvent>,
    session: Option<ActiveSession>,
}

async fn next_encoder_event(session: &mut Option<ActiveSession>) -> Option<EncoderEvent> {
    match session {
        Some(active) => active.events.recv().await,
        None => std::future::pending().await,
    }
}

impl Controller {
    async fn run(mut self, mut commands: mpsc::UnboundedReceiver<Command>) {
        info!("Recorder controller started");
        loop {
            tokio::select! {
                command = commands.recv() => match command {
                    Some(command) => self.handle_command(command).await,
                    None => break,
                },
                event = next_encoder_event(&mut self.session), if self.session.is_some() => {
                    self.handle_encoder_event(event).await;
                }
            }
        }

        // All handles dropped: finish the active recording before exiting
        if self.session.is_some() {
            info!("Controller shutting down; stopping active recording");
            self.request_stop(false).await;
            while self.session.is_some() {
                let event = next_encoder_event(&mut self.session).await;
                self.handle_encoder_event(event).await;
            }
        }
        info!("Recorder controller stopped");
    }

    fn set_state(&self, state: RecorderState) {
        self.state.send_replace(state);
    }

    fn current_state(&self) -> RecorderState {
        *self.state.borrow()
    }

    fn emit(&self, event: SessionEvent) {
        // No subscribers is fine
        let _ = self.events.send(event);
    }

    async fn handle_command(&mut self, command: Command) {
        match command {
            Command::Start { config, reply } => {
                let result = self.start(config).await;
                let _ = reply.send(result);
            }
            Command::Pause => self.pause(),
            Command::Resume => self.resume(),
            Command::Stop { discard } => self.request_stop(discard).await,
            Command::Stats(reply) => {
                let _ = reply.send(self.session.as_ref().map(ActiveSession::stats));
            }
        }
    }

    async fn set_exclusion(&self, excluded: bool) {
        if let Err(e) = self
            .services
            .exclusion
            .set_self_capture_excluded(excluded)
            .await
        {
            warn!("Failed to set capture exclusion to {}: {:#}", excluded, e);
        }
    }

    fn reject(&self, reason: RecorderError) -> Result<(), RecorderError> {
        warn!("Start rejected: {}", reason);
        self.emit(SessionEvent::Rejected {
            reason: reason.to_string(),
        });
        Err(reason)
    }

    async fn start(&mut self, config: SessionConfig) -> Result<(), RecorderError> {
        // A previous encoder that has not delivered Stopped still owns the session
        if self.session.is_some() || self.current_state().is_active() {
            return self.reject(RecorderError::SessionActive);
        }
        let Some(source) = config.source.clone() else {
            return self.reject(RecorderError::NoSourceSelected);
        };

        self.set_state(RecorderState::Starting);
        self.set_exclusion(true).await;
        info!("Starting recording of {} ({})", source.name, source.id);

        let mut resources = SessionResources::default();
        let mut target: Option<RecordingTarget> = None;
        let mut output: Option<Output> = None;

        let result = self
            .start_pipeline(&config, &mut resources, &mut target, &mut output)
            .await;

        self.set_exclusion(false).await;

        match result {
            Ok((encoder, events)) => {
                let (Some(target), Some(output)) = (target, output) else {
                    return Err(RecorderError::StartFailed("start sequence incomplete".to_string()));
                };
                let mode = output.mode();
                self.emit(SessionEvent::Started {
                    path: target.file_path.clone(),
                    mode,
                });
                info!("Recording to {:?} ({:?})", target.file_path, mode);
                self.session = Some(ActiveSession {
                    target,
                    output,
                    encoder,
                    events,
                    resources,
                    clock: SessionClock::start(),
                    chunks: 0,
                    bytes: 0,
                    discard: false,
                });
                self.set_state(RecorderState::Recording);
                Ok(())
            }
            Err(e) => {
                error!("Failed to start recording: {:#}", e);
                self.set_state(RecorderState::Error);
                resources.release();
                if let (Some(Output::Streaming(mut queue)), Some(target)) = (output, target.as_ref()) {
                    queue.shutdown().await;
                    self.discard_partial(target).await;
                }
                self.reopen_camera_preview(&resources).await;
                self.set_state(RecorderState::Idle);

                let message = format!("{:#}", e);
                self.emit(SessionEvent::Failed {
                    message: message.clone(),
                });
                Err(match e.downcast::<RecorderError>() {
                    Ok(typed) => typed,
                    Err(_) => RecorderError::StartFailed(message),
                })
            }
        }
    }

    /// Steps (a) to (h) of the start sequence. Whatever is acquired is left
    /// in the out-parameters so the caller can release it on failure.
    async fn start_pipeline(
        &self,
        config: &SessionConfig,
        resources: &mut SessionResources,
        target_slot: &mut Option<RecordingTarget>,
        output_slot: &mut Option<Output>,
    ) -> Result<(Box<dyn Encoder>, mpsc::UnboundedReceiver<EncoderEvent>)> {
        let services = &self.services;
        let source = config.source.as_ref().ok_or(RecorderError::NoSourceSelected)?;

        // (a) recording target
        let target = services
            .setup
            .request_recording_target(&source.id, &source.name)
            .await
            .context("Failed to resolve recording target")?;
        target.validate()?;
        let target = target_slot.insert(target);

        // (b) stream to disk, or buffer in memory if the sink refuses
        let output = match services.sink.open(&target.file_path).await {
            Ok(part) => {
                debug!("Disk stream open at {:?}", part);
                Output::Streaming(WriteQueue::new(services.sink.clone(), target.file_path.clone()))
            }
            Err(e) => {
                warn!("Disk streaming unavailable, buffering in memory: {}", e);
                Output::Memory(Vec::new())
            }
        };
        *output_slot = Some(output);

        // (c) primary capture
        let primary = services
            .backend
            .capture_display(&target.constraints)
            .await
            .context("Screen capture failed")?;
        let primary: &MediaStream = resources.primary.insert(primary);
        let screen_track = primary
            .first_video_track()
            .cloned()
            .ok_or(RecorderError::NoVideoTrack)?;
        let target_fps = screen_track
            .settings()
            .frame_rate
            .filter(|fps| *fps > 0.0)
            .unwrap_or(DEFAULT_SCREEN_FPS);
        // Bitrate follows the captured screen, not the capped canvas
        let screen_settings = screen_track.settings().clone();

        // (d) audio sources and mix
        resources.audio = acquire_audio_sources(
            services.backend.as_ref(),
            AudioSourceRequest {
                system_sound_enabled: config.system_sound_enabled,
                mic_id: config.mic_id.as_deref(),
                primary_stream: primary,
            },
        )
        .await;
        let mix = mix_audio(
            services.audio_graphs.as_ref(),
            MixRequest {
                system_sound_enabled: config.system_sound_enabled,
                primary_stream: primary,
                system_audio: resources.audio.system_audio.as_ref(),
                mic: resources.audio.mic.as_ref(),
            },
        );
        let audio_track = mix.output_track.clone();
        resources.mix = Some(mix);

        // (e) camera overlay and compositor
        let mut overlay = CameraOverlay::create(
            OverlayOptions {
                camera_id: config.camera_id.clone(),
                target_fps,
                padding_px: self.config.recording.overlay_padding_px,
                metrics_refresh: self.config.recording.metrics_refresh(),
            },
            services.backend.as_ref(),
            services.camera_metrics.clone(),
            services.camera_preview.as_ref(),
        )
        .await;
        if overlay.closed_existing_camera_window() {
            resources.reopen_camera = config.camera_id.clone();
        }
        let drawer = overlay.drawer();
        resources.cam_stream = overlay.take_cam_stream();
        resources.overlay = Some(overlay);

        let compositor = VideoCompositor::create(
            CompositorOptions {
                screen_track,
                target_fps,
                config: self.config.compositor.clone(),
            },
            Box::new(drawer),
        )
        .await?;
        let canvas_track = compositor.canvas_track().clone();
        resources.compositor = Some(compositor);

        // (f) one stream: composited video plus mixed audio
        let mut tracks = vec![canvas_track.clone()];
        tracks.extend(audio_track);
        let combined = resources.combined.insert(MediaStream::new(tracks));

        // (g) format and bitrate
        let options = encoder_options(
            services.encoders.as_ref(),
            &screen_settings,
            &self.config.encoding,
        )?;

        // (h) encoder
        let mut encoder = services
            .encoders
            .create(combined.clone(), &options)
            .context("Failed to create encoder")?;
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        encoder
            .start(self.config.recording.chunk_interval(), events_tx)
            .context("Failed to start encoder")?;

        Ok((encoder, events_rx))
    }

    fn pause(&mut self) {
        let state = self.current_state();
        if state != RecorderState::Recording {
            debug!("Pause ignored while {:?}", state);
            return;
        }
        let Some(active) = self.session.as_mut() else {
            return;
        };
        match active.encoder.pause() {
            Ok(()) => {
                active.clock.pause();
                self.set_state(RecorderState::Paused);
                self.emit(SessionEvent::Paused);
            }
            Err(e) => warn!("Failed to pause recording: {:#}", e),
        }
    }

    fn resume(&mut self) {
        let state = self.current_state();
        if state != RecorderState::Paused {
            debug!("Resume ignored while {:?}", state);
            return;
        }
        let Some(active) = self.session.as_mut() else {
            return;
        };
        match active.encoder.resume() {
            Ok(()) => {
                active.clock.resume();
                self.set_state(RecorderState::Recording);
                self.emit(SessionEvent::Resumed);
            }
            Err(e) => warn!("Failed to resume recording: {:#}", e),
        }
    }

    /// Ask the encoder to stop; the rest happens when it reports `Stopped`
    async fn request_stop(&mut self, discard: bool) {
        let state = self.current_state();
        let Some(active) = self.session.as_mut() else {
            debug!("Stop ignored: no active recording");
            return;
        };
        active.discard |= discard;
        if state == RecorderState::Stopping {
            debug!("Stop already in progress");
            return;
        }

        let stopped = active.encoder.stop();
        self.set_state(RecorderState::Stopping);
        if let Err(e) = stopped {
            // No Stopped event will follow; treat as a failed session
            self.handle_encoder_event(Some(EncoderEvent::Error(format!(
                "encoder failed to stop: {:#}",
                e
            ))))
            .await;
        }
    }

    async fn handle_encoder_event(&mut self, event: Option<EncoderEvent>) {
        match event {
            Some(EncoderEvent::DataAvailable(bytes)) => self.on_data(bytes),
            Some(EncoderEvent::Stopped) => self.on_stopped().await,
            Some(EncoderEvent::Error(message)) => self.on_error(message).await,
            None => self.on_error("encoder went away without stopping".to_string()).await,
        }
    }

    fn on_data(&mut self, bytes: Vec<u8>) {
        let Some(active) = self.session.as_mut() else {
            return;
        };
        if bytes.is_empty() {
            return;
        }
        active.chunks += 1;
        active.bytes += bytes.len() as u64;
        match &mut active.output {
            Output::Streaming(queue) => queue.enqueue(bytes),
            Output::Memory(chunks) => chunks.push(bytes),
        }
    }

    async fn on_error(&mut self, message: String) {
        let Some(mut active) = self.session.take() else {
            return;
        };
        error!("Recording failed: {}", message);
        self.set_state(RecorderState::Error);
        active.resources.release();

        if let Output::Streaming(queue) = &mut active.output {
            queue.flush().await;
            queue.shutdown().await;
            self.discard_partial(&active.target).await;
        }

        self.finish(&active).await;
        self.emit(SessionEvent::Failed { message });
        self.emit(SessionEvent::Ended);
    }

    async fn on_stopped(&mut self) {
        let Some(mut active) = self.session.take() else {
            return;
        };
        let stats = active.stats();
        info!(
            "Encoder stopped after {} ({} chunks, {} bytes)",
            stats.elapsed_label, stats.chunks, stats.bytes
        );
        let path = active.target.file_path.clone();

        let output = std::mem::replace(&mut active.output, Output::Memory(Vec::new()));
        match output {
            Output::Streaming(mut queue) => {
                queue.flush().await;
                let written = queue.shutdown().await;
                debug!("Write queue settled: {:?}", written);
                if active.discard {
                    self.discard_partial(&active.target).await;
                } else {
                    match self.services.sink.finalize(&path).await {
                        Ok(final_path) => self.post_process(final_path).await,
                        Err(e) => {
                            error!("Failed to finalize {:?}: {}", path, e);
                            self.emit(SessionEvent::SaveFailed {
                                path: None,
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
            Output::Memory(chunks) => {
                if active.discard {
                    info!("Discarded {} buffered chunks", chunks.len());
                } else {
                    let payload = chunks.concat();
                    match self.services.sink.save(&path, &payload).await {
                        Ok(saved) => self.post_process(saved).await,
                        Err(e) => {
                            error!("Failed to save recording to {:?}: {}", path, e);
                            self.emit(SessionEvent::SaveFailed {
                                path: None,
                                message: e.to_string(),
                            });
                        }
                    }
                }
            }
        }

        active.resources.release();
        self.finish(&active).await;
        self.emit(SessionEvent::Ended);
    }

    /// Fix container metadata; the raw file is kept if that fails
    async fn post_process(&self, path: PathBuf) {
        if !self.config.postprocess.enabled {
            self.emit(SessionEvent::Saved { path });
            return;
        }
        match self.services.fixer.fix(&path).await {
            Ok(fixed) => self.emit(SessionEvent::Saved { path: fixed }),
            Err(e) => {
                warn!("Metadata fix failed; keeping raw recording at {:?}: {:#}", path, e);
                self.emit(SessionEvent::SaveFailed {
                    path: Some(path),
                    message: format!("{:#}", e),
                });
            }
        }
    }

    async fn discard_partial(&self, target: &RecordingTarget) {
        let sink = &self.services.sink;
        if let Err(e) = sink.close(&target.file_path).await {
            warn!("Failed to close disk stream: {}", e);
        }
        if let Err(e) = sink.delete_partial(&target.file_path).await {
            error!("Failed to delete partial recording: {}", e);
        }
    }

    async fn reopen_camera_preview(&self, resources: &SessionResources) {
        if let Some(camera_id) = resources.reopen_camera.as_deref() {
            if let Err(e) = self.services.camera_preview.open(camera_id).await {
                warn!("Failed to reopen camera preview: {:#}", e);
            }
        }
    }

    /// Shared tail of every session exit
    async fn finish(&self, active: &ActiveSession) {
        self.reopen_camera_preview(&active.resources).await;
        self.set_exclusion(false).await;
        self.set_state(RecorderState::Idle);
    }
}
