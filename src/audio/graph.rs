// Audio processing graph used to merge several audio tracks into one
//
// The graph owns one destination track. Every connected input track is
// forwarded into a single queue; the mixing task buffers frames per input,
// waits until each input has a frame (or one input falls too far behind),
// and sums the samples with clipping.

use std::collections::VecDeque;

use anyhow::{bail, Context, Result};
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use crate::media::{AudioFrame, AudioStreamSource, MediaStream, MediaTrack, TrackSettings};

/// A live mixing graph: inputs in, one destination track out
pub trait AudioGraph: Send + Sync {
    /// Connect the audio track of a single-track stream as a graph input
    fn connect(&mut self, stream: &MediaStream) -> Result<()>;

    /// The destination's output track
    fn output_track(&mut self) -> Result<MediaTrack>;

    /// Stop the destination tracks and release the graph. Idempotent.
    fn close(&mut self);
}

/// Creates processing contexts. Construction may fail (no audio device, no runtime).
pub trait AudioGraphFactory: Send + Sync {
    fn create_context(&self) -> Result<Box<dyn AudioGraph>>;
}

/// Configuration for the PCM mixing graph
#[derive(Debug, Clone)]
pub struct MixerConfig {
    /// Sample rate of every input and of the output
    pub sample_rate: u32,
    /// Number of interleaved channels
    pub channels: u16,
    /// Maximum buffering delay in milliseconds (default: 200ms)
    /// Past this, frames are mixed without waiting for lagging inputs
    pub max_buffer_delay_ms: u64,
}

impl Default for MixerConfig {
    fn default() -> Self {
        Self {
            sample_rate: 48000,
            channels: 2,
            max_buffer_delay_ms: 200,
        }
    }
}

/// Factory for `PcmMixGraph`
#[derive(Debug, Clone, Default)]
pub struct PcmGraphFactory {
    config: MixerConfig,
}

impl PcmGraphFactory {
    pub fn new(config: MixerConfig) -> Self {
        Self { config }
    }
}

impl AudioGraphFactory for PcmGraphFactory {
    fn create_context(&self) -> Result<Box<dyn AudioGraph>> {
        Ok(Box::new(PcmMixGraph::new(self.config.clone())?))
    }
}

/// Software mixing graph over interleaved i16 PCM
pub struct PcmMixGraph {
    config: MixerConfig,
    runtime: tokio::runtime::Handle,
    output: MediaTrack,
    frames_tx: Option<mpsc::Sender<(usize, AudioFrame)>>,
    inputs_tx: mpsc::UnboundedSender<usize>,
    mix_task: Option<JoinHandle<()>>,
    forwarders: Vec<JoinHandle<()>>,
    closed: bool,
}

impl PcmMixGraph {
    pub fn new(config: MixerConfig) -> Result<Self> {
        let runtime = tokio::runtime::Handle::try_current()
            .context("audio graph requires a running Tokio runtime")?;

        info!(
            "Audio mixing graph initialized: {}Hz, {} channels",
            config.sample_rate, config.channels
        );

        let output = MediaTrack::audio(
            "Mixed Audio",
            TrackSettings {
                sample_rate: Some(config.sample_rate),
                channels: Some(config.channels),
                ..Default::default()
            },
        );

        let (frames_tx, frames_rx) = mpsc::channel(256);
        let (inputs_tx, inputs_rx) = mpsc::unbounded_channel();
        let state = MixState::new(config.clone());
        let mix_task = runtime.spawn(run_mixer(state, frames_rx, inputs_rx, output.clone()));

        Ok(Self {
            config,
            runtime,
            output,
            frames_tx: Some(frames_tx),
            inputs_tx,
            mix_task: Some(mix_task),
            forwarders: Vec::new(),
            closed: false,
        })
    }
}

impl AudioGraph for PcmMixGraph {
    fn connect(&mut self, stream: &MediaStream) -> Result<()> {
        if self.closed {
            bail!("audio graph is closed");
        }
        let track = stream
            .first_audio_track()
            .context("stream has no audio track")?
            .clone();
        let settings = track.settings();
        if settings.sample_rate.is_some_and(|r| r != self.config.sample_rate)
            || settings.channels.is_some_and(|c| c != self.config.channels)
        {
            bail!(
                "track {} format {:?}Hz/{:?}ch does not match graph {}Hz/{}ch",
                track.label(),
                settings.sample_rate,
                settings.channels,
                self.config.sample_rate,
                self.config.channels
            );
        }
        let frames = track.audio_frames().context("track carries no audio")?;
        let frames_tx = self.frames_tx.clone().context("audio graph is closed")?;

        let input = self.forwarders.len();
        self.inputs_tx
            .send(input)
            .context("mixing task is not running")?;
        self.forwarders
            .push(self.runtime.spawn(forward_input(input, track, frames, frames_tx)));

        debug!("Connected audio input {} to mixing graph", input);
        Ok(())
    }

    fn output_track(&mut self) -> Result<MediaTrack> {
        if self.closed {
            bail!("audio graph is closed");
        }
        Ok(self.output.clone())
    }

    fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;
        self.frames_tx = None;
        for forwarder in self.forwarders.drain(..) {
            forwarder.abort();
        }
        if let Some(task) = self.mix_task.take() {
            task.abort();
        }
        self.output.stop();
        info!("Audio mixing graph closed");
    }
}

impl Drop for PcmMixGraph {
    fn drop(&mut self) {
        self.close();
    }
}

async fn forward_input(
    input: usize,
    track: MediaTrack,
    mut frames: broadcast::Receiver<AudioFrame>,
    frames_tx: mpsc::Sender<(usize, AudioFrame)>,
) {
    loop {
        tokio::select! {
            _ = track.ended() => break,
            received = frames.recv() => match received {
                Ok(frame) => {
                    if frames_tx.send((input, frame)).await.is_err() {
                        break;
                    }
                }
                Err(broadcast::error::RecvError::Lagged(skipped)) => {
                    warn!("Audio input {} lagged, {} frames dropped", input, skipped);
                }
                Err(broadcast::error::RecvError::Closed) => break,
            }
        }
    }
    debug!("Audio input {} forwarder stopped", input);
}

async fn run_mixer(
    mut state: MixState,
    mut frames_rx: mpsc::Receiver<(usize, AudioFrame)>,
    mut inputs_rx: mpsc::UnboundedReceiver<usize>,
    output: MediaTrack,
) {
    let mut mixed_count = 0usize;

    loop {
        tokio::select! {
            biased;
            Some(input) = inputs_rx.recv() => state.add_input(input),
            received = frames_rx.recv() => {
                let Some((input, frame)) = received else { break };
                state.buffer_frame(input, frame);
                while let Some(mixed) = state.mix_next_chunk() {
                    output.push_audio(mixed);
                    mixed_count += 1;
                }
            }
        }
    }

    info!("Audio mixing complete: {} mixed frames produced", mixed_count);
}

/// Per-input buffers and the mixing arithmetic
struct MixState {
    config: MixerConfig,
    buffers: Vec<VecDeque<AudioFrame>>,
}

impl MixState {
    fn new(config: MixerConfig) -> Self {
        Self {
            config,
            buffers: Vec::new(),
        }
    }

    fn add_input(&mut self, input: usize) {
        if self.buffers.len() <= input {
            self.buffers.resize_with(input + 1, VecDeque::new);
        }
    }

    /// Buffer a frame for its input, dropping frames in the wrong format
    fn buffer_frame(&mut self, input: usize, frame: AudioFrame) {
        if frame.sample_rate != self.config.sample_rate {
            warn!(
                "Frame sample rate mismatch: expected {}, got {}. Dropping frame.",
                self.config.sample_rate, frame.sample_rate
            );
            return;
        }

        if frame.channels != self.config.channels {
            warn!(
                "Frame channel count mismatch: expected {}, got {}. Dropping frame.",
                self.config.channels, frame.channels
            );
            return;
        }

        self.add_input(input);
        self.buffers[input].push_back(frame);
    }

    /// True when some input holds more than the allowed delay of audio
    fn any_input_overdue(&self) -> bool {
        self.buffers.iter().any(|buffer| {
            match (buffer.front(), buffer.back()) {
                (Some(first), Some(last)) => {
                    last.timestamp_ms.saturating_sub(first.timestamp_ms)
                        >= self.config.max_buffer_delay_ms
                }
                _ => false,
            }
        })
    }

    /// Mix the next chunk once every input has a frame or one input is overdue
    fn mix_next_chunk(&mut self) -> Option<AudioFrame> {
        let all_ready = !self.buffers.is_empty() && self.buffers.iter().all(|b| !b.is_empty());
        if !all_ready && !self.any_input_overdue() {
            return None;
        }

        let frames: Vec<AudioFrame> = self
            .buffers
            .iter_mut()
            .filter_map(|buffer| buffer.pop_front())
            .collect();

        if frames.is_empty() {
            return None;
        }

        Some(self.mix_multiple_frames(&frames))
    }

    /// Mix frames together by adding their samples with clipping
    fn mix_multiple_frames(&self, frames: &[AudioFrame]) -> AudioFrame {
        let timestamp_ms = frames.iter().map(|f| f.timestamp_ms).min().unwrap_or(0);

        // Output length is that of the longest frame
        let max_len = frames.iter().map(|f| f.samples.len()).max().unwrap_or(0);
        let mut mixed_samples = Vec::with_capacity(max_len);

        for i in 0..max_len {
            let sum: i32 = frames
                .iter()
                .map(|f| f.samples.get(i).copied().unwrap_or(0) as i32)
                .sum();
            mixed_samples.push(sum.clamp(i16::MIN as i32, i16::MAX as i32) as i16);
        }

        AudioFrame {
            samples: mixed_samples,
            sample_rate: self.config.sample_rate,
            channels: self.config.channels,
            timestamp_ms,
            source: AudioStreamSource::Mixed,
        }
    }
}
