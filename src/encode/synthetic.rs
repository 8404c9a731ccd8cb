//! Stand-in encoder for demos and tests
//!
//! Writes a compact frame log instead of real codec output: a header with
//! the negotiated format, then one record per video frame and audio buffer.
//! Emission, pause/resume and stop follow a real incremental encoder.

use std::time::Duration;

use anyhow::{bail, Result};
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, warn};

use super::encoder::{Encoder, EncoderEvent, EncoderFactory, EncoderState};
use super::format::EncoderOptions;
use crate::media::{AudioFrame, MediaStream, MediaTrack, VideoFrame};

pub const MAGIC: &[u8; 4] = b"SCRC";

#[derive(Debug, Clone, Default)]
pub struct SyntheticEncoderFactory {
    /// Supported MIME types; empty means everything is supported
    pub supported: Vec<String>,
    pub fail_create: bool,
}

impl EncoderFactory for SyntheticEncoderFactory {
    fn is_type_supported(&self, mime_type: &str) -> bool {
        self.supported.is_empty() || self.supported.iter().any(|m| m == mime_type)
    }

    fn create(&self, stream: MediaStream, options: &EncoderOptions) -> Result<Box<dyn Encoder>> {
        if self.fail_create {
            bail!("encoder rejected {}", options.mime_type);
        }
        Ok(Box::new(SyntheticEncoder::new(stream, options.clone())))
    }
}

enum Control {
    Pause,
    Resume,
    Stop,
}

pub struct SyntheticEncoder {
    stream: MediaStream,
    options: EncoderOptions,
    state: EncoderState,
    control: Option<mpsc::UnboundedSender<Control>>,
}

impl SyntheticEncoder {
    pub fn new(stream: MediaStream, options: EncoderOptions) -> Self {
        Self {
            stream,
            options,
            state: EncoderState::Inactive,
            control: None,
        }
    }

    fn send(&self, control: Control) -> Result<()> {
        match &self.control {
            Some(tx) if tx.send(control).is_ok() => Ok(()),
            _ => bail!("encoder task is not running"),
        }
    }
}

impl Encoder for SyntheticEncoder {
    fn state(&self) -> EncoderState {
        self.state
    }

    fn start(&mut self, timeslice: Duration, events: mpsc::UnboundedSender<EncoderEvent>) -> Result<()> {
        if self.state != EncoderState::Inactive {
            bail!("encoder already started");
        }
        let (tx, rx) = mpsc::unbounded_channel();
        let video = video_frames(self.stream.first_video_track());
        let audio = audio_frames(self.stream.first_audio_track());
        tokio::spawn(run(self.options.mime_type.clone(), timeslice, video, audio, events, rx));

        self.control = Some(tx);
        self.state = EncoderState::Recording;
        Ok(())
    }

    fn pause(&mut self) -> Result<()> {
        if self.state != EncoderState::Recording {
            bail!("cannot pause while {:?}", self.state);
        }
        self.send(Control::Pause)?;
        self.state = EncoderState::Paused;
        Ok(())
    }

    fn resume(&mut self) -> Result<()> {
        if self.state != EncoderState::Paused {
            bail!("cannot resume while {:?}", self.state);
        }
        self.send(Control::Resume)?;
        self.state = EncoderState::Recording;
        Ok(())
    }

    fn stop(&mut self) -> Result<()> {
        if self.state == EncoderState::Inactive {
            bail!("encoder is not running");
        }
        self.send(Control::Stop)?;
        self.state = EncoderState::Inactive;
        Ok(())
    }
}

fn video_frames(track: Option<&MediaTrack>) -> BoxStream<'static, VideoFrame> {
    match track.and_then(|t| t.video_frames()) {
        Some(rx) => stream::unfold(rx, |mut rx| async move {
            rx.changed().await.ok()?;
            let frame = rx.borrow_and_update().clone();
            Some((frame, rx))
        })
        .filter_map(|frame| async move { frame })
        .boxed(),
        None => stream::pending().boxed(),
    }
}

fn audio_frames(track: Option<&MediaTrack>) -> BoxStream<'static, AudioFrame> {
    match track.and_then(|t| t.audio_frames()) {
        Some(rx) => stream::unfold(rx, |mut rx| async move {
            loop {
                match rx.recv().await {
                    Ok(frame) => return Some((frame, rx)),
                    Err(broadcast::error::RecvError::Lagged(n)) => {
                        warn!("Encoder fell behind; dropped {} audio buffers", n)
                    }
                    Err(broadcast::error::RecvError::Closed) => return None,
                }
            }
        })
        .boxed(),
        None => stream::pending().boxed(),
    }
}

async fn run(
    mime_type: String,
    timeslice: Duration,
    mut video: BoxStream<'static, VideoFrame>,
    mut audio: BoxStream<'static, AudioFrame>,
    events: mpsc::UnboundedSender<EncoderEvent>,
    mut control: mpsc::UnboundedReceiver<Control>,
) {
    let mut buffer = Vec::with_capacity(4096);
    buffer.extend_from_slice(MAGIC);
    buffer.extend_from_slice(&(mime_type.len() as u16).to_le_bytes());
    buffer.extend_from_slice(mime_type.as_bytes());

    let mut ticker = tokio::time::interval(timeslice);
    ticker.tick().await;
    let mut paused = false;
    let mut chunks = 0u64;

    loop {
        tokio::select! {
            command = control.recv() => match command {
                Some(Control::Pause) => paused = true,
                Some(Control::Resume) => paused = false,
                Some(Control::Stop) | None => break,
            },
            _ = ticker.tick() => {
                if !buffer.is_empty() {
                    chunks += 1;
                    let _ = events.send(EncoderEvent::DataAvailable(std::mem::take(&mut buffer)));
                }
            }
            Some(frame) = video.next() => {
                if !paused {
                    write_video_record(&mut buffer, &frame);
                }
            }
            Some(frame) = audio.next() => {
                if !paused {
                    write_audio_record(&mut buffer, &frame);
                }
            }
        }
    }

    if !buffer.is_empty() {
        chunks += 1;
        let _ = events.send(EncoderEvent::DataAvailable(buffer));
    }
    debug!("Synthetic encoder stopped after {} chunks", chunks);
    let _ = events.send(EncoderEvent::Stopped);
}

fn write_video_record(buffer: &mut Vec<u8>, frame: &VideoFrame) {
    buffer.push(b'V');
    buffer.extend_from_slice(&frame.timestamp_ms.to_le_bytes());
    buffer.extend_from_slice(&frame.width.to_le_bytes());
    buffer.extend_from_slice(&frame.height.to_le_bytes());
    buffer.extend_from_slice(&frame.pixel(0, 0).unwrap_or_default());
}

fn write_audio_record(buffer: &mut Vec<u8>, frame: &AudioFrame) {
    buffer.push(b'A');
    buffer.extend_from_slice(&frame.timestamp_ms.to_le_bytes());
    buffer.extend_from_slice(&(frame.samples.len() as u32).to_le_bytes());
}
