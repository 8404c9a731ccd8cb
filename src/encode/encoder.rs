use std::time::Duration;

use anyhow::Result;
use tokio::sync::mpsc;

use super::format::EncoderOptions;
use crate::media::MediaStream;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum EncoderState {
    Inactive,
    Recording,
    Paused,
}

/// Notifications emitted by a running encoder
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum EncoderEvent {
    /// One encoded chunk, in emission order
    DataAvailable(Vec<u8>),
    /// Unrecoverable runtime failure; no `Stopped` follows
    Error(String),
    /// All data has been delivered
    Stopped,
}

/// Incremental encoder over one combined stream
pub trait Encoder: Send + Sync {
    fn state(&self) -> EncoderState;

    /// Begin encoding, emitting a chunk roughly every `timeslice`
    fn start(&mut self, timeslice: Duration, events: mpsc::UnboundedSender<EncoderEvent>) -> Result<()>;

    fn pause(&mut self) -> Result<()>;

    fn resume(&mut self) -> Result<()>;

    /// Request a stop. Remaining data and `Stopped` arrive on the event channel.
    fn stop(&mut self) -> Result<()>;
}

pub trait EncoderFactory: Send + Sync {
    fn is_type_supported(&self, mime_type: &str) -> bool;

    fn create(&self, stream: MediaStream, options: &EncoderOptions) -> Result<Box<dyn Encoder>>;
}
