//! Media primitives shared by every stage of the pipeline
//!
//! The host capture API is modelled as tracks grouped into streams:
//! - Video tracks publish the latest decoded frame (`watch` semantics)
//! - Audio tracks fan out every PCM frame to all listeners (`broadcast`)
//! - Stopping a track is idempotent and wakes anyone waiting on it

mod frame;
mod source;
mod track;

pub use frame::{AudioFrame, AudioStreamSource, VideoFrame};
pub use source::{pick_default_source, DisplayInfo, MediaSource, SourceKind};
pub use track::{MediaStream, MediaTrack, TrackKind, TrackSettings};
