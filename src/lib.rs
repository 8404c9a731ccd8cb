pub mod audio;
pub mod capture;
pub mod config;
pub mod devices;
pub mod encode;
pub mod error;
pub mod fallback;
pub mod media;
pub mod postprocess;
pub mod session;
pub mod setup;
pub mod storage;
pub mod video;

pub use audio::{mix_audio, AudioGraphFactory, MixRequest, MixResult, PcmGraphFactory};
pub use capture::{CaptureBackend, SyntheticBackend, SyntheticConfig};
pub use config::Config;
pub use devices::{DeviceDescriptor, DeviceEnumerator, DeviceLists};
pub use encode::{EncoderFactory, SyntheticEncoderFactory};
pub use error::{RecorderError, WriterError};
pub use media::{MediaSource, MediaStream, MediaTrack};
pub use postprocess::{FfmpegMetadataFixer, MetadataFixer};
pub use session::{
    spawn_recorder, RecorderHandle, RecorderServices, RecorderState, SessionConfig, SessionEvent,
    SessionStats,
};
pub use setup::{DefaultRecordingSetup, RecordingSetup, RecordingTarget};
pub use storage::{ChunkedDiskWriter, DiskSink, WriteQueue};
