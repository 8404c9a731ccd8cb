//! Encoder seam, format negotiation and the synthetic encoder

pub mod encoder;
pub mod format;
pub mod synthetic;

pub use encoder::{Encoder, EncoderEvent, EncoderFactory, EncoderState};
pub use format::{compute_video_bitrate, encoder_options, select_mime_type, EncoderOptions};
pub use synthetic::{SyntheticEncoder, SyntheticEncoderFactory};
