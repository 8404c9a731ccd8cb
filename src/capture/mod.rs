//! Media acquisition
//!
//! The `CaptureBackend` trait is the seam to the OS capture APIs. The
//! acquirer opens the optional audio sources around it, each independently
//! fallible.

pub mod acquirer;
pub mod backend;
pub mod synthetic;

pub use acquirer::{acquire_audio_sources, AudioSourceRequest, AudioSources};
pub use backend::{CameraConstraints, CaptureBackend, CaptureConstraints, CursorMode, MicConstraints};
pub use synthetic::{SyntheticBackend, SyntheticConfig};
