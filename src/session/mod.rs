//! Recording session management
//!
//! This module provides the controller that drives one recording at a time:
//! - Media acquisition, audio mixing and video compositing
//! - Encoder lifecycle (start, pause, resume, stop, error)
//! - Streaming chunks to disk, or buffering them in memory
//! - Finalize, post-processing and cleanup on every exit path

mod config;
mod controller;
mod events;
mod resources;
mod services;
mod stats;

pub use config::SessionConfig;
pub use controller::{spawn_recorder, RecorderHandle};
pub use events::{RecorderState, SessionEvent};
pub use services::{CaptureExclusion, HeadlessCameraWindow, NoCaptureExclusion, RecorderServices};
pub use stats::{format_elapsed, OutputMode, SessionStats};
