use serde::{Deserialize, Serialize};

use crate::media::MediaSource;

/// User selections for one recording. Every field is independently optional.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Screen or window to capture
    pub source: Option<MediaSource>,

    /// Microphone device id
    pub mic_id: Option<String>,

    /// Camera device id for the picture-in-picture overlay
    pub camera_id: Option<String>,

    /// Record desktop audio
    pub system_sound_enabled: bool,
}

impl SessionConfig {
    pub fn for_source(source: MediaSource) -> Self {
        Self {
            source: Some(source),
            ..Default::default()
        }
    }
}
