use tracing::{info, warn};

use super::backend::{CaptureBackend, MicConstraints};
use crate::media::MediaStream;

/// Which optional audio sources to open alongside the primary capture
#[derive(Debug, Clone, Copy)]
pub struct AudioSourceRequest<'a> {
    pub system_sound_enabled: bool,
    pub mic_id: Option<&'a str>,
    pub primary_stream: &'a MediaStream,
}

/// Optional audio streams; `None` means not requested or not available
#[derive(Debug, Default)]
pub struct AudioSources {
    pub system_audio: Option<MediaStream>,
    pub mic: Option<MediaStream>,
}

impl AudioSources {
    pub fn stop_all(&self) {
        for stream in self.system_audio.iter().chain(self.mic.iter()) {
            stream.stop_all();
        }
    }
}

/// Open loopback audio and microphone streams.
///
/// Loopback is only requested when system sound is on and the primary
/// capture did not already bring desktop audio. A failure on one source is
/// logged and leaves that source empty; it never aborts the other.
pub async fn acquire_audio_sources(
    backend: &dyn CaptureBackend,
    request: AudioSourceRequest<'_>,
) -> AudioSources {
    let mut sources = AudioSources::default();

    if request.system_sound_enabled && !request.primary_stream.has_audio() {
        match backend.capture_system_audio().await {
            Ok(stream) => {
                info!("System loopback audio acquired");
                sources.system_audio = Some(stream);
            }
            Err(e) => warn!("System loopback audio not available: {:#}", e),
        }
    }

    if let Some(mic_id) = request.mic_id {
        match backend.open_microphone(&MicConstraints::voice(mic_id)).await {
            Ok(stream) => {
                info!("Microphone {} acquired", mic_id);
                sources.mic = Some(stream);
            }
            Err(e) => warn!("Microphone capture failed; continuing without mic: {:#}", e),
        }
    }

    sources
}
