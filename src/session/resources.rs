use tracing::debug;

use crate::audio::MixResult;
use crate::capture::AudioSources;
use crate::media::MediaStream;
use crate::video::{CameraOverlay, VideoCompositor};

/// Everything a session acquires, filled in as the start sequence progresses
#[derive(Default)]
pub(crate) struct SessionResources {
    pub primary: Option<MediaStream>,
    pub audio: AudioSources,
    pub mix: Option<MixResult>,
    pub overlay: Option<CameraOverlay>,
    pub cam_stream: Option<MediaStream>,
    pub compositor: Option<VideoCompositor>,
    pub combined: Option<MediaStream>,
    /// Camera whose preview window was closed to free the device
    pub reopen_camera: Option<String>,
}

impl SessionResources {
    /// Stop every track and tear down the graph, compositor and overlay.
    ///
    /// Safe to call any number of times and on a partially built session.
    pub fn release(&mut self) {
        if let Some(mut compositor) = self.compositor.take() {
            compositor.dispose();
        }
        if let Some(mut overlay) = self.overlay.take() {
            overlay.dispose();
            if let Some(stream) = overlay.take_cam_stream() {
                stream.stop_all();
            }
        }
        if let Some(stream) = self.cam_stream.take() {
            stream.stop_all();
        }
        if let Some(mut mix) = self.mix.take() {
            mix.dispose();
        }
        self.audio.stop_all();
        self.audio = AudioSources::default();
        if let Some(stream) = self.primary.take() {
            stream.stop_all();
        }
        if let Some(stream) = self.combined.take() {
            stream.stop_all();
            debug!("Session media released");
        }
    }
}

impl Drop for SessionResources {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::media::{MediaTrack, TrackSettings};

    #[test]
    fn test_release_twice_stops_everything() {
        let screen = MediaTrack::video("screen", TrackSettings::default());
        let mic = MediaTrack::audio("mic", TrackSettings::default());
        let mut resources = SessionResources::default();
        resources.primary = Some(MediaStream::new(vec![screen.clone()]));
        resources.audio = AudioSources {
            system_audio: None,
            mic: Some(MediaStream::new(vec![mic.clone()])),
        };

        resources.release();
        resources.release();

        assert!(screen.is_ended());
        assert!(mic.is_ended());
    }
}
