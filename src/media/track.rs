use std::fmt;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::sync::{broadcast, watch, Notify};

use super::frame::{AudioFrame, VideoFrame};

/// Audio buffers kept per listener before the slowest one starts lagging
const AUDIO_CHANNEL_CAPACITY: usize = 256;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum TrackKind {
    Audio,
    Video,
}

/// Negotiated properties of a track, as reported by the capture backend
#[derive(Debug, Clone, Default, PartialEq)]
pub struct TrackSettings {
    pub width: Option<u32>,
    pub height: Option<u32>,
    pub frame_rate: Option<f64>,
    pub sample_rate: Option<u32>,
    pub channels: Option<u16>,
    pub device_id: Option<String>,
}

enum TrackMedia {
    Video(watch::Sender<Option<VideoFrame>>),
    Audio(broadcast::Sender<AudioFrame>),
}

struct TrackInner {
    id: String,
    kind: TrackKind,
    label: String,
    settings: TrackSettings,
    frame_callbacks: bool,
    ended: AtomicBool,
    ended_notify: Notify,
    media: TrackMedia,
}

/// Handle to a single audio or video track.
///
/// Clones share the same underlying track: stopping one clone stops them all.
#[derive(Clone)]
pub struct MediaTrack {
    inner: Arc<TrackInner>,
}

impl MediaTrack {
    fn new(kind: TrackKind, label: &str, settings: TrackSettings, frame_callbacks: bool) -> Self {
        let media = match kind {
            TrackKind::Video => TrackMedia::Video(watch::channel(None).0),
            TrackKind::Audio => TrackMedia::Audio(broadcast::channel(AUDIO_CHANNEL_CAPACITY).0),
        };

        Self {
            inner: Arc::new(TrackInner {
                id: uuid::Uuid::new_v4().to_string(),
                kind,
                label: label.to_string(),
                settings,
                frame_callbacks,
                ended: AtomicBool::new(false),
                ended_notify: Notify::new(),
                media,
            }),
        }
    }

    /// Video track that signals every newly presented frame
    pub fn video(label: &str, settings: TrackSettings) -> Self {
        Self::new(TrackKind::Video, label, settings, true)
    }

    /// Video track that only exposes the latest frame; consumers must poll
    /// it on their own refresh clock
    pub fn refresh_driven_video(label: &str, settings: TrackSettings) -> Self {
        Self::new(TrackKind::Video, label, settings, false)
    }

    pub fn audio(label: &str, settings: TrackSettings) -> Self {
        Self::new(TrackKind::Audio, label, settings, false)
    }

    pub fn id(&self) -> &str {
        &self.inner.id
    }

    pub fn kind(&self) -> TrackKind {
        self.inner.kind
    }

    pub fn label(&self) -> &str {
        &self.inner.label
    }

    pub fn settings(&self) -> &TrackSettings {
        &self.inner.settings
    }

    /// Whether frame-presentation callbacks are available for this track
    pub fn supports_frame_callbacks(&self) -> bool {
        self.inner.frame_callbacks
    }

    pub fn is_ended(&self) -> bool {
        self.inner.ended.load(Ordering::SeqCst)
    }

    /// Stop the track. Safe to call any number of times.
    pub fn stop(&self) {
        if !self.inner.ended.swap(true, Ordering::SeqCst) {
            self.inner.ended_notify.notify_waiters();
        }
    }

    /// Resolves once the track has been stopped
    pub async fn ended(&self) {
        loop {
            let notified = self.inner.ended_notify.notified();
            if self.is_ended() {
                return;
            }
            notified.await;
        }
    }

    /// Publish a video frame. Returns false if the track is ended or not a video track.
    pub fn push_video(&self, frame: VideoFrame) -> bool {
        if self.is_ended() {
            return false;
        }
        match &self.inner.media {
            TrackMedia::Video(tx) => {
                tx.send_replace(Some(frame));
                true
            }
            TrackMedia::Audio(_) => false,
        }
    }

    /// Publish an audio frame. Returns false if the track is ended or not an audio track.
    pub fn push_audio(&self, frame: AudioFrame) -> bool {
        if self.is_ended() {
            return false;
        }
        match &self.inner.media {
            // No listeners is not an error: the frame is simply dropped
            TrackMedia::Audio(tx) => {
                let _ = tx.send(frame);
                true
            }
            TrackMedia::Video(_) => false,
        }
    }

    /// Subscribe to presented video frames
    pub fn video_frames(&self) -> Option<watch::Receiver<Option<VideoFrame>>> {
        match &self.inner.media {
            TrackMedia::Video(tx) => Some(tx.subscribe()),
            TrackMedia::Audio(_) => None,
        }
    }

    /// Most recently presented video frame, if any
    pub fn latest_video_frame(&self) -> Option<VideoFrame> {
        match &self.inner.media {
            TrackMedia::Video(tx) => tx.borrow().clone(),
            TrackMedia::Audio(_) => None,
        }
    }

    /// Subscribe to audio frames published from now on
    pub fn audio_frames(&self) -> Option<broadcast::Receiver<AudioFrame>> {
        match &self.inner.media {
            TrackMedia::Audio(tx) => Some(tx.subscribe()),
            TrackMedia::Video(_) => None,
        }
    }

    /// True if both handles refer to the same track
    pub fn same_track(&self, other: &MediaTrack) -> bool {
        Arc::ptr_eq(&self.inner, &other.inner)
    }
}

impl PartialEq for MediaTrack {
    fn eq(&self, other: &Self) -> bool {
        self.same_track(other)
    }
}

impl fmt::Debug for MediaTrack {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("MediaTrack")
            .field("id", &self.inner.id)
            .field("kind", &self.inner.kind)
            .field("label", &self.inner.label)
            .field("ended", &self.is_ended())
            .finish()
    }
}

/// An ordered group of tracks
#[derive(Debug, Clone)]
pub struct MediaStream {
    id: String,
    tracks: Vec<MediaTrack>,
}

impl MediaStream {
    pub fn new(tracks: Vec<MediaTrack>) -> Self {
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            tracks,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn tracks(&self) -> &[MediaTrack] {
        &self.tracks
    }

    pub fn audio_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Audio)
    }

    pub fn video_tracks(&self) -> impl Iterator<Item = &MediaTrack> {
        self.tracks.iter().filter(|t| t.kind() == TrackKind::Video)
    }

    pub fn first_audio_track(&self) -> Option<&MediaTrack> {
        self.audio_tracks().next()
    }

    pub fn first_video_track(&self) -> Option<&MediaTrack> {
        self.video_tracks().next()
    }

    pub fn has_audio(&self) -> bool {
        self.first_audio_track().is_some()
    }

    /// Stop every track in the stream. Idempotent.
    pub fn stop_all(&self) {
        for track in &self.tracks {
            track.stop();
        }
    }
}
