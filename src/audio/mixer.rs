// Merges the primary, loopback and microphone audio into one output track
//
// Mixing goes through a shared processing graph. If the graph cannot be
// built, exactly one available track is passed through instead so a
// mixing failure never costs the whole recording.

use anyhow::Result;
use tracing::{info, warn};

use super::graph::{AudioGraph, AudioGraphFactory};
use crate::fallback::{first_available, Candidate};
use crate::media::{MediaStream, MediaTrack};

/// Inputs to the mixing step
#[derive(Debug, Clone, Copy)]
pub struct MixRequest<'a> {
    pub system_sound_enabled: bool,
    pub primary_stream: &'a MediaStream,
    pub system_audio: Option<&'a MediaStream>,
    pub mic: Option<&'a MediaStream>,
}

/// Result of mixing: the track to record (if any) plus the graph to release
pub struct MixResult {
    pub output_track: Option<MediaTrack>,
    graph: Option<Box<dyn AudioGraph>>,
}

impl MixResult {
    fn passthrough(output_track: Option<MediaTrack>) -> Self {
        Self {
            output_track,
            graph: None,
        }
    }

    /// Whether a processing graph is live behind `output_track`
    pub fn is_mixed(&self) -> bool {
        self.graph.is_some()
    }

    /// Stop the destination tracks and close the graph.
    ///
    /// Idempotent; a no-op for passthrough results.
    pub fn dispose(&mut self) {
        if let Some(mut graph) = self.graph.take() {
            graph.close();
        }
    }
}

impl Drop for MixResult {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Combine the available audio sources into a single track
pub fn mix_audio(factory: &dyn AudioGraphFactory, request: MixRequest<'_>) -> MixResult {
    let has_primary_audio = request.system_sound_enabled && request.primary_stream.has_audio();
    let has_loopback_audio =
        request.system_sound_enabled && request.system_audio.is_some_and(|s| s.has_audio());
    let has_mic_audio = request.mic.is_some_and(|s| s.has_audio());

    if !has_primary_audio && !has_loopback_audio && !has_mic_audio {
        info!("No audio sources to mix; recording without audio");
        return MixResult::passthrough(None);
    }

    let mut inputs: Vec<&MediaStream> = Vec::with_capacity(3);
    if has_primary_audio {
        inputs.push(request.primary_stream);
    }
    if has_loopback_audio {
        inputs.extend(request.system_audio);
    }
    if has_mic_audio {
        inputs.extend(request.mic);
    }

    let mut graph: Option<Box<dyn AudioGraph>> = None;
    match build_graph(factory, &inputs, &mut graph) {
        Ok(output_track) => {
            info!("Mixing {} audio sources into one track", inputs.len());
            MixResult {
                output_track: Some(output_track),
                graph,
            }
        }
        Err(e) => {
            warn!("Audio mixing failed; will fallback to available audio tracks: {:#}", e);
            if let Some(mut partial) = graph.take() {
                partial.close();
            }
            MixResult::passthrough(pick_fallback_track(request.primary_stream, request.mic))
        }
    }
}

fn build_graph(
    factory: &dyn AudioGraphFactory,
    inputs: &[&MediaStream],
    slot: &mut Option<Box<dyn AudioGraph>>,
) -> Result<MediaTrack> {
    let graph = slot.insert(factory.create_context()?);
    for stream in inputs {
        // Each source enters the graph as an isolated audio-only stream
        let audio_only = MediaStream::new(stream.audio_tracks().cloned().collect());
        graph.connect(&audio_only)?;
    }
    graph.output_track()
}

/// Single-track fallback: primary capture audio first, then the microphone
fn pick_fallback_track(primary: &MediaStream, mic: Option<&MediaStream>) -> Option<MediaTrack> {
    let candidates = [
        Candidate::new("primary", || primary.first_audio_track().cloned()),
        Candidate::new("microphone", || mic.and_then(|m| m.first_audio_track().cloned())),
    ];

    let picked = first_available(&candidates);
    match &picked {
        Some((name, _)) => info!("Using {} audio track without mixing", name),
        None => info!("No fallback audio track available"),
    }
    picked.map(|(_, track)| track)
}
