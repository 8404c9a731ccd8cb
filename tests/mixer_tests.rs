// Integration tests for audio acquisition and mixing

mod common;

use std::time::Duration;

use anyhow::Result;
use screencast_recorder::audio::{mix_audio, MixRequest, MixerConfig, PcmGraphFactory};
use screencast_recorder::capture::{
    acquire_audio_sources, AudioSourceRequest, CaptureBackend, CaptureConstraints, MicConstraints,
    SyntheticBackend, SyntheticConfig,
};
use screencast_recorder::media::{AudioStreamSource, MediaStream, MediaTrack, TrackSettings};

use common::BrokenGraphs;

async fn screen_with_audio(backend: &SyntheticBackend) -> Result<MediaStream> {
    backend
        .capture_display(&CaptureConstraints::for_source("screen:0"))
        .await
}

#[tokio::test]
async fn test_mic_and_loopback_mixed_into_one_track() -> Result<()> {
    let backend = SyntheticBackend::default();
    let primary = backend
        .capture_display(&CaptureConstraints::for_source("screen:0"))
        .await?;
    let sources = acquire_audio_sources(
        &backend,
        AudioSourceRequest {
            system_sound_enabled: true,
            mic_id: Some("mic-1"),
            primary_stream: &primary,
        },
    )
    .await;
    assert!(sources.system_audio.is_some());
    assert!(sources.mic.is_some());

    let mut mix = mix_audio(
        &PcmGraphFactory::default(),
        MixRequest {
            system_sound_enabled: true,
            primary_stream: &primary,
            system_audio: sources.system_audio.as_ref(),
            mic: sources.mic.as_ref(),
        },
    );
    assert!(mix.is_mixed());

    let output = mix.output_track.clone().expect("mixed output track");
    let mut frames = output.audio_frames().expect("audio output");
    let frame = tokio::time::timeout(Duration::from_secs(2), frames.recv()).await??;
    assert_eq!(frame.source, AudioStreamSource::Mixed);
    assert_eq!(frame.sample_rate, 48000);
    assert_eq!(frame.channels, 2);

    mix.dispose();
    assert!(output.is_ended());
    sources.stop_all();
    primary.stop_all();
    Ok(())
}

#[tokio::test]
async fn test_broken_graph_falls_back_to_primary_audio_first() -> Result<()> {
    let backend = SyntheticBackend::new(SyntheticConfig {
        display_audio: true,
        ..Default::default()
    });
    let primary = screen_with_audio(&backend).await?;
    let mic = backend.open_microphone(&MicConstraints::voice("mic-1")).await?;

    let mix = mix_audio(
        &BrokenGraphs,
        MixRequest {
            system_sound_enabled: true,
            primary_stream: &primary,
            system_audio: None,
            mic: Some(&mic),
        },
    );

    assert!(!mix.is_mixed());
    let picked = mix.output_track.clone().expect("fallback track");
    assert!(picked.same_track(primary.first_audio_track().expect("display audio")));
    primary.stop_all();
    mic.stop_all();
    Ok(())
}

#[tokio::test]
async fn test_broken_graph_falls_back_to_mic_without_primary_audio() -> Result<()> {
    let backend = SyntheticBackend::default();
    let primary = backend
        .capture_display(&CaptureConstraints::for_source("screen:0"))
        .await?;
    let mic = backend.open_microphone(&MicConstraints::voice("mic-1")).await?;

    let mix = mix_audio(
        &BrokenGraphs,
        MixRequest {
            system_sound_enabled: false,
            primary_stream: &primary,
            system_audio: None,
            mic: Some(&mic),
        },
    );

    let picked = mix.output_track.clone().expect("fallback track");
    assert!(picked.same_track(mic.first_audio_track().expect("mic audio")));
    primary.stop_all();
    mic.stop_all();
    Ok(())
}

#[tokio::test]
async fn test_format_mismatch_degrades_to_single_track() -> Result<()> {
    let primary = MediaStream::new(vec![MediaTrack::video("screen", TrackSettings::default())]);
    let mic_track = MediaTrack::audio(
        "44.1k mic",
        TrackSettings {
            sample_rate: Some(44100),
            channels: Some(1),
            ..Default::default()
        },
    );
    let mic = MediaStream::new(vec![mic_track.clone()]);

    let mix = mix_audio(
        &PcmGraphFactory::new(MixerConfig::default()),
        MixRequest {
            system_sound_enabled: false,
            primary_stream: &primary,
            system_audio: None,
            mic: Some(&mic),
        },
    );

    assert!(!mix.is_mixed());
    assert!(mix.output_track.as_ref().is_some_and(|t| t.same_track(&mic_track)));
    Ok(())
}

#[tokio::test]
async fn test_no_audio_sources_means_no_track() {
    let primary = MediaStream::new(vec![MediaTrack::video("screen", TrackSettings::default())]);
    let mix = mix_audio(
        &PcmGraphFactory::default(),
        MixRequest {
            system_sound_enabled: true,
            primary_stream: &primary,
            system_audio: None,
            mic: None,
        },
    );
    assert!(mix.output_track.is_none());
    assert!(!mix.is_mixed());
}

#[tokio::test]
async fn test_loopback_skipped_when_capture_has_audio() -> Result<()> {
    let backend = SyntheticBackend::new(SyntheticConfig {
        display_audio: true,
        ..Default::default()
    });
    let primary = screen_with_audio(&backend).await?;
    assert!(primary.has_audio());

    let sources = acquire_audio_sources(
        &backend,
        AudioSourceRequest {
            system_sound_enabled: true,
            mic_id: None,
            primary_stream: &primary,
        },
    )
    .await;

    assert!(sources.system_audio.is_none());
    assert!(!backend.requests().iter().any(|r| r == "system-audio"));
    primary.stop_all();
    Ok(())
}

#[tokio::test]
async fn test_mic_failure_leaves_loopback_intact() -> Result<()> {
    let backend = SyntheticBackend::new(SyntheticConfig {
        fail_mic: true,
        ..Default::default()
    });
    let primary = backend
        .capture_display(&CaptureConstraints::for_source("screen:0"))
        .await?;

    let sources = acquire_audio_sources(
        &backend,
        AudioSourceRequest {
            system_sound_enabled: true,
            mic_id: Some("mic-1"),
            primary_stream: &primary,
        },
    )
    .await;

    assert!(sources.mic.is_none());
    assert!(sources.system_audio.is_some());
    sources.stop_all();
    primary.stop_all();
    Ok(())
}
