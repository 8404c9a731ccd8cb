// Encoding format and bitrate negotiation

use tracing::{debug, info};

use super::encoder::EncoderFactory;
use crate::config::EncodingConfig;
use crate::error::RecorderError;
use crate::fallback::{first_available, Candidate};
use crate::media::TrackSettings;

#[derive(Debug, Clone, PartialEq)]
pub struct EncoderOptions {
    pub mime_type: String,
    pub video_bits_per_second: u64,
    pub audio_bits_per_second: u64,
}

/// First candidate the encoder reports support for, in priority order
pub fn select_mime_type(factory: &dyn EncoderFactory, candidates: &[String]) -> Option<String> {
    let chain: Vec<Candidate<'_, String>> = candidates
        .iter()
        .map(|mime| {
            Candidate::new(mime.as_str(), move || {
                let supported = factory.is_type_supported(mime);
                debug!("Encoder support for {}: {}", mime, supported);
                supported.then(|| mime.clone())
            })
        })
        .collect();

    first_available(&chain).map(|(_, mime)| mime)
}

/// `width * height * fps * bits_per_pixel_per_frame`, clamped to the configured range
pub fn compute_video_bitrate(width: u32, height: u32, fps: f64, config: &EncodingConfig) -> u64 {
    let raw = width as f64 * height as f64 * fps * config.bits_per_pixel_per_frame;
    let bounded = raw.clamp(config.min_video_bitrate as f64, config.max_video_bitrate as f64);
    bounded.round() as u64
}

/// Negotiate the encoder configuration from the captured screen track settings
pub fn encoder_options(
    factory: &dyn EncoderFactory,
    video: &TrackSettings,
    config: &EncodingConfig,
) -> Result<EncoderOptions, RecorderError> {
    let mime_type = select_mime_type(factory, &config.mime_candidates)
        .ok_or_else(|| RecorderError::NoSupportedFormat(config.mime_candidates.clone()))?;

    let width = video.width.unwrap_or(config.fallback_width);
    let height = video.height.unwrap_or(config.fallback_height);
    let fps = video.frame_rate.unwrap_or(config.fallback_fps);
    let video_bits_per_second = compute_video_bitrate(width, height, fps, config);

    info!(
        "Encoding {} at {}x{}@{:.0} with {} bps video, {} bps audio",
        mime_type, width, height, fps, video_bits_per_second, config.audio_bitrate
    );
    Ok(EncoderOptions {
        mime_type,
        video_bits_per_second,
        audio_bits_per_second: config.audio_bitrate,
    })
}
