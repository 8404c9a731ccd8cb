use std::sync::Arc;

use tiny_skia::PixmapRef;

/// Origin of an audio frame inside the pipeline
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum AudioStreamSource {
    /// Audio embedded in the primary screen capture
    Display,
    /// Desktop loopback device
    Loopback,
    /// Microphone input
    Microphone,
    /// Output of the mixing graph
    Mixed,
}

/// Audio sample data (16-bit PCM, interleaved)
#[derive(Debug, Clone)]
pub struct AudioFrame {
    /// Raw audio samples (i16 PCM, interleaved)
    pub samples: Vec<i16>,
    /// Sample rate in Hz
    pub sample_rate: u32,
    /// Number of channels
    pub channels: u16,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
    /// Where the samples came from
    pub source: AudioStreamSource,
}

/// A decoded video frame, premultiplied RGBA8, row-major without padding
#[derive(Debug, Clone)]
pub struct VideoFrame {
    pub width: u32,
    pub height: u32,
    /// Timestamp in milliseconds since capture started
    pub timestamp_ms: u64,
    pub data: Arc<[u8]>,
}

impl VideoFrame {
    pub fn new(width: u32, height: u32, timestamp_ms: u64, data: Vec<u8>) -> Self {
        Self {
            width,
            height,
            timestamp_ms,
            data: data.into(),
        }
    }

    /// Single-colour frame, mostly useful for synthetic sources
    pub fn solid(width: u32, height: u32, timestamp_ms: u64, rgba: [u8; 4]) -> Self {
        let data: Vec<u8> = rgba
            .iter()
            .copied()
            .cycle()
            .take(width as usize * height as usize * 4)
            .collect();
        Self::new(width, height, timestamp_ms, data)
    }

    /// Borrow the frame as a drawable pixmap.
    ///
    /// Returns `None` when the buffer length does not match the dimensions.
    pub fn as_pixmap(&self) -> Option<PixmapRef<'_>> {
        PixmapRef::from_bytes(&self.data, self.width, self.height)
    }

    /// RGBA value at `(x, y)`, if inside the frame
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 4]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let offset = (y as usize * self.width as usize + x as usize) * 4;
        let px = self.data.get(offset..offset + 4)?;
        Some([px[0], px[1], px[2], px[3]])
    }
}
