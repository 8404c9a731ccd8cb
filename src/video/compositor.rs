// Per-frame compositing of the screen capture and overlay onto one canvas
//
// The loop is driven by new screen frames when the track signals them, and by
// a fixed refresh tick otherwise. Draws are rate-limited independently of the
// source frame rate.

use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use anyhow::{anyhow, Result};
use tiny_skia::{Color, Pixmap, PixmapPaint, Transform};
use tokio::sync::{watch, Notify};
use tokio::task::JoinHandle;
use tokio::time::Instant;
use tracing::{debug, info, warn};

use crate::config::CompositorConfig;
use crate::media::{MediaStream, MediaTrack, TrackSettings, VideoFrame};

/// Something painted on top of the screen every frame
pub trait OverlayDraw: Send {
    fn draw(&mut self, canvas: &mut Pixmap);
}

/// Overlay that draws nothing
pub struct NoOverlay;

impl OverlayDraw for NoOverlay {
    fn draw(&mut self, _canvas: &mut Pixmap) {}
}

pub struct CompositorOptions {
    pub screen_track: MediaTrack,
    pub target_fps: f64,
    pub config: CompositorConfig,
}

pub struct VideoCompositor {
    canvas_stream: MediaStream,
    canvas_track: MediaTrack,
    running: Arc<AtomicBool>,
    wake: Arc<Notify>,
    frames_drawn: Arc<AtomicU64>,
    task: Option<JoinHandle<()>>,
}

impl VideoCompositor {
    /// Size the canvas from the screen track and start the draw loop
    pub async fn create(options: CompositorOptions, overlay: Box<dyn OverlayDraw>) -> Result<Self> {
        let config = &options.config;
        let (width, height) = intrinsic_size(
            &options.screen_track,
            (config.fallback_width, config.fallback_height),
        )
        .await;
        let canvas = Pixmap::new(width, height)
            .ok_or_else(|| anyhow!("cannot allocate {}x{} canvas", width, height))?;

        let draw_fps = options.target_fps.max(1.0).min(config.max_draw_fps.max(1.0));
        let capture_fps = options.target_fps.min(config.max_capture_fps.max(1.0));
        let canvas_track = MediaTrack::video(
            "Composited Canvas",
            TrackSettings {
                width: Some(width),
                height: Some(height),
                frame_rate: Some(capture_fps),
                ..Default::default()
            },
        );
        info!(
            "Compositing {}x{} canvas at up to {:.0} fps (stream {:.0} fps)",
            width, height, draw_fps, capture_fps
        );

        let running = Arc::new(AtomicBool::new(true));
        let wake = Arc::new(Notify::new());
        let frames_drawn = Arc::new(AtomicU64::new(0));

        let draw_loop = DrawLoop {
            screen: options.screen_track,
            output: canvas_track.clone(),
            canvas,
            overlay,
            target_interval: Duration::from_secs_f64(1.0 / draw_fps),
            last_draw: None,
            running: running.clone(),
            frames_drawn: frames_drawn.clone(),
        };
        let refresh = Duration::from_millis(config.refresh_interval_ms.max(1));
        let task = tokio::spawn(draw_loop.run(wake.clone(), refresh));

        Ok(Self {
            canvas_stream: MediaStream::new(vec![canvas_track.clone()]),
            canvas_track,
            running,
            wake,
            frames_drawn,
            task: Some(task),
        })
    }

    /// Stream carrying the composited video
    pub fn canvas_stream(&self) -> &MediaStream {
        &self.canvas_stream
    }

    pub fn canvas_track(&self) -> &MediaTrack {
        &self.canvas_track
    }

    pub fn frames_drawn(&self) -> u64 {
        self.frames_drawn.load(Ordering::Relaxed)
    }

    /// Stop drawing. Safe to call repeatedly and after the source has ended.
    pub fn dispose(&mut self) {
        self.running.store(false, Ordering::SeqCst);
        self.wake.notify_one();
        if self.task.take().is_some() {
            debug!("Compositor disposed after {} frames", self.frames_drawn());
        }
    }
}

impl Drop for VideoCompositor {
    fn drop(&mut self) {
        self.dispose();
    }
}

/// Resolution of the first presented frame, or `fallback` if the track ends first
async fn intrinsic_size(track: &MediaTrack, fallback: (u32, u32)) -> (u32, u32) {
    if let Some(frame) = track.latest_video_frame() {
        return (frame.width, frame.height);
    }
    let Some(mut frames) = track.video_frames() else {
        return fallback;
    };

    loop {
        tokio::select! {
            _ = track.ended() => return fallback,
            changed = frames.changed() => {
                if changed.is_err() {
                    return fallback;
                }
                if let Some(frame) = frames.borrow_and_update().as_ref() {
                    return (frame.width, frame.height);
                }
            }
        }
    }
}

struct DrawLoop {
    screen: MediaTrack,
    output: MediaTrack,
    canvas: Pixmap,
    overlay: Box<dyn OverlayDraw>,
    target_interval: Duration,
    last_draw: Option<Instant>,
    running: Arc<AtomicBool>,
    frames_drawn: Arc<AtomicU64>,
}

impl DrawLoop {
    async fn run(mut self, wake: Arc<Notify>, refresh: Duration) {
        let frames = if self.screen.supports_frame_callbacks() {
            self.screen.video_frames()
        } else {
            None
        };

        match frames {
            Some(frames) => self.run_on_frames(frames, &wake).await,
            None => self.run_on_refresh(refresh, &wake).await,
        }
        self.output.stop();
        debug!("Compositor draw loop exited");
    }

    fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    async fn run_on_frames(&mut self, mut frames: watch::Receiver<Option<VideoFrame>>, wake: &Notify) {
        // A frame presented before the loop started still gets drawn
        frames.mark_changed();
        let screen = self.screen.clone();
        while self.is_running() {
            tokio::select! {
                _ = wake.notified() => {}
                _ = screen.ended() => break,
                changed = frames.changed() => {
                    if changed.is_err() {
                        break;
                    }
                    let frame = frames.borrow_and_update().clone();
                    if let Some(frame) = frame {
                        self.on_frame(&frame);
                    }
                }
            }
        }
    }

    async fn run_on_refresh(&mut self, refresh: Duration, wake: &Notify) {
        let mut ticker = tokio::time::interval(refresh);
        ticker.set_missed_tick_behavior(tokio::time::MissedTickBehavior::Skip);
        let screen = self.screen.clone();
        while self.is_running() {
            tokio::select! {
                _ = wake.notified() => {}
                _ = screen.ended() => break,
                _ = ticker.tick() => {
                    if let Some(frame) = screen.latest_video_frame() {
                        self.on_frame(&frame);
                    }
                }
            }
        }
    }

    fn on_frame(&mut self, frame: &VideoFrame) {
        if !self.is_running() {
            return;
        }
        let now = Instant::now();
        if let Some(last) = self.last_draw {
            let tolerance = Duration::from_millis(1);
            if now.duration_since(last) + tolerance < self.target_interval {
                return;
            }
        }
        self.last_draw = Some(now);

        if let Err(e) = self.draw(frame) {
            warn!("Skipping composite frame: {:#}", e);
        }
    }

    fn draw(&mut self, frame: &VideoFrame) -> Result<()> {
        if frame.width != self.canvas.width() || frame.height != self.canvas.height() {
            self.canvas = Pixmap::new(frame.width, frame.height)
                .ok_or_else(|| anyhow!("cannot resize canvas to {}x{}", frame.width, frame.height))?;
            info!("Screen resolution changed; canvas now {}x{}", frame.width, frame.height);
        }
        let screen = frame
            .as_pixmap()
            .ok_or_else(|| anyhow!("malformed {}x{} screen frame", frame.width, frame.height))?;

        self.canvas.fill(Color::BLACK);
        self.canvas.draw_pixmap(
            0,
            0,
            screen,
            &PixmapPaint::default(),
            Transform::identity(),
            None,
        );
        self.overlay.draw(&mut self.canvas);

        self.output.push_video(VideoFrame::new(
            self.canvas.width(),
            self.canvas.height(),
            frame.timestamp_ms,
            self.canvas.data().to_vec(),
        ));
        self.frames_drawn.fetch_add(1, Ordering::Relaxed);
        Ok(())
    }
}
