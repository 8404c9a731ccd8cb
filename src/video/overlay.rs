// Camera picture-in-picture overlay
//
// The overlay's on-screen size is owned by a separate always-on-top window,
// so it is polled from an external metrics source and shared with the draw
// routine. Geometry and the clip mask are rebuilt only when a dimension
// changes.

use std::sync::{Arc, Mutex};
use std::time::Duration;

use anyhow::Result;
use async_trait::async_trait;
use tiny_skia::{FillRule, FilterQuality, Mask, Pixmap, PixmapPaint, Transform};
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};

use super::compositor::OverlayDraw;
use super::geometry::{compute_overlay_geometry, GeometryInput, OverlayGeometry};
use crate::capture::{CameraConstraints, CaptureBackend};
use crate::media::{MediaStream, MediaTrack};

/// Overlays smaller than this (in either dimension) are ignored
const MIN_OVERLAY_PX: f64 = 16.0;

/// Visual size of the overlay window as reported by the metrics source
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct OverlayMetrics {
    pub width: f64,
    pub height: f64,
    pub corner_radius_px: f64,
    pub device_pixel_ratio: Option<f64>,
}

#[async_trait]
pub trait CameraMetrics: Send + Sync {
    /// Current overlay metrics, or `None` when the overlay is not shown
    async fn overlay_metrics(&self) -> Result<Option<OverlayMetrics>>;
}

/// The application's own camera preview window
#[async_trait]
pub trait CameraPreview: Send + Sync {
    async fn is_open(&self) -> bool;
    async fn close(&self) -> Result<()>;
    async fn open(&self, camera_id: &str) -> Result<()>;
}

/// Overlay size in canvas pixels. Zero means nothing is drawn.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct OverlaySize {
    pub width: u32,
    pub height: u32,
    pub corner_radius: u32,
}

impl OverlaySize {
    /// Convert window metrics to canvas pixels.
    ///
    /// Returns `None` for overlays too small to be meaningful.
    pub fn from_metrics(metrics: &OverlayMetrics) -> Option<Self> {
        let dpr = metrics
            .device_pixel_ratio
            .filter(|d| d.is_finite() && *d > 0.0)
            .unwrap_or(1.0);
        let width = (metrics.width * dpr).round();
        let height = (metrics.height * dpr).round();
        if !(width >= MIN_OVERLAY_PX && height >= MIN_OVERLAY_PX) {
            return None;
        }
        let max_radius = (width.min(height) / 2.0).floor();
        let radius = (metrics.corner_radius_px * dpr).round().clamp(0.0, max_radius);

        Some(Self {
            width: width as u32,
            height: height as u32,
            corner_radius: radius as u32,
        })
    }

    fn is_visible(&self) -> bool {
        self.width >= 1 && self.height >= 1
    }
}

#[derive(Debug, Clone)]
pub struct OverlayOptions {
    pub camera_id: Option<String>,
    pub target_fps: f64,
    pub padding_px: u32,
    pub metrics_refresh: Duration,
}

pub struct CameraOverlay {
    cam_stream: Option<MediaStream>,
    closed_existing_camera_window: bool,
    size: Arc<Mutex<OverlaySize>>,
    padding_px: u32,
    refresh_task: Option<JoinHandle<()>>,
}

impl CameraOverlay {
    /// Prepare the overlay for one recording.
    ///
    /// Never fails: a camera that cannot be opened simply yields an
    /// overlay that draws nothing.
    pub async fn create(
        options: OverlayOptions,
        backend: &dyn CaptureBackend,
        metrics: Arc<dyn CameraMetrics>,
        preview: &dyn CameraPreview,
    ) -> Self {
        // Metrics come from the preview window, so read them before closing it
        let initial = fetch_size(metrics.as_ref()).await.unwrap_or_default();
        let size = Arc::new(Mutex::new(initial));

        let mut closed_existing_camera_window = false;
        let mut cam_stream = None;

        if let Some(camera_id) = options.camera_id.as_deref() {
            if preview.is_open().await {
                match preview.close().await {
                    Ok(()) => {
                        info!("Closed camera preview to free {} for recording", camera_id);
                        closed_existing_camera_window = true;
                    }
                    Err(e) => warn!("Failed to close camera preview: {:#}", e),
                }
            }

            let constraints = CameraConstraints {
                device_id: camera_id.to_string(),
                ideal_frame_rate: options.target_fps,
            };
            match backend.open_camera(&constraints).await {
                Ok(stream) => cam_stream = Some(stream),
                Err(e) => warn!("Camera {} unavailable; recording without overlay: {:#}", camera_id, e),
            }
        }

        let refresh_task = cam_stream
            .as_ref()
            .map(|_| spawn_metrics_refresh(metrics, size.clone(), options.metrics_refresh));

        Self {
            cam_stream,
            closed_existing_camera_window,
            size,
            padding_px: options.padding_px,
            refresh_task,
        }
    }

    pub fn cam_stream(&self) -> Option<&MediaStream> {
        self.cam_stream.as_ref()
    }

    /// Hand the camera stream to the caller, who becomes responsible for stopping it
    pub fn take_cam_stream(&mut self) -> Option<MediaStream> {
        self.cam_stream.take()
    }

    pub fn closed_existing_camera_window(&self) -> bool {
        self.closed_existing_camera_window
    }

    pub fn size(&self) -> OverlaySize {
        self.size.lock().map(|s| *s).unwrap_or_default()
    }

    /// Draw routine for the compositor
    pub fn drawer(&self) -> CameraOverlayDraw {
        CameraOverlayDraw {
            camera: self
                .cam_stream
                .as_ref()
                .and_then(|s| s.first_video_track())
                .cloned(),
            size: self.size.clone(),
            padding_px: self.padding_px,
            cache: None,
            rebuilds: 0,
        }
    }

    /// Stop the metrics refresh. The camera stream is left running.
    pub fn dispose(&mut self) {
        if let Some(task) = self.refresh_task.take() {
            task.abort();
            debug!("Camera overlay metrics refresh stopped");
        }
    }
}

impl Drop for CameraOverlay {
    fn drop(&mut self) {
        self.dispose();
    }
}

async fn fetch_size(metrics: &dyn CameraMetrics) -> Option<OverlaySize> {
    match metrics.overlay_metrics().await {
        Ok(Some(m)) => OverlaySize::from_metrics(&m),
        Ok(None) => None,
        Err(e) => {
            debug!("Overlay metrics unavailable: {:#}", e);
            None
        }
    }
}

fn spawn_metrics_refresh(
    metrics: Arc<dyn CameraMetrics>,
    size: Arc<Mutex<OverlaySize>>,
    period: Duration,
) -> JoinHandle<()> {
    tokio::spawn(async move {
        let mut ticker = tokio::time::interval(period.max(Duration::from_millis(1)));
        ticker.tick().await;
        loop {
            ticker.tick().await;
            // Stale or missing metrics keep the last known size
            if let Some(fresh) = fetch_size(metrics.as_ref()).await {
                if let Ok(mut current) = size.lock() {
                    *current = fresh;
                }
            }
        }
    })
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
struct GeometryKey {
    overlay: OverlaySize,
    video: (u32, u32),
    canvas: (u32, u32),
}

struct CachedGeometry {
    key: GeometryKey,
    geometry: OverlayGeometry,
    mask: Option<Mask>,
}

/// Per-frame camera draw, handed to the compositor
pub struct CameraOverlayDraw {
    camera: Option<MediaTrack>,
    size: Arc<Mutex<OverlaySize>>,
    padding_px: u32,
    cache: Option<CachedGeometry>,
    rebuilds: u64,
}

impl CameraOverlayDraw {
    /// How many times geometry has been recomputed
    pub fn geometry_rebuilds(&self) -> u64 {
        self.rebuilds
    }

    fn geometry_for(&mut self, key: GeometryKey) -> &CachedGeometry {
        if self.cache.as_ref().is_some_and(|c| c.key != key) {
            self.cache = None;
        }
        let padding = self.padding_px;
        let rebuilds = &mut self.rebuilds;
        self.cache.get_or_insert_with(|| {
            *rebuilds += 1;
            let geometry = compute_overlay_geometry(&GeometryInput {
                canvas_width: key.canvas.0,
                canvas_height: key.canvas.1,
                overlay_width: key.overlay.width,
                overlay_height: key.overlay.height,
                corner_radius: key.overlay.corner_radius,
                padding,
                video_width: key.video.0,
                video_height: key.video.1,
            });
            let mask = build_mask(&geometry, key.canvas.0, key.canvas.1);
            CachedGeometry {
                key,
                geometry,
                mask,
            }
        })
    }
}

fn build_mask(geometry: &OverlayGeometry, width: u32, height: u32) -> Option<Mask> {
    let path = geometry.to_path()?;
    let mut mask = Mask::new(width, height)?;
    mask.fill_path(&path, FillRule::Winding, true, Transform::identity());
    Some(mask)
}

impl OverlayDraw for CameraOverlayDraw {
    fn draw(&mut self, canvas: &mut Pixmap) {
        let Some(camera) = self.camera.clone() else {
            return;
        };
        let overlay = self.size.lock().map(|s| *s).unwrap_or_default();
        if !overlay.is_visible() {
            return;
        }
        let Some(frame) = camera.latest_video_frame() else {
            return;
        };
        let Some(source) = frame.as_pixmap() else {
            return;
        };

        let key = GeometryKey {
            overlay,
            video: (frame.width, frame.height),
            canvas: (canvas.width(), canvas.height()),
        };
        let cached = self.geometry_for(key);
        let Some(mask) = cached.mask.as_ref() else {
            return;
        };

        let rect = cached.geometry.draw_rect;
        let src = cached.geometry.source_rect;
        let transform = Transform::from_row(
            rect.width / src.width,
            0.0,
            0.0,
            rect.height / src.height,
            rect.x,
            rect.y,
        );
        let paint = PixmapPaint {
            quality: FilterQuality::Bilinear,
            ..Default::default()
        };
        canvas.draw_pixmap(0, 0, source, &paint, transform, Some(mask));
    }
}
