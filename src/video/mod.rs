//! Video compositing: screen capture plus camera picture-in-picture on one canvas

pub mod compositor;
pub mod geometry;
pub mod overlay;

pub use compositor::{CompositorOptions, NoOverlay, OverlayDraw, VideoCompositor};
pub use geometry::{compute_overlay_geometry, GeometryInput, OverlayGeometry, PathSegment, Rect};
pub use overlay::{
    CameraMetrics, CameraOverlay, CameraPreview, OverlayMetrics, OverlayOptions, OverlaySize,
};
