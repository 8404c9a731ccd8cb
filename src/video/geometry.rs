//! Picture-in-picture placement math
//!
//! Pure functions: the same input always yields the same clip path and
//! draw rectangle, so results can be cached and compared.

use tiny_skia::{Path, PathBuilder};

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Rect {
    pub x: f32,
    pub y: f32,
    pub width: f32,
    pub height: f32,
}

/// One command of a clip path outline
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PathSegment {
    MoveTo(f32, f32),
    LineTo(f32, f32),
    /// Quadratic curve: control point then end point
    QuadTo(f32, f32, f32, f32),
    Close,
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub struct GeometryInput {
    pub canvas_width: u32,
    pub canvas_height: u32,
    pub overlay_width: u32,
    pub overlay_height: u32,
    pub corner_radius: u32,
    pub padding: u32,
    /// Intrinsic camera size; 0 means unknown and falls back to the overlay size
    pub video_width: u32,
    pub video_height: u32,
}

#[derive(Debug, Clone, PartialEq)]
pub struct OverlayGeometry {
    /// Overlay box on the canvas
    pub bounds: Rect,
    /// Rounded-rectangle outline of `bounds`
    pub clip_path: Vec<PathSegment>,
    /// Where the whole camera frame lands (cover fit, may overflow `bounds`)
    pub draw_rect: Rect,
    /// Region of the camera frame that is drawn
    pub source_rect: Rect,
}

impl OverlayGeometry {
    /// Build the clip outline as a drawable path
    pub fn to_path(&self) -> Option<Path> {
        let mut pb = PathBuilder::new();
        for segment in &self.clip_path {
            match *segment {
                PathSegment::MoveTo(x, y) => pb.move_to(x, y),
                PathSegment::LineTo(x, y) => pb.line_to(x, y),
                PathSegment::QuadTo(cx, cy, x, y) => pb.quad_to(cx, cy, x, y),
                PathSegment::Close => pb.close(),
            }
        }
        pb.finish()
    }
}

/// Place the overlay bottom-right, inset by the padding, with a rounded
/// clip and a cover-fit camera rectangle centred on the overlay
pub fn compute_overlay_geometry(input: &GeometryInput) -> OverlayGeometry {
    let w = input.overlay_width as f32;
    let h = input.overlay_height as f32;
    let x = input.canvas_width as f32 - w - input.padding as f32;
    let y = input.canvas_height as f32 - h - input.padding as f32;
    let r = (input.corner_radius as f32).min(w / 2.0).min(h / 2.0);

    let clip_path = vec![
        PathSegment::MoveTo(x + r, y),
        PathSegment::LineTo(x + w - r, y),
        PathSegment::QuadTo(x + w, y, x + w, y + r),
        PathSegment::LineTo(x + w, y + h - r),
        PathSegment::QuadTo(x + w, y + h, x + w - r, y + h),
        PathSegment::LineTo(x + r, y + h),
        PathSegment::QuadTo(x, y + h, x, y + h - r),
        PathSegment::LineTo(x, y + r),
        PathSegment::QuadTo(x, y, x + r, y),
        PathSegment::Close,
    ];

    let vw = if input.video_width > 0 { input.video_width } else { input.overlay_width } as f32;
    let vh = if input.video_height > 0 { input.video_height } else { input.overlay_height } as f32;
    let scale = (w / vw).max(h / vh);
    let draw_w = vw * scale;
    let draw_h = vh * scale;

    OverlayGeometry {
        bounds: Rect {
            x,
            y,
            width: w,
            height: h,
        },
        clip_path,
        draw_rect: Rect {
            x: x + (w - draw_w) / 2.0,
            y: y + (h - draw_h) / 2.0,
            width: draw_w,
            height: draw_h,
        },
        source_rect: Rect {
            x: 0.0,
            y: 0.0,
            width: vw,
            height: vh,
        },
    }
}
