//! Overlay primitives and drawing.
//!
//! - `builder`: detection tree -> flat list of `DrawPrimitive`s
//! - `trace`: per-trace-id centroid history and motion trails
//! - `render`: rasterises primitives onto a frame
//!
//! All coordinates are in source-frame pixels. Nothing here performs I/O except
//! font loading in `render`.

use anyhow::{anyhow, Result};
use image::Rgba;

pub mod builder;
pub mod render;
pub mod trace;

pub use builder::{build_primitives, CategoryStyle, PrimitiveBuilder};
pub use render::OverlayRenderer;
pub use trace::{TraceSample, TraceTracker, MAX_TRACE_SAMPLES};

pub type Color = Rgba<u8>;

pub const DEFAULT_COLOR: Color = Rgba([0x00, 0xff, 0x00, 0xff]);

#[derive(Clone, Debug, PartialEq)]
pub struct RectShape {
    pub x: f32,
    pub y: f32,
    pub w: f32,
    pub h: f32,
    pub label: Option<String>,
    pub score: Option<f32>,
    pub color: Color,
    pub trace_id: Option<u64>,
}

#[derive(Clone, Debug, PartialEq)]
pub struct LineShape {
    pub x1: f32,
    pub y1: f32,
    pub x2: f32,
    pub y2: f32,
    pub label: Option<String>,
    pub score: Option<f32>,
    pub color: Color,
}

#[derive(Clone, Debug, PartialEq)]
pub struct CircleShape {
    pub cx: f32,
    pub cy: f32,
    pub r: f32,
    pub color: Color,
}

/// A drawable shape in source-frame pixel space.
#[derive(Clone, Debug, PartialEq)]
pub enum DrawPrimitive {
    Rect(RectShape),
    Line(LineShape),
    Circle(CircleShape),
}

impl DrawPrimitive {
    pub fn color(&self) -> Color {
        match self {
            DrawPrimitive::Rect(rect) => rect.color,
            DrawPrimitive::Line(line) => line.color,
            DrawPrimitive::Circle(circle) => circle.color,
        }
    }
}

impl RectShape {
    pub fn centroid(&self) -> (f32, f32) {
        (self.x + self.w / 2.0, self.y + self.h / 2.0)
    }
}

/// Label text with an optional confidence suffix, e.g. `ball (90.0%)`.
pub fn caption(label: &str, score: Option<f32>) -> String {
    match score.filter(|s| s.is_finite()) {
        Some(score) => format!("{} ({:.1}%)", label, score * 100.0),
        None => label.to_string(),
    }
}

/// Parses `#rrggbb` / `rrggbb` (or `#rrggbbaa`) into an RGBA color.
pub fn parse_hex_color(value: &str) -> Result<Color> {
    let digits = value.trim().trim_start_matches('#');
    let bytes = hex::decode(digits).map_err(|e| anyhow!("invalid color '{}': {}", value, e))?;
    match bytes.as_slice() {
        [r, g, b] => Ok(Rgba([*r, *g, *b, 0xff])),
        [r, g, b, a] => Ok(Rgba([*r, *g, *b, *a])),
        _ => Err(anyhow!("invalid color '{}': expected 6 or 8 hex digits", value)),
    }
}

/// Cyclic hue palette for trace trails.
pub const TRACE_PALETTE: [[u8; 3]; 50] = [
    [255, 0, 0],
    [255, 64, 0],
    [255, 128, 0],
    [255, 191, 0],
    [255, 255, 0],
    [191, 255, 0],
    [128, 255, 0],
    [64, 255, 0],
    [0, 255, 0],
    [0, 255, 64],
    [0, 255, 128],
    [0, 255, 191],
    [0, 255, 255],
    [0, 191, 255],
    [0, 128, 255],
    [0, 64, 255],
    [0, 0, 255],
    [64, 0, 255],
    [128, 0, 255],
    [191, 0, 255],
    [255, 0, 255],
    [255, 0, 191],
    [255, 0, 128],
    [255, 0, 64],
    [255, 0, 0],
    [255, 51, 0],
    [255, 102, 0],
    [255, 153, 0],
    [255, 204, 0],
    [255, 255, 0],
    [204, 255, 0],
    [153, 255, 0],
    [102, 255, 0],
    [51, 255, 0],
    [0, 255, 0],
    [0, 255, 51],
    [0, 255, 102],
    [0, 255, 153],
    [0, 255, 204],
    [0, 255, 255],
    [0, 204, 255],
    [0, 153, 255],
    [0, 102, 255],
    [0, 51, 255],
    [0, 0, 255],
    [51, 0, 255],
    [102, 0, 255],
    [153, 0, 255],
    [204, 0, 255],
    [255, 0, 255],
];

pub fn trace_color(trace_id: u64) -> Color {
    let [r, g, b] = TRACE_PALETTE[(trace_id % TRACE_PALETTE.len() as u64) as usize];
    Rgba([r, g, b, 0xff])
}
