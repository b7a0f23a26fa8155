//! Rasterises overlay primitives onto a frame.
//!
//! Primitives are drawn onto a transparent layer sized from the frame itself
//! (not from stream metadata, which ignores rotation), then alpha-composited
//! onto a copy of the frame.

use std::path::{Path, PathBuf};

use ab_glyph::{FontArc, PxScale};
use anyhow::{Context, Result};
use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::{
    draw_filled_circle_mut, draw_filled_rect_mut, draw_hollow_rect_mut, draw_polygon_mut,
    draw_text_mut, text_size,
};
use imageproc::point::Point;
use imageproc::rect::Rect;

use super::{caption, CircleShape, Color, DrawPrimitive, LineShape, RectShape};

const RECT_STROKE: i32 = 3;
const LINE_STROKE: f32 = 4.0;
const LABEL_PAD: i32 = 4;
const LABEL_MIN_WIDTH: i32 = 40;
const LABEL_TEXT_PX: f32 = 12.0;
const TRACE_TEXT_PX: f32 = 24.0;
const LABEL_ROW_HEIGHT: i32 = 18;
const TRACE_ROW_HEIGHT: i32 = 24;
const LABEL_ALPHA: u8 = 191;
/// Pixel coordinates are clamped to this magnitude so offsets and extents
/// stay inside `i32`.
const COORD_LIMIT: f32 = 1_048_576.0;
const TEXT_COLOR: Color = Rgba([0, 0, 0, 0xff]);

const FONT_CANDIDATES: &[&str] = &[
    "/usr/share/fonts/truetype/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/TTF/DejaVuSans.ttf",
    "/usr/share/fonts/dejavu/DejaVuSans.ttf",
    "/usr/share/fonts/truetype/liberation/LiberationSans-Regular.ttf",
    "/System/Library/Fonts/Supplemental/Arial.ttf",
    "/Library/Fonts/Arial.ttf",
    "C:\\Windows\\Fonts\\arial.ttf",
];

#[derive(Clone, Default)]
pub struct OverlayRenderer {
    font: Option<FontArc>,
}

impl std::fmt::Debug for OverlayRenderer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OverlayRenderer")
            .field("has_font", &self.font.is_some())
            .finish()
    }
}

impl OverlayRenderer {
    /// Renderer without a font: label backgrounds are drawn, text is not.
    pub fn new() -> Self {
        Self { font: None }
    }

    pub fn with_font(font: FontArc) -> Self {
        Self { font: Some(font) }
    }

    pub fn from_font_path(path: &Path) -> Result<Self> {
        let bytes = std::fs::read(path)
            .with_context(|| format!("failed to read font {}", path.display()))?;
        let font = FontArc::try_from_vec(bytes)
            .with_context(|| format!("invalid font file {}", path.display()))?;
        Ok(Self::with_font(font))
    }

    /// Uses `font_path` when given, otherwise the first well-known system font
    /// that loads. Falls back to a text-less renderer.
    pub fn discover(font_path: Option<&Path>) -> Result<Self> {
        if let Some(path) = font_path {
            return Self::from_font_path(path);
        }
        for candidate in FONT_CANDIDATES.iter().map(PathBuf::from) {
            if !candidate.is_file() {
                continue;
            }
            match Self::from_font_path(&candidate) {
                Ok(renderer) => {
                    log::debug!("overlay font: {}", candidate.display());
                    return Ok(renderer);
                }
                Err(err) => log::debug!("skipping font {}: {:#}", candidate.display(), err),
            }
        }
        log::warn!("no overlay font found; labels will be drawn without text");
        Ok(Self::new())
    }

    pub fn has_font(&self) -> bool {
        self.font.is_some()
    }

    /// Composite `primitives` onto a copy of `frame`.
    pub fn render(&self, frame: &RgbaImage, primitives: &[DrawPrimitive]) -> RgbaImage {
        let mut out = frame.clone();
        if primitives.is_empty() {
            return out;
        }
        let (width, height) = frame.dimensions();
        let mut layer = RgbaImage::new(width, height);
        for primitive in primitives {
            match primitive {
                DrawPrimitive::Rect(rect) => self.draw_rect(&mut layer, rect),
                DrawPrimitive::Line(line) => self.draw_line(&mut layer, line),
                DrawPrimitive::Circle(circle) => draw_circle(&mut layer, circle),
            }
        }
        imageops::overlay(&mut out, &layer, 0, 0);
        out
    }

    fn draw_rect(&self, layer: &mut RgbaImage, rect: &RectShape) {
        let (frame_w, frame_h) = (layer.width() as i32, layer.height() as i32);
        let rx = px(rect.x).max(0);
        let ry = px(rect.y).max(0);
        if rx >= frame_w || ry >= frame_h {
            return;
        }
        // Extents stop just past the frame so clipped edges stay invisible.
        let rw = px(rect.w).clamp(0, frame_w + RECT_STROKE - rx);
        let rh = px(rect.h).clamp(0, frame_h + RECT_STROKE - ry);
        for inset in 0..RECT_STROKE {
            let w = rw - 2 * inset;
            let h = rh - 2 * inset;
            if w <= 0 || h <= 0 {
                break;
            }
            let outline = Rect::at(rx + inset, ry + inset).of_size(w as u32, h as u32);
            draw_hollow_rect_mut(layer, outline, rect.color);
        }

        let main = rect
            .label
            .as_deref()
            .filter(|label| !label.is_empty())
            .map(|label| caption(label, rect.score));
        let trace = rect.trace_id.map(|id| id.to_string());
        if main.is_none() && trace.is_none() {
            return;
        }

        let text_width = [
            main.as_deref().map(|t| self.text_width(t, LABEL_TEXT_PX)),
            trace.as_deref().map(|t| self.text_width(t, TRACE_TEXT_PX)),
        ]
        .into_iter()
        .flatten()
        .fold(LABEL_MIN_WIDTH, i32::max);
        let block_w = text_width + 2 * LABEL_PAD;
        let block_h = if trace.is_some() {
            LABEL_ROW_HEIGHT + TRACE_ROW_HEIGHT + LABEL_PAD
        } else {
            LABEL_ROW_HEIGHT
        };
        let block_y = if ry - block_h >= 0 {
            ry - block_h
        } else {
            (ry + rh).min(frame_h - block_h).max(0)
        };
        fill_label_background(layer, rx, block_y, block_w, block_h, rect.color);

        let text_x = rx + LABEL_PAD + 2;
        match (&main, &trace) {
            (Some(main), Some(trace)) => {
                self.draw_text(layer, text_x, block_y + 2, LABEL_TEXT_PX, main);
                self.draw_text(layer, text_x, block_y + LABEL_ROW_HEIGHT, TRACE_TEXT_PX, trace);
            }
            (Some(main), None) => self.draw_text(layer, text_x, block_y + 2, LABEL_TEXT_PX, main),
            (None, Some(trace)) => {
                let y = block_y + (block_h - TRACE_ROW_HEIGHT) / 2;
                self.draw_text(layer, text_x, y, TRACE_TEXT_PX, trace);
            }
            (None, None) => {}
        }
    }

    fn draw_line(&self, layer: &mut RgbaImage, line: &LineShape) {
        draw_thick_line(
            layer,
            (line.x1, line.y1),
            (line.x2, line.y2),
            LINE_STROKE,
            line.color,
        );
        let Some(label) = line.label.as_deref().filter(|label| !label.is_empty()) else {
            return;
        };
        let text = caption(label, line.score);
        let label_w = self.text_width(&text, LABEL_TEXT_PX).max(LABEL_MIN_WIDTH);
        let mid_x = px((line.x1 + line.x2) / 2.0);
        let mid_y = px((line.y1 + line.y2) / 2.0);
        let max_x = (layer.width() as i32 - label_w).max(0);
        let lx = (mid_x - label_w / 2).clamp(0, max_x);
        let top = (mid_y - 12 - 14).max(0);
        fill_label_background(
            layer,
            lx - LABEL_PAD,
            top,
            label_w + 2 * LABEL_PAD,
            LABEL_ROW_HEIGHT,
            line.color,
        );
        self.draw_text(layer, lx, top + 2, LABEL_TEXT_PX, &text);
    }

    fn text_width(&self, text: &str, size: f32) -> i32 {
        match &self.font {
            Some(font) => text_size(PxScale::from(size), font, text).0 as i32,
            None => (text.chars().count() as f32 * size * 0.58).ceil() as i32,
        }
    }

    fn draw_text(&self, layer: &mut RgbaImage, x: i32, y: i32, size: f32, text: &str) {
        if let Some(font) = &self.font {
            draw_text_mut(layer, TEXT_COLOR, x, y, PxScale::from(size), font, text);
        }
    }
}

fn draw_circle(layer: &mut RgbaImage, circle: &CircleShape) {
    let bound = (layer.width() + layer.height()) as i32;
    let radius = px(circle.r).clamp(1, bound.max(1));
    draw_filled_circle_mut(layer, (px(circle.cx), px(circle.cy)), radius, circle.color);
}

fn fill_label_background(layer: &mut RgbaImage, x: i32, y: i32, w: i32, h: i32, color: Color) {
    if w <= 0 || h <= 0 {
        return;
    }
    let Rgba([r, g, b, _]) = color;
    let area = Rect::at(x, y.max(0)).of_size(w as u32, h as u32);
    draw_filled_rect_mut(layer, area, Rgba([r, g, b, LABEL_ALPHA]));
}

/// A line of the given stroke width, drawn as a filled quad.
fn draw_thick_line(
    layer: &mut RgbaImage,
    (x1, y1): (f32, f32),
    (x2, y2): (f32, f32),
    width: f32,
    color: Color,
) {
    let (dx, dy) = (x2 - x1, y2 - y1);
    let len = (dx * dx + dy * dy).sqrt();
    let half = width / 2.0;
    if !len.is_finite() || len < 0.5 {
        draw_filled_circle_mut(layer, (px(x1), px(y1)), px(half).max(1), color);
        return;
    }
    let (nx, ny) = (-dy / len * half, dx / len * half);
    let quad = [
        Point::new(px(x1 + nx), px(y1 + ny)),
        Point::new(px(x2 + nx), px(y2 + ny)),
        Point::new(px(x2 - nx), px(y2 - ny)),
        Point::new(px(x1 - nx), px(y1 - ny)),
    ];
    draw_polygon_mut(layer, &quad, color);
}

fn px(value: f32) -> i32 {
    value.round().clamp(-COORD_LIMIT, COORD_LIMIT) as i32
}
