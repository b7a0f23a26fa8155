//! Detection tree -> drawable primitives.

use std::collections::HashMap;

use image::Rgba;

use super::{CircleShape, Color, DrawPrimitive, LineShape, RectShape, DEFAULT_COLOR};
use crate::detect::{walk_objects, DetectedObject, DetectionResult, MAX_OBJECT_DEPTH};

pub const DEFAULT_KEYPOINT_RADIUS: f32 = 4.0;

/// Category rules and colors used when turning detections into primitives.
#[derive(Clone, Debug)]
pub struct CategoryStyle {
    /// Categories drawn as a line between their first two keypoints.
    pub spine_categories: Vec<String>,
    /// Categories drawn as keypoint dots only.
    pub pose_categories: Vec<String>,
    /// Lowercased category -> color.
    pub colors: HashMap<String, Color>,
    pub default_color: Color,
    pub keypoint_radius: f32,
    pub max_depth: usize,
}

impl Default for CategoryStyle {
    fn default() -> Self {
        let colors = [
            ("ball", Rgba([0x00, 0xff, 0x00, 0xff])),
            ("cash", Rgba([0x00, 0xff, 0x00, 0xff])),
            ("paddle_spine", Rgba([0x00, 0xff, 0xff, 0xff])),
            ("person", Rgba([0xff, 0xcc, 0x00, 0xff])),
            ("pose", Rgba([0xff, 0x00, 0xff, 0xff])),
        ]
        .into_iter()
        .map(|(name, color)| (name.to_string(), color))
        .collect();
        Self {
            spine_categories: vec!["paddle_spine".to_string()],
            pose_categories: vec!["pose".to_string()],
            colors,
            default_color: DEFAULT_COLOR,
            keypoint_radius: DEFAULT_KEYPOINT_RADIUS,
            max_depth: MAX_OBJECT_DEPTH,
        }
    }
}

impl CategoryStyle {
    fn is_spine(&self, key: &str) -> bool {
        self.spine_categories.iter().any(|c| c.eq_ignore_ascii_case(key))
    }

    fn is_pose(&self, key: &str) -> bool {
        self.pose_categories.iter().any(|c| c.eq_ignore_ascii_case(key))
    }

    /// Color by category, then by class label, then the default.
    pub fn color_for(&self, object: &DetectedObject) -> Color {
        [object.category.as_deref(), object.class_label.as_deref()]
            .into_iter()
            .flatten()
            .find_map(|name| self.colors.get(&name.trim().to_lowercase()))
            .copied()
            .unwrap_or(self.default_color)
    }
}

#[derive(Clone, Debug, Default)]
pub struct PrimitiveBuilder {
    style: CategoryStyle,
}

impl PrimitiveBuilder {
    pub fn new(style: CategoryStyle) -> Self {
        Self { style }
    }

    pub fn style(&self) -> &CategoryStyle {
        &self.style
    }

    pub fn build(&self, result: &DetectionResult) -> Vec<DrawPrimitive> {
        let mut out = Vec::new();
        walk_objects(&result.objects, self.style.max_depth, &mut |object, _depth| {
            self.push_object(object, &mut out);
        });
        out
    }

    fn push_object(&self, object: &DetectedObject, out: &mut Vec<DrawPrimitive>) {
        let key = object.category_key();
        if self.style.is_spine(&key) {
            if let Some(line) = self.spine_line(object) {
                out.push(line);
            } else if let Some(rect) = self.rect(object) {
                out.push(rect);
            }
        } else if self.style.is_pose(&key) {
            out.extend(self.pose_points(object));
        } else if let Some(rect) = self.rect(object) {
            out.push(rect);
        }
    }

    fn rect(&self, object: &DetectedObject) -> Option<DrawPrimitive> {
        let (x, y, w, h) = object.bbox()?;
        Some(DrawPrimitive::Rect(RectShape {
            x,
            y,
            w,
            h,
            label: object.display_label(),
            score: object.confidence,
            color: self.style.color_for(object),
            trace_id: object.trace_id,
        }))
    }

    fn spine_line(&self, object: &DetectedObject) -> Option<DrawPrimitive> {
        object
            .key_points
            .iter()
            .filter(|set| set.points.len() >= 2)
            .find_map(|set| Some((set.points[0].position()?, set.points[1].position()?)))
            .map(|((x1, y1), (x2, y2))| {
                DrawPrimitive::Line(LineShape {
                    x1,
                    y1,
                    x2,
                    y2,
                    label: object.display_label(),
                    score: object.confidence,
                    color: self.style.color_for(object),
                })
            })
    }

    fn pose_points<'a>(
        &'a self,
        object: &'a DetectedObject,
    ) -> impl Iterator<Item = DrawPrimitive> + 'a {
        let color = self.style.color_for(object);
        object
            .key_points
            .iter()
            .flat_map(|set| set.points.iter())
            .filter(|point| point.is_visible())
            .filter_map(|point| point.position())
            .map(move |(cx, cy)| {
                DrawPrimitive::Circle(CircleShape {
                    cx,
                    cy,
                    r: self.style.keypoint_radius,
                    color,
                })
            })
    }
}

/// Builds primitives with the default category style.
pub fn build_primitives(result: &DetectionResult) -> Vec<DrawPrimitive> {
    PrimitiveBuilder::default().build(result)
}
