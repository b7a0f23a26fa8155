use serde::{Deserialize, Deserializer, Serialize};

/// One inference output for a single frame or image.
///
/// Field names follow the JSON emitted by the EyePop worker endpoint, so cached
/// buffers can be read back without translation.
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectionResult {
    #[serde(default, rename = "source_width", skip_serializing_if = "Option::is_none")]
    pub source_width: Option<f32>,
    #[serde(default, rename = "source_height", skip_serializing_if = "Option::is_none")]
    pub source_height: Option<f32>,
    /// Explicit 0-based frame index.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub frame: Option<f64>,
    /// Offset into the video in seconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub time: Option<f64>,
    /// Worker timestamp in nanoseconds.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub timestamp: Option<f64>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub objects: Vec<DetectedObject>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub event: Option<ResultEvent>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct DetectedObject {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_label: Option<String>,
    /// Score in 0..1.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub width: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub height: Option<f32>,
    /// Stable identity assigned by the remote tracker. Ids that are not
    /// non-negative integers are dropped on read.
    #[serde(default, deserialize_with = "lenient_trace_id", skip_serializing_if = "Option::is_none")]
    pub trace_id: Option<u64>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub key_points: Vec<KeypointSet>,
    #[serde(default, deserialize_with = "nullable_vec", skip_serializing_if = "Vec::is_empty")]
    pub objects: Vec<DetectedObject>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct KeypointSet {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub category: Option<String>,
    #[serde(default, deserialize_with = "nullable_vec")]
    pub points: Vec<Keypoint>,
}

#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct Keypoint {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub x: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub y: Option<f32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub visible: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub class_label: Option<String>,
}

/// Out-of-band event attached to a result (e.g. a worker-side error).
#[derive(Clone, Debug, Default, Serialize, Deserialize, PartialEq)]
pub struct ResultEvent {
    #[serde(rename = "type", default)]
    pub kind: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
}

impl ResultEvent {
    pub fn is_error(&self) -> bool {
        self.kind.eq_ignore_ascii_case("error")
    }
}

impl DetectedObject {
    /// Bounding box as `(x, y, width, height)` when every component is finite.
    pub fn bbox(&self) -> Option<(f32, f32, f32, f32)> {
        let x = finite(self.x)?;
        let y = finite(self.y)?;
        let w = finite(self.width)?;
        let h = finite(self.height)?;
        Some((x, y, w, h))
    }

    /// Lowercased category, falling back to the class label.
    pub fn category_key(&self) -> String {
        non_empty(self.category.as_deref())
            .or_else(|| non_empty(self.class_label.as_deref()))
            .map(str::to_lowercase)
            .unwrap_or_default()
    }

    /// Display label: class label first, then category.
    pub fn display_label(&self) -> Option<String> {
        non_empty(self.class_label.as_deref())
            .or_else(|| non_empty(self.category.as_deref()))
            .map(str::to_string)
    }
}

impl Keypoint {
    pub fn position(&self) -> Option<(f32, f32)> {
        Some((finite(self.x)?, finite(self.y)?))
    }

    pub fn is_visible(&self) -> bool {
        self.visible != Some(false)
    }
}

fn finite(value: Option<f32>) -> Option<f32> {
    value.filter(|v| v.is_finite())
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

fn nullable_vec<'de, D, T>(deserializer: D) -> Result<Vec<T>, D::Error>
where
    D: Deserializer<'de>,
    T: Deserialize<'de>,
{
    Option::<Vec<T>>::deserialize(deserializer).map(Option::unwrap_or_default)
}

fn lenient_trace_id<'de, D>(deserializer: D) -> Result<Option<u64>, D::Error>
where
    D: Deserializer<'de>,
{
    let value = Option::<serde_json::Value>::deserialize(deserializer)?;
    Ok(value.and_then(|value| match value {
        serde_json::Value::Number(n) => n.as_u64().or_else(|| {
            n.as_f64()
                .filter(|f| f.is_finite() && *f >= 0.0 && f.fract() == 0.0 && *f <= u64::MAX as f64)
                .map(|f| f as u64)
        }),
        _ => None,
    }))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_worker_json_with_nulls() {
        let raw = r#"{
            "source_width": 1920,
            "source_height": 1080,
            "timestamp": 33000000,
            "objects": [{
                "category": "person",
                "classLabel": "person",
                "confidence": 0.93,
                "x": 10, "y": 20, "width": 30, "height": 40,
                "traceId": 7,
                "keyPoints": null,
                "objects": [{
                    "category": "pose",
                    "keyPoints": [{"category": "3d-body-points", "points": [
                        {"x": 1.5, "y": 2.5, "visible": true, "classLabel": "nose"}
                    ]}]
                }]
            }]
        }"#;
        let result: DetectionResult = serde_json::from_str(raw).unwrap();
        assert_eq!(result.source_width, Some(1920.0));
        assert_eq!(result.objects.len(), 1);
        let person = &result.objects[0];
        assert_eq!(person.trace_id, Some(7));
        assert!(person.key_points.is_empty());
        assert_eq!(person.bbox(), Some((10.0, 20.0, 30.0, 40.0)));
        let pose = &person.objects[0];
        assert_eq!(pose.category_key(), "pose");
        assert_eq!(pose.key_points[0].points[0].position(), Some((1.5, 2.5)));
    }

    #[test]
    fn bbox_requires_every_component() {
        let obj = DetectedObject {
            x: Some(1.0),
            y: Some(1.0),
            width: Some(f32::NAN),
            height: Some(2.0),
            ..DetectedObject::default()
        };
        assert!(obj.bbox().is_none());
        let obj = DetectedObject {
            x: Some(1.0),
            y: None,
            width: Some(2.0),
            height: Some(2.0),
            ..DetectedObject::default()
        };
        assert!(obj.bbox().is_none());
    }

    #[test]
    fn labels_fall_back_and_skip_blank_values() {
        let obj = DetectedObject {
            category: Some("Ball".into()),
            class_label: Some("  ".into()),
            ..DetectedObject::default()
        };
        assert_eq!(obj.display_label().as_deref(), Some("Ball"));
        assert_eq!(obj.category_key(), "ball");
        assert_eq!(DetectedObject::default().display_label(), None);
    }

    #[test]
    fn malformed_trace_ids_are_dropped() {
        let raw = r#"{"objects": [
            {"category": "ball", "traceId": -3},
            {"category": "ball", "traceId": 2.5},
            {"category": "ball", "traceId": "abc"},
            {"category": "ball", "traceId": null},
            {"category": "ball", "traceId": 4.0},
            {"category": "ball", "traceId": 11}
        ]}"#;
        let result: DetectionResult = serde_json::from_str(raw).unwrap();
        let ids: Vec<_> = result.objects.iter().map(|o| o.trace_id).collect();
        assert_eq!(ids, vec![None, None, None, None, Some(4), Some(11)]);
    }

    #[test]
    fn error_events_are_recognised() {
        let raw = r#"{"event": {"type": "error", "message": "decoder failed"}}"#;
        let result: DetectionResult = serde_json::from_str(raw).unwrap();
        assert!(result.event.unwrap().is_error());
        assert!(result.objects.is_empty());
    }
}
