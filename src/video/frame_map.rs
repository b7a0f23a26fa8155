use std::collections::BTreeMap;

use crate::detect::DetectionResult;
use crate::overlay::{DrawPrimitive, PrimitiveBuilder};

/// 0-based frame index -> primitives drawn on that frame.
pub type FrameMap = BTreeMap<i64, Vec<DrawPrimitive>>;

/// Frame index for a buffered result: explicit `frame`, else `round(time * fps)`,
/// else its position in the buffer.
///
/// A fractional `frame` names no extracted frame, so it resolves to `None` and
/// the result is never drawn.
pub fn resolve_frame_index(result: &DetectionResult, position: usize, fps: f64) -> Option<i64> {
    if let Some(frame) = result.frame.filter(|f| f.is_finite()) {
        return (frame.fract() == 0.0).then_some(frame as i64);
    }
    if let Some(time) = result.time.filter(|t| t.is_finite()) {
        let index = (time * fps).round();
        if index.is_finite() {
            return Some(index as i64);
        }
    }
    Some(position as i64)
}

/// Demultiplexes a detection buffer into per-frame primitives. Results that
/// resolve to the same frame accumulate in buffer order.
pub fn build_frame_map(buffer: &[DetectionResult], fps: f64, builder: &PrimitiveBuilder) -> FrameMap {
    let mut map = FrameMap::new();
    for (position, result) in buffer.iter().enumerate() {
        let Some(index) = resolve_frame_index(result, position, fps) else {
            log::debug!("result {} has non-integral frame {:?}, skipping", position, result.frame);
            continue;
        };
        map.entry(index).or_default().extend(builder.build(result));
    }
    map
}
