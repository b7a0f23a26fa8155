//! Motion trails for tracked objects.
//!
//! `TraceTracker` keeps a bounded centroid history per trace id. One tracker is
//! meant to live for exactly one video: histories are never pruned, so reusing
//! a tracker across videos would leak trails from one clip into the next.

use std::collections::{BTreeMap, VecDeque};

use super::{trace_color, Color, DrawPrimitive, LineShape};

/// Maximum centroid samples kept per trace id.
pub const MAX_TRACE_SAMPLES: usize = 50;

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct TraceSample {
    pub x: f32,
    pub y: f32,
    pub color: Color,
}

#[derive(Debug)]
pub struct TraceTracker {
    histories: BTreeMap<u64, VecDeque<TraceSample>>,
    max_samples: usize,
}

impl Default for TraceTracker {
    fn default() -> Self {
        Self::new()
    }
}

impl TraceTracker {
    pub fn new() -> Self {
        Self::with_capacity(MAX_TRACE_SAMPLES)
    }

    pub fn with_capacity(max_samples: usize) -> Self {
        Self {
            histories: BTreeMap::new(),
            max_samples: max_samples.max(1),
        }
    }

    /// Record the centroid of every traced rect in this frame.
    pub fn update(&mut self, frame: &[DrawPrimitive]) {
        let max_samples = self.max_samples;
        for primitive in frame {
            let DrawPrimitive::Rect(rect) = primitive else {
                continue;
            };
            let Some(trace_id) = rect.trace_id else {
                continue;
            };
            let (x, y) = rect.centroid();
            let history = self
                .histories
                .entry(trace_id)
                .or_insert_with(|| VecDeque::with_capacity(max_samples));
            history.push_back(TraceSample {
                x,
                y,
                color: rect.color,
            });
            while history.len() > max_samples {
                history.pop_front();
            }
        }
    }

    /// One line per consecutive pair of samples, for every tracked id.
    pub fn current_trail_lines(&self) -> Vec<DrawPrimitive> {
        let mut lines = Vec::new();
        for (trace_id, history) in &self.histories {
            let color = trace_color(*trace_id);
            for (a, b) in history.iter().zip(history.iter().skip(1)) {
                lines.push(DrawPrimitive::Line(LineShape {
                    x1: a.x,
                    y1: a.y,
                    x2: b.x,
                    y2: b.y,
                    label: None,
                    score: None,
                    color,
                }));
            }
        }
        lines
    }

    pub fn history(&self, trace_id: u64) -> Option<&VecDeque<TraceSample>> {
        self.histories.get(&trace_id)
    }

    pub fn tracked_ids(&self) -> impl Iterator<Item = u64> + '_ {
        self.histories.keys().copied()
    }

    pub fn is_empty(&self) -> bool {
        self.histories.is_empty()
    }
}
