mod result;
mod walk;

pub use result::{DetectedObject, DetectionResult, Keypoint, KeypointSet, ResultEvent};
pub use walk::{walk_objects, MAX_OBJECT_DEPTH};

