//! EyePop overlay tools
//!
//! Turns remote inference results into annotated videos.
//!
//! # Pipeline
//!
//! 1. **Detections**: a buffer of `DetectionResult`s per video, read from the
//!    `<video>.json` cache or produced by an `InferenceClient` running a pop.
//! 2. **Primitives**: each result's object tree (bounded depth) becomes
//!    rectangles, spine lines and keypoint dots.
//! 3. **Trails**: a per-video `TraceTracker` keeps recent centroids per trace id
//!    and emits motion-trail segments.
//! 4. **Rendering**: primitives are composited onto every extracted frame.
//! 5. **Encoding**: frames are re-encoded at the source rate with the original
//!    audio stream copied.
//!
//! # Module Structure
//!
//! - `detect`: inference result model and the bounded object walk
//! - `overlay`: primitive building, trace trails and rasterisation
//! - `video`: ffmpeg backend, frame mapping, the per-video pipeline and batch driver
//! - `pop`, `client`, `processor`, `cache`: producing and caching detections
//! - `retry`, `ingest`: retried remote calls and dataset uploads
//! - `config`, `errlog`: runtime configuration and the fatal error log

pub mod cache;
pub mod client;
pub mod config;
pub mod detect;
pub mod errlog;
pub mod ingest;
pub mod overlay;
pub mod pop;
pub mod processor;
pub mod retry;
pub mod video;

pub use client::{DataClient, InferenceClient, OfflineClient};
pub use config::OverlayConfig;
pub use detect::{DetectedObject, DetectionResult, Keypoint, KeypointSet};
pub use overlay::{
    build_primitives, DrawPrimitive, OverlayRenderer, PrimitiveBuilder, TraceTracker,
};
pub use pop::PopDefinition;
pub use processor::Processor;
pub use retry::RetryPolicy;
pub use video::{ProcessOutcome, VideoOverlayPipeline};
