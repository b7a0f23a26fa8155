//! Frame extraction, overlay rendering and re-encoding of whole videos.

mod backend;
pub mod batch;
mod ffmpeg;
mod frame_map;
mod pipeline;
mod probe;

pub use backend::{EncodeJob, MediaBackend, FRAME_PATTERN};
pub use batch::{output_path_for, run_batch, scan_videos, BatchReport, DEFAULT_OUTPUT_SUFFIX};
pub use ffmpeg::{FfmpegCli, FfmpegSettings};
pub use frame_map::{build_frame_map, resolve_frame_index, FrameMap};
pub use pipeline::{
    PipelineOptions, ProcessOutcome, RenderStats, VideoOverlayPipeline, DEFAULT_PROGRESS_EVERY,
};
pub use probe::{parse_ffprobe_json, FrameRate, VideoProbe};
