use std::path::Path;

use anyhow::Result;

use super::probe::{FrameRate, VideoProbe};

/// printf-style name of extracted and rendered frames (1-based).
pub const FRAME_PATTERN: &str = "%08d.png";

/// Inputs for muxing a rendered frame sequence back into a video.
#[derive(Clone, Debug)]
pub struct EncodeJob<'a> {
    pub frames_dir: &'a Path,
    pub frame_pattern: &'a str,
    pub frame_rate: FrameRate,
    /// Source whose first audio stream is stream-copied, if any.
    pub audio_source: Option<&'a Path>,
    pub output: &'a Path,
}

/// Media tool backend used by the overlay pipeline.
///
/// The production implementation shells out to ffmpeg/ffprobe; tests supply
/// an in-process fake.
pub trait MediaBackend {
    /// Backend identifier.
    fn name(&self) -> &'static str;

    /// Read stream metadata. Must fail when the input has no video stream.
    fn probe(&self, input: &Path) -> Result<VideoProbe>;

    /// Decode every frame to `frames_dir` as lossless images named after
    /// `FRAME_PATTERN`, preserving frame count and order.
    fn extract_frames(&self, input: &Path, frames_dir: &Path) -> Result<()>;

    fn encode(&self, job: &EncodeJob<'_>) -> Result<()>;
}

impl<B: MediaBackend + ?Sized> MediaBackend for &B {
    fn name(&self) -> &'static str {
        (**self).name()
    }

    fn probe(&self, input: &Path) -> Result<VideoProbe> {
        (**self).probe(input)
    }

    fn extract_frames(&self, input: &Path, frames_dir: &Path) -> Result<()> {
        (**self).extract_frames(input, frames_dir)
    }

    fn encode(&self, job: &EncodeJob<'_>) -> Result<()> {
        (**self).encode(job)
    }
}
