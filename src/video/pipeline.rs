//! Video overlay pipeline.
//!
//! One call renders one video, strictly in order:
//! 1. skip if the output already exists
//! 2. probe stream metadata (fails before any scratch space is created)
//! 3. extract every frame to a scratch directory
//! 4. index the detection buffer into a `FrameMap`
//! 5. render frames one at a time, feeding the trace tracker
//! 6. re-encode, stream-copying audio when present
//!
//! Scratch directories are owned by a `TempDir` and removed on every exit path.

use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use anyhow::{bail, Context, Result};
use image::{ColorType, DynamicImage, ImageDecoder, ImageReader};
use tempfile::TempDir;

use super::backend::{EncodeJob, MediaBackend, FRAME_PATTERN};
use super::frame_map::build_frame_map;
use crate::cache;
use crate::detect::DetectionResult;
use crate::overlay::{DrawPrimitive, OverlayRenderer, PrimitiveBuilder, TraceTracker};

const SCRATCH_PREFIX: &str = ".frames_";
const RAW_DIR: &str = "raw";
const RENDERED_DIR: &str = "out";
pub const DEFAULT_PROGRESS_EVERY: usize = 100;

#[derive(Clone, Debug)]
pub struct PipelineOptions {
    /// Parent for scratch directories; the system temp dir when `None`.
    pub scratch_root: Option<PathBuf>,
    /// Log progress every N rendered frames.
    pub progress_every: usize,
}

impl Default for PipelineOptions {
    fn default() -> Self {
        Self {
            scratch_root: None,
            progress_every: DEFAULT_PROGRESS_EVERY,
        }
    }
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub struct RenderStats {
    pub frames: usize,
    /// Frames that had at least one primitive drawn on them.
    pub annotated: usize,
    pub has_audio: bool,
}

#[derive(Clone, Debug, PartialEq, Eq)]
pub enum ProcessOutcome {
    /// Output already existed; nothing was decoded or encoded.
    Skipped,
    Rendered(RenderStats),
}

pub struct VideoOverlayPipeline<B> {
    backend: B,
    builder: PrimitiveBuilder,
    renderer: OverlayRenderer,
    options: PipelineOptions,
    cancel: Option<Arc<AtomicBool>>,
}

impl<B: MediaBackend> VideoOverlayPipeline<B> {
    pub fn new(backend: B) -> Self {
        Self {
            backend,
            builder: PrimitiveBuilder::default(),
            renderer: OverlayRenderer::new(),
            options: PipelineOptions::default(),
            cancel: None,
        }
    }

    pub fn with_builder(mut self, builder: PrimitiveBuilder) -> Self {
        self.builder = builder;
        self
    }

    pub fn with_renderer(mut self, renderer: OverlayRenderer) -> Self {
        self.renderer = renderer;
        self
    }

    pub fn with_options(mut self, options: PipelineOptions) -> Self {
        self.options = options;
        self
    }

    /// Abort between frames once `flag` is set.
    pub fn with_cancel_flag(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    pub fn backend(&self) -> &B {
        &self.backend
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Render `buffer` onto `input` and write `output`, with a fresh trace
    /// history for this video.
    pub fn process_video(
        &self,
        input: &Path,
        output: &Path,
        buffer: &[DetectionResult],
    ) -> Result<ProcessOutcome> {
        let mut tracker = TraceTracker::new();
        self.process_video_with_tracker(input, output, buffer, &mut tracker)
    }

    /// Like `process_video`, reading the buffer from the `detections` cache
    /// file. An existing output is skipped before the cache is touched, so a
    /// finished video needs no buffer.
    pub fn process_cached(
        &self,
        input: &Path,
        output: &Path,
        detections: &Path,
    ) -> Result<ProcessOutcome> {
        if output.exists() {
            log::info!("output {} already exists, skipping", output.display());
            return Ok(ProcessOutcome::Skipped);
        }
        let buffer = cache::load(detections)?
            .with_context(|| format!("no detections found at {}", detections.display()))?;
        log::info!("{} results loaded from {}", buffer.len(), detections.display());
        self.process_video(input, output, &buffer)
    }

    pub fn process_video_with_tracker(
        &self,
        input: &Path,
        output: &Path,
        buffer: &[DetectionResult],
        tracker: &mut TraceTracker,
    ) -> Result<ProcessOutcome> {
        if output.exists() {
            log::info!("output {} already exists, skipping", output.display());
            return Ok(ProcessOutcome::Skipped);
        }

        let probe = self.backend.probe(input)?;
        log::info!(
            "{}: {}x{} @ {} fps, audio: {} ({})",
            input.display(),
            probe.width,
            probe.height,
            probe.frame_rate,
            probe.has_audio,
            self.backend.name()
        );

        let scratch = self.scratch_dir()?;
        let raw_dir = scratch.path().join(RAW_DIR);
        let rendered_dir = scratch.path().join(RENDERED_DIR);
        fs::create_dir_all(&raw_dir)?;
        fs::create_dir_all(&rendered_dir)?;

        self.backend.extract_frames(input, &raw_dir)?;
        let frames = list_frames(&raw_dir)?;
        if frames.is_empty() {
            bail!("no frames extracted from {}", input.display());
        }
        log::info!("extracted {} frames from {}", frames.len(), input.display());

        let frame_map = build_frame_map(buffer, probe.frame_rate.as_f64(), &self.builder);

        let mut annotated = 0;
        for (position, frame_path) in frames.iter().enumerate() {
            if self.is_cancelled() {
                bail!("interrupted while rendering {}", input.display());
            }
            // Extracted files are 1-based, buffer indices 0-based.
            let mut primitives = frame_map
                .get(&(position as i64))
                .cloned()
                .unwrap_or_default();
            tracker.update(&primitives);
            primitives.extend(tracker.current_trail_lines());

            let file_name = frame_path
                .file_name()
                .context("extracted frame has no file name")?;
            let dest = rendered_dir.join(file_name);
            if self.render_frame(frame_path, &dest, &primitives)? {
                annotated += 1;
            }

            let done = position + 1;
            if self.options.progress_every > 0 && done % self.options.progress_every == 0 {
                log::info!("processed {}/{} frames", done, frames.len());
            }
        }

        if let Some(parent) = output.parent().filter(|p| !p.as_os_str().is_empty()) {
            fs::create_dir_all(parent)
                .with_context(|| format!("failed to create {}", parent.display()))?;
        }
        let job = EncodeJob {
            frames_dir: &rendered_dir,
            frame_pattern: FRAME_PATTERN,
            frame_rate: probe.frame_rate,
            audio_source: probe.has_audio.then_some(input),
            output,
        };
        self.backend.encode(&job)?;

        scratch
            .close()
            .context("failed to remove scratch directory")?;
        log::info!("wrote {}", output.display());
        Ok(ProcessOutcome::Rendered(RenderStats {
            frames: frames.len(),
            annotated,
            has_audio: probe.has_audio,
        }))
    }

    fn scratch_dir(&self) -> Result<TempDir> {
        let mut builder = tempfile::Builder::new();
        builder.prefix(SCRATCH_PREFIX);
        let dir = match &self.options.scratch_root {
            Some(root) => {
                fs::create_dir_all(root)
                    .with_context(|| format!("failed to create {}", root.display()))?;
                builder.tempdir_in(root)
            }
            None => builder.tempdir(),
        };
        dir.context("failed to create scratch directory")
    }

    /// Returns whether anything was drawn. Every written frame is RGB8; empty
    /// frames already in that format are copied unchanged.
    fn render_frame(&self, src: &Path, dest: &Path, primitives: &[DrawPrimitive]) -> Result<bool> {
        if primitives.is_empty() {
            if frame_color_type(src)? == ColorType::Rgb8 {
                fs::copy(src, dest).with_context(|| format!("failed to copy {}", src.display()))?;
            } else {
                save_rgb(decode_frame(src)?, dest)?;
            }
            return Ok(false);
        }
        let frame = decode_frame(src)?.into_rgba8();
        let composed = self.renderer.render(&frame, primitives);
        save_rgb(DynamicImage::ImageRgba8(composed), dest)?;
        Ok(true)
    }
}

fn decode_frame(src: &Path) -> Result<DynamicImage> {
    image::open(src).with_context(|| format!("failed to decode frame {}", src.display()))
}

/// Reads only the header.
fn frame_color_type(src: &Path) -> Result<ColorType> {
    let decoder = ImageReader::open(src)
        .and_then(|reader| reader.with_guessed_format())
        .with_context(|| format!("failed to open frame {}", src.display()))?
        .into_decoder()
        .with_context(|| format!("failed to decode frame {}", src.display()))?;
    Ok(decoder.color_type())
}

fn save_rgb(image: DynamicImage, dest: &Path) -> Result<()> {
    image
        .into_rgb8()
        .save(dest)
        .with_context(|| format!("failed to write frame {}", dest.display()))
}

fn list_frames(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut frames = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if path.extension().and_then(|s| s.to_str()) == Some("png") {
            frames.push(path);
        }
    }
    frames.sort();
    Ok(frames)
}
