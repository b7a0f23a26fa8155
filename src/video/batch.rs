//! Directory batch driver: one video at a time, failures isolated per item.

use std::fs;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};

use super::backend::MediaBackend;
use super::pipeline::{ProcessOutcome, VideoOverlayPipeline};
use crate::detect::DetectionResult;

pub const VIDEO_EXTENSIONS: &[&str] = &["mp4", "mov"];
pub const DEFAULT_OUTPUT_SUFFIX: &str = "_output";

/// Videos directly inside `dir`, sorted by path. Extension match ignores case.
pub fn scan_videos(dir: &Path) -> Result<Vec<PathBuf>> {
    let mut videos = Vec::new();
    for entry in fs::read_dir(dir).with_context(|| format!("failed to read {}", dir.display()))? {
        let path = entry?.path();
        if !path.is_file() {
            continue;
        }
        let is_video = path
            .extension()
            .and_then(|ext| ext.to_str())
            .is_some_and(|ext| {
                VIDEO_EXTENSIONS
                    .iter()
                    .any(|known| ext.eq_ignore_ascii_case(known))
            });
        if is_video {
            videos.push(path);
        }
    }
    videos.sort();
    Ok(videos)
}

/// `<out_dir>/<stem><suffix>.mp4`
pub fn output_path_for(input: &Path, out_dir: &Path, suffix: &str) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    out_dir.join(format!("{stem}{suffix}.mp4"))
}

#[derive(Debug, Default)]
pub struct BatchReport {
    pub rendered: Vec<PathBuf>,
    pub skipped: Vec<PathBuf>,
    pub failed: Vec<(PathBuf, String)>,
    /// Set when the run stopped early on the cancellation flag.
    pub cancelled: bool,
}

impl BatchReport {
    pub fn is_clean(&self) -> bool {
        self.failed.is_empty() && !self.cancelled
    }

    pub fn summary(&self) -> String {
        format!(
            "{} rendered, {} skipped, {} failed{}",
            self.rendered.len(),
            self.skipped.len(),
            self.failed.len(),
            if self.cancelled { " (cancelled)" } else { "" }
        )
    }
}

/// Renders every input in order. Existing outputs are skipped before
/// `load_buffer` runs, so cached or remote detections are never fetched for
/// finished videos. An error on one item is logged and recorded, then the
/// batch moves on.
pub fn run_batch<B, F>(
    pipeline: &VideoOverlayPipeline<B>,
    inputs: &[PathBuf],
    out_dir: &Path,
    suffix: &str,
    mut load_buffer: F,
) -> BatchReport
where
    B: MediaBackend,
    F: FnMut(&Path) -> Result<Vec<DetectionResult>>,
{
    let mut report = BatchReport::default();
    for (index, input) in inputs.iter().enumerate() {
        if pipeline.is_cancelled() {
            log::warn!("batch cancelled after {} of {} videos", index, inputs.len());
            report.cancelled = true;
            break;
        }
        let output = output_path_for(input, out_dir, suffix);
        if output.exists() {
            log::info!("output {} already exists, skipping", output.display());
            report.skipped.push(input.clone());
            continue;
        }

        log::info!("[{}/{}] {}", index + 1, inputs.len(), input.display());
        let result = load_buffer(input)
            .and_then(|buffer| pipeline.process_video(input, &output, &buffer));
        match result {
            Ok(ProcessOutcome::Rendered(stats)) => {
                log::info!(
                    "{}: {} frames, {} annotated",
                    input.display(),
                    stats.frames,
                    stats.annotated
                );
                report.rendered.push(input.clone());
            }
            Ok(ProcessOutcome::Skipped) => report.skipped.push(input.clone()),
            Err(err) => {
                log::error!("{} failed: {:#}", input.display(), err);
                report.failed.push((input.clone(), format!("{:#}", err)));
            }
        }
    }
    report
}
