//! ffmpeg/ffprobe command-line backend.
//!
//! Frames are extracted as PNG so overlays are drawn on lossless pixels, and the
//! result is re-encoded as H.264/yuv420p for broad player support.

use std::ffi::OsString;
use std::path::{Path, PathBuf};
use std::process::{Command, Output, Stdio};

use anyhow::{anyhow, Context, Result};

use super::backend::{EncodeJob, MediaBackend, FRAME_PATTERN};
use super::probe::{parse_ffprobe_json, VideoProbe};

const BACKEND_NAME: &str = "ffmpeg-cli";
const STDERR_TAIL_LINES: usize = 12;

#[derive(Clone, Debug, PartialEq)]
pub struct FfmpegSettings {
    pub ffmpeg: PathBuf,
    pub ffprobe: PathBuf,
    /// x264 constant rate factor (0-51).
    pub crf: u8,
    pub preset: String,
}

impl Default for FfmpegSettings {
    fn default() -> Self {
        Self {
            ffmpeg: PathBuf::from("ffmpeg"),
            ffprobe: PathBuf::from("ffprobe"),
            crf: 18,
            preset: "veryfast".to_string(),
        }
    }
}

#[derive(Clone, Debug, Default)]
pub struct FfmpegCli {
    settings: FfmpegSettings,
}

impl FfmpegCli {
    pub fn new(settings: FfmpegSettings) -> Self {
        Self { settings }
    }

    pub fn settings(&self) -> &FfmpegSettings {
        &self.settings
    }

    /// Arguments for dumping every frame as an RGB24 PNG.
    pub fn extract_args(&self, input: &Path, frames_dir: &Path) -> Vec<OsString> {
        vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-i".into(),
            input.as_os_str().to_owned(),
            "-vsync".into(),
            "0".into(),
            "-pix_fmt".into(),
            "rgb24".into(),
            frames_dir.join(FRAME_PATTERN).into_os_string(),
        ]
    }

    /// Arguments for re-encoding a frame sequence; split out for testing.
    pub fn encode_args(&self, job: &EncodeJob<'_>) -> Vec<OsString> {
        let mut args: Vec<OsString> = vec![
            "-y".into(),
            "-hide_banner".into(),
            "-loglevel".into(),
            "error".into(),
            "-framerate".into(),
            job.frame_rate.to_string().into(),
            "-i".into(),
            job.frames_dir.join(job.frame_pattern).into_os_string(),
        ];
        if let Some(audio) = job.audio_source {
            args.push("-i".into());
            args.push(audio.as_os_str().to_owned());
        }
        args.extend(["-map".into(), "0:v:0".into()]);
        if job.audio_source.is_some() {
            args.extend(["-map".into(), "1:a:0?".into()]);
        }
        args.extend([
            "-c:v".into(),
            "libx264".into(),
            "-pix_fmt".into(),
            "yuv420p".into(),
            "-crf".into(),
            self.settings.crf.to_string().into(),
            "-preset".into(),
            self.settings.preset.clone().into(),
            "-r".into(),
            job.frame_rate.to_string().into(),
        ]);
        if job.audio_source.is_some() {
            args.extend(["-c:a".into(), "copy".into(), "-shortest".into()]);
        }
        args.push(job.output.as_os_str().to_owned());
        args
    }
}

impl MediaBackend for FfmpegCli {
    fn name(&self) -> &'static str {
        BACKEND_NAME
    }

    fn probe(&self, input: &Path) -> Result<VideoProbe> {
        let args: Vec<OsString> = vec![
            "-v".into(),
            "error".into(),
            "-print_format".into(),
            "json".into(),
            "-show_streams".into(),
            "-show_format".into(),
            input.as_os_str().to_owned(),
        ];
        let output = run_tool(&self.settings.ffprobe, &args)?;
        let stdout = String::from_utf8_lossy(&output.stdout);
        parse_ffprobe_json(&stdout).with_context(|| format!("failed to probe {}", input.display()))
    }

    fn extract_frames(&self, input: &Path, frames_dir: &Path) -> Result<()> {
        run_tool(&self.settings.ffmpeg, &self.extract_args(input, frames_dir))
            .with_context(|| format!("failed to extract frames from {}", input.display()))?;
        Ok(())
    }

    fn encode(&self, job: &EncodeJob<'_>) -> Result<()> {
        run_tool(&self.settings.ffmpeg, &self.encode_args(job))
            .with_context(|| format!("failed to encode {}", job.output.display()))?;
        Ok(())
    }
}

fn run_tool(program: &Path, args: &[OsString]) -> Result<Output> {
    log::debug!(
        "running {} {}",
        program.display(),
        args.iter()
            .map(|a| a.to_string_lossy())
            .collect::<Vec<_>>()
            .join(" ")
    );
    let output = Command::new(program)
        .args(args)
        .stdin(Stdio::null())
        .output()
        .with_context(|| format!("failed to run {}", program.display()))?;
    if !output.status.success() {
        let stderr = String::from_utf8_lossy(&output.stderr);
        let lines: Vec<&str> = stderr.lines().collect();
        let tail = lines[lines.len().saturating_sub(STDERR_TAIL_LINES)..].join("\n");
        return Err(anyhow!(
            "{} exited with {}: {}",
            program.display(),
            output.status,
            tail.trim()
        ));
    }
    Ok(output)
}
