//! ffprobe output parsing.

use anyhow::{anyhow, Context, Result};
use serde::Deserialize;

const FALLBACK_FRAME_RATE: FrameRate = FrameRate { num: 30, den: 1 };

/// Frame rate as the rational ffprobe reports, e.g. `30000/1001`.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct FrameRate {
    pub num: u32,
    pub den: u32,
}

impl FrameRate {
    /// Parses `num/den` or a plain integer. Zero rates are rejected.
    pub fn parse(value: &str) -> Option<Self> {
        let value = value.trim();
        let (num, den) = match value.split_once('/') {
            Some((num, den)) => (num.trim().parse().ok()?, den.trim().parse().ok()?),
            None => (value.parse().ok()?, 1),
        };
        if num == 0 || den == 0 {
            return None;
        }
        Some(Self { num, den })
    }

    pub fn as_f64(self) -> f64 {
        self.num as f64 / self.den as f64
    }
}

impl std::fmt::Display for FrameRate {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}/{}", self.num, self.den)
    }
}

/// Stream facts needed to extract and re-encode a video.
#[derive(Clone, Debug, PartialEq)]
pub struct VideoProbe {
    pub frame_rate: FrameRate,
    /// Coded dimensions; rendered frames may differ when a rotation applies.
    pub width: u32,
    pub height: u32,
    pub has_audio: bool,
}

#[derive(Debug, Deserialize)]
struct FfprobeOutput {
    #[serde(default)]
    streams: Vec<FfprobeStream>,
}

#[derive(Debug, Deserialize)]
struct FfprobeStream {
    codec_type: Option<String>,
    r_frame_rate: Option<String>,
    avg_frame_rate: Option<String>,
    width: Option<u32>,
    height: Option<u32>,
}

/// Parses `ffprobe -print_format json -show_streams` output.
pub fn parse_ffprobe_json(raw: &str) -> Result<VideoProbe> {
    let output: FfprobeOutput = serde_json::from_str(raw).context("invalid ffprobe json")?;
    let video = output
        .streams
        .iter()
        .find(|s| s.codec_type.as_deref() == Some("video"))
        .ok_or_else(|| anyhow!("no video stream found"))?;
    let frame_rate = [video.r_frame_rate.as_deref(), video.avg_frame_rate.as_deref()]
        .into_iter()
        .flatten()
        .find_map(FrameRate::parse)
        .unwrap_or(FALLBACK_FRAME_RATE);
    let has_audio = output
        .streams
        .iter()
        .any(|s| s.codec_type.as_deref() == Some("audio"));
    Ok(VideoProbe {
        frame_rate,
        width: video.width.unwrap_or(0),
        height: video.height.unwrap_or(0),
        has_audio,
    })
}
