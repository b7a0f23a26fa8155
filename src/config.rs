use anyhow::{anyhow, Result};
use serde::Deserialize;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::time::Duration;

use crate::overlay::{parse_hex_color, CategoryStyle, PrimitiveBuilder};
use crate::retry::RetryPolicy;
use crate::video::{FfmpegSettings, PipelineOptions, DEFAULT_OUTPUT_SUFFIX, DEFAULT_PROGRESS_EVERY};

const DEFAULT_INPUT_DIR: &str = "input_video";
const DEFAULT_OUTPUT_DIR: &str = "output_video";
const DEFAULT_ERROR_LOG: &str = "error_log.txt";
const DEFAULT_POP: &str = "person";
const MAX_CRF: u8 = 51;

pub const CONFIG_ENV: &str = "EYEPOP_OVERLAY_CONFIG";

#[derive(Debug, Deserialize, Default)]
struct OverlayConfigFile {
    input_dir: Option<PathBuf>,
    output_dir: Option<PathBuf>,
    output_suffix: Option<String>,
    scratch_dir: Option<PathBuf>,
    font_path: Option<PathBuf>,
    pop: Option<String>,
    error_log: Option<PathBuf>,
    progress_every: Option<usize>,
    ffmpeg: Option<FfmpegConfigFile>,
    retry: Option<RetryConfigFile>,
    style: Option<StyleConfigFile>,
}

#[derive(Debug, Deserialize, Default)]
struct FfmpegConfigFile {
    ffmpeg: Option<PathBuf>,
    ffprobe: Option<PathBuf>,
    crf: Option<u8>,
    preset: Option<String>,
}

#[derive(Debug, Deserialize, Default)]
struct RetryConfigFile {
    max_attempts: Option<u32>,
    backoff_ms: Option<u64>,
}

#[derive(Debug, Deserialize, Default)]
struct StyleConfigFile {
    /// Category -> `#rrggbb` / `#rrggbbaa`, merged over the built-in table.
    colors: Option<HashMap<String, String>>,
    default_color: Option<String>,
    spine_categories: Option<Vec<String>>,
    pose_categories: Option<Vec<String>>,
    keypoint_radius: Option<f32>,
    max_depth: Option<usize>,
}

#[derive(Debug, Clone)]
pub struct OverlayConfig {
    pub input_dir: PathBuf,
    pub output_dir: PathBuf,
    pub output_suffix: String,
    pub scratch_dir: Option<PathBuf>,
    pub font_path: Option<PathBuf>,
    /// Preset name or path to a pop definition file.
    pub pop: String,
    pub error_log: PathBuf,
    pub progress_every: usize,
    pub ffmpeg: FfmpegSettings,
    pub retry: RetryPolicy,
    pub style: CategoryStyle,
}

impl OverlayConfig {
    /// Config from the file named by `EYEPOP_OVERLAY_CONFIG` (if any), then
    /// environment overrides, then validation.
    pub fn load() -> Result<Self> {
        Self::load_from(None)
    }

    /// Like `load`, with an explicit file taking precedence over the env var.
    pub fn load_from(path: Option<&Path>) -> Result<Self> {
        let env_path = std::env::var(CONFIG_ENV)
            .ok()
            .filter(|p| !p.trim().is_empty())
            .map(PathBuf::from);
        let file_cfg = match path.map(Path::to_path_buf).or(env_path) {
            Some(path) => Some(read_config_file(&path)?),
            None => None,
        };
        let mut cfg = Self::from_file(file_cfg.unwrap_or_default())?;
        cfg.apply_env()?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn primitive_builder(&self) -> PrimitiveBuilder {
        PrimitiveBuilder::new(self.style.clone())
    }

    pub fn pipeline_options(&self) -> PipelineOptions {
        PipelineOptions {
            scratch_root: self.scratch_dir.clone(),
            progress_every: self.progress_every,
        }
    }

    fn from_file(file: OverlayConfigFile) -> Result<Self> {
        let ffmpeg_file = file.ffmpeg.unwrap_or_default();
        let defaults = FfmpegSettings::default();
        let ffmpeg = FfmpegSettings {
            ffmpeg: ffmpeg_file.ffmpeg.unwrap_or(defaults.ffmpeg),
            ffprobe: ffmpeg_file.ffprobe.unwrap_or(defaults.ffprobe),
            crf: ffmpeg_file.crf.unwrap_or(defaults.crf),
            preset: ffmpeg_file.preset.unwrap_or(defaults.preset),
        };

        let retry_file = file.retry.unwrap_or_default();
        let retry_defaults = RetryPolicy::default();
        let retry = RetryPolicy {
            max_attempts: retry_file
                .max_attempts
                .unwrap_or(retry_defaults.max_attempts),
            backoff_step: retry_file
                .backoff_ms
                .map(Duration::from_millis)
                .unwrap_or(retry_defaults.backoff_step),
        };

        Ok(Self {
            input_dir: file
                .input_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_INPUT_DIR)),
            output_dir: file
                .output_dir
                .unwrap_or_else(|| PathBuf::from(DEFAULT_OUTPUT_DIR)),
            output_suffix: file
                .output_suffix
                .unwrap_or_else(|| DEFAULT_OUTPUT_SUFFIX.to_string()),
            scratch_dir: file.scratch_dir,
            font_path: file.font_path,
            pop: file.pop.unwrap_or_else(|| DEFAULT_POP.to_string()),
            error_log: file
                .error_log
                .unwrap_or_else(|| PathBuf::from(DEFAULT_ERROR_LOG)),
            progress_every: file.progress_every.unwrap_or(DEFAULT_PROGRESS_EVERY),
            ffmpeg,
            retry,
            style: style_from_file(file.style.unwrap_or_default())?,
        })
    }

    fn apply_env(&mut self) -> Result<()> {
        if let Some(dir) = env_path("EYEPOP_INPUT_DIR") {
            self.input_dir = dir;
        }
        if let Some(dir) = env_path("EYEPOP_OUTPUT_DIR") {
            self.output_dir = dir;
        }
        if let Some(dir) = env_path("EYEPOP_SCRATCH_DIR") {
            self.scratch_dir = Some(dir);
        }
        if let Some(path) = env_path("EYEPOP_FONT_PATH") {
            self.font_path = Some(path);
        }
        if let Some(path) = env_path("EYEPOP_FFMPEG") {
            self.ffmpeg.ffmpeg = path;
        }
        if let Some(path) = env_path("EYEPOP_FFPROBE") {
            self.ffmpeg.ffprobe = path;
        }
        Ok(())
    }

    fn validate(&self) -> Result<()> {
        if self.ffmpeg.crf > MAX_CRF {
            return Err(anyhow!("ffmpeg.crf must be at most {MAX_CRF}"));
        }
        if self.ffmpeg.preset.trim().is_empty() {
            return Err(anyhow!("ffmpeg.preset must not be empty"));
        }
        if self.retry.max_attempts == 0 {
            return Err(anyhow!("retry.max_attempts must be greater than zero"));
        }
        if self.output_suffix.contains(['/', '\\']) {
            return Err(anyhow!("output_suffix must not contain path separators"));
        }
        if self.output_suffix.is_empty() && self.input_dir == self.output_dir {
            return Err(anyhow!(
                "output_suffix must be set when input and output directories are the same"
            ));
        }
        if !(self.style.keypoint_radius.is_finite() && self.style.keypoint_radius > 0.0) {
            return Err(anyhow!("style.keypoint_radius must be greater than zero"));
        }
        if self.pop.trim().is_empty() {
            return Err(anyhow!("pop must name a preset or a definition file"));
        }
        Ok(())
    }
}

fn style_from_file(file: StyleConfigFile) -> Result<CategoryStyle> {
    let mut style = CategoryStyle::default();
    for (category, hex) in file.colors.unwrap_or_default() {
        let color = parse_hex_color(&hex)
            .map_err(|e| anyhow!("style.colors.{}: {}", category, e))?;
        style.colors.insert(category.trim().to_lowercase(), color);
    }
    if let Some(hex) = file.default_color {
        style.default_color =
            parse_hex_color(&hex).map_err(|e| anyhow!("style.default_color: {}", e))?;
    }
    if let Some(categories) = file.spine_categories {
        style.spine_categories = categories;
    }
    if let Some(categories) = file.pose_categories {
        style.pose_categories = categories;
    }
    if let Some(radius) = file.keypoint_radius {
        style.keypoint_radius = radius;
    }
    if let Some(depth) = file.max_depth {
        style.max_depth = depth;
    }
    Ok(style)
}

fn read_config_file(path: &Path) -> Result<OverlayConfigFile> {
    let raw = std::fs::read_to_string(path)
        .map_err(|e| anyhow!("failed to read config file {}: {}", path.display(), e))?;
    let is_toml = path
        .extension()
        .and_then(|ext| ext.to_str())
        .is_some_and(|ext| ext.eq_ignore_ascii_case("toml"));
    let cfg = if is_toml {
        toml::from_str(&raw).map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    } else {
        serde_json::from_str(&raw)
            .map_err(|e| anyhow!("invalid config file {}: {}", path.display(), e))?
    };
    Ok(cfg)
}

fn env_path(name: &str) -> Option<PathBuf> {
    std::env::var(name)
        .ok()
        .filter(|value| !value.trim().is_empty())
        .map(PathBuf::from)
}
