//! overlay_video - render a detection buffer onto a single video

use anyhow::{Context, Result};
use clap::Parser;
use std::path::{Path, PathBuf};
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eyepop_overlay::cache;
use eyepop_overlay::errlog::append_error_log;
use eyepop_overlay::video::{FfmpegCli, ProcessOutcome, VideoOverlayPipeline};
use eyepop_overlay::{OverlayConfig, OverlayRenderer};

#[path = "../ui.rs"]
#[allow(dead_code)]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Source video.
    input: PathBuf,
    /// Output path (defaults to `<stem>_overlay.mp4` next to the input).
    #[arg(long, short)]
    output: Option<PathBuf>,
    /// Detection buffer JSON (defaults to `<input>.json`).
    #[arg(long)]
    detections: Option<PathBuf>,
    /// Config file (JSON or TOML); overrides EYEPOP_OVERLAY_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// TrueType/OpenType font for labels.
    #[arg(long)]
    font: Option<PathBuf>,
    /// UI mode for stderr progress.
    #[arg(long, value_enum, default_value_t = ui::UiMode::Auto, value_name = "MODE")]
    ui: ui::UiMode,
}

fn main() -> ExitCode {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut cfg = match OverlayConfig::load_from(args.config.as_deref()) {
        Ok(cfg) => cfg,
        Err(err) => {
            log::error!("invalid configuration: {:#}", err);
            return ExitCode::from(2);
        }
    };
    if let Some(font) = args.font.clone() {
        cfg.font_path = Some(font);
    }

    match run(&args, &cfg, ui::Ui::detect(args.ui)) {
        Ok(_) => ExitCode::SUCCESS,
        Err(err) => {
            log::error!("{:#}", err);
            if let Err(log_err) = append_error_log(&cfg.error_log, &err) {
                log::warn!("could not record error: {:#}", log_err);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(args: &Args, cfg: &OverlayConfig, ui: ui::Ui) -> Result<ProcessOutcome> {
    let output = args
        .output
        .clone()
        .unwrap_or_else(|| default_output_for(&args.input));
    let detections = args
        .detections
        .clone()
        .unwrap_or_else(|| cache::cache_path_for(&args.input));

    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, stopping after cleanup");
            cancel.store(true, Ordering::SeqCst);
        })
        .context("error setting Ctrl-C handler")?;
    }

    let renderer = OverlayRenderer::discover(cfg.font_path.as_deref())?;
    let pipeline = VideoOverlayPipeline::new(FfmpegCli::new(cfg.ffmpeg.clone()))
        .with_builder(cfg.primitive_builder())
        .with_renderer(renderer)
        .with_options(cfg.pipeline_options())
        .with_cancel_flag(cancel);

    let outcome = {
        let _stage = ui.stage("Render overlay");
        pipeline.process_cached(&args.input, &output, &detections)?
    };
    match &outcome {
        ProcessOutcome::Skipped => log::info!("{} already exists", output.display()),
        ProcessOutcome::Rendered(stats) => log::info!(
            "wrote {} ({} frames, {} annotated, audio: {})",
            output.display(),
            stats.frames,
            stats.annotated,
            stats.has_audio
        ),
    }
    Ok(outcome)
}

fn default_output_for(input: &Path) -> PathBuf {
    let stem = input
        .file_stem()
        .map(|s| s.to_string_lossy().into_owned())
        .unwrap_or_else(|| "video".to_string());
    input.with_file_name(format!("{stem}_overlay.mp4"))
}
