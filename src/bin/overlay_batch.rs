//! overlay_batch - render detection overlays onto every video in a directory
//!
//! For each `.mp4`/`.mov` in the input directory:
//! 1. Skip it when `<stem>_output.mp4` already exists
//! 2. Load detections from `<video>.json`, or run the configured pop
//! 3. Draw boxes, spines, keypoints and trace trails on every frame
//! 4. Re-encode to the output directory, keeping the original audio
//!
//! A failing video is logged and the batch moves on. Unexpected errors are
//! appended to the error log and the process exits non-zero.

use anyhow::{Context, Result};
use clap::Parser;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use eyepop_overlay::client::OfflineClient;
use eyepop_overlay::errlog::append_error_log;
use eyepop_overlay::video::{run_batch, scan_videos, BatchReport, FfmpegCli, VideoOverlayPipeline};
use eyepop_overlay::{OverlayConfig, OverlayRenderer, PopDefinition, Processor};

#[path = "../ui.rs"]
#[allow(dead_code)]
mod ui;

#[derive(Parser, Debug)]
#[command(author, version, about)]
struct Args {
    /// Directory scanned for input videos.
    #[arg(long)]
    input_dir: Option<PathBuf>,
    /// Directory receiving `<stem>_output.mp4` files.
    #[arg(long)]
    output_dir: Option<PathBuf>,
    /// Config file (JSON or TOML); overrides EYEPOP_OVERLAY_CONFIG.
    #[arg(long)]
    config: Option<PathBuf>,
    /// Pop preset name or definition file used when no cache exists.
    #[arg(long)]
    pop: Option<String>,
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
    if let Some(dir) = args.input_dir.clone() {
        cfg.input_dir = dir;
    }
    if let Some(dir) = args.output_dir.clone() {
        cfg.output_dir = dir;
    }
    if let Some(pop) = args.pop.clone() {
        cfg.pop = pop;
    }
    if let Some(font) = args.font.clone() {
        cfg.font_path = Some(font);
    }

    match run(&cfg, ui::Ui::detect(args.ui)) {
        Ok(report) if report.is_clean() => ExitCode::SUCCESS,
        Ok(_) => ExitCode::FAILURE,
        Err(err) => {
            log::error!("{:#}", err);
            if let Err(log_err) = append_error_log(&cfg.error_log, &err) {
                log::warn!("could not record error: {:#}", log_err);
            }
            ExitCode::FAILURE
        }
    }
}

fn run(cfg: &OverlayConfig, ui: ui::Ui) -> Result<BatchReport> {
    let cancel = Arc::new(AtomicBool::new(false));
    {
        let cancel = Arc::clone(&cancel);
        ctrlc::set_handler(move || {
            log::warn!("interrupt received, stopping after cleanup");
            cancel.store(true, Ordering::SeqCst);
        })
        .context("error setting Ctrl-C handler")?;
    }

    let (pop, renderer) = {
        let _stage = ui.stage("Load pop and font");
        let pop = PopDefinition::resolve(&cfg.pop)?;
        let renderer = OverlayRenderer::discover(cfg.font_path.as_deref())?;
        (pop, renderer)
    };

    let videos = {
        let _stage = ui.stage("Scan input videos");
        scan_videos(&cfg.input_dir)?
    };
    if videos.is_empty() {
        log::warn!("no videos found in {}", cfg.input_dir.display());
        return Ok(BatchReport::default());
    }
    log::info!("found {} videos in {}", videos.len(), cfg.input_dir.display());
    std::fs::create_dir_all(&cfg.output_dir)
        .with_context(|| format!("failed to create {}", cfg.output_dir.display()))?;

    let mut processor = Processor::new(pop, OfflineClient).with_retry(cfg.retry);
    let pipeline = VideoOverlayPipeline::new(FfmpegCli::new(cfg.ffmpeg.clone()))
        .with_builder(cfg.primitive_builder())
        .with_renderer(renderer)
        .with_options(cfg.pipeline_options())
        .with_cancel_flag(Arc::clone(&cancel));

    let bar = ui.batch_bar(videos.len());
    let report = run_batch(
        &pipeline,
        &videos,
        &cfg.output_dir,
        &cfg.output_suffix,
        |input| {
            bar.inc(1);
            bar.set_message(
                input
                    .file_name()
                    .map(|name| name.to_string_lossy().into_owned())
                    .unwrap_or_default(),
            );
            processor.detections_for(input)
        },
    );
    bar.finish_and_clear();

    for (input, reason) in &report.failed {
        log::error!("failed: {} ({})", input.display(), reason);
    }
    log::info!("batch finished: {}", report.summary());
    Ok(report)
}
