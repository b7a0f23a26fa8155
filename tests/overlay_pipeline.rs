use anyhow::{anyhow, Result};
use image::{ColorType, Rgb, RgbImage, RgbaImage};
use std::cell::RefCell;
use std::fs;
use std::path::{Path, PathBuf};
use std::sync::atomic::AtomicBool;
use std::sync::Arc;
use tempfile::{tempdir, TempDir};

use eyepop_overlay::video::{
    run_batch, EncodeJob, FrameRate, MediaBackend, PipelineOptions, ProcessOutcome,
    VideoOverlayPipeline, VideoProbe,
};
use eyepop_overlay::cache::{self, cache_path_for};
use eyepop_overlay::{DetectedObject, DetectionResult};

#[derive(Default)]
struct Calls {
    probes: usize,
    extracts: usize,
    encodes: Vec<(FrameRate, Option<PathBuf>, PathBuf)>,
}

/// In-process stand-in for ffmpeg: extraction writes black PNG frames, encoding
/// copies the rendered frames to `captured` and writes a dummy output file.
struct FakeMedia {
    probe: Option<VideoProbe>,
    frames: u32,
    size: (u32, u32),
    fail_extract: bool,
    /// Extract RGBA frames instead of RGB.
    rgba: bool,
    captured: PathBuf,
    calls: RefCell<Calls>,
}

impl FakeMedia {
    fn new(captured: &Path, frames: u32) -> Self {
        Self {
            probe: Some(VideoProbe {
                frame_rate: FrameRate { num: 1, den: 1 },
                width: 32,
                height: 32,
                has_audio: false,
            }),
            frames,
            size: (32, 32),
            fail_extract: false,
            rgba: false,
            captured: captured.to_path_buf(),
            calls: RefCell::new(Calls::default()),
        }
    }

    fn total_calls(&self) -> usize {
        let calls = self.calls.borrow();
        calls.probes + calls.extracts + calls.encodes.len()
    }
}

impl MediaBackend for FakeMedia {
    fn name(&self) -> &'static str {
        "fake"
    }

    fn probe(&self, _input: &Path) -> Result<VideoProbe> {
        self.calls.borrow_mut().probes += 1;
        self.probe.clone().ok_or_else(|| anyhow!("no video stream found"))
    }

    fn extract_frames(&self, _input: &Path, frames_dir: &Path) -> Result<()> {
        self.calls.borrow_mut().extracts += 1;
        if self.fail_extract {
            fs::write(frames_dir.join("00000001.png"), b"partial")?;
            return Err(anyhow!("ffmpeg exited with 1: invalid data"));
        }
        let (w, h) = self.size;
        for i in 1..=self.frames {
            let path = frames_dir.join(format!("{i:08}.png"));
            if self.rgba {
                RgbaImage::new(w, h).save(path)?;
            } else {
                RgbImage::new(w, h).save(path)?;
            }
        }
        Ok(())
    }

    fn encode(&self, job: &EncodeJob<'_>) -> Result<()> {
        fs::create_dir_all(&self.captured)?;
        for entry in fs::read_dir(job.frames_dir)? {
            let path = entry?.path();
            if let Some(name) = path.file_name() {
                fs::copy(&path, self.captured.join(name))?;
            }
        }
        fs::write(job.output, b"mp4")?;
        self.calls.borrow_mut().encodes.push((
            job.frame_rate,
            job.audio_source.map(Path::to_path_buf),
            job.output.to_path_buf(),
        ));
        Ok(())
    }
}

struct Fixture {
    dir: TempDir,
}

impl Fixture {
    fn new() -> Self {
        Self {
            dir: tempdir().unwrap(),
        }
    }

    fn path(&self, name: &str) -> PathBuf {
        self.dir.path().join(name)
    }

    fn scratch(&self) -> PathBuf {
        self.path("scratch")
    }

    fn options(&self) -> PipelineOptions {
        PipelineOptions {
            scratch_root: Some(self.scratch()),
            ..PipelineOptions::default()
        }
    }

    fn scratch_entries(&self) -> usize {
        match fs::read_dir(self.scratch()) {
            Ok(entries) => entries.count(),
            Err(_) => 0,
        }
    }
}

fn ball_at(frame: f64, x: f32, y: f32, trace_id: Option<u64>) -> DetectionResult {
    DetectionResult {
        frame: Some(frame),
        objects: vec![DetectedObject {
            category: Some("ball".into()),
            x: Some(x),
            y: Some(y),
            width: Some(5.0),
            height: Some(5.0),
            trace_id,
            ..DetectedObject::default()
        }],
        ..DetectionResult::default()
    }
}

#[test]
fn draws_detections_on_matching_frames_only() {
    let fx = Fixture::new();
    let backend = FakeMedia::new(&fx.path("captured"), 2);
    let pipeline = VideoOverlayPipeline::new(backend).with_options(fx.options());
    let output = fx.path("out/clip_output.mp4");

    let outcome = pipeline
        .process_video(&fx.path("clip.mp4"), &output, &[ball_at(0.0, 10.0, 10.0, None)])
        .unwrap();

    match outcome {
        ProcessOutcome::Rendered(stats) => {
            assert_eq!(stats.frames, 2);
            assert_eq!(stats.annotated, 1);
            assert!(!stats.has_audio);
        }
        other => panic!("unexpected outcome {other:?}"),
    }
    assert!(output.exists());

    let first = image::open(fx.path("captured/00000001.png")).unwrap().to_rgb8();
    assert_eq!(*first.get_pixel(10, 10), Rgb([0, 255, 0]));
    assert_eq!(*first.get_pixel(0, 0), Rgb([0, 0, 0]));
    let second = image::open(fx.path("captured/00000002.png")).unwrap().to_rgb8();
    assert_eq!(*second.get_pixel(10, 10), Rgb([0, 0, 0]));

    let calls = pipeline.backend().calls.borrow();
    assert_eq!(calls.encodes.len(), 1);
    let (rate, audio, encoded) = &calls.encodes[0];
    assert_eq!(*rate, FrameRate { num: 1, den: 1 });
    assert!(audio.is_none());
    assert_eq!(encoded, &output);
    assert_eq!(fx.scratch_entries(), 0);
}

#[test]
fn every_encoded_frame_is_rgb8() {
    let fx = Fixture::new();
    let mut backend = FakeMedia::new(&fx.path("captured"), 2);
    backend.rgba = true;
    let pipeline = VideoOverlayPipeline::new(backend).with_options(fx.options());

    pipeline
        .process_video(&fx.path("clip.mp4"), &fx.path("out.mp4"), &[ball_at(0.0, 4.0, 4.0, None)])
        .unwrap();

    for name in ["00000001.png", "00000002.png"] {
        let frame = image::open(fx.path("captured").join(name)).unwrap();
        assert_eq!(frame.color(), ColorType::Rgb8, "{name}");
    }
}

#[test]
fn audio_source_is_the_input_when_present() {
    let fx = Fixture::new();
    let mut backend = FakeMedia::new(&fx.path("captured"), 1);
    if let Some(probe) = backend.probe.as_mut() {
        probe.has_audio = true;
        probe.frame_rate = FrameRate { num: 30000, den: 1001 };
    }
    let pipeline = VideoOverlayPipeline::new(backend).with_options(fx.options());
    let input = fx.path("clip.mov");

    pipeline
        .process_video(&input, &fx.path("clip_output.mp4"), &[])
        .unwrap();

    let calls = pipeline.backend().calls.borrow();
    let (rate, audio, _) = &calls.encodes[0];
    assert_eq!(*rate, FrameRate { num: 30000, den: 1001 });
    assert_eq!(audio.as_deref(), Some(input.as_path()));
}

#[test]
fn existing_output_is_left_untouched() {
    let fx = Fixture::new();
    let output = fx.path("clip_output.mp4");
    fs::write(&output, b"previous run").unwrap();
    let pipeline =
        VideoOverlayPipeline::new(FakeMedia::new(&fx.path("captured"), 1)).with_options(fx.options());

    let outcome = pipeline
        .process_video(&fx.path("clip.mp4"), &output, &[ball_at(0.0, 1.0, 1.0, None)])
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Skipped);
    assert_eq!(pipeline.backend().total_calls(), 0);
    assert_eq!(fs::read(&output).unwrap(), b"previous run");
    assert!(!fx.scratch().exists());
}

#[test]
fn finished_video_is_skipped_without_a_detection_cache() {
    let fx = Fixture::new();
    let output = fx.path("clip_overlay.mp4");
    fs::write(&output, b"previous run").unwrap();
    let pipeline =
        VideoOverlayPipeline::new(FakeMedia::new(&fx.path("captured"), 1)).with_options(fx.options());

    let outcome = pipeline
        .process_cached(&fx.path("clip.mp4"), &output, &fx.path("clip.mp4.json"))
        .unwrap();

    assert_eq!(outcome, ProcessOutcome::Skipped);
    assert_eq!(pipeline.backend().total_calls(), 0);
    assert_eq!(fs::read(&output).unwrap(), b"previous run");
}

#[test]
fn cached_detections_are_rendered_and_missing_cache_is_an_error() {
    let fx = Fixture::new();
    let input = fx.path("clip.mp4");
    let pipeline =
        VideoOverlayPipeline::new(FakeMedia::new(&fx.path("captured"), 1)).with_options(fx.options());

    let err = pipeline
        .process_cached(&input, &fx.path("clip_overlay.mp4"), &cache_path_for(&input))
        .unwrap_err();
    assert!(err.to_string().contains("no detections found"));
    assert_eq!(pipeline.backend().total_calls(), 0);

    cache::save(&cache_path_for(&input), &[ball_at(0.0, 10.0, 10.0, None)]).unwrap();
    let outcome = pipeline
        .process_cached(&input, &fx.path("clip_overlay.mp4"), &cache_path_for(&input))
        .unwrap();
    match outcome {
        ProcessOutcome::Rendered(stats) => assert_eq!(stats.annotated, 1),
        other => panic!("unexpected outcome {other:?}"),
    }
}

#[test]
fn missing_video_stream_fails_before_scratch_is_created() {
    let fx = Fixture::new();
    let mut backend = FakeMedia::new(&fx.path("captured"), 1);
    backend.probe = None;
    let pipeline = VideoOverlayPipeline::new(backend).with_options(fx.options());

    let err = pipeline
        .process_video(&fx.path("audio_only.mp4"), &fx.path("out.mp4"), &[])
        .unwrap_err();

    assert!(err.to_string().contains("no video stream"));
    assert!(!fx.scratch().exists());
    assert_eq!(pipeline.backend().calls.borrow().extracts, 0);
}

#[test]
fn extraction_failure_removes_scratch() {
    let fx = Fixture::new();
    let mut backend = FakeMedia::new(&fx.path("captured"), 1);
    backend.fail_extract = true;
    let pipeline = VideoOverlayPipeline::new(backend).with_options(fx.options());

    let err = pipeline
        .process_video(&fx.path("clip.mp4"), &fx.path("out.mp4"), &[])
        .unwrap_err();

    assert!(format!("{err:#}").contains("invalid data"));
    assert_eq!(fx.scratch_entries(), 0);
    assert!(!fx.path("out.mp4").exists());
}

#[test]
fn cancellation_stops_between_frames_and_cleans_up() {
    let fx = Fixture::new();
    let cancel = Arc::new(AtomicBool::new(true));
    let pipeline = VideoOverlayPipeline::new(FakeMedia::new(&fx.path("captured"), 3))
        .with_options(fx.options())
        .with_cancel_flag(cancel);

    let err = pipeline
        .process_video(&fx.path("clip.mp4"), &fx.path("out.mp4"), &[])
        .unwrap_err();

    assert!(err.to_string().contains("interrupted"));
    assert!(pipeline.backend().calls.borrow().encodes.is_empty());
    assert_eq!(fx.scratch_entries(), 0);
}

#[test]
fn trace_trail_is_drawn_between_past_positions() {
    let fx = Fixture::new();
    let mut backend = FakeMedia::new(&fx.path("captured"), 2);
    backend.size = (64, 64);
    let pipeline = VideoOverlayPipeline::new(backend).with_options(fx.options());
    let buffer = [
        ball_at(0.0, 10.0, 40.0, Some(1)),
        ball_at(1.0, 40.0, 40.0, Some(1)),
    ];

    pipeline
        .process_video(&fx.path("clip.mp4"), &fx.path("out.mp4"), &buffer)
        .unwrap();

    // Centroids are (12.5, 42.5) and (42.5, 42.5); the trail crosses x = 27.
    // Trace id 1 maps to the second palette entry.
    let second = image::open(fx.path("captured/00000002.png")).unwrap().to_rgb8();
    assert_eq!(*second.get_pixel(27, 42), Rgb([255, 64, 0]));
}

#[test]
fn batch_isolates_failures_and_skips_finished_videos() {
    let fx = Fixture::new();
    let out_dir = fx.path("output_video");
    fs::create_dir_all(&out_dir).unwrap();
    fs::write(out_dir.join("done_output.mp4"), b"old").unwrap();
    let inputs = vec![fx.path("broken.mp4"), fx.path("done.mp4"), fx.path("fresh.mov")];
    let pipeline =
        VideoOverlayPipeline::new(FakeMedia::new(&fx.path("captured"), 1)).with_options(fx.options());

    let mut loaded = Vec::new();
    let report = run_batch(&pipeline, &inputs, &out_dir, "_output", |input| {
        loaded.push(input.to_path_buf());
        if input.ends_with("broken.mp4") {
            return Err(anyhow!("corrupt cache"));
        }
        Ok(vec![ball_at(0.0, 2.0, 2.0, None)])
    });

    assert_eq!(report.rendered, vec![fx.path("fresh.mov")]);
    assert_eq!(report.skipped, vec![fx.path("done.mp4")]);
    assert_eq!(report.failed.len(), 1);
    assert!(report.failed[0].1.contains("corrupt cache"));
    assert_eq!(loaded, vec![fx.path("broken.mp4"), fx.path("fresh.mov")]);
    assert!(out_dir.join("fresh_output.mp4").exists());
    assert!(!report.is_clean());
}

#[test]
fn batch_stops_when_cancelled() {
    let fx = Fixture::new();
    let pipeline = VideoOverlayPipeline::new(FakeMedia::new(&fx.path("captured"), 1))
        .with_options(fx.options())
        .with_cancel_flag(Arc::new(AtomicBool::new(true)));

    let report = run_batch(
        &pipeline,
        &[fx.path("a.mp4"), fx.path("b.mp4")],
        &fx.path("out"),
        "_output",
        |_| Ok(Vec::new()),
    );

    assert!(report.cancelled);
    assert!(report.rendered.is_empty());
    assert_eq!(pipeline.backend().total_calls(), 0);
}
