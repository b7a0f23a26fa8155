use anyhow::{anyhow, Result};
use std::path::{Path, PathBuf};
use std::sync::{Mutex, Once};
use std::thread::{self, ThreadId};
use std::time::Duration;
use tempfile::tempdir;

use eyepop_overlay::cache::cache_path_for;
use eyepop_overlay::detect::ResultEvent;
use eyepop_overlay::{
    DetectedObject, DetectionResult, InferenceClient, PopDefinition, Processor, RetryPolicy,
};

/// Worker stand-in that fails a fixed number of times before answering.
#[derive(Default)]
struct FlakyWorker {
    failures_left: u32,
    pops: Vec<PopDefinition>,
    requests: Vec<(PathBuf, String)>,
}

impl InferenceClient for FlakyWorker {
    fn name(&self) -> &'static str {
        "flaky"
    }

    fn change_pop(&mut self, pop: &PopDefinition) -> Result<()> {
        self.pops.push(pop.clone());
        Ok(())
    }

    fn process_file(&mut self, path: &Path, mime_type: &str) -> Result<Vec<DetectionResult>> {
        self.requests.push((path.to_path_buf(), mime_type.to_string()));
        if self.failures_left > 0 {
            self.failures_left -= 1;
            return Err(anyhow!("connection reset"));
        }
        Ok(vec![
            DetectionResult {
                time: Some(0.5),
                objects: vec![DetectedObject {
                    category: Some("person".into()),
                    confidence: Some(0.95),
                    ..DetectedObject::default()
                }],
                ..DetectionResult::default()
            },
            DetectionResult {
                event: Some(ResultEvent {
                    kind: "error".into(),
                    message: Some("frame decode failed".into()),
                }),
                ..DetectionResult::default()
            },
        ])
    }
}

/// Records warnings and errors per test thread.
struct CapturingLogger;

static LOGGER: CapturingLogger = CapturingLogger;
static LOGGER_INIT: Once = Once::new();
static RECORDS: Mutex<Vec<(ThreadId, log::Level, String)>> = Mutex::new(Vec::new());

impl log::Log for CapturingLogger {
    fn enabled(&self, metadata: &log::Metadata<'_>) -> bool {
        metadata.level() <= log::Level::Warn
    }

    fn log(&self, record: &log::Record<'_>) {
        if !self.enabled(record.metadata()) {
            return;
        }
        if let Ok(mut records) = RECORDS.lock() {
            records.push((thread::current().id(), record.level(), record.args().to_string()));
        }
    }

    fn flush(&self) {}
}

fn capture_logs() {
    LOGGER_INIT.call_once(|| {
        log::set_logger(&LOGGER).unwrap();
        log::set_max_level(log::LevelFilter::Warn);
    });
}

fn logged(level: log::Level) -> Vec<String> {
    let current = thread::current().id();
    RECORDS
        .lock()
        .unwrap()
        .iter()
        .filter(|(thread, lvl, _)| *thread == current && *lvl == level)
        .map(|(_, _, message)| message.clone())
        .collect()
}

fn no_wait(max_attempts: u32) -> RetryPolicy {
    RetryPolicy {
        max_attempts,
        backoff_step: Duration::ZERO,
    }
}

#[test]
fn video_detections_are_inferred_once_then_cached() {
    let dir = tempdir().unwrap();
    let video = dir.path().join("rally.mp4");
    let pop = PopDefinition::preset("person-2d-pose").unwrap();
    let mut processor = Processor::new(pop.clone(), FlakyWorker::default());

    let first = processor.detections_for(&video).unwrap();
    assert_eq!(first.len(), 2);
    assert!(cache_path_for(&video).exists());

    let second = processor.detections_for(&video).unwrap();
    assert_eq!(second, first);

    let worker = processor.into_client();
    assert_eq!(worker.pops, vec![pop]);
    assert_eq!(worker.requests, vec![(video, "video/mp4".to_string())]);
}

#[test]
fn crop_prediction_retries_transient_failures() {
    capture_logs();
    let dir = tempdir().unwrap();
    let crop = dir.path().join("person_10_20_30_40_cropped.jpg");
    let cache = dir.path().join("json/asset_10_20_30_40.json");
    let worker = FlakyWorker {
        failures_left: 2,
        ..FlakyWorker::default()
    };
    let mut processor =
        Processor::new(PopDefinition::preset("person").unwrap(), worker).with_retry(no_wait(3));

    let buffer = processor.predict_crop(&crop, &cache).unwrap().unwrap();
    assert_eq!(buffer.len(), 2);
    assert!(cache.exists());
    assert_eq!(processor.client().requests.len(), 3);
    let warnings = logged(log::Level::Warn);
    assert_eq!(warnings.len(), 2, "{warnings:?}");
    assert!(warnings.iter().all(|w| w.contains("connection reset")));
    assert!(!logged(log::Level::Error)
        .iter()
        .any(|e| e.ends_with("max retries reached")));
    assert!(processor
        .client()
        .requests
        .iter()
        .all(|(_, mime)| mime == "image/jpeg"));

    // Served from the cache file now.
    processor.predict_crop(&crop, &cache).unwrap().unwrap();
    assert_eq!(processor.client().requests.len(), 3);
}

#[test]
fn crop_prediction_gives_up_after_max_attempts() {
    capture_logs();
    let dir = tempdir().unwrap();
    let cache = dir.path().join("crop.json");
    let worker = FlakyWorker {
        failures_left: 10,
        ..FlakyWorker::default()
    };
    let mut processor =
        Processor::new(PopDefinition::preset("person").unwrap(), worker).with_retry(no_wait(3));

    let result = processor
        .predict_crop(&dir.path().join("crop.jpg"), &cache)
        .unwrap();
    assert!(result.is_none());
    assert!(!cache.exists());
    assert_eq!(processor.client().requests.len(), 3);
    assert_eq!(logged(log::Level::Warn).len(), 3);
    let errors = logged(log::Level::Error);
    assert_eq!(
        errors
            .iter()
            .filter(|e| e.ends_with("max retries reached"))
            .count(),
        1,
        "{errors:?}"
    );
}

#[test]
fn invalid_pop_is_rejected_before_any_request() {
    let dir = tempdir().unwrap();
    let mut processor = Processor::new(PopDefinition::default(), FlakyWorker::default());
    let err = processor
        .detections_for(&dir.path().join("clip.mov"))
        .unwrap_err();
    assert!(err.to_string().contains("no components"));
    assert!(processor.client().requests.is_empty());
}
