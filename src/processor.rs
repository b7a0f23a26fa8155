//! Cache-or-infer processing driven by a `PopDefinition`.

use std::path::Path;

use anyhow::{Context, Result};

use crate::cache;
use crate::client::{mime_for, InferenceClient};
use crate::detect::DetectionResult;
use crate::pop::PopDefinition;
use crate::retry::RetryPolicy;

/// One processor for every pipeline variant; behaviour differs only by the
/// pop definition it is built with.
pub struct Processor<C> {
    pop: PopDefinition,
    client: C,
    retry: RetryPolicy,
    pop_applied: bool,
}

impl<C: InferenceClient> Processor<C> {
    pub fn new(pop: PopDefinition, client: C) -> Self {
        Self {
            pop,
            client,
            retry: RetryPolicy::default(),
            pop_applied: false,
        }
    }

    pub fn with_retry(mut self, retry: RetryPolicy) -> Self {
        self.retry = retry;
        self
    }

    pub fn pop(&self) -> &PopDefinition {
        &self.pop
    }

    pub fn client(&self) -> &C {
        &self.client
    }

    pub fn into_client(self) -> C {
        self.client
    }

    /// Detections for a whole media file: the `<input>.json` cache when it
    /// exists, otherwise a fresh inference run that is then cached.
    pub fn detections_for(&mut self, input: &Path) -> Result<Vec<DetectionResult>> {
        let cache_path = cache::cache_path_for(input);
        if let Some(buffer) = cache::load(&cache_path)? {
            log::info!(
                "using {} cached results from {}",
                buffer.len(),
                cache_path.display()
            );
            return Ok(buffer);
        }

        self.ensure_pop()?;
        log::info!("running {} on {}", self.client.name(), input.display());
        let buffer = self
            .client
            .process_file(input, mime_for(input))
            .with_context(|| format!("inference failed for {}", input.display()))?;
        cache::log_error_events(input, &buffer);
        log::info!("{}: {} results", input.display(), buffer.len());
        cache::save(&cache_path, &buffer)?;
        Ok(buffer)
    }

    /// Detections for one crop image, retried per the policy. `Ok(None)` when
    /// every attempt failed; nothing is cached then, so the crop is retried on
    /// the next run.
    pub fn predict_crop(
        &mut self,
        crop_path: &Path,
        cache_path: &Path,
    ) -> Result<Option<Vec<DetectionResult>>> {
        if let Some(buffer) = cache::load(cache_path)? {
            return Ok(Some(buffer));
        }
        self.ensure_pop()?;

        let retry = self.retry;
        let client = &mut self.client;
        let mime = mime_for(crop_path);
        let what = format!("predict {}", crop_path.display());
        match retry.run(&what, |_| client.process_file(crop_path, mime)) {
            Ok(buffer) => {
                cache::save(cache_path, &buffer)?;
                Ok(Some(buffer))
            }
            Err(err) => {
                log::error!("skipping crop {}: {:#}", crop_path.display(), err);
                Ok(None)
            }
        }
    }

    fn ensure_pop(&mut self) -> Result<()> {
        if self.pop_applied {
            return Ok(());
        }
        self.pop.validate()?;
        self.client
            .change_pop(&self.pop)
            .with_context(|| format!("failed to apply pop on {}", self.client.name()))?;
        log::info!(
            "pop applied on {} ({} components)",
            self.client.name(),
            self.pop.components.len()
        );
        self.pop_applied = true;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::client::OfflineClient;
    use tempfile::tempdir;

    #[test]
    fn cached_detections_skip_the_client() {
        let dir = tempdir().unwrap();
        let input = dir.path().join("clip.mp4");
        let buffer = vec![DetectionResult {
            frame: Some(3.0),
            ..DetectionResult::default()
        }];
        cache::save(&cache::cache_path_for(&input), &buffer).unwrap();

        let pop = PopDefinition::preset("person").unwrap();
        let mut processor = Processor::new(pop, OfflineClient);
        assert_eq!(processor.detections_for(&input).unwrap(), buffer);
    }

    #[test]
    fn offline_without_cache_fails() {
        let dir = tempdir().unwrap();
        let pop = PopDefinition::preset("person").unwrap();
        let mut processor = Processor::new(pop, OfflineClient);
        let err = processor
            .detections_for(&dir.path().join("clip.mp4"))
            .unwrap_err();
        assert!(format!("{err:#}").contains("no inference endpoint"));
    }

    #[test]
    fn exhausted_crop_is_skipped_and_not_cached() {
        let dir = tempdir().unwrap();
        let cache_path = dir.path().join("crop.json");
        let pop = PopDefinition::preset("person").unwrap();
        let mut processor =
            Processor::new(pop, OfflineClient).with_retry(RetryPolicy::immediate(2));
        let result = processor
            .predict_crop(&dir.path().join("crop.jpg"), &cache_path)
            .unwrap();
        assert!(result.is_none());
        assert!(!cache_path.exists());
    }
}
