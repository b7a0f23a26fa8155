use std::time::Duration;

use anyhow::{anyhow, Result};

pub const DEFAULT_MAX_ATTEMPTS: u32 = 3;
pub const DEFAULT_BACKOFF_STEP: Duration = Duration::from_secs(1);

/// Bounded retry with linear backoff: attempt `n` (1-based) that fails waits
/// `n * backoff_step` before the next one.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub backoff_step: Duration,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: DEFAULT_MAX_ATTEMPTS,
            backoff_step: DEFAULT_BACKOFF_STEP,
        }
    }
}

impl RetryPolicy {
    /// Policy without sleeps, for tests and dry runs.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts,
            backoff_step: Duration::ZERO,
        }
    }

    pub fn delay_for(&self, attempt: u32) -> Duration {
        self.backoff_step.saturating_mul(attempt)
    }

    /// Runs `op` with the 1-based attempt number until it succeeds or the
    /// attempts run out. Each failure is logged as a warning; exhaustion is
    /// logged as an error and returned with the last failure as context.
    pub fn run<T, F>(&self, what: &str, mut op: F) -> Result<T>
    where
        F: FnMut(u32) -> Result<T>,
    {
        let attempts = self.max_attempts.max(1);
        let mut last_err = None;
        for attempt in 1..=attempts {
            match op(attempt) {
                Ok(value) => return Ok(value),
                Err(err) => {
                    log::warn!("{what}: attempt {attempt}/{attempts} failed: {err:#}");
                    last_err = Some(err);
                    if attempt < attempts {
                        let delay = self.delay_for(attempt);
                        if !delay.is_zero() {
                            std::thread::sleep(delay);
                        }
                    }
                }
            }
        }
        log::error!("{what}: max retries reached");
        let err = last_err.unwrap_or_else(|| anyhow!("no attempts made"));
        Err(err.context(format!("{what}: max retries reached after {attempts} attempts")))
    }
}
