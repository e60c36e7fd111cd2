use std::thread;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use tracing::{error, warn};

use crate::error::MergerError;

/// Errors that know whether a retry can help.
pub trait Transient {
    fn is_transient(&self) -> bool;
}

impl Transient for MergerError {
    fn is_transient(&self) -> bool {
        MergerError::is_transient(self)
    }
}

impl Transient for obm_store::StoreError {
    fn is_transient(&self) -> bool {
        obm_store::StoreError::is_transient(self)
    }
}

/// Exponential backoff for transient store failures.
///
/// Runs on the blocking pool, so the wait is a plain thread sleep.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct RetryPolicy {
    /// Total attempts including the first one. `0` behaves like `1`.
    pub max_attempts: u32,
    pub initial_backoff_ms: u64,
    pub max_backoff_ms: u64,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            initial_backoff_ms: 100,
            max_backoff_ms: 5_000,
        }
    }
}

impl RetryPolicy {
    /// A policy that tries exactly once.
    pub fn none() -> Self {
        Self {
            max_attempts: 1,
            initial_backoff_ms: 0,
            max_backoff_ms: 0,
        }
    }

    /// Delay before retry number `attempt` (1-based).
    pub fn backoff(&self, attempt: u32) -> Duration {
        let factor = 1u64.checked_shl(attempt.saturating_sub(1)).unwrap_or(u64::MAX);
        let ms = self
            .initial_backoff_ms
            .saturating_mul(factor)
            .min(self.max_backoff_ms);
        Duration::from_millis(ms)
    }

    /// Run `op`, retrying while it fails with a transient error.
    pub fn run<T, E, F>(&self, what: &str, mut op: F) -> Result<T, E>
    where
        E: Transient + std::fmt::Display,
        F: FnMut() -> Result<T, E>,
    {
        let attempts = self.max_attempts.max(1);
        let mut attempt = 1;
        loop {
            match op() {
                Ok(value) => return Ok(value),
                Err(e) if e.is_transient() && attempt < attempts => {
                    let delay = self.backoff(attempt);
                    warn!(
                        op = what,
                        attempt,
                        max_attempts = attempts,
                        delay_ms = delay.as_millis() as u64,
                        error = %e,
                        "transient failure, retrying"
                    );
                    thread::sleep(delay);
                    attempt += 1;
                }
                Err(e) => {
                    if e.is_transient() {
                        error!(op = what, attempts, error = %e, "giving up after retries");
                    }
                    return Err(e);
                }
            }
        }
    }
}
