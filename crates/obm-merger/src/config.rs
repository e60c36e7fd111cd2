use std::time::Duration;

use obm_types::MAX_BLOCK_NUM;
use serde::{Deserialize, Serialize};

use crate::error::{MergerError, MergerResult};
use crate::retry::RetryPolicy;

/// Merge loop settings.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct MergerConfig {
    /// Blocks per bundle.
    pub chunk_size: u64,
    /// Lowest base block the merger will ever produce.
    pub minimal_block_num: u64,
    /// Pause between passes over the source store.
    pub poll_interval_ms: u64,
    /// Delete one-block files found below the current base.
    pub delete_stale_files: bool,
    /// Source and destination keys ending with this suffix are skipped.
    pub ignore_suffix: String,
    pub retry: RetryPolicy,
}

impl Default for MergerConfig {
    fn default() -> Self {
        Self {
            chunk_size: 100,
            minimal_block_num: 0,
            poll_interval_ms: 1_000,
            delete_stale_files: true,
            ignore_suffix: ".tmp".to_string(),
            retry: RetryPolicy::default(),
        }
    }
}

impl MergerConfig {
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Reject settings the merge loop cannot run with.
    pub fn validate(&self) -> MergerResult<()> {
        check_block_range(self.minimal_block_num, self.chunk_size)?;
        if self.minimal_block_num % self.chunk_size != 0 {
            return Err(MergerError::Config(format!(
                "minimal_block_num {} is not a multiple of chunk_size {}",
                self.minimal_block_num, self.chunk_size
            )));
        }
        if self.retry.initial_backoff_ms > self.retry.max_backoff_ms {
            return Err(MergerError::Config(
                "retry.initial_backoff_ms exceeds retry.max_backoff_ms".into(),
            ));
        }
        Ok(())
    }
}

/// Bundle bases and sizes must stay within the ten-digit key space.
pub(crate) fn check_block_range(minimal_block_num: u64, chunk_size: u64) -> MergerResult<()> {
    if chunk_size == 0 {
        return Err(MergerError::Config("chunk_size must be positive".into()));
    }
    if chunk_size > MAX_BLOCK_NUM + 1 {
        return Err(MergerError::Config(format!(
            "chunk_size {chunk_size} exceeds the block number space ({})",
            MAX_BLOCK_NUM + 1
        )));
    }
    if minimal_block_num > MAX_BLOCK_NUM {
        return Err(MergerError::Config(format!(
            "minimal_block_num {minimal_block_num} exceeds {MAX_BLOCK_NUM}"
        )));
    }
    Ok(())
}
