//! Resume point discovery in the destination store.

use obm_store::{ObjectStore, StoreResult, WalkControl, WalkQuery};
use obm_types::{format_bundle_key, parse_bundle_key, MAX_BLOCK_NUM};
use tracing::{debug, error, info, warn};

use crate::config::check_block_range;
use crate::error::{MergerError, MergerResult};

/// Coarsest probe step is `chunk_size * 10^MAX_PROBE_LEVEL`.
pub const MAX_PROBE_LEVEL: u32 = 4;

/// Find the highest bundle base reachable from `minimal` by existence probes.
///
/// Each level advances by `chunk_size * 10^level` while the probed key exists,
/// then hands the last confirmed base to the next finer level, so the probe
/// count grows with the number of decimal digits rather than the number of
/// bundles. Returns `None` when the bundle at `minimal` itself is missing.
pub fn locate_highest_bundle(
    store: &dyn ObjectStore,
    minimal: u64,
    chunk_size: u64,
) -> StoreResult<Option<u64>> {
    if !store.exists(&format_bundle_key(minimal))? {
        return Ok(None);
    }

    let mut highest = minimal;
    for level in (0..=MAX_PROBE_LEVEL).rev() {
        let Some(step) = 10u64
            .checked_pow(level)
            .and_then(|scale| scale.checked_mul(chunk_size))
            .filter(|step| *step > 0)
        else {
            continue;
        };
        loop {
            let Some(probe) = highest.checked_add(step).filter(|n| *n <= MAX_BLOCK_NUM) else {
                break;
            };
            if !store.exists(&format_bundle_key(probe))? {
                break;
            }
            highest = probe;
        }
        debug!(level, step, highest, "probe level done");
    }
    Ok(Some(highest))
}

/// Compute the base block of the next bundle to produce.
///
/// Locates the highest existing bundle, then walks forward from it checking
/// that consecutive bundles are exactly `chunk_size` apart. A gap is reported
/// as [`MergerError::HoleDetected`] and never skipped over. Keys that are not
/// bundle names, or that end with `ignore_suffix`, are skipped.
pub fn find_next_base_block(
    store: &dyn ObjectStore,
    minimal: u64,
    chunk_size: u64,
    ignore_suffix: &str,
) -> MergerResult<u64> {
    check_block_range(minimal, chunk_size)?;
    let Some(highest) = locate_highest_bundle(store, minimal, chunk_size)? else {
        info!(minimal, "no bundle at minimal block; starting there");
        return Ok(minimal);
    };
    debug!(highest, "highest probed bundle");

    let query = WalkQuery::all()
        .starting_at(format_bundle_key(highest))
        .ignoring_suffix(ignore_suffix);
    let mut last: Option<u64> = None;
    let mut hole = None;
    store.walk(&query, &mut |key| {
        let number = match parse_bundle_key(key) {
            Ok(number) => number,
            Err(e) => {
                warn!(key, error = %e, "skipping unknown destination key");
                return Ok(WalkControl::Continue);
            }
        };
        if number < minimal {
            return Ok(WalkControl::Continue);
        }
        if let Some(prev) = last {
            if number != prev + chunk_size {
                hole = Some((prev, number));
                return Ok(WalkControl::Stop);
            }
        }
        last = Some(number);
        Ok(WalkControl::Continue)
    })?;

    if let Some((from, to)) = hole {
        error!(from, to, "hole in merged bundles; refusing to resume");
        return Err(MergerError::HoleDetected { from, to });
    }
    Ok(last.unwrap_or(highest) + chunk_size)
}
