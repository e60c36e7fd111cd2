//! In-memory accumulator for one chunk-sized range of blocks.
//!
//! Triage feeds parsed one-block files into the [`Bundle`]. Files for the
//! range `[base, base + chunk_size)` are kept as candidates per block number;
//! after every triage the canonical chain is re-resolved as the longest run of
//! candidates starting at `base` where each entry's previous id is the id of
//! the entry before it. Candidates off that chain are fork candidates, or
//! pending when nothing at their number is accepted yet.

use std::collections::{BTreeMap, BTreeSet, HashMap};

use obm_types::OneBlockFile;
use tracing::{debug, warn};

/// Classification counts for one [`Bundle::triage`] call.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct TriageReport {
    /// New files that ended up on the canonical chain.
    pub accepted: usize,
    /// New files sharing a number with an accepted entry of another id.
    pub fork_candidates: usize,
    /// New in-range files whose predecessor is not accepted yet.
    pub pending: usize,
    /// Files at or beyond the end of the range (not retained).
    pub ahead: usize,
    /// Files below the base, scheduled for deletion.
    pub stale: usize,
    /// Files repeating an already known block id under another key.
    pub duplicates: usize,
}

/// Accumulator for the blocks of `[base, base + chunk_size)`.
#[derive(Clone, Debug)]
pub struct Bundle {
    base: u64,
    chunk_size: u64,
    /// In-range candidates per block number, in arrival order.
    candidates: BTreeMap<u64, Vec<OneBlockFile>>,
    /// Canonical chain from `base`, ascending and gap-free.
    accepted: Vec<OneBlockFile>,
    stale: BTreeSet<String>,
    /// Same-id repeats of a candidate, by key, with their block number.
    duplicates: BTreeMap<String, u64>,
    /// Candidates taken out by [`Bundle::remove`], by key, with their block
    /// number. Consumed with the range unless triaged again.
    dropped: BTreeMap<String, u64>,
}

impl Bundle {
    /// Create an empty bundle for the range starting at `base`.
    pub fn new(base: u64, chunk_size: u64) -> Self {
        Self {
            base,
            chunk_size,
            candidates: BTreeMap::new(),
            accepted: Vec::new(),
            stale: BTreeSet::new(),
            duplicates: BTreeMap::new(),
            dropped: BTreeMap::new(),
        }
    }

    pub fn base(&self) -> u64 {
        self.base
    }

    pub fn chunk_size(&self) -> u64 {
        self.chunk_size
    }

    /// First block number past this range.
    pub fn end(&self) -> u64 {
        self.base.saturating_add(self.chunk_size)
    }

    /// Returns `true` if `number` falls inside this range.
    pub fn contains(&self, number: u64) -> bool {
        number >= self.base && number < self.end()
    }

    /// Accepted entries, ascending by number with no gaps.
    pub fn accepted(&self) -> &[OneBlockFile] {
        &self.accepted
    }

    /// Returns `true` once every number of the range is accepted with an
    /// unbroken identifier chain.
    pub fn is_complete(&self) -> bool {
        self.accepted.len() as u64 == self.chunk_size
    }

    /// In-range candidates that are not on the canonical chain.
    pub fn fork_candidates(&self) -> Vec<&OneBlockFile> {
        self.candidates
            .values()
            .flatten()
            .filter(|f| !self.is_accepted(f))
            .collect()
    }

    /// Keys of files below the base seen by triage.
    pub fn stale_keys(&self) -> impl Iterator<Item = &str> {
        self.stale.iter().map(String::as_str)
    }

    /// Total number of in-range candidates, accepted or not.
    pub fn candidate_count(&self) -> usize {
        self.candidates.values().map(Vec::len).sum()
    }

    /// Every source key this range consumes once merged: accepted entries,
    /// non-canonical forks, duplicates, dropped files and (optionally) stale
    /// files.
    pub fn consumed_keys(&self, include_stale: bool) -> Vec<String> {
        let mut keys: Vec<String> = self
            .candidates
            .values()
            .flatten()
            .map(|f| f.key.clone())
            .collect();
        keys.extend(self.duplicates.keys().cloned());
        keys.extend(self.dropped.keys().cloned());
        if include_stale {
            keys.extend(self.stale.iter().cloned());
        }
        keys
    }

    /// Fresh, empty bundle for the range right after this one.
    pub fn next(&self) -> Bundle {
        Bundle::new(self.end(), self.chunk_size)
    }

    /// Classify `files` (ascending order) against this range.
    ///
    /// Re-triaging an already known key is a no-op, so callers may feed the
    /// full source listing on every pass. A dropped key is classified afresh,
    /// since its content may have been replaced.
    pub fn triage(&mut self, files: impl IntoIterator<Item = OneBlockFile>) -> TriageReport {
        let mut report = TriageReport::default();
        let mut inserted = Vec::new();

        for file in files {
            if file.number < self.base {
                if self.stale.insert(file.key.clone()) {
                    warn!(
                        key = %file.key,
                        number = file.number,
                        base = self.base,
                        "one-block file below current base; scheduling deletion"
                    );
                    report.stale += 1;
                }
                continue;
            }
            if file.number >= self.end() {
                report.ahead += 1;
                continue;
            }

            self.dropped.remove(&file.key);
            let slot = self.candidates.entry(file.number).or_default();
            if slot.iter().any(|f| f.key == file.key) || self.duplicates.contains_key(&file.key) {
                continue;
            }
            if slot.iter().any(|f| f.id == file.id) {
                debug!(key = %file.key, number = file.number, "duplicate one-block file");
                self.duplicates.insert(file.key, file.number);
                report.duplicates += 1;
                continue;
            }
            inserted.push((file.number, file.key.clone()));
            slot.push(file);
        }

        if inserted.is_empty() {
            return report;
        }
        self.resolve();

        for (number, key) in inserted {
            if self.accepted.iter().any(|f| f.key == key) {
                debug!(key = %key, number, "accepted");
                report.accepted += 1;
            } else if self.accepted_at(number).is_some() {
                debug!(key = %key, number, "fork candidate");
                report.fork_candidates += 1;
            } else {
                debug!(key = %key, number, "pending: predecessor not accepted yet");
                report.pending += 1;
            }
        }
        report
    }

    /// Drop a candidate (e.g. its payload turned out unreadable).
    ///
    /// Duplicates recorded against the same number are released so a later
    /// triage can offer them as replacements.
    pub fn remove(&mut self, key: &str) -> bool {
        let mut removed = None;
        self.candidates.retain(|&number, files| {
            let before = files.len();
            files.retain(|f| f.key != key);
            if files.len() != before {
                removed = Some(number);
            }
            !files.is_empty()
        });
        let Some(number) = removed else {
            return false;
        };
        self.duplicates.retain(|_, n| *n != number);
        self.dropped.insert(key.to_string(), number);
        self.resolve();
        true
    }

    /// Accepted entry at `number`, if any.
    pub fn accepted_at(&self, number: u64) -> Option<&OneBlockFile> {
        let first = self.accepted.first()?.number;
        let index = number.checked_sub(first)?;
        self.accepted.get(usize::try_from(index).ok()?)
    }

    fn is_accepted(&self, file: &OneBlockFile) -> bool {
        self.accepted_at(file.number)
            .is_some_and(|a| a.key == file.key)
    }

    /// Recompute the canonical chain.
    ///
    /// `reach[n][i]` is the length of the longest linked run starting at the
    /// i-th candidate of number `n`; it is filled from the top of the range
    /// down so each lookup of `n + 1` is already computed. Ties go to the
    /// candidate seen first.
    fn resolve(&mut self) {
        let mut reach: HashMap<u64, Vec<usize>> = HashMap::new();
        for (&number, files) in self.candidates.iter().rev() {
            let next = self.candidates.get(&(number + 1));
            let next_reach = reach.get(&(number + 1));
            let runs = files
                .iter()
                .map(|f| 1 + best_successor(f, next, next_reach).map_or(0, |(_, r)| r))
                .collect();
            reach.insert(number, runs);
        }

        self.accepted.clear();
        let Some(first) = reach
            .get(&self.base)
            .and_then(|runs| first_max(runs.iter().copied().enumerate()))
        else {
            return;
        };

        let mut number = self.base;
        let mut index = first.0;
        loop {
            let file = &self.candidates[&number][index];
            self.accepted.push(file.clone());
            match best_successor(
                file,
                self.candidates.get(&(number + 1)),
                reach.get(&(number + 1)),
            ) {
                Some((next_index, _)) => {
                    number += 1;
                    index = next_index;
                }
                None => break,
            }
        }
    }
}

/// Best linked successor of `file` among `next`: `(index, reach)`.
fn best_successor(
    file: &OneBlockFile,
    next: Option<&Vec<OneBlockFile>>,
    next_reach: Option<&Vec<usize>>,
) -> Option<(usize, usize)> {
    let (next, next_reach) = (next?, next_reach?);
    first_max(
        next.iter()
            .enumerate()
            .filter(|(_, n)| n.previous_id == file.id)
            .map(|(i, _)| (i, next_reach[i])),
    )
}

/// Highest `(index, value)` by value; the earliest wins ties.
fn first_max(items: impl Iterator<Item = (usize, usize)>) -> Option<(usize, usize)> {
    items.fold(None, |best, item| match best {
        Some((_, value)) if value >= item.1 => best,
        _ => Some(item),
    })
}
