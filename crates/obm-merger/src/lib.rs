//! Merging of one-block files into fixed-size bundles.
//!
//! Upstream producers drop one file per observed block into a source store.
//! The [`Merger`] groups them into bundles of `chunk_size` consecutive
//! blocks, resolves forks along the way, uploads each complete bundle to a
//! destination store and deletes the consumed one-block files.
//!
//! # Lifecycle
//!
//! 1. [`find_next_base_block`] probes the destination for the last bundle and
//!    checks the existing bundles for holes.
//! 2. Each pass lists the source, triages the keys into the current
//!    [`Bundle`] and merges it whenever it is complete.
//! 3. A [`QueryService`] answers "which blocks do you already hold" against
//!    the latest published bundle snapshot.
//!
//! # Guarantees
//!
//! 1. A bundle is written before any of its source files is deleted.
//! 2. Rewriting a bundle produces the same bytes, so a crash between upload
//!    and delete is safe to replay.
//! 3. A hole in the destination stops startup; it is never skipped.

pub mod bundle;
pub mod config;
pub mod error;
pub mod locate;
pub mod merger;
pub mod query;
pub mod retry;

#[cfg(test)]
mod testutil;

pub use bundle::{Bundle, TriageReport};
pub use config::MergerConfig;
pub use error::{MergerError, MergerResult};
pub use locate::{find_next_base_block, locate_highest_bundle, MAX_PROBE_LEVEL};
pub use merger::{MergeReport, Merger, PassReport};
pub use query::{pre_merged_blocks, BundleStatus, PreMergedRequest, PreMergedResponse, QueryService};
pub use retry::{RetryPolicy, Transient};
