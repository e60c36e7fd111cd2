//! Read-only view of the live bundle for downstream consumers.

use std::sync::Arc;

use obm_types::BlockRef;
use serde::{Deserialize, Serialize};
use tokio::sync::watch;

use crate::bundle::Bundle;

/// Ask for the accepted blocks from `low_block_num` up to the block with id
/// `high_block_id`, inclusive.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreMergedRequest {
    pub low_block_num: u64,
    pub high_block_id: String,
}

#[derive(Clone, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct PreMergedResponse {
    pub found: bool,
    pub blocks: Vec<BlockRef>,
}

impl PreMergedResponse {
    pub fn not_found() -> Self {
        Self::default()
    }
}

/// Summary of the bundle currently being accumulated.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BundleStatus {
    pub base: u64,
    pub chunk_size: u64,
    pub accepted: usize,
    pub fork_candidates: usize,
    pub last_accepted: Option<u64>,
    pub complete: bool,
}

impl From<&Bundle> for BundleStatus {
    fn from(bundle: &Bundle) -> Self {
        Self {
            base: bundle.base(),
            chunk_size: bundle.chunk_size(),
            accepted: bundle.accepted().len(),
            fork_candidates: bundle.fork_candidates().len(),
            last_accepted: bundle.accepted().last().map(|f| f.number),
            complete: bundle.is_complete(),
        }
    }
}

/// Answer premerged-block queries against `bundle`.
///
/// The requested range must lie entirely inside the accepted chain; the
/// chain is contiguous so the low index follows from the number alone.
pub fn pre_merged_blocks(bundle: &Bundle, request: &PreMergedRequest) -> PreMergedResponse {
    let accepted = bundle.accepted();
    let Some(high) = accepted
        .iter()
        .position(|f| f.id == request.high_block_id)
    else {
        return PreMergedResponse::not_found();
    };
    let first = accepted[0].number;
    if request.low_block_num < first || request.low_block_num > accepted[high].number {
        return PreMergedResponse::not_found();
    }
    let low = (request.low_block_num - first) as usize;

    PreMergedResponse {
        found: true,
        blocks: accepted[low..=high].iter().map(BlockRef::from).collect(),
    }
}

/// Cloneable handle on the merger's published bundle snapshots.
///
/// Every answer is computed against one snapshot, so a query never observes
/// a half-triaged or half-reset bundle.
#[derive(Clone, Debug)]
pub struct QueryService {
    live: watch::Receiver<Arc<Bundle>>,
}

impl QueryService {
    pub fn new(live: watch::Receiver<Arc<Bundle>>) -> Self {
        Self { live }
    }

    /// The most recently published bundle.
    pub fn snapshot(&self) -> Arc<Bundle> {
        Arc::clone(&self.live.borrow())
    }

    pub fn pre_merged_blocks(&self, request: &PreMergedRequest) -> PreMergedResponse {
        pre_merged_blocks(&self.snapshot(), request)
    }

    pub fn status(&self) -> BundleStatus {
        BundleStatus::from(&*self.snapshot())
    }
}
