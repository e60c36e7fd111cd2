//! The merge loop: list, triage, merge, upload, delete.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;

use obm_codec::BlockCodec;
use obm_store::{ObjectStore, StoreError, WalkQuery};
use obm_types::{format_bundle_key, Block, FormatError, OneBlockFile};
use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use crate::bundle::{Bundle, TriageReport};
use crate::config::MergerConfig;
use crate::error::{MergerError, MergerResult};
use crate::locate::find_next_base_block;
use crate::query::QueryService;

/// Outcome of one successful merge-upload-delete cycle.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct MergeReport {
    pub base: u64,
    pub key: String,
    pub blocks: usize,
    pub bytes: usize,
    pub deleted: usize,
}

/// Outcome of one [`Merger::process_once`] pass.
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct PassReport {
    pub listed: usize,
    /// Bases of the bundles written during the pass, ascending.
    pub merged_bundles: Vec<u64>,
    pub deleted: usize,
    pub pending_deletes: usize,
}

/// Sole owner of the current bundle and the resume position.
///
/// The core is synchronous; [`Merger::run`] drives it from a blocking task.
/// Each state change publishes an immutable bundle snapshot for
/// [`QueryService`] handles.
pub struct Merger {
    source: Arc<dyn ObjectStore>,
    destination: Arc<dyn ObjectStore>,
    codec: Arc<dyn BlockCodec>,
    config: MergerConfig,
    bundle: Bundle,
    live: watch::Sender<Arc<Bundle>>,
    /// Consumed source keys whose deletion has not succeeded yet.
    pending_deletes: BTreeSet<String>,
    /// Malformed source keys; never triaged again.
    ignored: HashSet<String>,
    /// Keys whose payload was rejected during the current pass.
    rejected: HashSet<String>,
    /// Rejected keys already logged at `warn!`.
    reported: HashSet<String>,
}

impl Merger {
    /// Build a merger resuming after the last contiguous bundle in
    /// `destination`.
    pub fn new(
        source: Arc<dyn ObjectStore>,
        destination: Arc<dyn ObjectStore>,
        codec: Arc<dyn BlockCodec>,
        config: MergerConfig,
    ) -> MergerResult<Self> {
        config.validate()?;
        let base = config.retry.run("find next base block", || {
            find_next_base_block(
                destination.as_ref(),
                config.minimal_block_num,
                config.chunk_size,
                &config.ignore_suffix,
            )
        })?;
        info!(
            base,
            chunk_size = config.chunk_size,
            minimal_block_num = config.minimal_block_num,
            "resuming merge"
        );
        Ok(Self::with_base(source, destination, codec, config, base))
    }

    /// Build a merger starting at an explicit base, skipping discovery.
    pub fn with_base(
        source: Arc<dyn ObjectStore>,
        destination: Arc<dyn ObjectStore>,
        codec: Arc<dyn BlockCodec>,
        config: MergerConfig,
        base: u64,
    ) -> Self {
        let bundle = Bundle::new(base, config.chunk_size);
        let (live, _) = watch::channel(Arc::new(bundle.clone()));
        Self {
            source,
            destination,
            codec,
            config,
            bundle,
            live,
            pending_deletes: BTreeSet::new(),
            ignored: HashSet::new(),
            rejected: HashSet::new(),
            reported: HashSet::new(),
        }
    }

    pub fn bundle(&self) -> &Bundle {
        &self.bundle
    }

    pub fn config(&self) -> &MergerConfig {
        &self.config
    }

    /// Source keys still waiting for a successful delete.
    pub fn pending_deletes(&self) -> impl Iterator<Item = &str> {
        self.pending_deletes.iter().map(String::as_str)
    }

    /// A query handle following this merger's bundle.
    pub fn query_service(&self) -> QueryService {
        QueryService::new(self.live.subscribe())
    }

    /// Parse and classify source keys, ascending. Malformed names are logged
    /// once and skipped from then on; keys rejected during the current pass
    /// are skipped until the next one.
    pub fn triage_new_one_block_files<S: AsRef<str>>(&mut self, keys: &[S]) -> TriageReport {
        let mut files = Vec::with_capacity(keys.len());
        for key in keys {
            let key = key.as_ref();
            if self.ignored.contains(key)
                || self.rejected.contains(key)
                || self.pending_deletes.contains(key)
            {
                continue;
            }
            match OneBlockFile::parse(key) {
                Ok(file) => files.push(file),
                Err(e) => {
                    warn!(key, error = %e, "ignoring malformed one-block filename");
                    self.ignored.insert(key.to_string());
                }
            }
        }
        let report = self.bundle.triage(files);
        if report != TriageReport::default() {
            debug!(base = self.bundle.base(), ?report, "triage");
            self.publish();
        }
        report
    }

    /// Write the complete bundle to the destination, then advance to the next
    /// range and delete the consumed source files.
    ///
    /// A failed write leaves the bundle untouched. A source file whose payload
    /// is unreadable or disagrees with its name is dropped from the bundle and
    /// reported as [`MergerError::Format`]. The next pass reads it again, so
    /// the bundle completes once the file is rewritten or replaced.
    pub fn merge_upload_and_delete(&mut self) -> MergerResult<MergeReport> {
        if !self.bundle.is_complete() {
            return Err(MergerError::IncompleteBundle {
                base: self.bundle.base(),
                accepted: self.bundle.accepted().len(),
                chunk_size: self.bundle.chunk_size(),
            });
        }

        let base = self.bundle.base();
        let key = format_bundle_key(base);
        let payload = self.build_payload()?;

        self.config
            .retry
            .run("write bundle", || {
                self.destination
                    .write(&key, &payload)
                    .map_err(|source| MergerError::WriteFailed {
                        key: key.clone(),
                        source,
                    })
            })?;
        let blocks = self.bundle.accepted().len();
        info!(key = %key, blocks, bytes = payload.len(), "bundle written");

        self.pending_deletes
            .extend(self.bundle.consumed_keys(self.config.delete_stale_files));
        self.bundle = self.bundle.next();
        self.publish();
        let deleted = self.flush_deletes();

        Ok(MergeReport {
            base,
            key,
            blocks,
            bytes: payload.len(),
            deleted,
        })
    }

    /// One pass: retry pending deletes, list the source, then triage and
    /// merge until the current bundle is incomplete.
    pub fn process_once(&mut self) -> MergerResult<PassReport> {
        self.rejected.clear();
        let mut report = PassReport {
            deleted: self.flush_deletes(),
            ..PassReport::default()
        };

        let mut query = WalkQuery::all().ignoring_suffix(self.config.ignore_suffix.as_str());
        if !self.config.delete_stale_files {
            query = query.starting_at(format_bundle_key(self.bundle.base()));
        }
        let mut keys = self
            .config
            .retry
            .run("list one-block files", || self.source.list(&query))?;
        report.listed = keys.len();

        loop {
            self.triage_new_one_block_files(&keys);
            if !self.bundle.is_complete() {
                break;
            }
            match self.merge_upload_and_delete() {
                Ok(merge) => {
                    report.merged_bundles.push(merge.base);
                    report.deleted += merge.deleted;
                    let floor = format_bundle_key(self.bundle.base());
                    keys.retain(|k| k.as_str() >= floor.as_str());
                }
                Err(MergerError::Format(_)) => {}
                Err(e) => return Err(e),
            }
        }

        report.pending_deletes = self.pending_deletes.len();
        Ok(report)
    }

    /// Poll the source until `shutdown` flips to `true` or its sender drops.
    ///
    /// Pass failures are logged and retried on the next tick with the bundle
    /// state intact.
    pub async fn run(self, mut shutdown: watch::Receiver<bool>) -> MergerResult<()> {
        let poll = self.config.poll_interval();
        let mut merger = self;
        info!(
            base = merger.bundle.base(),
            poll_ms = poll.as_millis() as u64,
            "merger started"
        );

        while !*shutdown.borrow() {
            let (back, result) = tokio::task::spawn_blocking(move || {
                let result = merger.process_once();
                (merger, result)
            })
            .await
            .map_err(|e| MergerError::Join(e.to_string()))?;
            merger = back;

            match result {
                Ok(pass) if !pass.merged_bundles.is_empty() => info!(
                    merged = ?pass.merged_bundles,
                    deleted = pass.deleted,
                    pending_deletes = pass.pending_deletes,
                    base = merger.bundle.base(),
                    "pass complete"
                ),
                Ok(pass) => debug!(
                    listed = pass.listed,
                    accepted = merger.bundle.accepted().len(),
                    "nothing to merge"
                ),
                Err(e) => error!(
                    error = %e,
                    base = merger.bundle.base(),
                    "merge pass failed; retrying next tick"
                ),
            }

            tokio::select! {
                _ = tokio::time::sleep(poll) => {}
                changed = shutdown.changed() => {
                    if changed.is_err() {
                        break;
                    }
                }
            }
        }

        info!(base = merger.bundle.base(), "merger stopped");
        Ok(())
    }

    fn publish(&self) {
        self.live.send_replace(Arc::new(self.bundle.clone()));
    }

    /// Read, verify and re-encode every accepted block, in chain order.
    fn build_payload(&mut self) -> MergerResult<Vec<u8>> {
        let accepted = self.bundle.accepted().to_vec();
        let mut payload = Vec::new();
        for file in &accepted {
            let block = match self.load_block(file) {
                Ok(block) => block,
                Err(MergerError::Format(e)) => {
                    self.reject(file, &e);
                    return Err(MergerError::Format(e));
                }
                Err(e) => return Err(e),
            };
            payload.extend(self.codec.encode(&block)?);
        }
        Ok(payload)
    }

    fn load_block(&self, file: &OneBlockFile) -> MergerResult<Block> {
        let mismatch = |reason: String| FormatError::Mismatch {
            key: file.key.clone(),
            number: file.number,
            reason,
        };

        let data = self
            .config
            .retry
            .run("read one-block file", || self.source.read(&file.key))?
            .ok_or_else(|| mismatch("file vanished from source store".into()))?;
        let mut blocks = self
            .codec
            .decode_all(&data)
            .map_err(|e| mismatch(e.to_string()))?;
        if blocks.len() != 1 {
            return Err(mismatch(format!("expected one block, found {}", blocks.len())).into());
        }
        let block = blocks.remove(0);

        if block.number != file.number {
            return Err(mismatch(format!("payload holds block {}", block.number)).into());
        }
        if !block.id.ends_with(&file.id) || !block.previous_id.ends_with(&file.previous_id) {
            return Err(mismatch(format!(
                "payload ids {}/{} do not match filename",
                block.id, block.previous_id
            ))
            .into());
        }
        Ok(block)
    }

    fn reject(&mut self, file: &OneBlockFile, reason: &FormatError) {
        if self.reported.insert(file.key.clone()) {
            warn!(key = %file.key, error = %reason, "dropping one-block file from bundle");
        } else {
            debug!(key = %file.key, error = %reason, "one-block file still rejected");
        }
        self.bundle.remove(&file.key);
        self.rejected.insert(file.key.clone());
        self.publish();
    }

    /// Try every pending delete once; failures stay queued for the next pass.
    fn flush_deletes(&mut self) -> usize {
        let mut deleted = 0;
        let keys: Vec<String> = self.pending_deletes.iter().cloned().collect();
        for key in keys {
            match self.source.delete(&key) {
                Ok(existed) => {
                    self.pending_deletes.remove(&key);
                    self.reported.remove(&key);
                    deleted += usize::from(existed);
                }
                Err(StoreError::InvalidKey { reason, .. }) => {
                    warn!(key = %key, reason = %reason, "dropping undeletable key");
                    self.pending_deletes.remove(&key);
                }
                Err(e) => {
                    warn!(key = %key, error = %e, "delete failed; will retry");
                }
            }
        }
        deleted
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::retry::RetryPolicy;
    use crate::testutil::{chain_id, linked, name, write_one_block, FlakyStore, CHAIN};
    use chrono::{TimeZone, Utc};
    use obm_codec::{BlockReader, FramedBlockCodec};
    use obm_types::format_one_block_filename;
    use std::time::Duration;

    fn config(chunk_size: u64) -> MergerConfig {
        MergerConfig {
            chunk_size,
            poll_interval_ms: 10,
            retry: RetryPolicy {
                max_attempts: 2,
                initial_backoff_ms: 0,
                max_backoff_ms: 0,
            },
            ..MergerConfig::default()
        }
    }

    fn setup_with(config: MergerConfig) -> (Merger, Arc<FlakyStore>, Arc<FlakyStore>) {
        let src = Arc::new(FlakyStore::new());
        let dst = Arc::new(FlakyStore::new());
        let merger = Merger::with_base(
            src.clone(),
            dst.clone(),
            Arc::new(FramedBlockCodec),
            config,
            100,
        );
        (merger, src, dst)
    }

    fn setup(chunk_size: u64) -> (Merger, Arc<FlakyStore>, Arc<FlakyStore>) {
        setup_with(config(chunk_size))
    }

    fn write_all<S: AsRef<str>>(store: &FlakyStore, keys: &[S]) {
        for key in keys {
            write_one_block(store, key.as_ref());
        }
    }

    fn bundle_blocks(dst: &FlakyStore, key: &str) -> Vec<Block> {
        let data = dst.inner().read(key).unwrap().expect("bundle written");
        BlockReader::new(&data[..]).map(|b| b.unwrap()).collect()
    }

    // -----------------------------------------------------------------------
    // Merge, upload, delete
    // -----------------------------------------------------------------------

    #[test]
    fn merge_upload_and_delete() {
        let (mut merger, src, dst) = setup(5);
        write_all(&src, &CHAIN);
        merger.triage_new_one_block_files(&CHAIN);

        let report = merger.merge_upload_and_delete().unwrap();
        assert_eq!(report.key, "0000000100");
        assert_eq!(report.blocks, 5);
        assert_eq!(report.deleted, 5);

        let data = dst.inner().read("0000000100").unwrap().unwrap();
        let mut reader = BlockReader::new(&data[..]);
        for (i, number) in (100..105).enumerate() {
            let block = reader.read().unwrap().unwrap();
            assert_eq!(block.to_string(), format!("#{number} ({})", chain_id(i)));
            assert_eq!(block.payload, format!("payload-{number}").into_bytes());
        }
        assert!(reader.read().unwrap().is_none());

        assert!(src.inner().is_empty());
        assert_eq!(merger.bundle().base(), 105);
        assert!(merger.bundle().accepted().is_empty());
    }

    #[test]
    fn remerge_writes_identical_bundle() {
        let (mut merger, src, dst) = setup(5);
        write_all(&src, &CHAIN);
        merger.triage_new_one_block_files(&CHAIN);
        merger.merge_upload_and_delete().unwrap();
        let first = dst.inner().read("0000000100").unwrap().unwrap();

        // Crash between upload and delete: sources reappear, base restarts.
        write_all(&src, &CHAIN);
        let mut again = Merger::with_base(
            src.clone(),
            dst.clone(),
            Arc::new(FramedBlockCodec),
            config(5),
            100,
        );
        again.process_once().unwrap();
        let second = dst.inner().read("0000000100").unwrap().unwrap();
        assert_eq!(first, second);
        assert_eq!(dst.inner().len(), 1);
    }

    #[test]
    fn incomplete_bundle_is_not_merged() {
        let (mut merger, src, dst) = setup(5);
        write_all(&src, &CHAIN[..4]);
        merger.triage_new_one_block_files(&CHAIN[..4]);
        let err = merger.merge_upload_and_delete().unwrap_err();
        assert!(matches!(
            err,
            MergerError::IncompleteBundle { base: 100, accepted: 4, chunk_size: 5 }
        ));
        assert!(dst.inner().is_empty());
    }

    #[test]
    fn write_failure_keeps_bundle() {
        let (mut merger, src, dst) = setup(5);
        write_all(&src, &CHAIN);
        merger.triage_new_one_block_files(&CHAIN);

        dst.fail_writes(10);
        let err = merger.merge_upload_and_delete().unwrap_err();
        assert!(matches!(err, MergerError::WriteFailed { .. }));
        assert_eq!(merger.bundle().base(), 100);
        assert!(merger.bundle().is_complete());
        assert_eq!(src.inner().len(), 5);
        assert!(dst.inner().is_empty());

        dst.fail_writes(0);
        merger.merge_upload_and_delete().unwrap();
        assert!(dst.inner().exists("0000000100").unwrap());
    }

    #[test]
    fn transient_write_failure_is_retried() {
        let (mut merger, src, dst) = setup(5);
        write_all(&src, &CHAIN);
        merger.triage_new_one_block_files(&CHAIN);
        dst.fail_writes(1);
        merger.merge_upload_and_delete().unwrap();
        assert_eq!(dst.inner().len(), 1);
    }

    #[test]
    fn failed_deletes_are_retried_next_pass() {
        let (mut merger, src, _dst) = setup(5);
        write_all(&src, &CHAIN);
        merger.triage_new_one_block_files(&CHAIN);

        src.fail_deletes(2);
        let report = merger.merge_upload_and_delete().unwrap();
        assert_eq!(report.deleted, 3);
        assert_eq!(merger.pending_deletes().count(), 2);
        assert_eq!(merger.bundle().base(), 105);

        let pass = merger.process_once().unwrap();
        assert_eq!(pass.deleted, 2);
        assert_eq!(pass.pending_deletes, 0);
        assert!(pass.merged_bundles.is_empty());
        assert!(src.inner().is_empty());
    }

    // -----------------------------------------------------------------------
    // Passes
    // -----------------------------------------------------------------------

    #[test]
    fn pass_merges_every_complete_bundle() {
        let (mut merger, src, dst) = setup(5);
        write_all(&src, &linked("a", 100, 112));

        let pass = merger.process_once().unwrap();
        assert_eq!(pass.listed, 12);
        assert_eq!(pass.merged_bundles, vec![100, 105]);
        assert_eq!(pass.deleted, 10);
        assert_eq!(dst.inner().keys(), vec!["0000000100", "0000000105"]);
        assert_eq!(src.inner().len(), 2);
        assert_eq!(merger.bundle().base(), 110);
        assert_eq!(merger.bundle().accepted().len(), 2);
    }

    #[test]
    fn fork_files_are_deleted_with_bundle() {
        let (mut merger, src, dst) = setup(5);
        write_all(&src, &linked("a", 100, 105));
        write_all(&src, &[name(102, "b102", "a101")]);

        let pass = merger.process_once().unwrap();
        assert_eq!(pass.merged_bundles, vec![100]);
        assert!(src.inner().is_empty());

        let ids: Vec<String> = bundle_blocks(&dst, "0000000100")
            .into_iter()
            .map(|b| b.id)
            .collect();
        assert_eq!(ids, vec!["a100", "a101", "a102", "a103", "a104"]);
    }

    #[test]
    fn stale_files_go_with_next_merge() {
        let (mut merger, src, _dst) = setup(5);
        write_all(&src, &linked("a", 95, 105));
        merger.process_once().unwrap();
        assert!(src.inner().is_empty());
    }

    #[test]
    fn stale_files_kept_when_configured() {
        let (mut merger, src, _dst) = setup_with(MergerConfig {
            delete_stale_files: false,
            ..config(5)
        });
        write_all(&src, &linked("a", 95, 105));
        let pass = merger.process_once().unwrap();
        assert_eq!(pass.listed, 5);
        assert_eq!(pass.merged_bundles, vec![100]);
        assert_eq!(src.inner().len(), 5);
        assert!(merger.bundle().stale_keys().next().is_none());
    }

    #[test]
    fn temp_files_are_not_listed() {
        let (mut merger, src, _dst) = setup(5);
        write_all(&src, &CHAIN[..4]);
        src.inner().write(&format!("{}.tmp", CHAIN[4]), b"partial").unwrap();
        let pass = merger.process_once().unwrap();
        assert_eq!(pass.listed, 4);
        assert!(pass.merged_bundles.is_empty());
    }

    // -----------------------------------------------------------------------
    // Rejected input
    // -----------------------------------------------------------------------

    #[test]
    fn malformed_names_are_ignored_once() {
        let (mut merger, src, _dst) = setup(5);
        write_all(&src, &CHAIN);
        src.inner().write("garbage", b"").unwrap();
        src.inner().write("0000000100-bad", b"").unwrap();

        let pass = merger.process_once().unwrap();
        assert_eq!(pass.merged_bundles, vec![100]);
        assert_eq!(merger.ignored.len(), 2);
        assert_eq!(src.inner().keys(), vec!["0000000100-bad", "garbage"]);

        merger.process_once().unwrap();
        assert_eq!(merger.ignored.len(), 2);
    }

    #[test]
    fn corrupt_payload_drops_file_until_replaced() {
        let (mut merger, src, dst) = setup(5);
        write_all(&src, &CHAIN);
        src.inner().write(CHAIN[2], b"junk").unwrap();

        let pass = merger.process_once().unwrap();
        assert!(pass.merged_bundles.is_empty());
        assert_eq!(merger.bundle().accepted().len(), 2);
        assert!(dst.inner().is_empty());

        let ts = Utc.with_ymd_and_hms(1970, 1, 17, 15, 31, 13).unwrap();
        let replacement = format_one_block_filename(102, &ts, &chain_id(2), &chain_id(1));
        write_one_block(&*src, &replacement);

        let pass = merger.process_once().unwrap();
        assert_eq!(pass.merged_bundles, vec![100]);
        assert!(src.inner().is_empty());
    }

    #[test]
    fn corrupt_payload_recovers_when_rewritten_in_place() {
        let (mut merger, src, dst) = setup(5);
        write_all(&src, &CHAIN);
        src.inner().write(CHAIN[2], b"junk").unwrap();

        let pass = merger.process_once().unwrap();
        assert!(pass.merged_bundles.is_empty());
        assert_eq!(src.inner().keys().len(), 5);

        let pass = merger.process_once().unwrap();
        assert!(pass.merged_bundles.is_empty());

        write_one_block(&*src, CHAIN[2]);
        let pass = merger.process_once().unwrap();
        assert_eq!(pass.merged_bundles, vec![100]);
        assert_eq!(merger.bundle().base(), 105);
        assert_eq!(bundle_blocks(&dst, &format_bundle_key(100)).len(), 5);
        assert!(src.inner().is_empty());
    }

    #[test]
    fn payload_with_two_blocks_is_rejected() {
        let (mut merger, src, _dst) = setup(5);
        write_all(&src, &CHAIN);
        let file = OneBlockFile::parse(CHAIN[2]).unwrap();
        let block = Block::new(102, file.id, file.previous_id, file.timestamp);
        let mut data = FramedBlockCodec.encode(&block).unwrap();
        data.extend(FramedBlockCodec.encode(&block).unwrap());
        src.inner().write(CHAIN[2], &data).unwrap();

        merger.triage_new_one_block_files(&CHAIN);
        let err = merger.merge_upload_and_delete().unwrap_err();
        match err {
            MergerError::Format(FormatError::Mismatch { number, reason, .. }) => {
                assert_eq!(number, 102);
                assert!(reason.contains("found 2"), "{reason}");
            }
            other => panic!("unexpected error: {other}"),
        }
        assert_eq!(merger.bundle().accepted().len(), 2);
    }

    #[test]
    fn payload_must_match_filename() {
        let (mut merger, src, _dst) = setup(5);
        write_all(&src, &CHAIN);
        let wrong = Block::new(103, chain_id(3), chain_id(2), Utc::now());
        src.inner()
            .write(CHAIN[2], &FramedBlockCodec.encode(&wrong).unwrap())
            .unwrap();

        merger.triage_new_one_block_files(&CHAIN);
        let err = merger.merge_upload_and_delete().unwrap_err();
        assert!(matches!(err, MergerError::Format(FormatError::Mismatch { number: 102, .. })));
        assert!(!merger.bundle().is_complete());
    }

    #[test]
    fn unreadable_source_aborts_merge() {
        let (mut merger, src, dst) = setup(5);
        write_all(&src, &CHAIN);
        merger.triage_new_one_block_files(&CHAIN);
        src.fail_reads(10);
        let err = merger.merge_upload_and_delete().unwrap_err();
        assert!(matches!(err, MergerError::Store(StoreError::Unavailable(_))));
        assert!(merger.bundle().is_complete());
        assert!(dst.inner().is_empty());
    }

    // -----------------------------------------------------------------------
    // Startup and query handle
    // -----------------------------------------------------------------------

    #[test]
    fn new_resumes_after_last_bundle() {
        let src = Arc::new(FlakyStore::new());
        let dst = Arc::new(FlakyStore::new());
        dst.inner().write("0000000100", b"").unwrap();
        dst.inner().write("0000000105", b"").unwrap();
        let merger = Merger::new(
            src,
            dst,
            Arc::new(FramedBlockCodec),
            MergerConfig {
                minimal_block_num: 100,
                ..config(5)
            },
        )
        .unwrap();
        assert_eq!(merger.bundle().base(), 110);
    }

    #[test]
    fn new_refuses_to_resume_over_hole() {
        let dst = Arc::new(FlakyStore::new());
        for key in ["0000000100", "0000000105", "0000000115"] {
            dst.inner().write(key, b"").unwrap();
        }
        let result = Merger::new(
            Arc::new(FlakyStore::new()),
            dst,
            Arc::new(FramedBlockCodec),
            MergerConfig {
                minimal_block_num: 100,
                ..config(5)
            },
        );
        assert!(matches!(result, Err(MergerError::HoleDetected { from: 105, to: 115 })));
    }

    #[test]
    fn new_rejects_invalid_config() {
        let result = Merger::new(
            Arc::new(FlakyStore::new()),
            Arc::new(FlakyStore::new()),
            Arc::new(FramedBlockCodec),
            config(0),
        );
        assert!(matches!(result, Err(MergerError::Config(_))));
    }

    #[test]
    fn query_service_follows_merges() {
        let (mut merger, src, _dst) = setup(5);
        let service = merger.query_service();
        write_all(&src, &CHAIN);

        merger.triage_new_one_block_files(&CHAIN);
        assert_eq!(service.status().accepted, 5);
        let request = crate::query::PreMergedRequest {
            low_block_num: 101,
            high_block_id: chain_id(3),
        };
        assert_eq!(service.pre_merged_blocks(&request).blocks.len(), 3);

        merger.merge_upload_and_delete().unwrap();
        let status = service.status();
        assert_eq!(status.base, 105);
        assert_eq!(status.accepted, 0);
        assert!(!service.pre_merged_blocks(&request).found);
    }

    // -----------------------------------------------------------------------
    // Run loop
    // -----------------------------------------------------------------------

    #[tokio::test]
    async fn run_merges_until_shutdown() {
        let (merger, src, dst) = setup(5);
        write_all(&src, &CHAIN);
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(merger.run(rx));

        for _ in 0..200 {
            if dst.inner().exists("0000000100").unwrap() {
                break;
            }
            tokio::time::sleep(Duration::from_millis(10)).await;
        }
        assert!(dst.inner().exists("0000000100").unwrap());

        tx.send(true).unwrap();
        handle.await.unwrap().unwrap();
    }

    #[tokio::test]
    async fn run_stops_when_sender_dropped() {
        let (merger, _src, _dst) = setup(5);
        let (tx, rx) = watch::channel(false);
        drop(tx);
        merger.run(rx).await.unwrap();
    }

    // -----------------------------------------------------------------------
    // Properties
    // -----------------------------------------------------------------------

    mod properties {
        use super::*;
        use proptest::prelude::*;

        proptest! {
            #![proptest_config(ProptestConfig::with_cases(32))]

            #[test]
            fn linked_range_merges_into_one_bundle(chunk in 1u64..=20, slot in 0u64..1000) {
                let base = slot * chunk;
                let src = Arc::new(FlakyStore::new());
                let dst = Arc::new(FlakyStore::new());
                let mut merger = Merger::with_base(
                    src.clone(),
                    dst.clone(),
                    Arc::new(FramedBlockCodec),
                    config(chunk),
                    base,
                );
                write_all(&src, &linked("p", base, base + chunk));

                let pass = merger.process_once().unwrap();
                prop_assert_eq!(pass.merged_bundles, vec![base]);
                prop_assert_eq!(dst.inner().keys(), vec![format_bundle_key(base)]);

                let numbers: Vec<u64> = bundle_blocks(&dst, &format_bundle_key(base))
                    .iter()
                    .map(|b| b.number)
                    .collect();
                prop_assert_eq!(numbers, (base..base + chunk).collect::<Vec<_>>());
                prop_assert!(src.inner().is_empty());
                prop_assert_eq!(merger.bundle().base(), base + chunk);
            }
        }
    }
}
