//! Fixtures and store doubles shared by the merger tests.

use std::sync::atomic::{AtomicUsize, Ordering};

use chrono::{TimeZone, Utc};
use obm_codec::{BlockCodec, FramedBlockCodec};
use obm_store::{InMemoryObjectStore, ObjectStore, StoreError, StoreResult, WalkControl, WalkQuery};
use obm_types::{format_one_block_filename, Block, OneBlockFile};

/// Five linked mainnet-style one-block keys, blocks 100 through 104.
pub const CHAIN: [&str; 5] = [
    "0000000100-19700117T153111.4-dfe2e70d6c116a541101cecbb256d7402d62125f6ddc9b607d49edc989825c64-db10afd3efa45327eb284c83cc925bd9bd7966aea53067c1eebe0724d124ec1e",
    "0000000101-19700117T153112.4-4f66fd0241681ebbc119f97e952c1036b87b6e8f64f5c5d84c5c7a9bb1ebfdcc-dfe2e70d6c116a541101cecbb256d7402d62125f6ddc9b607d49edc989825c64",
    "0000000102-19700117T153113.4-16110f3aa1895de2ec22cfd746751f724d112a953c71b62858a1523b50f3dc64-4f66fd0241681ebbc119f97e952c1036b87b6e8f64f5c5d84c5c7a9bb1ebfdcc",
    "0000000103-19700117T153114.4-39bef3da2cd14e02781b576050dc426606149bff937a4af43e65417e6e98c713-16110f3aa1895de2ec22cfd746751f724d112a953c71b62858a1523b50f3dc64",
    "0000000104-19700117T153115.4-7faae5e905007d146c15b22dcb736935cb344f88be0d35fe656701e84d52398e-39bef3da2cd14e02781b576050dc426606149bff937a4af43e65417e6e98c713",
];

/// Block id carried by `CHAIN[i]`.
pub fn chain_id(i: usize) -> String {
    OneBlockFile::parse(CHAIN[i]).unwrap().id
}

/// One-block key for `number` with a timestamp derived from the number.
pub fn name(number: u64, id: &str, previous_id: &str) -> String {
    let ts = Utc.with_ymd_and_hms(2017, 7, 1, 0, 0, 0).unwrap()
        + chrono::Duration::seconds(number as i64);
    format_one_block_filename(number, &ts, id, previous_id)
}

/// Keys of a linked run `[from, to)` on `branch`: ids `{branch}{n}`.
pub fn linked(branch: &str, from: u64, to: u64) -> Vec<String> {
    (from..to)
        .map(|n| {
            let previous = n
                .checked_sub(1)
                .map_or_else(|| "genesis".to_string(), |p| format!("{branch}{p}"));
            name(n, &format!("{branch}{n}"), &previous)
        })
        .collect()
}

pub fn parse_all<I, S>(names: I) -> Vec<OneBlockFile>
where
    I: IntoIterator<Item = S>,
    S: AsRef<str>,
{
    names
        .into_iter()
        .map(|n| OneBlockFile::parse(n.as_ref()).unwrap())
        .collect()
}

/// Store an encoded block matching `key` under `key`.
pub fn write_one_block(store: &dyn ObjectStore, key: &str) {
    let file = OneBlockFile::parse(key).unwrap();
    let block = Block::new(file.number, file.id, file.previous_id, file.timestamp)
        .with_payload(format!("payload-{}", file.number).into_bytes());
    let data = FramedBlockCodec.encode(&block).unwrap();
    store.write(key, &data).unwrap();
}

/// In-memory store that fails a configurable number of upcoming calls and
/// counts existence probes.
#[derive(Default)]
pub struct FlakyStore {
    inner: InMemoryObjectStore,
    fail_exists: AtomicUsize,
    fail_reads: AtomicUsize,
    fail_writes: AtomicUsize,
    fail_deletes: AtomicUsize,
    exists_calls: AtomicUsize,
}

impl FlakyStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn inner(&self) -> &InMemoryObjectStore {
        &self.inner
    }

    pub fn fail_exists(&self, n: usize) {
        self.fail_exists.store(n, Ordering::SeqCst);
    }

    pub fn fail_reads(&self, n: usize) {
        self.fail_reads.store(n, Ordering::SeqCst);
    }

    pub fn fail_writes(&self, n: usize) {
        self.fail_writes.store(n, Ordering::SeqCst);
    }

    pub fn fail_deletes(&self, n: usize) {
        self.fail_deletes.store(n, Ordering::SeqCst);
    }

    pub fn exists_calls(&self) -> usize {
        self.exists_calls.load(Ordering::SeqCst)
    }

    fn trip(counter: &AtomicUsize, what: &str) -> StoreResult<()> {
        let tripped = counter
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |n| n.checked_sub(1))
            .is_ok();
        if tripped {
            Err(StoreError::Unavailable(format!("injected {what} failure")))
        } else {
            Ok(())
        }
    }
}

impl ObjectStore for FlakyStore {
    fn walk(
        &self,
        query: &WalkQuery,
        visit: &mut dyn FnMut(&str) -> StoreResult<WalkControl>,
    ) -> StoreResult<()> {
        self.inner.walk(query, visit)
    }

    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>> {
        Self::trip(&self.fail_reads, "read")?;
        self.inner.read(key)
    }

    fn write(&self, key: &str, data: &[u8]) -> StoreResult<()> {
        Self::trip(&self.fail_writes, "write")?;
        self.inner.write(key, data)
    }

    fn exists(&self, key: &str) -> StoreResult<bool> {
        self.exists_calls.fetch_add(1, Ordering::SeqCst);
        Self::trip(&self.fail_exists, "exists")?;
        self.inner.exists(key)
    }

    fn delete(&self, key: &str) -> StoreResult<bool> {
        Self::trip(&self.fail_deletes, "delete")?;
        self.inner.delete(key)
    }
}
