use std::fmt;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::filename::OneBlockFile;

/// A single chain block as seen by the merger.
///
/// The merger only reads the number, the two identifiers and the timestamp;
/// `payload` is carried through untouched.
#[derive(Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Block {
    pub number: u64,
    pub id: String,
    pub previous_id: String,
    pub timestamp: DateTime<Utc>,
    pub payload: Vec<u8>,
}

impl Block {
    pub fn new(
        number: u64,
        id: impl Into<String>,
        previous_id: impl Into<String>,
        timestamp: DateTime<Utc>,
    ) -> Self {
        Self {
            number,
            id: id.into(),
            previous_id: previous_id.into(),
            timestamp,
            payload: Vec::new(),
        }
    }

    pub fn with_payload(mut self, payload: Vec<u8>) -> Self {
        self.payload = payload;
        self
    }
}

impl fmt::Debug for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Block")
            .field("number", &self.number)
            .field("id", &self.id)
            .field("previous_id", &self.previous_id)
            .field("payload_len", &self.payload.len())
            .finish()
    }
}

impl fmt::Display for Block {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{} ({})", self.number, self.id)
    }
}

/// Reference to a premerged block, as returned by the query service.
///
/// `key` is the source-store key of the one-block file holding the block.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct BlockRef {
    pub number: u64,
    pub id: String,
    pub previous_id: String,
    pub timestamp: DateTime<Utc>,
    pub key: String,
}

impl From<&OneBlockFile> for BlockRef {
    fn from(file: &OneBlockFile) -> Self {
        Self {
            number: file.number,
            id: file.id.clone(),
            previous_id: file.previous_id.clone(),
            timestamp: file.timestamp,
            key: file.key.clone(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::TimeZone;

    fn ts() -> DateTime<Utc> {
        Utc.with_ymd_and_hms(2017, 7, 1, 12, 21, 41).unwrap()
    }

    #[test]
    fn display_shows_number_and_id() {
        let block = Block::new(100, "24a07267", "e5914b39", ts());
        assert_eq!(block.to_string(), "#100 (24a07267)");
    }

    #[test]
    fn debug_hides_payload_bytes() {
        let block = Block::new(7, "aa", "bb", ts()).with_payload(vec![1, 2, 3]);
        let debug = format!("{block:?}");
        assert!(debug.contains("payload_len: 3"));
    }

    #[test]
    fn block_ref_from_file() {
        let file = OneBlockFile::parse("0000000100-20170701T122141.0-24a07267-e5914b39").unwrap();
        let r = BlockRef::from(&file);
        assert_eq!(r.number, 100);
        assert_eq!(r.id, "24a07267");
        assert_eq!(r.previous_id, "e5914b39");
        assert_eq!(r.key, file.key);
    }

    #[test]
    fn block_ref_serde_roundtrip() {
        let file = OneBlockFile::parse("0000000101-20170701T122141.5-dbda3f44-24a07267").unwrap();
        let r = BlockRef::from(&file);
        let json = serde_json::to_string(&r).unwrap();
        let parsed: BlockRef = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed, r);
    }
}
