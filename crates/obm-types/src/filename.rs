//! One-block and bundle filename protocols.
//!
//! One-block files are named after the block they hold:
//!
//! ```text
//! 0000000100-20170701T122141.0-24a07267-e5914b39
//! ^number    ^timestamp        ^id      ^previous id
//! ```
//!
//! Bundle files are named after their base block number only:
//!
//! ```text
//! 0000000100
//! ```
//!
//! Block numbers are always [`BLOCK_NUM_WIDTH`] digits, zero padded, so that
//! sorting keys lexically sorts them numerically. Everything downstream
//! (triage order, resume scanning) depends on that property.

use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FormatError;

/// Width of the zero-padded block number prefix.
pub const BLOCK_NUM_WIDTH: usize = 10;

/// Highest block number representable in a fixed-width key.
pub const MAX_BLOCK_NUM: u64 = 9_999_999_999;

const TIMESTAMP_FORMAT: &str = "%Y%m%dT%H%M%S%.f";
const FIELD_COUNT: usize = 4;

/// Parsed metadata of a one-block source file.
///
/// Several files may share a `number` when the chain forked; they then differ
/// by `id`.
#[derive(Clone, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct OneBlockFile {
    pub number: u64,
    pub timestamp: DateTime<Utc>,
    pub id: String,
    pub previous_id: String,
    /// Source-store key the metadata was parsed from.
    pub key: String,
}

impl OneBlockFile {
    /// Parse a source-store key into one-block metadata.
    pub fn parse(key: &str) -> Result<Self, FormatError> {
        let (number, timestamp, id, previous_id) = parse_one_block_filename(key)?;
        Ok(Self {
            number,
            timestamp,
            id,
            previous_id,
            key: key.to_string(),
        })
    }
}

/// Split a one-block filename into `(number, timestamp, id, previous_id)`.
///
/// # Examples
///
/// ```
/// use obm_types::parse_one_block_filename;
///
/// let (num, _, id, prev) =
///     parse_one_block_filename("0000000101-20170701T122141.5-dbda3f44-09f6d693").unwrap();
/// assert_eq!(num, 101);
/// assert_eq!(id, "dbda3f44");
/// assert_eq!(prev, "09f6d693");
/// assert!(parse_one_block_filename("0000000101-dbda3f44").is_err());
/// ```
pub fn parse_one_block_filename(
    name: &str,
) -> Result<(u64, DateTime<Utc>, String, String), FormatError> {
    let parts: Vec<&str> = name.split('-').collect();
    if parts.len() != FIELD_COUNT {
        return Err(FormatError::FieldCount {
            name: name.to_string(),
            found: parts.len(),
            expected: FIELD_COUNT,
        });
    }

    let number = parse_block_number(name, parts[0])?;

    let timestamp = NaiveDateTime::parse_from_str(parts[1], TIMESTAMP_FORMAT)
        .map_err(|_| FormatError::InvalidTimestamp {
            name: name.to_string(),
            field: parts[1].to_string(),
        })?
        .and_utc();

    if parts[2].is_empty() {
        return Err(FormatError::EmptyField {
            name: name.to_string(),
            field: "id",
        });
    }
    if parts[3].is_empty() {
        return Err(FormatError::EmptyField {
            name: name.to_string(),
            field: "previous id",
        });
    }

    Ok((number, timestamp, parts[2].to_string(), parts[3].to_string()))
}

/// Build a one-block filename. Inverse of [`parse_one_block_filename`].
pub fn format_one_block_filename(
    number: u64,
    timestamp: &DateTime<Utc>,
    id: &str,
    previous_id: &str,
) -> String {
    format!(
        "{number:0width$}-{}-{id}-{previous_id}",
        timestamp.format(TIMESTAMP_FORMAT),
        width = BLOCK_NUM_WIDTH,
    )
}

/// Destination key of the bundle starting at `base`.
pub fn format_bundle_key(base: u64) -> String {
    format!("{base:0width$}", width = BLOCK_NUM_WIDTH)
}

/// Parse a bundle key back into its base block number.
pub fn parse_bundle_key(key: &str) -> Result<u64, FormatError> {
    parse_block_number(key, key)
}

fn parse_block_number(name: &str, field: &str) -> Result<u64, FormatError> {
    // `u64::from_str` also accepts a leading `+`; keys must be plain digits.
    if field.len() != BLOCK_NUM_WIDTH || !field.bytes().all(|b| b.is_ascii_digit()) {
        return Err(FormatError::InvalidNumber {
            name: name.to_string(),
            field: field.to_string(),
        });
    }
    field.parse().map_err(|_| FormatError::InvalidNumber {
        name: name.to_string(),
        field: field.to_string(),
    })
}
