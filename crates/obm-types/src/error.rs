use thiserror::Error;

/// Errors produced while parsing filenames or decoded block metadata.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum FormatError {
    #[error("wrong filename format: {name:?} has {found} dash-delimited fields, expected {expected}")]
    FieldCount {
        name: String,
        found: usize,
        expected: usize,
    },

    #[error("invalid block number {field:?} in {name:?}")]
    InvalidNumber { name: String, field: String },

    #[error("invalid block timestamp {field:?} in {name:?}")]
    InvalidTimestamp { name: String, field: String },

    #[error("empty {field} field in {name:?}")]
    EmptyField { name: String, field: &'static str },

    #[error("block {number} does not match file {key:?}: {reason}")]
    Mismatch {
        key: String,
        number: u64,
        reason: String,
    },
}
