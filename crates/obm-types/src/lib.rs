//! Foundation types for the one-block merger (OBM).
//!
//! Every other OBM crate depends on `obm-types`. It defines the block model
//! the merger reads and the two filename protocols that make the object-store
//! key namespace usable as an index:
//!
//! - one-block files: `{number:010}-{timestamp}-{id}-{previous_id}`
//! - bundle files: `{base:010}`
//!
//! Both protocols use fixed-width, zero-padded block numbers so that lexical
//! key order equals numeric block order on every storage backend.
//!
//! # Key Types
//!
//! - [`Block`] -- a decoded block (number, identifiers, timestamp, payload)
//! - [`BlockRef`] -- a block reference returned by premerged-block queries
//! - [`OneBlockFile`] -- parsed metadata of a one-block source key

pub mod block;
pub mod error;
pub mod filename;

pub use block::{Block, BlockRef};
pub use error::FormatError;
pub use filename::{
    format_bundle_key, format_one_block_filename, parse_bundle_key, parse_one_block_filename,
    OneBlockFile, BLOCK_NUM_WIDTH, MAX_BLOCK_NUM,
};
