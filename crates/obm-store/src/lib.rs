//! Object storage for the one-block merger.
//!
//! The merger reads one-block files from a *source* store and writes bundles
//! to a *destination* store. Both are plain key-value stores with ordered
//! listing; the key namespace itself is the index, so backends must list keys
//! in ascending lexical order.
//!
//! # Storage Backends
//!
//! All backends implement the [`ObjectStore`] trait:
//!
//! - [`InMemoryObjectStore`] -- `BTreeMap`-based store for tests and embedding
//! - [`LocalObjectStore`] -- one file per key in a flat directory
//!
//! # Design Rules
//!
//! 1. `walk` visits keys in ascending lexical order.
//! 2. `write` overwrites in place and is atomic at the call boundary: readers
//!    see either the old value or the new one, never a partial value.
//! 3. Deleting a missing key is not an error.
//! 4. The store never interprets object contents.
//! 5. All I/O errors are propagated, never silently ignored.

pub mod error;
pub mod local;
pub mod memory;
pub mod traits;

pub use error::{StoreError, StoreResult};
pub use local::LocalObjectStore;
pub use memory::InMemoryObjectStore;
pub use traits::{validate_key, ObjectStore, WalkControl, WalkQuery};
