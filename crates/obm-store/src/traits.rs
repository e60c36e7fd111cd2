use crate::error::{StoreError, StoreResult};

/// Returned by walk visitors to continue or stop the enumeration.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum WalkControl {
    Continue,
    Stop,
}

/// Selection of keys for [`ObjectStore::walk`].
#[derive(Clone, Debug, Default, PartialEq, Eq)]
pub struct WalkQuery {
    /// Only keys starting with this prefix.
    pub prefix: String,
    /// Only keys lexically greater than or equal to this key.
    pub start_at: Option<String>,
    /// Skip keys ending with this suffix (in-progress uploads).
    pub ignore_suffix: Option<String>,
}

impl WalkQuery {
    /// Every key in the store.
    pub fn all() -> Self {
        Self::default()
    }

    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            prefix: prefix.into(),
            ..Self::default()
        }
    }

    pub fn starting_at(mut self, key: impl Into<String>) -> Self {
        self.start_at = Some(key.into());
        self
    }

    pub fn ignoring_suffix(mut self, suffix: impl Into<String>) -> Self {
        let suffix = suffix.into();
        self.ignore_suffix = (!suffix.is_empty()).then_some(suffix);
        self
    }

    /// Returns `true` if `key` is selected by this query.
    pub fn matches(&self, key: &str) -> bool {
        if !key.starts_with(&self.prefix) {
            return false;
        }
        if let Some(start) = &self.start_at {
            if key < start.as_str() {
                return false;
            }
        }
        if let Some(suffix) = &self.ignore_suffix {
            if key.ends_with(suffix.as_str()) {
                return false;
            }
        }
        true
    }
}

/// Key-ordered object store.
///
/// All implementations must satisfy these invariants:
/// - `walk` visits selected keys in ascending lexical order.
/// - `write` replaces any previous value atomically.
/// - `delete` of a missing key returns `Ok(false)`.
/// - All I/O errors are propagated, never silently ignored.
///
/// Calls are blocking; async callers should run them on a blocking pool.
pub trait ObjectStore: Send + Sync {
    /// Enumerate keys selected by `query` in ascending order.
    fn walk(
        &self,
        query: &WalkQuery,
        visit: &mut dyn FnMut(&str) -> StoreResult<WalkControl>,
    ) -> StoreResult<()>;

    /// Read an object. Returns `Ok(None)` if the key does not exist.
    fn read(&self, key: &str) -> StoreResult<Option<Vec<u8>>>;

    /// Write (or overwrite) an object.
    fn write(&self, key: &str, data: &[u8]) -> StoreResult<()>;

    /// Check whether a key exists.
    fn exists(&self, key: &str) -> StoreResult<bool>;

    /// Delete a key. Returns `true` if the key existed.
    fn delete(&self, key: &str) -> StoreResult<bool>;

    /// Collect the keys selected by `query`.
    fn list(&self, query: &WalkQuery) -> StoreResult<Vec<String>> {
        let mut keys = Vec::new();
        self.walk(query, &mut |key| {
            keys.push(key.to_string());
            Ok(WalkControl::Continue)
        })?;
        Ok(keys)
    }
}

/// Reject keys that cannot live in a flat key namespace.
pub fn validate_key(key: &str) -> StoreResult<()> {
    let reason = if key.is_empty() {
        "key must not be empty"
    } else if key.starts_with('.') {
        "key must not start with '.'"
    } else if key.contains(['/', '\\', '\0']) {
        "key must not contain path separators"
    } else {
        return Ok(());
    };
    Err(StoreError::InvalidKey {
        key: key.to_string(),
        reason: reason.into(),
    })
}
