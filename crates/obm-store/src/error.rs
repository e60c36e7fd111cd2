/// Errors from object store operations.
#[derive(Debug, thiserror::Error)]
pub enum StoreError {
    /// The requested object was not found.
    #[error("object not found: {0}")]
    NotFound(String),

    /// The key cannot be stored by this backend.
    #[error("invalid key {key:?}: {reason}")]
    InvalidKey { key: String, reason: String },

    /// I/O error from the underlying storage backend.
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Backend temporarily unavailable (throttling, network partition).
    #[error("store unavailable: {0}")]
    Unavailable(String),
}

impl StoreError {
    /// Whether retrying the same operation may succeed.
    pub fn is_transient(&self) -> bool {
        matches!(self, Self::Io(_) | Self::Unavailable(_))
    }
}

/// Result alias for store operations.
pub type StoreResult<T> = Result<T, StoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn transient_classification() {
        assert!(StoreError::Unavailable("slow down".into()).is_transient());
        assert!(StoreError::Io(std::io::Error::other("reset")).is_transient());
        assert!(!StoreError::NotFound("k".into()).is_transient());
        assert!(!StoreError::InvalidKey { key: "a/b".into(), reason: "x".into() }.is_transient());
    }
}
