use obm_codec::CodecError;
use obm_store::StoreError;
use obm_types::FormatError;

/// Errors from the merge loop and its startup.
#[derive(Debug, thiserror::Error)]
pub enum MergerError {
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    #[error("codec error: {0}")]
    Codec(#[from] CodecError),

    #[error("format error: {0}")]
    Format(#[from] FormatError),

    /// Existing bundles in the destination are not contiguous.
    #[error("hole in merged bundles: {from} is followed by {to}")]
    HoleDetected { from: u64, to: u64 },

    #[error("bundle write failed for {key}: {source}")]
    WriteFailed {
        key: String,
        #[source]
        source: StoreError,
    },

    #[error("bundle at {base} incomplete: {accepted}/{chunk_size} blocks accepted")]
    IncompleteBundle {
        base: u64,
        accepted: usize,
        chunk_size: u64,
    },

    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("merge task failed: {0}")]
    Join(String),
}

impl MergerError {
    /// Whether repeating the failed operation may succeed.
    pub fn is_transient(&self) -> bool {
        match self {
            Self::Store(e) | Self::WriteFailed { source: e, .. } => e.is_transient(),
            _ => false,
        }
    }
}

/// Result alias for merger operations.
pub type MergerResult<T> = Result<T, MergerError>;
