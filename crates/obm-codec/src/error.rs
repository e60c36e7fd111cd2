use thiserror::Error;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("serialization error: {0}")]
    Serialization(String),

    #[error("deserialization error at offset {offset}: {reason}")]
    Deserialization { offset: u64, reason: String },

    #[error("CRC mismatch at offset {offset}: expected {expected:#010x}, got {actual:#010x}")]
    CrcMismatch {
        offset: u64,
        expected: u32,
        actual: u32,
    },

    #[error("invalid frame length {length} at offset {offset}")]
    InvalidFrameLength { offset: u64, length: u32 },

    #[error("frame too large: {size} bytes (max {max})")]
    FrameTooLarge { size: usize, max: usize },

    #[error("truncated frame at offset {offset}: needed {needed} bytes, got {got}")]
    Truncated { offset: u64, needed: usize, got: usize },

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type CodecResult<T> = Result<T, CodecError>;
