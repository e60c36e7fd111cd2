//! Block codec for the one-block merger.
//!
//! A one-block file holds exactly one encoded block; a bundle holds the
//! concatenation of the encoded blocks of its range. Every encoded block is a
//! self-delimiting frame:
//!
//! ```text
//! [4 bytes: payload length (little-endian u32)]
//! [4 bytes: CRC32 of payload (little-endian u32)]
//! [N bytes: payload (bincode-serialized Block)]
//! ```
//!
//! Concatenating frames therefore yields a valid stream, and [`BlockReader`]
//! decodes such a stream block by block until end-of-stream.

pub mod codec;
pub mod error;
pub mod stream;

pub use codec::{BlockCodec, FramedBlockCodec};
pub use error::{CodecError, CodecResult};
pub use stream::{encode_frame, BlockReader, HEADER_SIZE, MAX_FRAME_SIZE};
