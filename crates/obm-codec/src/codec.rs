use obm_types::Block;

use crate::error::CodecResult;
use crate::stream::{encode_frame, BlockReader};

/// Encodes blocks into storable bytes and decodes them back.
///
/// The merger is generic over the codec; a bundle is always the plain
/// concatenation of `encode` outputs, so implementations must produce
/// self-delimiting encodings.
pub trait BlockCodec: Send + Sync {
    /// Encode one block.
    fn encode(&self, block: &Block) -> CodecResult<Vec<u8>>;

    /// Decode the first block in `data`, returning it with the number of
    /// bytes consumed. `Ok(None)` when `data` holds no more blocks.
    fn decode(&self, data: &[u8]) -> CodecResult<Option<(Block, usize)>>;

    /// Decode every block in `data` until end-of-stream.
    fn decode_all(&self, data: &[u8]) -> CodecResult<Vec<Block>> {
        let mut blocks = Vec::new();
        let mut rest = data;
        while let Some((block, consumed)) = self.decode(rest)? {
            blocks.push(block);
            rest = &rest[consumed..];
        }
        Ok(blocks)
    }
}

/// Length-prefixed, CRC32-checked bincode frames.
#[derive(Clone, Copy, Debug, Default)]
pub struct FramedBlockCodec;

impl BlockCodec for FramedBlockCodec {
    fn encode(&self, block: &Block) -> CodecResult<Vec<u8>> {
        encode_frame(block)
    }

    fn decode(&self, data: &[u8]) -> CodecResult<Option<(Block, usize)>> {
        let mut reader = BlockReader::new(data);
        Ok(reader
            .read()?
            .map(|block| (block, reader.offset() as usize)))
    }
}
