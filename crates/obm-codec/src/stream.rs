use std::io::{self, Read};

use obm_types::Block;

use crate::error::{CodecError, CodecResult};

/// Header size: 4 bytes length + 4 bytes CRC.
pub const HEADER_SIZE: usize = 8;

/// Largest accepted frame payload.
pub const MAX_FRAME_SIZE: usize = 64 * 1024 * 1024;

/// Encode a single block into one frame.
pub fn encode_frame(block: &Block) -> CodecResult<Vec<u8>> {
    let payload =
        bincode::serialize(block).map_err(|e| CodecError::Serialization(e.to_string()))?;
    if payload.len() > MAX_FRAME_SIZE {
        return Err(CodecError::FrameTooLarge {
            size: payload.len(),
            max: MAX_FRAME_SIZE,
        });
    }

    let mut frame = Vec::with_capacity(HEADER_SIZE + payload.len());
    frame.extend_from_slice(&(payload.len() as u32).to_le_bytes());
    frame.extend_from_slice(&crc32fast::hash(&payload).to_le_bytes());
    frame.extend_from_slice(&payload);
    Ok(frame)
}

/// Sequentially decodes frames until end-of-stream.
///
/// A stream ending exactly on a frame boundary is a clean end; any partial
/// header or payload is reported as [`CodecError::Truncated`].
pub struct BlockReader<R: Read> {
    inner: R,
    offset: u64,
    failed: bool,
}

impl<R: Read> BlockReader<R> {
    pub fn new(inner: R) -> Self {
        Self {
            inner,
            offset: 0,
            failed: false,
        }
    }

    /// Bytes consumed so far.
    pub fn offset(&self) -> u64 {
        self.offset
    }

    /// Read the next block. `Ok(None)` signals end-of-stream.
    pub fn read(&mut self) -> CodecResult<Option<Block>> {
        let result = self.read_frame();
        if result.is_err() {
            self.failed = true;
        }
        result
    }

    fn read_frame(&mut self) -> CodecResult<Option<Block>> {
        let offset = self.offset;

        let mut header = [0u8; HEADER_SIZE];
        let got = read_fully(&mut self.inner, &mut header)?;
        if got == 0 {
            return Ok(None);
        }
        if got < HEADER_SIZE {
            return Err(CodecError::Truncated {
                offset,
                needed: HEADER_SIZE,
                got,
            });
        }

        let length = u32::from_le_bytes([header[0], header[1], header[2], header[3]]);
        let expected = u32::from_le_bytes([header[4], header[5], header[6], header[7]]);
        if length == 0 || length as usize > MAX_FRAME_SIZE {
            return Err(CodecError::InvalidFrameLength { offset, length });
        }

        let mut payload = vec![0u8; length as usize];
        let got = read_fully(&mut self.inner, &mut payload)?;
        if got < payload.len() {
            return Err(CodecError::Truncated {
                offset,
                needed: payload.len(),
                got,
            });
        }

        let actual = crc32fast::hash(&payload);
        if actual != expected {
            return Err(CodecError::CrcMismatch {
                offset,
                expected,
                actual,
            });
        }

        let block: Block =
            bincode::deserialize(&payload).map_err(|e| CodecError::Deserialization {
                offset,
                reason: e.to_string(),
            })?;

        self.offset += (HEADER_SIZE + payload.len()) as u64;
        Ok(Some(block))
    }
}

impl<R: Read> Iterator for BlockReader<R> {
    type Item = CodecResult<Block>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.failed {
            return None;
        }
        self.read().transpose()
    }
}

/// Fill `buf` from `reader`, stopping early only at end-of-stream.
fn read_fully(reader: &mut impl Read, buf: &mut [u8]) -> io::Result<usize> {
    let mut filled = 0;
    while filled < buf.len() {
        match reader.read(&mut buf[filled..]) {
            Ok(0) => break,
            Ok(n) => filled += n,
            Err(e) if e.kind() == io::ErrorKind::Interrupted => continue,
            Err(e) => return Err(e),
        }
    }
    Ok(filled)
}
