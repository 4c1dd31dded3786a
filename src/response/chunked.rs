//! Chunked transfer coding framing.
//!
//! One flush produces one chunk: `<hex length>\r\n<payload>\r\n`, the last flush of a response
//! appends the zero-length terminator chunk.
use crate::native::DataChunk;

pub(crate) const CRLF: &[u8] = b"\r\n";

pub(crate) const TERMINATOR: &[u8] = b"0\r\n\r\n";

const HEX: &[u8; 16] = b"0123456789abcdef";

/// Chunk size line, e.g: `1f4\r\n`.
pub(crate) struct ChunkHeader {
    buf: [u8; 18],
    start: usize,
}

impl ChunkHeader {
    pub(crate) fn new(size: u64) -> Self {
        let mut buf = [0u8; 18];
        buf[16] = b'\r';
        buf[17] = b'\n';

        let mut start = 16;
        let mut n = size;
        loop {
            start -= 1;
            buf[start] = HEX[(n & 0xf) as usize];
            n >>= 4;
            if n == 0 {
                break;
            }
        }
        Self { buf, start }
    }

    #[inline]
    pub(crate) fn as_bytes(&self) -> &[u8] {
        &self.buf[self.start..]
    }
}

/// Wrap the payload of one flush in chunk framing.
///
/// An empty payload produces no chunk, only the terminator when `end` is set.
pub(crate) fn frame<'a>(
    header: &'a ChunkHeader,
    payload: Vec<DataChunk<'a>>,
    end: bool,
) -> Vec<DataChunk<'a>> {
    let len = payload.iter().map(DataChunk::len).sum::<u64>();
    let mut chunks = Vec::with_capacity(payload.len() + 3);
    if len != 0 {
        chunks.push(DataChunk::Memory(header.as_bytes()));
        chunks.extend(payload);
        chunks.push(DataChunk::Memory(CRLF));
    }
    if end {
        chunks.push(DataChunk::Memory(TERMINATOR));
    }
    chunks
}
