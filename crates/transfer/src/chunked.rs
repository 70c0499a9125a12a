use std::collections::BTreeMap;

use trickle_protocol::{ChunkData, CompressionLevel};

use crate::compress::{MIN_COMPRESS_LEN, compress, decompress};
use crate::{DEFAULT_CHUNK_SIZE, TransferError};

/// Splits `data` into ordered chunks of `chunk_size` bytes; only the last
/// chunk may be shorter.
///
/// If `chunk_size` is 0, [`DEFAULT_CHUNK_SIZE`] is used. Empty data yields
/// no chunks.
pub fn split(data: &[u8], chunk_size: usize) -> Vec<&[u8]> {
    let chunk_size = if chunk_size == 0 {
        DEFAULT_CHUNK_SIZE
    } else {
        chunk_size
    };
    data.chunks(chunk_size).collect()
}

/// Number of chunks a file of `size` bytes splits into.
pub fn chunk_count(size: u64, chunk_size: u32) -> u64 {
    if chunk_size == 0 {
        return 0;
    }
    size.div_ceil(u64::from(chunk_size))
}

/// Concatenates chunks in ascending index order.
///
/// Chunks may arrive in any order; a later duplicate replaces the earlier
/// one. Fails with [`TransferError::MissingChunk`] on the first gap in
/// `0..=max_index`.
pub fn reassemble<I>(chunks: I) -> Result<Vec<u8>, TransferError>
where
    I: IntoIterator<Item = (u32, Vec<u8>)>,
{
    let mut assembler = ChunkAssembler::new();
    for (index, data) in chunks {
        assembler.insert(index, data);
    }
    assembler.reassemble()
}

/// Collects decoded chunks for one file until the sender signals completion.
#[derive(Debug, Default)]
pub struct ChunkAssembler {
    chunks: BTreeMap<u32, Vec<u8>>,
    received_bytes: u64,
}

impl ChunkAssembler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Stores a chunk, replacing any earlier chunk with the same index.
    pub fn insert(&mut self, index: u32, data: Vec<u8>) {
        self.received_bytes += data.len() as u64;
        if let Some(old) = self.chunks.insert(index, data) {
            self.received_bytes -= old.len() as u64;
        }
    }

    /// Number of distinct chunks held.
    pub fn len(&self) -> usize {
        self.chunks.len()
    }

    pub fn is_empty(&self) -> bool {
        self.chunks.is_empty()
    }

    /// Total bytes currently held across all chunks.
    pub fn received_bytes(&self) -> u64 {
        self.received_bytes
    }

    /// Concatenates the held chunks, consuming the assembler.
    pub fn reassemble(self) -> Result<Vec<u8>, TransferError> {
        let mut out = Vec::with_capacity(self.received_bytes as usize);
        for (expected, (index, data)) in (0u32..).zip(self.chunks) {
            if index != expected {
                return Err(TransferError::MissingChunk(expected));
            }
            out.extend_from_slice(&data);
        }
        Ok(out)
    }
}

/// Builds the wire form of one raw chunk.
///
/// The payload is compressed only when compression is enabled, the chunk is
/// at least [`MIN_COMPRESS_LEN`] bytes and the compressed form is smaller.
pub fn encode_chunk(index: u32, raw: &[u8], level: CompressionLevel) -> ChunkData {
    let original_len = raw.len() as u64;
    if level.is_enabled() && raw.len() >= MIN_COMPRESS_LEN {
        match compress(raw, level.level()) {
            Ok(packed) if packed.len() < raw.len() => {
                return ChunkData {
                    index,
                    payload: packed,
                    compressed: true,
                    original_len,
                };
            }
            Ok(_) => {}
            Err(e) => {
                tracing::debug!(index, error = %e, "compression failed, sending raw chunk");
            }
        }
    }
    ChunkData {
        index,
        payload: raw.to_vec(),
        compressed: false,
        original_len,
    }
}

/// Recovers the raw bytes of a received chunk.
///
/// `max_len` bounds `original_len` so a hostile peer cannot make the
/// decompressor allocate arbitrarily large buffers.
pub fn decode_chunk(chunk: &ChunkData, max_len: usize) -> Result<Vec<u8>, TransferError> {
    let invalid = |reason: String| TransferError::InvalidChunk {
        index: chunk.index,
        reason,
    };

    if chunk.original_len == 0 {
        return Err(invalid("zero-length chunk".into()));
    }
    if chunk.original_len > max_len as u64 {
        return Err(invalid(format!(
            "original length {} exceeds limit {max_len}",
            chunk.original_len
        )));
    }

    if !chunk.compressed {
        if chunk.payload.len() as u64 != chunk.original_len {
            return Err(invalid(format!(
                "raw payload is {} bytes, header says {}",
                chunk.payload.len(),
                chunk.original_len
            )));
        }
        return Ok(chunk.payload.clone());
    }

    decompress(&chunk.payload, chunk.original_len as usize)
}
