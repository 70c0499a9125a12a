//! Chunking engine: splits files into ordered chunks, reassembles them,
//! compresses individual chunks and verifies whole-file digests.

mod checksum;
mod chunked;
mod compress;
mod types;
mod validation;

pub use checksum::{checksum, to_hex, verify, verify_data};
pub use chunked::{ChunkAssembler, chunk_count, decode_chunk, encode_chunk, reassemble, split};
pub use compress::{MIN_COMPRESS_LEN, compress, decompress};
pub use types::FileMetadata;
pub use validation::{MAX_FILENAME_LEN, validate_filename};

/// Default chunk size in bytes (4 KiB).
pub const DEFAULT_CHUNK_SIZE: usize = trickle_protocol::ChunkSize::Medium.bytes() as usize;

/// Errors produced by the transfer crate.
#[derive(Debug, thiserror::Error)]
pub enum TransferError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("checksum mismatch: expected {expected}, got {actual}")]
    ChecksumMismatch { expected: String, actual: String },

    #[error("missing chunk {0}")]
    MissingChunk(u32),

    #[error("size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: u64, actual: u64 },

    #[error("corrupt chunk: {0}")]
    Corrupt(String),

    #[error("invalid chunk {index}: {reason}")]
    InvalidChunk { index: u32, reason: String },

    #[error("unsupported chunk size: {0}")]
    InvalidChunkSize(u32),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),
}

impl TransferError {
    /// Returns `true` for failures that mean the received bytes cannot be
    /// trusted (as opposed to a malformed request).
    pub fn is_integrity(&self) -> bool {
        matches!(
            self,
            TransferError::ChecksumMismatch { .. }
                | TransferError::MissingChunk(_)
                | TransferError::SizeMismatch { .. }
                | TransferError::Corrupt(_)
        )
    }
}
