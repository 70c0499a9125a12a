use trickle_protocol::{ChunkSize, Digest, FileInfo};

use crate::checksum::{checksum, to_hex};
use crate::chunked::chunk_count;
use crate::validation::validate_filename;
use crate::TransferError;

/// Name, size and digest of a file being transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileMetadata {
    pub filename: String,
    pub size: u64,
    /// `None` until the digest has been computed.
    pub checksum: Option<Digest>,
}

impl FileMetadata {
    /// Creates metadata for a validated file name.
    pub fn new(filename: impl Into<String>, size: u64) -> Result<Self, TransferError> {
        let filename = filename.into();
        validate_filename(&filename)?;
        Ok(Self {
            filename,
            size,
            checksum: None,
        })
    }

    /// Describes `data` completely, digest included.
    pub fn from_bytes(filename: impl Into<String>, data: &[u8]) -> Result<Self, TransferError> {
        let mut meta = Self::new(filename, data.len() as u64)?;
        meta.checksum = Some(checksum(data));
        Ok(meta)
    }

    pub fn chunk_count(&self, chunk_size: ChunkSize) -> u64 {
        chunk_count(self.size, chunk_size.bytes())
    }

    pub fn checksum_hex(&self) -> Option<String> {
        self.checksum.as_ref().map(to_hex)
    }

    /// Builds the announcement sent ahead of the chunks.
    pub fn to_file_info(&self, chunk_size: ChunkSize) -> FileInfo {
        FileInfo {
            filename: self.filename.clone(),
            size: self.size,
            chunk_size: chunk_size.bytes(),
            checksum: self.checksum,
        }
    }

    /// Accepts a peer's announcement, returning the metadata and the
    /// chunk size the peer will split with.
    pub fn from_file_info(info: &FileInfo) -> Result<(Self, ChunkSize), TransferError> {
        let chunk_size = ChunkSize::from_bytes(info.chunk_size)
            .ok_or(TransferError::InvalidChunkSize(info.chunk_size))?;
        let mut meta = Self::new(info.filename.clone(), info.size)?;
        meta.checksum = info.checksum;
        Ok((meta, chunk_size))
    }
}
