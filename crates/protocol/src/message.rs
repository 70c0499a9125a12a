//! Protocol messages.

use crate::constants::{Digest, ErrorCode, MessageType};

/// File metadata announced before chunks flow in either direction.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FileInfo {
    /// Plain file name, no directory components.
    pub filename: String,
    /// Total size in bytes.
    pub size: u64,
    /// Chunk size the sender splits with.
    pub chunk_size: u32,
    /// Whole-file SHA-256, if the sender computed one.
    pub checksum: Option<Digest>,
}

/// One chunk of a file as carried on the wire.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChunkData {
    /// 0-based position of the chunk within the file.
    pub index: u32,
    /// Compressed or raw bytes, depending on `compressed`.
    pub payload: Vec<u8>,
    pub compressed: bool,
    /// Length of the raw chunk before compression.
    pub original_len: u64,
}

/// Every message of the protocol.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Message {
    Handshake { version: String },
    FileRequest { filename: String },
    FileInfo(FileInfo),
    ChunkData(ChunkData),
    ChunkAck { index: u32 },
    Error { code: ErrorCode, text: String },
    Complete,
}

impl Message {
    pub fn msg_type(&self) -> MessageType {
        match self {
            Message::Handshake { .. } => MessageType::Handshake,
            Message::FileRequest { .. } => MessageType::FileRequest,
            Message::FileInfo(_) => MessageType::FileInfo,
            Message::ChunkData(_) => MessageType::ChunkData,
            Message::ChunkAck { .. } => MessageType::ChunkAck,
            Message::Error { .. } => MessageType::Error,
            Message::Complete => MessageType::Complete,
        }
    }

    /// Creates an error message.
    pub fn error(code: ErrorCode, text: impl Into<String>) -> Self {
        Message::Error {
            code,
            text: text.into(),
        }
    }

    /// Serializes the message into its canonical frame.
    pub fn encode(&self) -> Vec<u8> {
        crate::codec::encode(self)
    }
}
