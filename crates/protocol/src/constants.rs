//! Closed sets of protocol constants: message tags, chunk sizes,
//! compression levels, error codes and the protocol version.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Protocol version spoken by this implementation.
pub const PROTOCOL_VERSION: ProtocolVersion = ProtocolVersion {
    major: 1,
    minor: 0,
    patch: 0,
};

/// Length of a SHA-256 digest in bytes.
pub const DIGEST_LEN: usize = 32;

/// A whole-file SHA-256 digest.
pub type Digest = [u8; DIGEST_LEN];

/// Message type tags, equal to the first byte of every frame.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u8)]
pub enum MessageType {
    Handshake = 0x01,
    FileRequest = 0x02,
    FileInfo = 0x03,
    ChunkData = 0x04,
    ChunkAck = 0x05,
    Error = 0x06,
    Complete = 0x07,
}

impl MessageType {
    /// Maps a wire tag back to its message type.
    pub fn from_tag(tag: u8) -> Option<Self> {
        match tag {
            0x01 => Some(Self::Handshake),
            0x02 => Some(Self::FileRequest),
            0x03 => Some(Self::FileInfo),
            0x04 => Some(Self::ChunkData),
            0x05 => Some(Self::ChunkAck),
            0x06 => Some(Self::Error),
            0x07 => Some(Self::Complete),
            _ => None,
        }
    }

    pub fn tag(self) -> u8 {
        self as u8
    }
}

impl fmt::Display for MessageType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Handshake => "handshake",
            Self::FileRequest => "file_request",
            Self::FileInfo => "file_info",
            Self::ChunkData => "chunk_data",
            Self::ChunkAck => "chunk_ack",
            Self::Error => "error",
            Self::Complete => "complete",
        };
        f.write_str(name)
    }
}

/// Allowed chunk sizes.
///
/// Smaller chunks suit slower links: a lost connection wastes less work and
/// each frame stays short.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChunkSize {
    /// 1 KiB, ultra-low bandwidth.
    Small,
    /// 4 KiB, low bandwidth.
    #[default]
    Medium,
    /// 16 KiB, normal bandwidth.
    Large,
    /// 64 KiB, high bandwidth.
    XLarge,
}

impl ChunkSize {
    pub const ALL: [ChunkSize; 4] = [Self::Small, Self::Medium, Self::Large, Self::XLarge];

    /// Size in bytes.
    pub const fn bytes(self) -> u32 {
        match self {
            Self::Small => 1024,
            Self::Medium => 4096,
            Self::Large => 16384,
            Self::XLarge => 65536,
        }
    }

    /// Returns the named size for an exact byte count.
    pub fn from_bytes(bytes: u32) -> Option<Self> {
        Self::ALL.into_iter().find(|s| s.bytes() == bytes)
    }
}

/// Compression levels applied to outgoing chunk payloads.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum CompressionLevel {
    /// Chunks are always sent raw.
    None,
    Low,
    #[default]
    Medium,
    High,
}

impl CompressionLevel {
    /// Numeric level handed to the compressor (0 means disabled).
    pub const fn level(self) -> i32 {
        match self {
            Self::None => 0,
            Self::Low => 1,
            Self::Medium => 6,
            Self::High => 9,
        }
    }

    pub const fn is_enabled(self) -> bool {
        !matches!(self, Self::None)
    }
}

/// Error codes carried by `Error` frames.
///
/// Unknown codes survive a decode/encode cycle through [`ErrorCode::Other`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ErrorCode {
    UnknownMessage,
    FileNotFound,
    StorageFailure,
    MalformedMessage,
    IntegrityFailure,
    IncompatibleVersion,
    UnexpectedMessage,
    InvalidFilename,
    Other(u8),
}

impl ErrorCode {
    pub fn from_u8(code: u8) -> Self {
        match code {
            1 => Self::UnknownMessage,
            2 => Self::FileNotFound,
            3 => Self::StorageFailure,
            4 => Self::MalformedMessage,
            5 => Self::IntegrityFailure,
            6 => Self::IncompatibleVersion,
            7 => Self::UnexpectedMessage,
            8 => Self::InvalidFilename,
            other => Self::Other(other),
        }
    }

    pub fn as_u8(self) -> u8 {
        match self {
            Self::UnknownMessage => 1,
            Self::FileNotFound => 2,
            Self::StorageFailure => 3,
            Self::MalformedMessage => 4,
            Self::IntegrityFailure => 5,
            Self::IncompatibleVersion => 6,
            Self::UnexpectedMessage => 7,
            Self::InvalidFilename => 8,
            Self::Other(code) => code,
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnknownMessage => f.write_str("unknown message"),
            Self::FileNotFound => f.write_str("file not found"),
            Self::StorageFailure => f.write_str("storage failure"),
            Self::MalformedMessage => f.write_str("malformed message"),
            Self::IntegrityFailure => f.write_str("integrity failure"),
            Self::IncompatibleVersion => f.write_str("incompatible version"),
            Self::UnexpectedMessage => f.write_str("unexpected message"),
            Self::InvalidFilename => f.write_str("invalid filename"),
            Self::Other(code) => write!(f, "error code {code}"),
        }
    }
}

/// Semantic protocol version exchanged in the handshake as `major.minor.patch`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct ProtocolVersion {
    pub major: u16,
    pub minor: u16,
    pub patch: u16,
}

impl ProtocolVersion {
    /// Parses `major.minor.patch`. Missing minor/patch components default to 0.
    pub fn parse(s: &str) -> Option<Self> {
        let mut parts = s.trim().split('.');
        let major = parts.next()?.parse().ok()?;
        let minor = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        let patch = match parts.next() {
            Some(p) => p.parse().ok()?,
            None => 0,
        };
        if parts.next().is_some() {
            return None;
        }
        Some(Self {
            major,
            minor,
            patch,
        })
    }

    /// Two versions interoperate when their major components are equal.
    pub fn is_compatible(&self, other: &ProtocolVersion) -> bool {
        self.major == other.major
    }
}

impl fmt::Display for ProtocolVersion {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}.{}.{}", self.major, self.minor, self.patch)
    }
}
