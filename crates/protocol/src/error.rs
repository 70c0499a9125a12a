//! Codec error types.

use crate::constants::{ErrorCode, MessageType};

/// A frame that could not be decoded. Every variant describes a malformed
/// message.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum CodecError {
    #[error("empty frame")]
    Empty,

    #[error("unknown message tag 0x{0:02x}")]
    UnknownTag(u8),

    #[error("{msg_type} frame truncated: header needs {expected} bytes, got {got}")]
    Truncated {
        msg_type: MessageType,
        expected: usize,
        got: usize,
    },

    #[error("{msg_type} frame declares {declared} tail bytes but {actual} follow the header")]
    LengthMismatch {
        msg_type: MessageType,
        declared: usize,
        actual: usize,
    },

    #[error("{field} is not valid UTF-8")]
    InvalidUtf8 { field: &'static str },

    #[error("invalid {field} flag: {value}")]
    InvalidFlag { field: &'static str, value: u8 },

    #[error("checksum bytes present without has_checksum flag")]
    StrayChecksum,
}

impl CodecError {
    /// Wire error code reported to the peer for this failure.
    pub fn error_code(&self) -> ErrorCode {
        match self {
            CodecError::UnknownTag(_) => ErrorCode::UnknownMessage,
            _ => ErrorCode::MalformedMessage,
        }
    }
}
