//! Error types for transfer sessions.

use std::fmt;

use trickle_protocol::{CodecError, ErrorCode, MessageType, ProtocolVersion};
use trickle_transfer::TransferError;

use crate::storage::StorageError;

/// Broad failure classes, used to pick the reaction to a failed session.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    /// Socket failure or timeout. Nothing is sent back.
    Connection,
    /// Malformed or out-of-state message, or an error reported by the peer.
    Protocol,
    /// File missing, name rejected or disk failure.
    Storage,
    /// Checksum or length mismatch in received data.
    Integrity,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Connection => "connection",
            Self::Protocol => "protocol",
            Self::Storage => "storage",
            Self::Integrity => "integrity",
        };
        f.write_str(name)
    }
}

/// Errors produced while running a session or client exchange.
#[derive(Debug, thiserror::Error)]
pub enum SessionError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("timed out waiting for the peer")]
    Timeout,

    #[error("connection closed by peer")]
    Closed,

    #[error("malformed message: {0}")]
    Codec(#[from] CodecError),

    #[error("frame of {len} bytes exceeds limit of {max}")]
    FrameTooLarge { len: usize, max: usize },

    #[error("expected {expected}, got {got}")]
    UnexpectedMessage {
        expected: &'static str,
        got: MessageType,
    },

    #[error("incompatible protocol version {theirs:?} (ours is {ours})")]
    IncompatibleVersion {
        ours: ProtocolVersion,
        theirs: String,
    },

    #[error("file of {size} bytes exceeds limit of {max}")]
    FileTooLarge { size: u64, max: u64 },

    #[error("protocol violation: {0}")]
    Protocol(String),

    #[error(transparent)]
    Storage(#[from] StorageError),

    #[error(transparent)]
    Transfer(#[from] TransferError),

    #[error("peer reported {code}: {text}")]
    Remote { code: ErrorCode, text: String },
}

impl SessionError {
    pub(crate) fn unexpected(expected: &'static str, got: MessageType) -> Self {
        Self::UnexpectedMessage { expected, got }
    }

    pub fn kind(&self) -> ErrorKind {
        match self {
            Self::Io(_) | Self::Timeout | Self::Closed => ErrorKind::Connection,
            Self::Codec(_)
            | Self::FrameTooLarge { .. }
            | Self::UnexpectedMessage { .. }
            | Self::IncompatibleVersion { .. }
            | Self::Protocol(_)
            | Self::Remote { .. } => ErrorKind::Protocol,
            Self::FileTooLarge { .. } | Self::Storage(_) => ErrorKind::Storage,
            Self::Transfer(e) if e.is_integrity() => ErrorKind::Integrity,
            Self::Transfer(TransferError::Io(_)) => ErrorKind::Storage,
            Self::Transfer(_) => ErrorKind::Protocol,
        }
    }

    /// Code to report to the peer, or `None` when no `Error` reply is sent:
    /// the connection is unusable, or the peer reported the error itself.
    pub fn wire_code(&self) -> Option<ErrorCode> {
        let code = match self {
            Self::Io(_) | Self::Timeout | Self::Closed | Self::Remote { .. } => return None,
            Self::Codec(e) => e.error_code(),
            Self::FrameTooLarge { .. } | Self::Protocol(_) => ErrorCode::MalformedMessage,
            Self::UnexpectedMessage { .. } => ErrorCode::UnexpectedMessage,
            Self::IncompatibleVersion { .. } => ErrorCode::IncompatibleVersion,
            Self::FileTooLarge { .. } => ErrorCode::StorageFailure,
            Self::Storage(StorageError::NotFound(_)) => ErrorCode::FileNotFound,
            Self::Storage(StorageError::InvalidFilename(_)) => ErrorCode::InvalidFilename,
            Self::Storage(StorageError::Io(_)) => ErrorCode::StorageFailure,
            Self::Transfer(e) if e.is_integrity() => ErrorCode::IntegrityFailure,
            Self::Transfer(TransferError::InvalidFilename(_)) => ErrorCode::InvalidFilename,
            Self::Transfer(TransferError::Io(_)) => ErrorCode::StorageFailure,
            Self::Transfer(_) => ErrorCode::MalformedMessage,
        };
        Some(code)
    }
}
