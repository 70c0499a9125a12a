//! Transfer sessions over a byte stream.
//!
//! A [`Session`] drives one server-side connection from handshake to a
//! terminal state: it either serves a download or receives an upload.
//! [`Client`] is the matching peer. Both exchange frames through [`wire`]
//! and keep file bytes behind the [`Storage`] trait.

pub mod client;
pub mod error;
pub mod session;
pub mod storage;
pub mod wire;

pub use client::Client;
pub use error::{ErrorKind, SessionError};
pub use session::{Direction, Session, SessionConfig, SessionState, TransferSummary};
pub use storage::{DirStorage, Storage, StorageError};

use std::time::Duration;

/// Buffer size for session streams (64 KiB, one max-size chunk).
pub const STREAM_BUFFER_SIZE: usize = 64 * 1024;

/// Timeout for the next expected message.
pub const DEFAULT_READ_TIMEOUT: Duration = Duration::from_secs(30);

/// Timeout for the client's TCP connection attempt.
pub const CONNECT_TIMEOUT: Duration = Duration::from_secs(10);

/// Largest frame accepted from a peer: the biggest chunk plus headroom for
/// headers and long strings.
pub const MAX_FRAME_LEN: usize = 128 * 1024;

/// Default cap on the size of an uploaded or downloaded file (1 GiB).
pub const DEFAULT_MAX_FILE_SIZE: u64 = 1 << 30;
