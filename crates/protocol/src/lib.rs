//! Wire protocol for Trickle client-server file transfers.
//!
//! Pure translation between [`Message`] values and byte frames; no I/O and
//! no state. See [`codec`] for the frame layout.

pub mod codec;
pub mod constants;
mod error;
mod message;

pub use codec::{decode, encode, frame_len, header_len};
pub use constants::{
    ChunkSize, CompressionLevel, DIGEST_LEN, Digest, ErrorCode, MessageType, PROTOCOL_VERSION,
    ProtocolVersion,
};
pub use error::CodecError;
pub use message::{ChunkData, FileInfo, Message};
