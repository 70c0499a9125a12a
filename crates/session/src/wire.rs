//! Message framing over a byte stream.
//!
//! Frames are self-delimiting: the tag fixes the header length and the
//! header declares the tail length (see [`trickle_protocol::codec`]). A
//! reader therefore pulls the tag, then the rest of the header, then the
//! tail, and hands the complete frame to the codec.

use std::io;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncReadExt, AsyncWrite, AsyncWriteExt};
use trickle_protocol::{Message, decode, frame_len, header_len};

use crate::MAX_FRAME_LEN;
use crate::error::SessionError;

/// Reads one complete message.
///
/// A clean end of stream before the first byte is [`SessionError::Closed`].
pub async fn read_message<R: AsyncRead + Unpin>(reader: &mut R) -> Result<Message, SessionError> {
    let tag = match reader.read_u8().await {
        Ok(tag) => tag,
        Err(e) if e.kind() == io::ErrorKind::UnexpectedEof => return Err(SessionError::Closed),
        Err(e) => return Err(e.into()),
    };

    let header_len = header_len(tag)?;
    let mut frame = vec![0u8; header_len];
    frame[0] = tag;
    reader.read_exact(&mut frame[1..]).await?;

    let total = frame_len(&frame)?;
    if total > MAX_FRAME_LEN {
        return Err(SessionError::FrameTooLarge {
            len: total,
            max: MAX_FRAME_LEN,
        });
    }

    frame.resize(total, 0);
    reader.read_exact(&mut frame[header_len..]).await?;
    Ok(decode(&frame)?)
}

/// Writes one message and flushes it.
pub async fn write_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &Message,
) -> Result<(), SessionError> {
    writer.write_all(&msg.encode()).await?;
    writer.flush().await?;
    Ok(())
}

/// Writes one message within `timeout`.
///
/// A peer that stops reading eventually fills the socket buffer; the write
/// then fails with [`SessionError::Timeout`] instead of blocking forever.
pub async fn send_message<W: AsyncWrite + Unpin>(
    writer: &mut W,
    msg: &Message,
    timeout: Duration,
) -> Result<(), SessionError> {
    tokio::time::timeout(timeout, write_message(writer, msg))
        .await
        .map_err(|_| SessionError::Timeout)?
}

/// Reads the next message within `timeout`.
///
/// An `Error` frame from the peer is surfaced as [`SessionError::Remote`].
pub async fn recv_message<R: AsyncRead + Unpin>(
    reader: &mut R,
    timeout: Duration,
) -> Result<Message, SessionError> {
    let msg = tokio::time::timeout(timeout, read_message(reader))
        .await
        .map_err(|_| SessionError::Timeout)??;
    match msg {
        Message::Error { code, text } => Err(SessionError::Remote { code, text }),
        msg => Ok(msg),
    }
}
