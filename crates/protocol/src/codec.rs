//! Binary frame codec.
//!
//! # Wire format
//!
//! All integers are big-endian. Each frame is a fixed header, optionally
//! followed by one variable-length tail whose length the header declares.
//!
//! ```text
//! Handshake:   [1: 0x01][4: version_len][version_len: UTF-8]
//! FileRequest: [1: 0x02][4: name_len][name_len: UTF-8]
//! FileInfo:    [1: 0x03][8: size][4: chunk_size][1: has_checksum]
//!              [32: checksum, zeroed when absent][4: name_len][name_len: UTF-8]
//! ChunkData:   [1: 0x04][4: index][4: payload_len][1: compressed]
//!              [8: original_len][payload_len: payload]
//! ChunkAck:    [1: 0x05][4: index]
//! Error:       [1: 0x06][1: code][4: text_len][text_len: UTF-8]
//! Complete:    [1: 0x07]
//! ```

use crate::constants::{DIGEST_LEN, Digest, ErrorCode, MessageType};
use crate::error::CodecError;
use crate::message::{ChunkData, FileInfo, Message};

/// Fixed layout of one frame type: header length and the offset of the
/// `u32` tail length inside the header, if the frame has a tail.
struct Layout {
    header_len: usize,
    tail_len_offset: Option<usize>,
}

fn layout(msg_type: MessageType) -> Layout {
    let (header_len, tail_len_offset) = match msg_type {
        MessageType::Handshake | MessageType::FileRequest => (5, Some(1)),
        MessageType::FileInfo => {
            let name_len_offset = 1 + 8 + 4 + 1 + DIGEST_LEN;
            (name_len_offset + 4, Some(name_len_offset))
        }
        MessageType::ChunkData => (1 + 4 + 4 + 1 + 8, Some(5)),
        MessageType::ChunkAck => (5, None),
        MessageType::Error => (6, Some(2)),
        MessageType::Complete => (1, None),
    };
    Layout {
        header_len,
        tail_len_offset,
    }
}

/// Returns the fixed header length (tag included) for a frame starting with `tag`.
pub fn header_len(tag: u8) -> Result<usize, CodecError> {
    let msg_type = MessageType::from_tag(tag).ok_or(CodecError::UnknownTag(tag))?;
    Ok(layout(msg_type).header_len)
}

/// Returns the total frame length declared by a complete fixed header.
///
/// `header` must hold at least [`header_len`] bytes; extra bytes are ignored.
pub fn frame_len(header: &[u8]) -> Result<usize, CodecError> {
    let tag = *header.first().ok_or(CodecError::Empty)?;
    let msg_type = MessageType::from_tag(tag).ok_or(CodecError::UnknownTag(tag))?;
    let layout = layout(msg_type);
    if header.len() < layout.header_len {
        return Err(CodecError::Truncated {
            msg_type,
            expected: layout.header_len,
            got: header.len(),
        });
    }
    let tail = match layout.tail_len_offset {
        Some(offset) => read_u32_at(header, offset) as usize,
        None => 0,
    };
    Ok(layout.header_len + tail)
}

fn read_u32_at(buf: &[u8], offset: usize) -> u32 {
    let mut raw = [0u8; 4];
    raw.copy_from_slice(&buf[offset..offset + 4]);
    u32::from_be_bytes(raw)
}

// ---------------------------------------------------------------------------
// Encoding
// ---------------------------------------------------------------------------

/// Encodes a message into its canonical frame.
pub fn encode(msg: &Message) -> Vec<u8> {
    let msg_type = msg.msg_type();
    let mut buf = Vec::with_capacity(layout(msg_type).header_len + tail_len(msg));
    buf.push(msg_type.tag());

    match msg {
        Message::Handshake { version } => put_str(&mut buf, version),
        Message::FileRequest { filename } => put_str(&mut buf, filename),
        Message::FileInfo(info) => {
            buf.extend_from_slice(&info.size.to_be_bytes());
            buf.extend_from_slice(&info.chunk_size.to_be_bytes());
            match &info.checksum {
                Some(digest) => {
                    buf.push(1);
                    buf.extend_from_slice(digest);
                }
                None => {
                    buf.push(0);
                    buf.extend_from_slice(&[0u8; DIGEST_LEN]);
                }
            }
            put_str(&mut buf, &info.filename);
        }
        Message::ChunkData(chunk) => {
            buf.extend_from_slice(&chunk.index.to_be_bytes());
            buf.extend_from_slice(&(chunk.payload.len() as u32).to_be_bytes());
            buf.push(u8::from(chunk.compressed));
            buf.extend_from_slice(&chunk.original_len.to_be_bytes());
            buf.extend_from_slice(&chunk.payload);
        }
        Message::ChunkAck { index } => buf.extend_from_slice(&index.to_be_bytes()),
        Message::Error { code, text } => {
            buf.push(code.as_u8());
            put_str(&mut buf, text);
        }
        Message::Complete => {}
    }
    buf
}

fn tail_len(msg: &Message) -> usize {
    match msg {
        Message::Handshake { version } => version.len(),
        Message::FileRequest { filename } => filename.len(),
        Message::FileInfo(info) => info.filename.len(),
        Message::ChunkData(chunk) => chunk.payload.len(),
        Message::Error { text, .. } => text.len(),
        Message::ChunkAck { .. } | Message::Complete => 0,
    }
}

fn put_str(buf: &mut Vec<u8>, s: &str) {
    buf.extend_from_slice(&(s.len() as u32).to_be_bytes());
    buf.extend_from_slice(s.as_bytes());
}

// ---------------------------------------------------------------------------
// Decoding
// ---------------------------------------------------------------------------

/// Decodes exactly one frame. Trailing bytes are an error.
pub fn decode(buf: &[u8]) -> Result<Message, CodecError> {
    let total = frame_len(buf)?;
    let msg_type = MessageType::from_tag(buf[0]).ok_or(CodecError::UnknownTag(buf[0]))?;
    let header = layout(msg_type).header_len;
    if total != buf.len() {
        return Err(CodecError::LengthMismatch {
            msg_type,
            declared: total - header,
            actual: buf.len() - header,
        });
    }

    let mut r = FieldReader::new(&buf[1..]);
    let msg = match msg_type {
        MessageType::Handshake => Message::Handshake {
            version: r.string("version")?,
        },
        MessageType::FileRequest => Message::FileRequest {
            filename: r.string("filename")?,
        },
        MessageType::FileInfo => {
            let size = r.u64();
            let chunk_size = r.u32();
            let has_checksum = r.flag("has_checksum")?;
            let mut digest: Digest = [0u8; DIGEST_LEN];
            digest.copy_from_slice(r.take(DIGEST_LEN));
            let checksum = if has_checksum {
                Some(digest)
            } else if digest.iter().any(|b| *b != 0) {
                return Err(CodecError::StrayChecksum);
            } else {
                None
            };
            Message::FileInfo(FileInfo {
                filename: r.string("filename")?,
                size,
                chunk_size,
                checksum,
            })
        }
        MessageType::ChunkData => {
            let index = r.u32();
            let payload_len = r.u32() as usize;
            let compressed = r.flag("compressed")?;
            let original_len = r.u64();
            Message::ChunkData(ChunkData {
                index,
                payload: r.take(payload_len).to_vec(),
                compressed,
                original_len,
            })
        }
        MessageType::ChunkAck => Message::ChunkAck { index: r.u32() },
        MessageType::Error => {
            let code = ErrorCode::from_u8(r.u8());
            Message::Error {
                code,
                text: r.string("text")?,
            }
        }
        MessageType::Complete => Message::Complete,
    };
    Ok(msg)
}

/// Sequential field reader over a buffer whose length was already validated
/// by [`frame_len`].
struct FieldReader<'a> {
    buf: &'a [u8],
    pos: usize,
}

impl<'a> FieldReader<'a> {
    fn new(buf: &'a [u8]) -> Self {
        Self { buf, pos: 0 }
    }

    fn take(&mut self, n: usize) -> &'a [u8] {
        let out = &self.buf[self.pos..self.pos + n];
        self.pos += n;
        out
    }

    fn u8(&mut self) -> u8 {
        self.take(1)[0]
    }

    fn u32(&mut self) -> u32 {
        let mut raw = [0u8; 4];
        raw.copy_from_slice(self.take(4));
        u32::from_be_bytes(raw)
    }

    fn u64(&mut self) -> u64 {
        let mut raw = [0u8; 8];
        raw.copy_from_slice(self.take(8));
        u64::from_be_bytes(raw)
    }

    fn flag(&mut self, field: &'static str) -> Result<bool, CodecError> {
        match self.u8() {
            0 => Ok(false),
            1 => Ok(true),
            value => Err(CodecError::InvalidFlag { field, value }),
        }
    }

    fn string(&mut self, field: &'static str) -> Result<String, CodecError> {
        let len = self.u32() as usize;
        String::from_utf8(self.take(len).to_vec()).map_err(|_| CodecError::InvalidUtf8 { field })
    }
}
