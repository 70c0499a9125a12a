//! Client side of a transfer.
//!
//! A client connects, handshakes, then performs exactly one download or
//! upload, matching the single exchange a server session serves.

use tokio::io::{AsyncRead, AsyncWrite, BufStream};
use tokio::net::{TcpStream, ToSocketAddrs};
use tracing::{debug, info};
use trickle_protocol::{Message, PROTOCOL_VERSION, ProtocolVersion};
use trickle_transfer::{
    ChunkAssembler, FileMetadata, TransferError, decode_chunk, encode_chunk, split,
    validate_filename, verify_data,
};

use crate::error::SessionError;
use crate::session::SessionConfig;
use crate::wire::{recv_message, send_message};
use crate::{CONNECT_TIMEOUT, STREAM_BUFFER_SIZE};

/// A handshaken connection to a Trickle server.
pub struct Client<S = TcpStream> {
    stream: BufStream<S>,
    config: SessionConfig,
    server_version: ProtocolVersion,
}

impl Client<TcpStream> {
    /// Connects to `addr` and performs the handshake.
    pub async fn connect<A: ToSocketAddrs>(
        addr: A,
        config: SessionConfig,
    ) -> Result<Self, SessionError> {
        let stream = tokio::time::timeout(CONNECT_TIMEOUT, TcpStream::connect(addr))
            .await
            .map_err(|_| SessionError::Timeout)??;
        stream.set_nodelay(true)?;
        if let Ok(peer) = stream.peer_addr() {
            debug!(%peer, "connected");
        }
        Self::handshake(stream, config).await
    }
}

impl<S> Client<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    /// Performs the handshake over an already established stream.
    pub async fn handshake(stream: S, config: SessionConfig) -> Result<Self, SessionError> {
        let mut stream = BufStream::with_capacity(STREAM_BUFFER_SIZE, STREAM_BUFFER_SIZE, stream);
        send_message(
            &mut stream,
            &Message::Handshake {
                version: PROTOCOL_VERSION.to_string(),
            },
            config.read_timeout,
        )
        .await?;

        let version = match recv_message(&mut stream, config.read_timeout).await? {
            Message::Handshake { version } => version,
            other => return Err(SessionError::unexpected("handshake", other.msg_type())),
        };
        let server_version = ProtocolVersion::parse(&version)
            .filter(|v| PROTOCOL_VERSION.is_compatible(v))
            .ok_or(SessionError::IncompatibleVersion {
                ours: PROTOCOL_VERSION,
                theirs: version,
            })?;

        Ok(Self {
            stream,
            config,
            server_version,
        })
    }

    pub fn server_version(&self) -> ProtocolVersion {
        self.server_version
    }

    /// Downloads `filename` and returns its verified contents.
    ///
    /// The bytes are returned only after every chunk arrived, the size
    /// matches the announcement and the announced digest verifies.
    pub async fn download(mut self, filename: &str) -> Result<Vec<u8>, SessionError> {
        validate_filename(filename)?;
        let timeout = self.config.read_timeout;
        send_message(
            &mut self.stream,
            &Message::FileRequest {
                filename: filename.to_string(),
            },
            timeout,
        )
        .await?;

        let info = match recv_message(&mut self.stream, timeout).await? {
            Message::FileInfo(info) => info,
            other => return Err(SessionError::unexpected("file_info", other.msg_type())),
        };
        let (meta, chunk_size) = FileMetadata::from_file_info(&info)?;
        if meta.filename != filename {
            return Err(SessionError::Protocol(format!(
                "requested {filename:?}, server announced {:?}",
                meta.filename
            )));
        }
        if meta.size > self.config.max_file_size {
            return Err(SessionError::FileTooLarge {
                size: meta.size,
                max: self.config.max_file_size,
            });
        }

        let expected_chunks = meta.chunk_count(chunk_size);
        let mut assembler = ChunkAssembler::new();
        loop {
            match recv_message(&mut self.stream, timeout).await? {
                Message::ChunkData(chunk) => {
                    if u64::from(chunk.index) >= expected_chunks {
                        return Err(TransferError::InvalidChunk {
                            index: chunk.index,
                            reason: format!("file has {expected_chunks} chunks"),
                        }
                        .into());
                    }
                    let raw = decode_chunk(&chunk, chunk_size.bytes() as usize)?;
                    assembler.insert(chunk.index, raw);
                }
                Message::Complete => break,
                other => {
                    return Err(SessionError::unexpected(
                        "chunk_data or complete",
                        other.msg_type(),
                    ));
                }
            }
        }

        let data = assembler.reassemble()?;
        if data.len() as u64 != meta.size {
            return Err(TransferError::SizeMismatch {
                expected: meta.size,
                actual: data.len() as u64,
            }
            .into());
        }
        if let Some(expected) = &meta.checksum {
            verify_data(expected, &data)?;
        }
        info!(filename, bytes = data.len(), "download verified");
        Ok(data)
    }

    /// Uploads `data` as `filename`.
    ///
    /// Chunks are written while acknowledgements are drained concurrently,
    /// so neither direction can stall on a full socket buffer. Returns the
    /// metadata the server accepted.
    pub async fn upload(self, filename: &str, data: &[u8]) -> Result<FileMetadata, SessionError> {
        let meta = FileMetadata::from_bytes(filename, data)?;
        let chunk_size = self.config.chunk_size;
        let compression = self.config.compression;
        let timeout = self.config.read_timeout;
        let expected_chunks = meta.chunk_count(chunk_size);
        let (mut reader, mut writer) = tokio::io::split(self.stream);

        let send = async {
            let info = Message::FileInfo(meta.to_file_info(chunk_size));
            send_message(&mut writer, &info, timeout).await?;
            for (index, raw) in (0u32..).zip(split(data, chunk_size.bytes() as usize)) {
                let chunk = encode_chunk(index, raw, compression);
                send_message(&mut writer, &Message::ChunkData(chunk), timeout).await?;
            }
            send_message(&mut writer, &Message::Complete, timeout).await
        };

        let drain = async {
            let mut acked = 0u64;
            loop {
                match recv_message(&mut reader, timeout).await? {
                    Message::ChunkAck { .. } => acked += 1,
                    Message::Complete => return Ok::<_, SessionError>(acked),
                    other => {
                        return Err(SessionError::unexpected(
                            "chunk_ack or complete",
                            other.msg_type(),
                        ));
                    }
                }
            }
        };

        let (sent, drained) = tokio::join!(send, drain);
        let acked = match (sent, drained) {
            // The server's own report explains a broken pipe on our side.
            (_, Err(e @ SessionError::Remote { .. })) => return Err(e),
            (Err(e), _) | (Ok(()), Err(e)) => return Err(e),
            (Ok(()), Ok(acked)) => acked,
        };
        if acked != expected_chunks {
            return Err(SessionError::Protocol(format!(
                "server acknowledged {acked} of {expected_chunks} chunks"
            )));
        }

        info!(filename, bytes = meta.size, chunks = acked, "upload accepted");
        Ok(meta)
    }
}
