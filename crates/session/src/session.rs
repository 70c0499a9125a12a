//! Server side of one connection.
//!
//! ```text
//! Init --Handshake--> Handshaken --FileRequest--> ServingDownload --> Complete
//!                                \--FileInfo----> ReceivingUpload --> Complete
//! any state --error--> Failed
//! ```

use std::fmt;
use std::sync::Arc;
use std::time::Duration;

use tokio::io::{AsyncRead, AsyncWrite, BufStream};
use tracing::{debug, info, trace, warn};
use trickle_protocol::{
    ChunkSize, CompressionLevel, FileInfo, Message, PROTOCOL_VERSION, ProtocolVersion,
};
use trickle_transfer::{
    ChunkAssembler, FileMetadata, TransferError, decode_chunk, encode_chunk, split, verify_data,
};

use crate::error::SessionError;
use crate::storage::Storage;
use crate::wire::{recv_message, send_message};
use crate::{DEFAULT_MAX_FILE_SIZE, DEFAULT_READ_TIMEOUT, STREAM_BUFFER_SIZE};

/// Lifecycle of a session. `Complete` and `Failed` are terminal.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SessionState {
    Init,
    Handshaken,
    ServingDownload,
    ReceivingUpload,
    Complete,
    Failed,
}

impl SessionState {
    pub fn is_terminal(self) -> bool {
        matches!(self, Self::Complete | Self::Failed)
    }
}

impl fmt::Display for SessionState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            Self::Init => "init",
            Self::Handshaken => "handshaken",
            Self::ServingDownload => "serving_download",
            Self::ReceivingUpload => "receiving_upload",
            Self::Complete => "complete",
            Self::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Per-session knobs, shared by the server session and the client.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    /// Chunk size used when this side sends a file.
    pub chunk_size: ChunkSize,
    /// Compression applied to chunks this side sends.
    pub compression: CompressionLevel,
    /// Timeout for each expected message.
    pub read_timeout: Duration,
    /// Largest file accepted from the peer.
    pub max_file_size: u64,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            chunk_size: ChunkSize::default(),
            compression: CompressionLevel::default(),
            read_timeout: DEFAULT_READ_TIMEOUT,
            max_file_size: DEFAULT_MAX_FILE_SIZE,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
}

impl fmt::Display for Direction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::Download => f.write_str("download"),
            Self::Upload => f.write_str("upload"),
        }
    }
}

/// What a completed session transferred.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TransferSummary {
    pub direction: Direction,
    pub filename: String,
    pub bytes: u64,
    pub chunks: u64,
}

/// One server-side session, exclusively owning its stream.
pub struct Session<S> {
    stream: BufStream<S>,
    storage: Arc<dyn Storage>,
    config: SessionConfig,
    state: SessionState,
}

impl<S> Session<S>
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    pub fn new(stream: S, storage: Arc<dyn Storage>, config: SessionConfig) -> Self {
        Self {
            stream: BufStream::with_capacity(STREAM_BUFFER_SIZE, STREAM_BUFFER_SIZE, stream),
            storage,
            config,
            state: SessionState::Init,
        }
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    /// Drives the session to a terminal state.
    ///
    /// On failure the peer receives an `Error` frame whenever the error has
    /// a wire code and the stream is still writable.
    pub async fn run(&mut self) -> Result<TransferSummary, SessionError> {
        let result = self.drive().await;
        match &result {
            Ok(summary) => {
                self.state = SessionState::Complete;
                info!(
                    direction = %summary.direction,
                    filename = %summary.filename,
                    bytes = summary.bytes,
                    chunks = summary.chunks,
                    "session complete"
                );
            }
            Err(e) => self.fail(e).await,
        }
        result
    }

    async fn fail(&mut self, err: &SessionError) {
        let state = self.state;
        self.state = SessionState::Failed;
        warn!(%state, kind = %err.kind(), error = %err, "session failed");

        if let Some(code) = err.wire_code() {
            let reply = Message::error(code, err.to_string());
            let timeout = self.config.read_timeout;
            if let Err(e) = send_message(&mut self.stream, &reply, timeout).await {
                debug!(error = %e, "could not deliver error reply");
            }
        }
    }

    async fn drive(&mut self) -> Result<TransferSummary, SessionError> {
        self.handshake().await?;

        match self.recv().await? {
            Message::FileRequest { filename } => self.serve_download(filename).await,
            Message::FileInfo(info) => self.receive_upload(info).await,
            other => Err(SessionError::unexpected(
                "file_request or file_info",
                other.msg_type(),
            )),
        }
    }

    async fn recv(&mut self) -> Result<Message, SessionError> {
        recv_message(&mut self.stream, self.config.read_timeout).await
    }

    async fn send(&mut self, msg: &Message) -> Result<(), SessionError> {
        send_message(&mut self.stream, msg, self.config.read_timeout).await
    }

    async fn handshake(&mut self) -> Result<(), SessionError> {
        let version = match self.recv().await? {
            Message::Handshake { version } => version,
            other => return Err(SessionError::unexpected("handshake", other.msg_type())),
        };

        let compatible = ProtocolVersion::parse(&version)
            .is_some_and(|theirs| PROTOCOL_VERSION.is_compatible(&theirs));
        if !compatible {
            return Err(SessionError::IncompatibleVersion {
                ours: PROTOCOL_VERSION,
                theirs: version,
            });
        }

        self.send(&Message::Handshake {
            version: PROTOCOL_VERSION.to_string(),
        })
        .await?;
        self.state = SessionState::Handshaken;
        debug!(peer_version = %version, "handshake complete");
        Ok(())
    }

    async fn serve_download(&mut self, filename: String) -> Result<TransferSummary, SessionError> {
        self.state = SessionState::ServingDownload;
        info!(%filename, "download requested");

        let data = self.storage.read_file(&filename).await?;
        let meta = FileMetadata::from_bytes(filename, &data)?;
        let chunk_size = self.config.chunk_size;
        let compression = self.config.compression;

        self.send(&Message::FileInfo(meta.to_file_info(chunk_size)))
            .await?;

        let mut chunks = 0u64;
        for (index, raw) in (0u32..).zip(split(&data, chunk_size.bytes() as usize)) {
            let chunk = encode_chunk(index, raw, compression);
            trace!(
                index,
                bytes = chunk.payload.len(),
                compressed = chunk.compressed,
                "sending chunk"
            );
            self.send(&Message::ChunkData(chunk)).await?;
            chunks += 1;
        }
        self.send(&Message::Complete).await?;

        Ok(TransferSummary {
            direction: Direction::Download,
            filename: meta.filename,
            bytes: meta.size,
            chunks,
        })
    }

    async fn receive_upload(&mut self, info: FileInfo) -> Result<TransferSummary, SessionError> {
        self.state = SessionState::ReceivingUpload;
        let (meta, chunk_size) = FileMetadata::from_file_info(&info)?;
        info!(filename = %meta.filename, size = meta.size, "upload announced");

        if meta.size > self.config.max_file_size {
            return Err(SessionError::FileTooLarge {
                size: meta.size,
                max: self.config.max_file_size,
            });
        }

        let expected_chunks = meta.chunk_count(chunk_size);
        let max_chunk_len = chunk_size.bytes() as usize;
        let mut assembler = ChunkAssembler::new();

        loop {
            match self.recv().await? {
                Message::ChunkData(chunk) => {
                    if u64::from(chunk.index) >= expected_chunks {
                        return Err(TransferError::InvalidChunk {
                            index: chunk.index,
                            reason: format!("file has {expected_chunks} chunks"),
                        }
                        .into());
                    }
                    let raw = decode_chunk(&chunk, max_chunk_len)?;
                    trace!(index = chunk.index, bytes = raw.len(), "chunk received");
                    assembler.insert(chunk.index, raw);
                    self.send(&Message::ChunkAck { index: chunk.index })
                        .await?;
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

        let chunks = assembler.len() as u64;
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

        self.storage.write_file(&meta.filename, &data).await?;
        self.send(&Message::Complete).await?;

        Ok(TransferSummary {
            direction: Direction::Upload,
            filename: meta.filename,
            bytes: meta.size,
            chunks,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::DuplexStream;
    use trickle_protocol::{ChunkData, ErrorCode, MessageType};
    use trickle_transfer::{checksum, reassemble};

    use crate::storage::DirStorage;
    use crate::wire::{read_message, write_message};

    struct Harness {
        peer: DuplexStream,
        session: tokio::task::JoinHandle<(Result<TransferSummary, SessionError>, SessionState)>,
        _dir: tempfile::TempDir,
        root: std::path::PathBuf,
    }

    async fn start(config: SessionConfig) -> Harness {
        start_with_buffer(config, 256 * 1024).await
    }

    async fn start_with_buffer(config: SessionConfig, buffer: usize) -> Harness {
        let dir = tempfile::tempdir().unwrap();
        let root = dir.path().to_path_buf();
        let storage = Arc::new(DirStorage::open(&root).await.unwrap());
        let (peer, server_side) = tokio::io::duplex(buffer);
        let session = tokio::spawn(async move {
            let mut session = Session::new(server_side, storage, config);
            let result = session.run().await;
            (result, session.state())
        });
        Harness {
            peer,
            session,
            _dir: dir,
            root,
        }
    }

    async fn send(peer: &mut DuplexStream, msg: Message) {
        write_message(peer, &msg).await.unwrap();
    }

    async fn recv(peer: &mut DuplexStream) -> Message {
        read_message(peer).await.unwrap()
    }

    async fn handshake(peer: &mut DuplexStream) {
        send(peer, Message::Handshake { version: "1.0.0".into() }).await;
        assert_eq!(
            recv(peer).await,
            Message::Handshake {
                version: PROTOCOL_VERSION.to_string()
            }
        );
    }

    fn sample(len: usize) -> Vec<u8> {
        (0..len).map(|i| (i * 7 % 256) as u8).collect()
    }

    #[tokio::test]
    async fn download_streams_info_chunks_then_complete() {
        let config = SessionConfig {
            compression: CompressionLevel::None,
            ..SessionConfig::default()
        };
        let mut h = start(config).await;
        let data = sample(10_000);
        std::fs::write(h.root.join("data.bin"), &data).unwrap();

        handshake(&mut h.peer).await;
        send(&mut h.peer, Message::FileRequest { filename: "data.bin".into() }).await;

        let Message::FileInfo(info) = recv(&mut h.peer).await else {
            panic!("expected file info");
        };
        assert_eq!(info.size, 10_000);
        assert_eq!(info.chunk_size, 4096);
        assert_eq!(info.checksum, Some(checksum(&data)));

        let mut chunks = Vec::new();
        loop {
            match recv(&mut h.peer).await {
                Message::ChunkData(c) => chunks.push(c),
                Message::Complete => break,
                other => panic!("unexpected {other:?}"),
            }
        }
        let indices: Vec<u32> = chunks.iter().map(|c| c.index).collect();
        assert_eq!(indices, vec![0, 1, 2]);
        let lens: Vec<usize> = chunks.iter().map(|c| c.payload.len()).collect();
        assert_eq!(lens, vec![4096, 4096, 1808]);
        let rebuilt = reassemble(chunks.into_iter().map(|c| (c.index, c.payload))).unwrap();
        assert_eq!(rebuilt, data);

        let (result, state) = h.session.await.unwrap();
        let summary = result.unwrap();
        assert_eq!(summary.direction, Direction::Download);
        assert_eq!(summary.chunks, 3);
        assert_eq!(state, SessionState::Complete);
    }

    #[tokio::test]
    async fn download_missing_file_reports_not_found() {
        let mut h = start(SessionConfig::default()).await;
        handshake(&mut h.peer).await;
        send(&mut h.peer, Message::FileRequest { filename: "ghost.txt".into() }).await;

        match recv(&mut h.peer).await {
            Message::Error { code, .. } => assert_eq!(code, ErrorCode::FileNotFound),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(matches!(read_message(&mut h.peer).await, Err(SessionError::Closed)));

        let (result, state) = h.session.await.unwrap();
        assert!(matches!(result, Err(SessionError::Storage(_))));
        assert_eq!(state, SessionState::Failed);
    }

    #[tokio::test]
    async fn download_traversal_reports_invalid_filename() {
        let mut h = start(SessionConfig::default()).await;
        handshake(&mut h.peer).await;
        send(&mut h.peer, Message::FileRequest { filename: "../etc/passwd".into() }).await;

        match recv(&mut h.peer).await {
            Message::Error { code, .. } => assert_eq!(code, ErrorCode::InvalidFilename),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn incompatible_version_fails_before_request() {
        let mut h = start(SessionConfig::default()).await;
        send(&mut h.peer, Message::Handshake { version: "2.0.0".into() }).await;

        match recv(&mut h.peer).await {
            Message::Error { code, .. } => assert_eq!(code, ErrorCode::IncompatibleVersion),
            other => panic!("expected error, got {other:?}"),
        }
        let (result, state) = h.session.await.unwrap();
        assert!(matches!(result, Err(SessionError::IncompatibleVersion { .. })));
        assert_eq!(state, SessionState::Failed);
    }

    #[tokio::test]
    async fn request_before_handshake_is_unexpected() {
        let mut h = start(SessionConfig::default()).await;
        send(&mut h.peer, Message::FileRequest { filename: "a.txt".into() }).await;

        match recv(&mut h.peer).await {
            Message::Error { code, .. } => assert_eq!(code, ErrorCode::UnexpectedMessage),
            other => panic!("expected error, got {other:?}"),
        }
        let (_, state) = h.session.await.unwrap();
        assert_eq!(state, SessionState::Failed);
    }

    #[tokio::test]
    async fn chunk_without_file_info_is_unexpected() {
        let mut h = start(SessionConfig::default()).await;
        handshake(&mut h.peer).await;
        send(
            &mut h.peer,
            Message::ChunkData(ChunkData {
                index: 0,
                payload: b"x".to_vec(),
                compressed: false,
                original_len: 1,
            }),
        )
        .await;

        match recv(&mut h.peer).await {
            Message::Error { code, .. } => assert_eq!(code, ErrorCode::UnexpectedMessage),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn unknown_tag_reports_unknown_message() {
        let mut h = start(SessionConfig::default()).await;
        tokio::io::AsyncWriteExt::write_all(&mut h.peer, &[0x99, 0, 0])
            .await
            .unwrap();

        match recv(&mut h.peer).await {
            Message::Error { code, .. } => assert_eq!(code, ErrorCode::UnknownMessage),
            other => panic!("expected error, got {other:?}"),
        }
    }

    async fn upload_chunks(
        peer: &mut DuplexStream,
        name: &str,
        data: &[u8],
        chunks: Vec<ChunkData>,
    ) {
        send(
            peer,
            Message::FileInfo(FileInfo {
                filename: name.into(),
                size: data.len() as u64,
                chunk_size: 4096,
                checksum: Some(checksum(data)),
            }),
        )
        .await;
        for chunk in chunks {
            send(peer, Message::ChunkData(chunk)).await;
        }
    }

    #[tokio::test]
    async fn upload_out_of_order_with_duplicate_is_stored() {
        let mut h = start(SessionConfig::default()).await;
        let data = sample(10_000);
        let mut chunks: Vec<ChunkData> = (0u32..)
            .zip(split(&data, 4096))
            .map(|(i, raw)| encode_chunk(i, raw, CompressionLevel::Low))
            .collect();
        chunks.swap(0, 2);
        chunks.push(chunks[1].clone());

        handshake(&mut h.peer).await;
        upload_chunks(&mut h.peer, "up.bin", &data, chunks).await;

        let mut acks = Vec::new();
        for _ in 0..4 {
            match recv(&mut h.peer).await {
                Message::ChunkAck { index } => acks.push(index),
                other => panic!("expected ack, got {other:?}"),
            }
        }
        assert_eq!(acks, vec![2, 1, 0, 1]);

        send(&mut h.peer, Message::Complete).await;
        assert_eq!(recv(&mut h.peer).await, Message::Complete);

        let (result, state) = h.session.await.unwrap();
        let summary = result.unwrap();
        assert_eq!(summary.direction, Direction::Upload);
        assert_eq!(summary.bytes, 10_000);
        assert_eq!(summary.chunks, 3);
        assert_eq!(state, SessionState::Complete);
        assert_eq!(std::fs::read(h.root.join("up.bin")).unwrap(), data);
    }

    #[tokio::test]
    async fn upload_with_corrupted_chunk_is_not_persisted() {
        let mut h = start(SessionConfig::default()).await;
        let data = sample(10_000);
        let mut chunks: Vec<ChunkData> = (0u32..)
            .zip(split(&data, 4096))
            .map(|(i, raw)| encode_chunk(i, raw, CompressionLevel::None))
            .collect();
        chunks[1].payload[10] ^= 0xFF;

        handshake(&mut h.peer).await;
        upload_chunks(&mut h.peer, "bad.bin", &data, chunks).await;
        for _ in 0..3 {
            assert!(matches!(recv(&mut h.peer).await, Message::ChunkAck { .. }));
        }
        send(&mut h.peer, Message::Complete).await;

        match recv(&mut h.peer).await {
            Message::Error { code, .. } => assert_eq!(code, ErrorCode::IntegrityFailure),
            other => panic!("expected error, got {other:?}"),
        }
        let (result, state) = h.session.await.unwrap();
        assert_eq!(result.unwrap_err().kind(), crate::ErrorKind::Integrity);
        assert_eq!(state, SessionState::Failed);
        assert!(!h.root.join("bad.bin").exists());
    }

    #[tokio::test]
    async fn upload_with_missing_chunk_fails_integrity() {
        let mut h = start(SessionConfig::default()).await;
        let data = sample(10_000);
        let chunks: Vec<ChunkData> = (0u32..)
            .zip(split(&data, 4096))
            .filter(|(i, _)| *i != 1)
            .map(|(i, raw)| encode_chunk(i, raw, CompressionLevel::None))
            .collect();

        handshake(&mut h.peer).await;
        upload_chunks(&mut h.peer, "gap.bin", &data, chunks).await;
        for _ in 0..2 {
            assert!(matches!(recv(&mut h.peer).await, Message::ChunkAck { .. }));
        }
        send(&mut h.peer, Message::Complete).await;

        match recv(&mut h.peer).await {
            Message::Error { code, .. } => assert_eq!(code, ErrorCode::IntegrityFailure),
            other => panic!("expected error, got {other:?}"),
        }
        assert!(!h.root.join("gap.bin").exists());
    }

    #[tokio::test]
    async fn upload_chunk_beyond_announced_size_is_rejected() {
        let mut h = start(SessionConfig::default()).await;
        let data = sample(100);
        let chunks = vec![encode_chunk(5, &data, CompressionLevel::None)];

        handshake(&mut h.peer).await;
        upload_chunks(&mut h.peer, "small.bin", &data, chunks).await;

        match recv(&mut h.peer).await {
            Message::Error { code, .. } => assert_eq!(code, ErrorCode::MalformedMessage),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn upload_over_limit_is_refused() {
        let config = SessionConfig {
            max_file_size: 1024,
            ..SessionConfig::default()
        };
        let mut h = start(config).await;
        handshake(&mut h.peer).await;
        upload_chunks(&mut h.peer, "huge.bin", &sample(2048), Vec::new()).await;

        match recv(&mut h.peer).await {
            Message::Error { code, .. } => assert_eq!(code, ErrorCode::StorageFailure),
            other => panic!("expected error, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn empty_upload_is_stored() {
        let mut h = start(SessionConfig::default()).await;
        handshake(&mut h.peer).await;
        upload_chunks(&mut h.peer, "empty.txt", b"", Vec::new()).await;
        send(&mut h.peer, Message::Complete).await;
        assert_eq!(recv(&mut h.peer).await, Message::Complete);
        assert_eq!(std::fs::read(h.root.join("empty.txt")).unwrap(), b"");
    }

    #[tokio::test]
    async fn peer_error_fails_without_reply() {
        let mut h = start(SessionConfig::default()).await;
        handshake(&mut h.peer).await;
        send(&mut h.peer, Message::error(ErrorCode::Other(99), "client gave up")).await;

        assert!(matches!(read_message(&mut h.peer).await, Err(SessionError::Closed)));
        let (result, state) = h.session.await.unwrap();
        assert!(matches!(result, Err(SessionError::Remote { .. })));
        assert_eq!(state, SessionState::Failed);
    }

    #[tokio::test(start_paused = true)]
    async fn silent_peer_times_out() {
        let h = start(SessionConfig::default()).await;
        let (result, state) = h.session.await.unwrap();
        assert!(matches!(result, Err(SessionError::Timeout)));
        assert_eq!(state, SessionState::Failed);
        drop(h.peer);
    }

    #[tokio::test(start_paused = true)]
    async fn stalled_reader_times_out_download() {
        let config = SessionConfig {
            compression: CompressionLevel::None,
            ..SessionConfig::default()
        };
        let read_timeout = config.read_timeout;
        let mut h = start_with_buffer(config, 4096).await;
        std::fs::write(h.root.join("big.bin"), sample(512 * 1024)).unwrap();

        handshake(&mut h.peer).await;
        send(&mut h.peer, Message::FileRequest { filename: "big.bin".into() }).await;
        let started = tokio::time::Instant::now();

        // The peer stays connected but never reads again.
        let (result, state) = h.session.await.unwrap();
        assert!(matches!(result, Err(SessionError::Timeout)));
        assert_eq!(state, SessionState::Failed);
        assert!(started.elapsed() >= read_timeout);
        drop(h.peer);
    }

    #[test]
    fn terminal_states() {
        assert!(SessionState::Complete.is_terminal());
        assert!(SessionState::Failed.is_terminal());
        assert!(!SessionState::ReceivingUpload.is_terminal());
        assert_eq!(MessageType::ChunkAck.to_string(), "chunk_ack");
    }
}
