//! Accept loop and per-connection session tasks.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

use tokio::io::{AsyncRead, AsyncWrite};
use tokio::net::{TcpListener, TcpStream, ToSocketAddrs};
use tokio::sync::Mutex;
use tokio_util::sync::CancellationToken;
use tokio_util::task::TaskTracker;
use tracing::Instrument;
use trickle_session::{DirStorage, ErrorKind, Session, SessionConfig, SessionState, Storage};

use crate::table::{ConnectionInfo, ConnectionTable};
use crate::{ACCEPT_BACKOFF, ServerConfig, ServerError};

/// The Trickle connection dispatcher.
///
/// Runs one isolated session per accepted connection. A panic inside a
/// session is contained to its task.
pub struct Dispatcher {
    local_addr: SocketAddr,
    listener: Mutex<Option<TcpListener>>,
    storage: Arc<dyn Storage>,
    session_config: SessionConfig,
    connections: ConnectionTable,
    cancel: CancellationToken,
    tracker: TaskTracker,
    next_id: AtomicU64,
}

impl Dispatcher {
    /// Opens the storage root and binds the listening socket.
    pub async fn bind(config: &ServerConfig) -> Result<Arc<Self>, ServerError> {
        let storage = DirStorage::open(&config.root).await?;
        tracing::info!(root = %storage.root().display(), "storage ready");
        Self::with_storage(
            (config.host.as_str(), config.port),
            Arc::new(storage),
            config.session_config(),
        )
        .await
    }

    /// Binds `addr` and serves files from `storage`.
    pub async fn with_storage<A: ToSocketAddrs>(
        addr: A,
        storage: Arc<dyn Storage>,
        session_config: SessionConfig,
    ) -> Result<Arc<Self>, ServerError> {
        let listener = TcpListener::bind(addr).await?;
        let local_addr = listener.local_addr()?;
        Ok(Arc::new(Self {
            local_addr,
            listener: Mutex::new(Some(listener)),
            storage,
            session_config,
            connections: ConnectionTable::new(),
            cancel: CancellationToken::new(),
            tracker: TaskTracker::new(),
            next_id: AtomicU64::new(1),
        }))
    }

    pub fn local_addr(&self) -> SocketAddr {
        self.local_addr
    }

    pub fn port(&self) -> u16 {
        self.local_addr.port()
    }

    pub fn connections(&self) -> &ConnectionTable {
        &self.connections
    }

    /// Stops accepting new connections. Sessions already running finish on
    /// their own; [`run`](Self::run) returns once they have.
    pub fn shutdown(&self) {
        self.cancel.cancel();
    }

    /// Accepts connections until [`shutdown`](Self::shutdown), then waits for
    /// in-flight sessions.
    pub async fn run(self: &Arc<Self>) -> Result<(), ServerError> {
        let listener = self
            .listener
            .lock()
            .await
            .take()
            .ok_or(ServerError::AlreadyRunning)?;
        tracing::info!(addr = %self.local_addr, "dispatcher listening");

        loop {
            tokio::select! {
                _ = self.cancel.cancelled() => break,

                result = listener.accept() => {
                    match result {
                        Ok((stream, peer_addr)) => self.spawn_session(stream, peer_addr).await,
                        Err(e) => {
                            tracing::error!("accept error: {e}");
                            tokio::time::sleep(ACCEPT_BACKOFF).await;
                        }
                    }
                }
            }
        }

        drop(listener);
        self.tracker.close();
        tracing::info!(
            active = self.tracker.len(),
            "stopped accepting, waiting for sessions"
        );
        self.tracker.wait().await;
        tracing::info!("dispatcher stopped");
        Ok(())
    }

    async fn spawn_session(self: &Arc<Self>, stream: TcpStream, peer_addr: SocketAddr) {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed);
        self.connections
            .insert(ConnectionInfo {
                id,
                peer_addr,
                connected_at: Instant::now(),
            })
            .await;

        let span = tracing::info_span!("conn", conn_id = id, %peer_addr);
        let this = Arc::clone(self);
        self.tracker.spawn(
            async move {
                tracing::info!("connection accepted");
                let storage = Arc::clone(&this.storage);
                let config = this.session_config.clone();

                // Own task, so a panicking session still gets its entry removed.
                let session = tokio::spawn(
                    async move {
                        if let Err(e) = stream.set_nodelay(true) {
                            tracing::debug!(error = %e, "set_nodelay failed");
                        }
                        run_session(stream, storage, config).await
                    }
                    .in_current_span(),
                );

                match session.await {
                    Ok((state, failure)) => match failure {
                        None => tracing::debug!(%state, ok = true, "connection closed"),
                        Some(kind) => {
                            tracing::debug!(%state, ok = false, %kind, "connection closed")
                        }
                    },
                    Err(e) => tracing::error!(error = %e, "session task aborted"),
                }
                this.connections.remove(id).await;
            }
            .instrument(span),
        );
    }
}

/// Runs one session to its terminal state and reports how it ended.
async fn run_session<S>(
    stream: S,
    storage: Arc<dyn Storage>,
    config: SessionConfig,
) -> (SessionState, Option<ErrorKind>)
where
    S: AsyncRead + AsyncWrite + Unpin,
{
    let mut session = Session::new(stream, storage, config);
    let outcome = session.run().await;
    (session.state(), outcome.err().map(|e| e.kind()))
}
