use std::collections::HashMap;
use std::net::SocketAddr;
use std::time::Instant;

use tokio::sync::Mutex;

/// One live connection.
#[derive(Debug, Clone)]
pub struct ConnectionInfo {
    pub id: u64,
    pub peer_addr: SocketAddr,
    pub connected_at: Instant,
}

/// Live connections keyed by id.
///
/// Written on accept and on disconnect only; sessions never read it.
#[derive(Debug, Default)]
pub struct ConnectionTable {
    inner: Mutex<HashMap<u64, ConnectionInfo>>,
}

impl ConnectionTable {
    pub fn new() -> Self {
        Self::default()
    }

    pub async fn insert(&self, info: ConnectionInfo) {
        self.inner.lock().await.insert(info.id, info);
    }

    pub async fn remove(&self, id: u64) -> Option<ConnectionInfo> {
        self.inner.lock().await.remove(&id)
    }

    pub async fn len(&self) -> usize {
        self.inner.lock().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.inner.lock().await.is_empty()
    }

    /// Copies the current entries, ordered by id.
    pub async fn snapshot(&self) -> Vec<ConnectionInfo> {
        let mut entries: Vec<ConnectionInfo> = self.inner.lock().await.values().cloned().collect();
        entries.sort_by_key(|c| c.id);
        entries
    }
}
