use std::path::PathBuf;
use std::time::Duration;

use serde::{Deserialize, Serialize};
use trickle_protocol::{ChunkSize, CompressionLevel};
use trickle_session::{DEFAULT_MAX_FILE_SIZE, SessionConfig};

/// Dispatcher configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ServerConfig {
    /// Address to listen on.
    #[serde(default = "default_host")]
    pub host: String,

    /// TCP port to listen on (0 = OS-assigned).
    #[serde(default = "default_port")]
    pub port: u16,

    /// Directory holding the shared files.
    #[serde(default = "default_root")]
    pub root: PathBuf,

    /// Chunk size for downloads served by this server.
    #[serde(default)]
    pub chunk_size: ChunkSize,

    /// Compression applied to download chunks.
    #[serde(default)]
    pub compression: CompressionLevel,

    /// Seconds to wait for each expected message.
    #[serde(default = "default_read_timeout_secs")]
    pub read_timeout_secs: u64,

    /// Largest upload accepted, in bytes.
    #[serde(default = "default_max_file_size")]
    pub max_file_size: u64,
}

fn default_host() -> String {
    "0.0.0.0".into()
}

fn default_port() -> u16 {
    5000
}

fn default_root() -> PathBuf {
    PathBuf::from("./shared_files")
}

fn default_read_timeout_secs() -> u64 {
    30
}

fn default_max_file_size() -> u64 {
    DEFAULT_MAX_FILE_SIZE
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            root: default_root(),
            chunk_size: ChunkSize::default(),
            compression: CompressionLevel::default(),
            read_timeout_secs: default_read_timeout_secs(),
            max_file_size: default_max_file_size(),
        }
    }
}

impl ServerConfig {
    /// Knobs handed to every session this server runs.
    pub fn session_config(&self) -> SessionConfig {
        SessionConfig {
            chunk_size: self.chunk_size,
            compression: self.compression,
            read_timeout: Duration::from_secs(self.read_timeout_secs),
            max_file_size: self.max_file_size,
        }
    }
}
