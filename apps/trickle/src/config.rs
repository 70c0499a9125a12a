//! Server configuration loading.
//!
//! Configuration is stored as TOML. Every key is optional:
//!
//! ```toml
//! host = "0.0.0.0"
//! port = 5000
//! root = "./shared_files"
//! chunk_size = "medium"      # small | medium | large | xlarge
//! compression = "medium"     # none | low | medium | high
//! read_timeout_secs = 30      # must be at least 1
//! max_file_size = 1073741824
//! ```

use std::path::{Path, PathBuf};

use anyhow::{Context, ensure};
use trickle_protocol::{ChunkSize, CompressionLevel};
use trickle_server::ServerConfig;

/// File read when no `--config` is given, if it exists.
pub const DEFAULT_CONFIG_FILE: &str = "trickle.toml";

/// Loads the server configuration.
///
/// An explicit `path` must exist. Without one, [`DEFAULT_CONFIG_FILE`] is
/// used when present and built-in defaults otherwise.
pub fn load(path: Option<&Path>) -> anyhow::Result<ServerConfig> {
    match path {
        Some(path) => read(path),
        None => {
            let path = Path::new(DEFAULT_CONFIG_FILE);
            if path.exists() {
                read(path)
            } else {
                Ok(ServerConfig::default())
            }
        }
    }
}

fn read(path: &Path) -> anyhow::Result<ServerConfig> {
    let content = std::fs::read_to_string(path)
        .with_context(|| format!("reading config {}", path.display()))?;
    let config: ServerConfig = toml::from_str(&content)
        .with_context(|| format!("parsing config {}", path.display()))?;
    validate(&config).with_context(|| format!("invalid config {}", path.display()))?;
    tracing::debug!(path = %path.display(), "configuration loaded");
    Ok(config)
}

fn validate(config: &ServerConfig) -> anyhow::Result<()> {
    ensure!(
        config.read_timeout_secs > 0,
        "read_timeout_secs must be at least 1"
    );
    Ok(())
}

/// Command-line values that take precedence over the file.
#[derive(Debug, Default)]
pub struct Overrides {
    pub host: Option<String>,
    pub port: Option<u16>,
    pub root: Option<PathBuf>,
    pub chunk_size: Option<ChunkSize>,
    pub compression: Option<CompressionLevel>,
}

impl Overrides {
    pub fn apply(self, config: &mut ServerConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
        if let Some(root) = self.root {
            config.root = root;
        }
        if let Some(chunk_size) = self.chunk_size {
            config.chunk_size = chunk_size;
        }
        if let Some(compression) = self.compression {
            config.compression = compression;
        }
    }
}
