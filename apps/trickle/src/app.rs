//! Subcommand runners.

use std::path::{Path, PathBuf};
use std::sync::Arc;

use anyhow::Context;
use trickle_protocol::{ChunkSize, CompressionLevel};
use trickle_server::{Dispatcher, ServerConfig};
use trickle_session::{Client, SessionConfig};

/// Serves files until Ctrl-C, then drains in-flight sessions.
pub async fn serve(config: ServerConfig) -> anyhow::Result<()> {
    let dispatcher = Dispatcher::bind(&config)
        .await
        .with_context(|| format!("starting server on {}:{}", config.host, config.port))?;
    tracing::info!(
        addr = %dispatcher.local_addr(),
        root = %config.root.display(),
        "serving files"
    );

    let runner = Arc::clone(&dispatcher);
    let mut run = tokio::spawn(async move { runner.run().await });

    tokio::select! {
        result = &mut run => return Ok(result??),
        signal = tokio::signal::ctrl_c() => {
            signal.context("listening for Ctrl-C")?;
            tracing::info!("shutdown requested, waiting for active sessions");
            dispatcher.shutdown();
        }
    }

    run.await??;
    tracing::info!("server shut down cleanly");
    Ok(())
}

/// Downloads `name` from `server` and writes it to `output`.
pub async fn download(server: &str, name: &str, output: Option<PathBuf>) -> anyhow::Result<()> {
    let client = Client::connect(server, SessionConfig::default())
        .await
        .with_context(|| format!("connecting to {server}"))?;
    let data = client
        .download(name)
        .await
        .with_context(|| format!("downloading {name}"))?;

    let output = output.unwrap_or_else(|| PathBuf::from(name));
    tokio::fs::write(&output, &data)
        .await
        .with_context(|| format!("writing {}", output.display()))?;
    tracing::info!(path = %output.display(), bytes = data.len(), "file saved");
    Ok(())
}

/// Uploads the local file at `path` to `server`.
pub async fn upload(
    server: &str,
    path: &Path,
    name: Option<String>,
    chunk_size: ChunkSize,
    compression: CompressionLevel,
) -> anyhow::Result<()> {
    let name = match name {
        Some(name) => name,
        None => path
            .file_name()
            .and_then(|n| n.to_str())
            .map(str::to_owned)
            .context("local path has no usable file name, pass --name")?,
    };
    let data = tokio::fs::read(path)
        .await
        .with_context(|| format!("reading {}", path.display()))?;

    let config = SessionConfig {
        chunk_size,
        compression,
        ..SessionConfig::default()
    };
    let client = Client::connect(server, config)
        .await
        .with_context(|| format!("connecting to {server}"))?;
    let meta = client
        .upload(&name, &data)
        .await
        .with_context(|| format!("uploading {name}"))?;

    tracing::info!(
        name = %meta.filename,
        bytes = meta.size,
        checksum = %meta.checksum_hex().unwrap_or_default(),
        "upload complete"
    );
    Ok(())
}
