//! Trickle entry point.

mod app;
mod config;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;
use trickle_protocol::{ChunkSize, CompressionLevel};

use config::Overrides;

/// Chunked, compressed file transfer for slow links
#[derive(Parser)]
#[command(name = "trickle")]
#[command(author, version, about, long_about = None)]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Serve files from a directory
    Serve {
        /// Configuration file (defaults to ./trickle.toml when present)
        #[arg(short, long)]
        config: Option<PathBuf>,

        /// Address to listen on
        #[arg(long)]
        host: Option<String>,

        /// Port to listen on
        #[arg(short, long)]
        port: Option<u16>,

        /// Directory holding the shared files
        #[arg(long)]
        root: Option<PathBuf>,

        /// Chunk size in bytes for downloads (1024, 4096, 16384 or 65536)
        #[arg(long, value_parser = parse_chunk_size)]
        chunk_size: Option<ChunkSize>,

        /// Compression for downloads (none, low, medium or high)
        #[arg(long, value_parser = parse_compression)]
        compression: Option<CompressionLevel>,
    },

    /// Download a file from a server
    Download {
        /// Server address (host:port)
        server: String,

        /// Name of the file on the server
        name: String,

        /// Where to write the file (defaults to the name in the current directory)
        #[arg(short, long)]
        output: Option<PathBuf>,
    },

    /// Upload a file to a server
    Upload {
        /// Server address (host:port)
        server: String,

        /// Local file to send
        path: PathBuf,

        /// Name to store the file under (defaults to the local file name)
        #[arg(long)]
        name: Option<String>,

        /// Chunk size in bytes (1024, 4096, 16384 or 65536)
        #[arg(long, value_parser = parse_chunk_size, default_value = "4096")]
        chunk_size: ChunkSize,

        /// Compression level (none, low, medium or high)
        #[arg(long, value_parser = parse_compression, default_value = "medium")]
        compression: CompressionLevel,
    },
}

fn parse_chunk_size(s: &str) -> Result<ChunkSize, String> {
    let bytes: u32 = s.parse().map_err(|e| format!("{e}"))?;
    ChunkSize::from_bytes(bytes)
        .ok_or_else(|| format!("unsupported chunk size {bytes}, use 1024, 4096, 16384 or 65536"))
}

fn parse_compression(s: &str) -> Result<CompressionLevel, String> {
    match s.to_ascii_lowercase().as_str() {
        "none" => Ok(CompressionLevel::None),
        "low" => Ok(CompressionLevel::Low),
        "medium" => Ok(CompressionLevel::Medium),
        "high" => Ok(CompressionLevel::High),
        other => Err(format!("unknown compression level {other:?}")),
    }
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info")),
        )
        .init();

    let rt = tokio::runtime::Runtime::new()?;
    match cli.command {
        Command::Serve {
            config: config_path,
            host,
            port,
            root,
            chunk_size,
            compression,
        } => {
            let mut server_config = config::load(config_path.as_deref())?;
            Overrides {
                host,
                port,
                root,
                chunk_size,
                compression,
            }
            .apply(&mut server_config);
            tracing::info!(
                version = env!("CARGO_PKG_VERSION"),
                "starting Trickle server"
            );
            rt.block_on(app::serve(server_config))
        }
        Command::Download {
            server,
            name,
            output,
        } => rt.block_on(app::download(&server, &name, output)),
        Command::Upload {
            server,
            path,
            name,
            chunk_size,
            compression,
        } => rt.block_on(app::upload(&server, &path, name, chunk_size, compression)),
    }
}
