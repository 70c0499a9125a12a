//! File storage behind a transfer session.
//!
//! Sessions only see the [`Storage`] trait; [`DirStorage`] keeps files as
//! plain entries of one directory.

use std::future::Future;
use std::io;
use std::path::{Path, PathBuf};
use std::pin::Pin;
use std::sync::atomic::{AtomicU64, Ordering};

use tokio::io::AsyncWriteExt;
use tracing::debug;
use trickle_transfer::validate_filename;

/// A boxed future returned by storage methods.
pub type StorageFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T, StorageError>> + Send + 'a>>;

/// Errors produced by a storage backend.
#[derive(Debug, thiserror::Error)]
pub enum StorageError {
    #[error("file not found: {0}")]
    NotFound(String),

    #[error("invalid filename: {0}")]
    InvalidFilename(String),

    #[error("storage I/O error: {0}")]
    Io(#[from] io::Error),
}

/// Read and write access to whole files by plain name.
///
/// Implementations must reject names that could escape their namespace.
pub trait Storage: Send + Sync + 'static {
    /// Returns the full contents of `name`, or [`StorageError::NotFound`].
    fn read_file<'a>(&'a self, name: &'a str) -> StorageFuture<'a, Vec<u8>>;

    /// Replaces `name` with `data`. Readers never observe a partial file.
    fn write_file<'a>(&'a self, name: &'a str, data: &'a [u8]) -> StorageFuture<'a, ()>;
}

static TEMP_COUNTER: AtomicU64 = AtomicU64::new(0);

/// Storage rooted at one directory on disk.
#[derive(Debug, Clone)]
pub struct DirStorage {
    root: PathBuf,
}

impl DirStorage {
    /// Opens `root`, creating it (and its parents) if missing.
    pub async fn open(root: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = root.into();
        tokio::fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    fn resolve(&self, name: &str) -> Result<PathBuf, StorageError> {
        validate_filename(name).map_err(|e| StorageError::InvalidFilename(e.to_string()))?;
        Ok(self.root.join(name))
    }

    fn temp_path(&self) -> PathBuf {
        let n = TEMP_COUNTER.fetch_add(1, Ordering::Relaxed);
        self.root
            .join(format!(".trickle-{}-{n}.part", std::process::id()))
    }

    async fn write_atomic(&self, path: &Path, data: &[u8]) -> io::Result<()> {
        let tmp = self.temp_path();
        let result = async {
            let mut file = tokio::fs::File::create(&tmp).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            drop(file);
            tokio::fs::rename(&tmp, path).await
        }
        .await;

        if result.is_err() {
            let _ = tokio::fs::remove_file(&tmp).await;
        }
        result
    }
}

impl Storage for DirStorage {
    fn read_file<'a>(&'a self, name: &'a str) -> StorageFuture<'a, Vec<u8>> {
        Box::pin(async move {
            let path = self.resolve(name)?;
            match tokio::fs::read(&path).await {
                Ok(data) => Ok(data),
                Err(e) if e.kind() == io::ErrorKind::NotFound => {
                    Err(StorageError::NotFound(name.to_string()))
                }
                Err(e) => Err(e.into()),
            }
        })
    }

    fn write_file<'a>(&'a self, name: &'a str, data: &'a [u8]) -> StorageFuture<'a, ()> {
        Box::pin(async move {
            let path = self.resolve(name)?;
            self.write_atomic(&path, data).await?;
            debug!(name, bytes = data.len(), "file stored");
            Ok(())
        })
    }
}
