//! Connection dispatcher for the Trickle file server.
//!
//! Accepts TCP connections and runs one independent
//! [`Session`](trickle_session::Session) per connection. Sessions never share
//! state; the [`ConnectionTable`] is the only structure they all touch.

mod config;
mod server;
mod table;

pub use config::ServerConfig;
pub use server::Dispatcher;
pub use table::{ConnectionInfo, ConnectionTable};

use std::time::Duration;

use trickle_session::StorageError;

/// Pause after a failed `accept` before trying again.
pub const ACCEPT_BACKOFF: Duration = Duration::from_millis(100);

/// Errors produced by the dispatcher.
#[derive(Debug, thiserror::Error)]
pub enum ServerError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("dispatcher already running")]
    AlreadyRunning,
}
