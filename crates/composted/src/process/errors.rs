//! Defines the unified error surface for server launch and supervision.

use std::io;

use thiserror::Error;

use crate::bootstrap::BootstrapError;

use super::shutdown::ShutdownError;

/// Errors surfaced while launching or supervising the server process.
#[derive(Debug, Error)]
pub enum LaunchError {
    /// Bootstrapping the server failed.
    #[error("server bootstrap failed: {source}")]
    Bootstrap {
        /// Underlying bootstrap error.
        #[source]
        source: BootstrapError,
    },
    /// Waiting for shutdown failed.
    #[error("failed to await shutdown signal: {source}")]
    Shutdown {
        /// Underlying shutdown error.
        #[source]
        source: ShutdownError,
    },
    /// The shutdown watcher thread could not be spawned.
    #[error("failed to spawn shutdown watcher: {source}")]
    Watcher {
        /// Underlying IO error.
        #[source]
        source: io::Error,
    },
    /// The shutdown watcher thread panicked.
    #[error("shutdown watcher panicked")]
    WatcherPanicked,
    /// The session loop panicked and the server was stopped.
    #[error("session loop panicked")]
    SessionPanicked,
}

impl From<ShutdownError> for LaunchError {
    fn from(source: ShutdownError) -> Self {
        Self::Shutdown { source }
    }
}

impl From<BootstrapError> for LaunchError {
    fn from(source: BootstrapError) -> Self {
        Self::Bootstrap { source }
    }
}
