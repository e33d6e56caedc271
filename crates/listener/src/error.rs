//! Listener error types

use thiserror::Error;

/// Errors from running the front door
#[derive(Debug, Error)]
pub enum ListenerError {
    /// Could not bind the configured address
    #[error("failed to bind {addr}: {source}")]
    Bind {
        /// The configured bind address
        addr: String,
        /// Underlying IO error
        #[source]
        source: std::io::Error,
    },

    /// The server loop failed
    #[error("http server error: {0}")]
    Serve(#[from] std::io::Error),
}
