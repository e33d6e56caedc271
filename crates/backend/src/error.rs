//! Backend error types

use thiserror::Error;

/// Result type for backend operations
pub type Result<T> = std::result::Result<T, BackendError>;

/// Errors from the fleet, its endpoints and their bufferers
#[derive(Debug, Error)]
pub enum BackendError {
    /// Bufferer directory or file I/O failure; fatal for that bufferer
    #[error("buffer I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// A persisted payload could not be read back; the entry is dropped
    #[error("buffered payload '{filename}' is corrupt: {reason}")]
    Corrupt {
        /// Payload file name (relative to the bufferer root)
        filename: String,
        /// Why it could not be restored
        reason: String,
    },

    /// `post` on a non-active endpoint without buffering
    #[error("endpoint '{alias}' is not active")]
    Unavailable {
        /// Endpoint alias
        alias: String,
    },

    /// No endpoint's db_regex matches the batch's database
    #[error("no endpoint for database '{database}'")]
    NoRoute {
        /// The unroutable database name
        database: String,
    },

    /// Alias lookup miss
    #[error("no endpoint named '{alias}'")]
    NotFound {
        /// The requested alias
        alias: String,
    },

    /// The bufferer input queue is full; the batch was dropped
    #[error("buffer input queue is full")]
    Overloaded,

    /// Ping or post before a client was built
    #[error("endpoint '{alias}' is not connected")]
    NotConnected {
        /// Endpoint alias
        alias: String,
    },

    /// Transport-level downstream failure
    #[error("downstream write to '{alias}' failed: {source}")]
    Downstream {
        /// Endpoint alias
        alias: String,
        /// Underlying transport error
        #[source]
        source: reqwest::Error,
    },

    /// The downstream answered with a non-success status
    #[error("downstream '{alias}' returned status {status}")]
    DownstreamStatus {
        /// Endpoint alias
        alias: String,
        /// HTTP status code
        status: u16,
    },

    /// Failed to build the downstream HTTP client
    #[error("failed to build client for '{alias}': {source}")]
    Client {
        /// Endpoint alias
        alias: String,
        /// Underlying client error
        #[source]
        source: reqwest::Error,
    },

    /// Endpoint constructed without an alias
    #[error("endpoint alias cannot be empty")]
    EmptyAlias,

    /// Two endpoints share one alias
    #[error("duplicate endpoint alias '{alias}'")]
    DuplicateAlias {
        /// The conflicting alias
        alias: String,
    },

    /// A db_regex pattern does not compile
    #[error("invalid db_regex '{pattern}': {source}")]
    InvalidRegex {
        /// The offending pattern
        pattern: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },

    /// Telemetry batch construction failure
    #[error(transparent)]
    Protocol(#[from] sir_protocol::ProtocolError),
}

impl BackendError {
    /// True for temporary conditions the front door reports as 503
    pub fn is_unavailable(&self) -> bool {
        matches!(
            self,
            Self::Unavailable { .. } | Self::NoRoute { .. } | Self::Overloaded
        )
    }
}
