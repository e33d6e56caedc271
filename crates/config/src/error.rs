//! Configuration error types

use std::io;
use thiserror::Error;

/// Result type for configuration operations
pub type Result<T> = std::result::Result<T, ConfigError>;

/// Errors that can occur when loading or validating configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    /// Failed to read the configuration file
    #[error("failed to read config file '{path}': {source}")]
    Io {
        /// Path to the file
        path: String,
        /// Underlying IO error
        #[source]
        source: io::Error,
    },

    /// Failed to parse TOML
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),

    /// Two `[server.<key>]` entries resolved to the same alias
    #[error("duplicate server alias '{alias}'")]
    DuplicateAlias {
        /// The conflicting alias
        alias: String,
    },

    /// A `db_regex` pattern does not compile
    #[error("server '{alias}' has invalid db_regex '{pattern}': {source}")]
    InvalidRegex {
        /// Server alias
        alias: String,
        /// The offending pattern
        pattern: String,
        /// Underlying regex error
        #[source]
        source: regex::Error,
    },

    /// A server entry is missing its downstream address
    #[error("server '{alias}' is missing 'server_name'")]
    MissingServerName {
        /// Server alias
        alias: String,
    },
}
