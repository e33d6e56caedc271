//! SIR - Configuration
//!
//! TOML-based configuration with sensible defaults: a relay should run from
//! a couple of lines of config. Only specify what you need to change.
//!
//! # Parsing
//!
//! Use the `FromStr` trait to parse configuration:
//!
//! ```
//! use sir_config::Config;
//! use std::str::FromStr;
//!
//! let config = Config::from_str("[server.local]\nport = 8086").unwrap();
//! assert_eq!(config.server.len(), 1);
//! ```
//!
//! # Example Minimal Config
//!
//! ```toml
//! [listener]
//! addr = "0.0.0.0:8186"
//!
//! [server.local]
//! server_name = "localhost"
//! port = 8086
//! ```
//!
//! Every duration field accepts human-readable strings (`"30s"`, `"5m"`).

mod error;
mod internal;
mod listener;
mod server;

use std::collections::HashMap;
use std::fs;
use std::path::Path;
use std::str::FromStr;

use serde::Deserialize;

pub use error::{ConfigError, Result};
pub use internal::InternalConfig;
pub use listener::ListenerConfig;
pub use server::ServerConfig;

/// Main configuration structure
///
/// All sections are optional with defaults.
#[derive(Debug, Clone, Default, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Verbose logging for every component that doesn't set its own flag
    pub debug: bool,

    /// Front-door HTTP listener
    pub listener: ListenerConfig,

    /// Self-telemetry loop
    pub internal: InternalConfig,

    /// Downstream servers, keyed by `[server.<key>]`
    pub server: HashMap<String, ServerConfig>,
}

impl Config {
    /// Load configuration from a TOML file
    ///
    /// # Errors
    ///
    /// Returns an error when the file cannot be read, contains invalid
    /// TOML, or fails validation.
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let path = path.as_ref();
        let contents = fs::read_to_string(path).map_err(|e| ConfigError::Io {
            path: path.display().to_string(),
            source: e,
        })?;
        Self::from_str(&contents)
    }

    fn parse(s: &str) -> Result<Self> {
        let mut config: Config = toml::from_str(s)?;
        config.normalize();
        config.validate()?;
        Ok(config)
    }

    /// Fill empty aliases from the server table keys
    fn normalize(&mut self) {
        for (key, server) in &mut self.server {
            if server.alias.is_empty() {
                server.alias = key.clone();
            }
        }
    }

    /// Validate the configuration
    ///
    /// Checks for duplicate aliases across server entries, missing
    /// downstream host names, and db_regex patterns that do not compile.
    fn validate(&self) -> Result<()> {
        let mut seen = Vec::with_capacity(self.server.len());
        for server in self.server.values() {
            if seen.contains(&server.alias.as_str()) {
                return Err(ConfigError::DuplicateAlias {
                    alias: server.alias.clone(),
                });
            }
            seen.push(&server.alias);

            if server.server_name.is_empty() {
                return Err(ConfigError::MissingServerName {
                    alias: server.alias.clone(),
                });
            }

            for pattern in &server.db_regex {
                regex::Regex::new(pattern).map_err(|e| ConfigError::InvalidRegex {
                    alias: server.alias.clone(),
                    pattern: pattern.clone(),
                    source: e,
                })?;
            }
        }
        Ok(())
    }

    /// The configured servers, in no particular order
    pub fn servers(&self) -> impl Iterator<Item = &ServerConfig> {
        self.server.values()
    }
}

impl FromStr for Config {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self> {
        Self::parse(s)
    }
}
