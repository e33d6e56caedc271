//! Downstream server configuration

use serde::Deserialize;
use std::path::PathBuf;
use std::time::Duration;

/// One `[server.<key>]` entry: a downstream time-series server
///
/// An empty `alias` is filled in from the table key at load time. An empty
/// `db_regex` list routes everything (`.*`).
///
/// # Example
///
/// ```toml
/// [server.central]
/// server_name = "influx-1.example.net"
/// port = 8086
/// db_regex = ["^metrics$", "^app_.*"]
/// timeout = "30s"
/// ping_frequency = "10s"
/// buffering = true
/// buffer_path = "/var/lib/sir"
/// buffer_flush_frequency = "10s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ServerConfig {
    /// Unique name within the fleet; defaults to the `[server.<key>]` key
    pub alias: String,

    /// Downstream host name
    /// Default: localhost
    pub server_name: String,

    /// Downstream port
    /// Default: 8086
    pub port: u16,

    /// Use https for the downstream connection
    pub secure: bool,

    /// Skip TLS certificate verification
    pub unsafe_ssl: bool,

    /// Basic-auth username
    pub username: Option<String>,

    /// Basic-auth password
    pub password: Option<String>,

    /// Database-name regexes this server accepts; empty means all
    pub db_regex: Vec<String>,

    /// Downstream request timeout
    /// Default: 30s
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Health-check period
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub ping_frequency: Duration,

    /// In-flight write ceiling
    /// Default: 100
    pub max_concurrent_requests: usize,

    /// Start (and stay) suspended
    pub disable: bool,

    /// Verbose per-post logging
    pub debug: bool,

    /// Buffer batches to disk while the downstream is unavailable
    pub buffering: bool,

    /// Buffer root directory; the alias is appended as a subdirectory.
    /// Default: the alias itself, relative to the working directory
    pub buffer_path: Option<PathBuf>,

    /// Buffer flush period
    /// Default: 10s
    #[serde(with = "humantime_serde")]
    pub buffer_flush_frequency: Duration,
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            alias: String::new(),
            server_name: "localhost".into(),
            port: 8086,
            secure: false,
            unsafe_ssl: false,
            username: None,
            password: None,
            db_regex: Vec::new(),
            timeout: Duration::from_secs(30),
            ping_frequency: Duration::from_secs(10),
            max_concurrent_requests: 100,
            disable: false,
            debug: false,
            buffering: false,
            buffer_path: None,
            buffer_flush_frequency: Duration::from_secs(10),
        }
    }
}

impl ServerConfig {
    /// Base URL of the downstream server
    pub fn url(&self) -> String {
        let scheme = if self.secure { "https" } else { "http" };
        format!("{scheme}://{}:{}", self.server_name, self.port)
    }

    /// Root directory for this server's bufferer
    pub fn buffer_root(&self) -> PathBuf {
        match &self.buffer_path {
            Some(base) => base.join(&self.alias),
            None => PathBuf::from(&self.alias),
        }
    }
}
