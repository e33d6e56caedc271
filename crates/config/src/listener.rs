//! Front-door listener configuration

use serde::Deserialize;
use std::time::Duration;

/// `[listener]` section: the HTTP front door
///
/// # Example
///
/// ```toml
/// [listener]
/// addr = "0.0.0.0:8186"
/// retention_policy = "autogen"
/// timeout = "60s"
/// log = true
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct ListenerConfig {
    /// Bind address
    /// Default: 127.0.0.1:8186
    pub addr: String,

    /// Retention policy applied to writes that omit `rp`
    /// Default: autogen
    pub retention_policy: String,

    /// Request timeout
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub timeout: Duration,

    /// Log every incoming connection
    pub log: bool,

    /// Verbose request handling logs
    pub debug: bool,
}

impl Default for ListenerConfig {
    fn default() -> Self {
        Self {
            addr: "127.0.0.1:8186".into(),
            retention_policy: "autogen".into(),
            timeout: Duration::from_secs(60),
            log: false,
            debug: false,
        }
    }
}
