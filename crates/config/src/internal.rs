//! Self-telemetry configuration

use serde::Deserialize;
use std::time::Duration;

/// `[internal]` section: self-telemetry written back through the relay
///
/// When enabled, the fleet harvests its own counters every `frequency` and
/// posts them as a write batch addressed to `database`. The database must
/// match at least one endpoint's `db_regex` or every tick logs a no-route
/// error.
///
/// # Example
///
/// ```toml
/// [internal]
/// enable = true
/// database = "internal"
/// frequency = "60s"
/// ```
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct InternalConfig {
    /// Enable the telemetry loop
    /// Default: false
    pub enable: bool,

    /// Database the telemetry batches are addressed to
    /// Default: internal
    pub database: String,

    /// Harvest period
    /// Default: 60s
    #[serde(with = "humantime_serde")]
    pub frequency: Duration,
}

impl Default for InternalConfig {
    fn default() -> Self {
        Self {
            enable: false,
            database: "internal".into(),
            frequency: Duration::from_secs(60),
        }
    }
}
