//! Fleet - the endpoint collection
//!
//! Owns every configured endpoint, routes incoming batches to the
//! endpoints whose `db_regex` matches the batch's database, exposes a
//! status document, and periodically harvests per-endpoint counters into
//! telemetry batches posted back through the relay itself.
//!
//! Routing decisions are memoized per database name. The endpoint set is
//! fixed at construction, so a cached route never goes stale.

use std::collections::{BTreeMap, HashMap};
use std::sync::Arc;
use std::time::Duration;

use dashmap::DashMap;
use parking_lot::Mutex;
use sir_protocol::Batch;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::endpoint::Endpoint;
use crate::error::{BackendError, Result};

/// Self-telemetry settings
#[derive(Debug, Clone)]
pub struct FleetTelemetry {
    /// Harvest and self-post stats
    pub enable: bool,
    /// Database the stats batches are addressed to
    pub database: String,
    /// Harvest period
    pub frequency: Duration,
}

impl From<&sir_config::InternalConfig> for FleetTelemetry {
    fn from(config: &sir_config::InternalConfig) -> Self {
        Self {
            enable: config.enable,
            database: config.database.clone(),
            frequency: config.frequency,
        }
    }
}

/// The collection of downstream endpoints plus routing and telemetry
pub struct Fleet {
    endpoints: HashMap<String, Arc<Endpoint>>,
    /// Memoized database -> matching endpoints routing decisions
    routing_cache: DashMap<String, Vec<Arc<Endpoint>>>,
    telemetry: FleetTelemetry,
    shutdown: CancellationToken,
    tasks: Mutex<Vec<JoinHandle<()>>>,
}

impl Fleet {
    /// Build the fleet from a parsed configuration
    ///
    /// # Errors
    ///
    /// Fails on a duplicate alias or an endpoint that does not construct
    /// (empty alias, invalid regex).
    pub fn from_config(config: &sir_config::Config) -> Result<Self> {
        let mut endpoints = HashMap::with_capacity(config.server.len());
        for server in config.servers() {
            let mut server = server.clone();
            if config.debug && !server.debug {
                server.debug = true;
            }
            let endpoint = Endpoint::from_config(&server)?;
            let alias = endpoint.alias().to_string();
            if endpoints.contains_key(&alias) {
                return Err(BackendError::DuplicateAlias { alias });
            }
            endpoints.insert(alias, Arc::new(endpoint));
        }

        Ok(Self {
            endpoints,
            routing_cache: DashMap::new(),
            telemetry: FleetTelemetry::from(&config.internal),
            shutdown: CancellationToken::new(),
            tasks: Mutex::new(Vec::new()),
        })
    }

    /// Number of endpoints
    pub fn len(&self) -> usize {
        self.endpoints.len()
    }

    /// True when no endpoint is configured
    pub fn is_empty(&self) -> bool {
        self.endpoints.is_empty()
    }

    /// Telemetry settings
    pub fn telemetry(&self) -> &FleetTelemetry {
        &self.telemetry
    }

    /// Exact-alias lookup
    ///
    /// # Errors
    ///
    /// [`BackendError::NotFound`] when no endpoint carries the alias.
    pub fn endpoint_by_alias(&self, alias: &str) -> Result<Arc<Endpoint>> {
        self.endpoints
            .get(alias)
            .cloned()
            .ok_or_else(|| BackendError::NotFound {
                alias: alias.to_string(),
            })
    }

    /// Every endpoint with at least one db_regex matching `database`
    ///
    /// Each endpoint contributes at most once regardless of how many of
    /// its patterns match.
    pub fn endpoints_for_database(&self, database: &str) -> Vec<Arc<Endpoint>> {
        self.endpoints
            .values()
            .filter(|endpoint| endpoint.matches_database(database))
            .cloned()
            .collect()
    }

    /// Relay one batch to every matching endpoint
    ///
    /// Fan-out is best-effort: endpoints are posted in turn and the first
    /// error returns, so earlier endpoints may already have accepted the
    /// batch.
    ///
    /// # Errors
    ///
    /// [`BackendError::NoRoute`] when nothing matches; otherwise the
    /// first endpoint error.
    pub async fn post(&self, batch: &Batch) -> Result<()> {
        let targets = {
            let entry = self
                .routing_cache
                .entry(batch.database().to_string())
                .or_insert_with(|| self.endpoints_for_database(batch.database()));
            entry.clone()
        };

        if targets.is_empty() {
            return Err(BackendError::NoRoute {
                database: batch.database().to_string(),
            });
        }

        for endpoint in &targets {
            endpoint.post(batch).await?;
        }
        Ok(())
    }

    /// JSON document mapping alias to lowercase status name
    pub fn status(&self) -> String {
        let state: BTreeMap<&str, &str> = self
            .endpoints
            .iter()
            .map(|(alias, endpoint)| (alias.as_str(), endpoint.status().as_str()))
            .collect();
        serde_json::to_string(&state).unwrap_or_else(|_| "{}".to_string())
    }

    /// One telemetry batch holding every endpoint's stats points
    pub fn stats(&self) -> Result<Batch> {
        let mut batch = Batch::new(&self.telemetry.database, "", "")?;
        for endpoint in self.endpoints.values() {
            for point in endpoint.stats() {
                batch.add_point(point);
            }
        }
        Ok(batch)
    }

    /// Launch every endpoint's run loop
    pub fn start_all(&self) {
        let mut tasks = self.tasks.lock();
        for endpoint in self.endpoints.values() {
            let endpoint = Arc::clone(endpoint);
            let alias = endpoint.alias().to_string();
            tasks.push(tokio::spawn(async move {
                if let Err(e) = endpoint.run().await {
                    tracing::error!(alias = %alias, error = %e, "endpoint terminated");
                }
            }));
        }
    }

    /// Stop every endpoint and wait for their run loops to return
    pub async fn stop_all(&self) {
        for endpoint in self.endpoints.values() {
            endpoint.stop();
        }
        let tasks: Vec<_> = self.tasks.lock().drain(..).collect();
        for task in tasks {
            let _ = task.await;
        }
    }

    /// Request shutdown; `run` stops the endpoints and returns
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Main loop
    ///
    /// Starts all endpoints, then - when telemetry is enabled - harvests
    /// and self-posts stats every telemetry period until shutdown. A
    /// telemetry database no endpoint routes is logged each tick and
    /// otherwise ignored.
    pub async fn run(&self) {
        tracing::info!(endpoints = self.endpoints.len(), "starting backends");
        self.start_all();

        if !self.telemetry.enable {
            self.shutdown.cancelled().await;
            self.stop_all().await;
            return;
        }

        tracing::info!(
            database = %self.telemetry.database,
            frequency = ?self.telemetry.frequency,
            "collecting internal stats"
        );
        let mut ticker = tokio::time::interval(self.telemetry.frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // the immediate first tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    self.stop_all().await;
                    return;
                }
                _ = ticker.tick() => {
                    match self.stats() {
                        Ok(batch) => {
                            if let Err(e) = self.post(&batch).await {
                                tracing::warn!(error = %e, "failed to post internal stats");
                            }
                        }
                        Err(e) => tracing::warn!(error = %e, "failed to collect internal stats"),
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Fleet {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Fleet")
            .field("endpoints", &self.endpoints.len())
            .field("telemetry", &self.telemetry.enable)
            .finish()
    }
}

#[cfg(test)]
#[path = "fleet_test.rs"]
mod fleet_test;
