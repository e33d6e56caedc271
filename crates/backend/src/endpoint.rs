//! Endpoint - one downstream server
//!
//! Owns exactly one downstream connection: builds the HTTP client, keeps
//! the health state fresh with a ping loop, admits a bounded number of
//! concurrent writes, and decides per post whether a batch goes to the
//! wire, into the overflow buffer, or back to the caller as an error.
//!
//! # Lifecycle
//!
//! ```text
//! Inactive --connect ok--> Active <--ping ok-- Failed
//!                            |                   ^
//!                            +----ping err-------+
//! ```
//!
//! `Suspended` endpoints (config `disable = true`) never connect and never
//! ping. A downstream write failure nudges the run loop into an immediate
//! health check instead of waiting out the ping period.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::{Mutex, RwLock};
use regex::Regex;
use sir_config::ServerConfig;
use sir_protocol::{Batch, FieldValue, Point};
use tokio::sync::{Notify, Semaphore};
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;

use crate::bufferer::Bufferer;
use crate::error::{BackendError, Result};
use crate::now_nanos;
use crate::status::{EndpointStatus, StatusCell};

/// Telemetry measurement for per-endpoint counters
pub const BACKEND_MEASUREMENT: &str = "sir_backend";

/// Telemetry measurement for per-database counters
pub const DB_MEASUREMENT: &str = "sir_db";

/// Default in-flight write ceiling
pub const DEFAULT_NUM_RQ: usize = 100;

const USER_AGENT: &str = "sir";

/// Pace of the backlog drainer: one pop attempt per tick, so roughly
/// sixty reinjected batches per second at most.
const BACKLOG_TICK: Duration = Duration::from_millis(15);

#[derive(Debug, Default)]
struct PostCounters {
    posted: u64,
    per_db: HashMap<String, u64>,
}

/// One downstream time-series server
pub struct Endpoint {
    alias: String,
    db_regex: Vec<Regex>,
    base_url: String,
    username: Option<String>,
    password: Option<String>,
    timeout: Duration,
    unsafe_ssl: bool,
    ping_frequency: Duration,
    debug: bool,

    status: StatusCell,
    client: RwLock<Option<reqwest::Client>>,

    /// Admission control: holds a permit for every in-flight write
    permits: Semaphore,
    num_rq: usize,

    counters: Mutex<PostCounters>,

    bufferer: Option<Arc<Bufferer>>,

    shutdown: CancellationToken,
    ping_nudge: Notify,
}

impl Endpoint {
    /// Build an endpoint from one `[server.<key>]` config entry
    ///
    /// # Errors
    ///
    /// Fails on an empty alias or a db_regex pattern that does not
    /// compile. An empty db_regex list defaults to `.*` (route
    /// everything).
    pub fn from_config(config: &ServerConfig) -> Result<Self> {
        if config.alias.is_empty() {
            return Err(BackendError::EmptyAlias);
        }

        let patterns: Vec<String> = if config.db_regex.is_empty() {
            vec![".*".to_string()]
        } else {
            config.db_regex.clone()
        };
        let db_regex = patterns
            .iter()
            .map(|pattern| {
                Regex::new(pattern).map_err(|e| BackendError::InvalidRegex {
                    pattern: pattern.clone(),
                    source: e,
                })
            })
            .collect::<Result<Vec<_>>>()?;

        // Optimistic start; the first failed ping demotes it.
        let initial = if config.disable {
            EndpointStatus::Suspended
        } else {
            EndpointStatus::Active
        };

        let num_rq = if config.max_concurrent_requests == 0 {
            DEFAULT_NUM_RQ
        } else {
            config.max_concurrent_requests
        };

        let bufferer = config.buffering.then(|| {
            Arc::new(Bufferer::new(
                config.buffer_root(),
                config.buffer_flush_frequency,
            ))
        });

        Ok(Self {
            alias: config.alias.clone(),
            db_regex,
            base_url: config.url(),
            username: config.username.clone(),
            password: config.password.clone(),
            timeout: config.timeout,
            unsafe_ssl: config.unsafe_ssl,
            ping_frequency: config.ping_frequency,
            debug: config.debug,
            status: StatusCell::new(initial),
            client: RwLock::new(None),
            permits: Semaphore::new(num_rq),
            num_rq,
            counters: Mutex::new(PostCounters::default()),
            bufferer,
            shutdown: CancellationToken::new(),
            ping_nudge: Notify::new(),
        })
    }

    /// Unique name within the fleet
    pub fn alias(&self) -> &str {
        &self.alias
    }

    /// Current lifecycle state
    pub fn status(&self) -> EndpointStatus {
        self.status.load()
    }

    /// The overflow buffer, when buffering is enabled
    pub fn bufferer(&self) -> Option<&Arc<Bufferer>> {
        self.bufferer.as_ref()
    }

    /// Total points posted downstream
    pub fn posted(&self) -> u64 {
        self.counters.lock().posted
    }

    /// Whether any of this endpoint's db_regex patterns matches `database`
    pub fn matches_database(&self, database: &str) -> bool {
        self.db_regex.iter().any(|regex| regex.is_match(database))
    }

    /// Request shutdown; `run` drains its children and returns
    pub fn stop(&self) {
        self.shutdown.cancel();
    }

    /// Build the downstream HTTP client
    ///
    /// On success the endpoint is `Active`; on failure it is `Failed` and
    /// the builder error surfaces.
    pub fn connect(&self) -> Result<()> {
        let mut builder = reqwest::Client::builder()
            .timeout(self.timeout)
            .user_agent(USER_AGENT);
        if self.unsafe_ssl {
            builder = builder.danger_accept_invalid_certs(true);
        }

        match builder.build() {
            Ok(client) => {
                *self.client.write() = Some(client);
                self.status.store(EndpointStatus::Active);
                Ok(())
            }
            Err(e) => {
                self.status.store(EndpointStatus::Failed);
                Err(BackendError::Client {
                    alias: self.alias.clone(),
                    source: e,
                })
            }
        }
    }

    /// Drop the client and mark the endpoint inactive
    fn close(&self) {
        *self.client.write() = None;
        self.status.store(EndpointStatus::Inactive);
    }

    /// Low-cost health probe against the downstream `/ping`
    ///
    /// Success promotes a non-active endpoint to `Active`; failure
    /// demotes `Active` and `Drop` to `Failed`. Suspended endpoints are
    /// left untouched; an unconnected endpoint fails with
    /// [`BackendError::NotConnected`].
    pub async fn ping(&self) -> Result<()> {
        let state = self.status.load();
        if state == EndpointStatus::Suspended {
            return Ok(());
        }

        let client = self.client.read().clone();
        let Some(client) = client else {
            return Err(BackendError::NotConnected {
                alias: self.alias.clone(),
            });
        };
        if state == EndpointStatus::Inactive {
            return Err(BackendError::NotConnected {
                alias: self.alias.clone(),
            });
        }

        let mut request = client.get(format!("{}/ping", self.base_url));
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let outcome = match request.send().await {
            Ok(response) if response.status().is_success() => Ok(()),
            Ok(response) => Err(BackendError::DownstreamStatus {
                alias: self.alias.clone(),
                status: response.status().as_u16(),
            }),
            Err(e) => Err(BackendError::Downstream {
                alias: self.alias.clone(),
                source: e,
            }),
        };

        match &outcome {
            Err(e)
                if matches!(
                    state,
                    EndpointStatus::Active | EndpointStatus::Drop
                ) =>
            {
                tracing::warn!(alias = %self.alias, error = %e, "health check failed");
                self.status.store(EndpointStatus::Failed);
            }
            Ok(()) if state != EndpointStatus::Active => {
                tracing::info!(alias = %self.alias, "health check recovered");
                self.status.store(EndpointStatus::Active);
            }
            _ => {}
        }

        outcome
    }

    /// Relay one batch to this endpoint
    ///
    /// A non-active endpoint buffers the batch (buffering on) or fails
    /// with [`BackendError::Unavailable`]. An active endpoint writes
    /// downstream under the concurrency bound; a downstream failure nudges
    /// the health check and falls back to the buffer when one exists.
    pub async fn post(&self, batch: &Batch) -> Result<()> {
        if self.status.load() != EndpointStatus::Active {
            if let Some(bufferer) = &self.bufferer {
                return bufferer.enqueue(batch.clone());
            }
            return Err(BackendError::Unavailable {
                alias: self.alias.clone(),
            });
        }

        match self.do_post(batch).await {
            Ok(()) => Ok(()),
            Err(e) => {
                // Refresh the health state off the post path.
                self.ping_nudge.notify_one();
                if let Some(bufferer) = &self.bufferer {
                    if self.debug {
                        tracing::debug!(
                            alias = %self.alias,
                            error = %e,
                            "downstream write failed, buffering batch"
                        );
                    }
                    bufferer.enqueue(batch.clone())
                } else {
                    Err(e)
                }
            }
        }
    }

    /// The wire write: one permit, one POST, counters on success
    async fn do_post(&self, batch: &Batch) -> Result<()> {
        let client = self.client.read().clone();
        let Some(client) = client else {
            return Err(BackendError::NotConnected {
                alias: self.alias.clone(),
            });
        };

        // Blocks while num_rq writes are already in flight; the permit
        // releases on every exit path.
        let Ok(_permit) = self.permits.acquire().await else {
            return Err(BackendError::Unavailable {
                alias: self.alias.clone(),
            });
        };

        let mut request = client
            .post(format!("{}/write", self.base_url))
            .query(&self.write_query(batch))
            .body(batch.to_line_protocol());
        if let Some(username) = &self.username {
            request = request.basic_auth(username, self.password.as_deref());
        }

        let response = request.send().await.map_err(|e| BackendError::Downstream {
            alias: self.alias.clone(),
            source: e,
        })?;
        if !response.status().is_success() {
            return Err(BackendError::DownstreamStatus {
                alias: self.alias.clone(),
                status: response.status().as_u16(),
            });
        }

        let points = batch.num_points() as u64;
        let mut counters = self.counters.lock();
        counters.posted += points;
        *counters
            .per_db
            .entry(batch.database().to_string())
            .or_insert(0) += points;
        Ok(())
    }

    fn write_query(&self, batch: &Batch) -> Vec<(&'static str, String)> {
        let mut query = vec![("db", batch.database().to_string())];
        if !batch.retention_policy().is_empty() {
            query.push(("rp", batch.retention_policy().to_string()));
        }
        if !batch.precision().is_empty() {
            query.push(("precision", batch.precision().to_string()));
        }
        query
    }

    /// Telemetry points for this endpoint, all tagged with the alias:
    /// one `sir_backend` point, one `sir_db` point per tracked database,
    /// and the bufferer's point when buffering is on
    pub fn stats(&self) -> Vec<Point> {
        let timestamp = now_nanos();
        let (posted, per_db) = {
            let counters = self.counters.lock();
            (counters.posted, counters.per_db.clone())
        };
        let active = self.num_rq.saturating_sub(self.permits.available_permits());

        let mut points = vec![
            Point::new(BACKEND_MEASUREMENT)
                .with_tag("alias", self.alias.clone())
                .with_field("active_req", FieldValue::Integer(active as i64))
                .with_field("state", FieldValue::Integer(self.status.load() as i64))
                .with_field("posted", FieldValue::Integer(posted as i64))
                .with_timestamp(timestamp),
        ];
        for (database, count) in per_db {
            points.push(
                Point::new(DB_MEASUREMENT)
                    .with_tag("alias", self.alias.clone())
                    .with_tag("database", database)
                    .with_field("posted", FieldValue::Integer(count as i64))
                    .with_timestamp(timestamp),
            );
        }
        if let Some(bufferer) = &self.bufferer {
            points.push(
                bufferer
                    .stats()
                    .with_tag("alias", self.alias.clone())
                    .with_timestamp(timestamp),
            );
        }
        points
    }

    /// Main loop
    ///
    /// Starts the bufferer and the backlog drainer when buffering is on,
    /// connects unless suspended, then alternates between the ping ticker
    /// and the shutdown signal. On shutdown the children are cancelled and
    /// awaited before this returns.
    pub async fn run(self: Arc<Self>) -> Result<()> {
        let child_token = self.shutdown.child_token();
        let mut children = Vec::new();

        if let Some(bufferer) = &self.bufferer {
            bufferer.init()?;

            let worker = Arc::clone(bufferer);
            let token = child_token.clone();
            let alias = self.alias.clone();
            children.push(tokio::spawn(async move {
                if let Err(e) = worker.run(token).await {
                    tracing::error!(alias = %alias, error = %e, "bufferer terminated");
                }
            }));

            let endpoint = Arc::clone(&self);
            let token = child_token.clone();
            children.push(tokio::spawn(async move {
                endpoint.process_backlog(token).await;
            }));
        }

        if self.status.load() != EndpointStatus::Suspended {
            self.status.store(EndpointStatus::Starting);
            if let Err(e) = self.connect() {
                child_token.cancel();
                for task in children {
                    let _ = task.await;
                }
                return Err(e);
            }
            if let Err(e) = self.ping().await {
                tracing::warn!(alias = %self.alias, error = %e, "initial health check failed");
            }
        }

        let mut ticker = tokio::time::interval(self.ping_frequency);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
        ticker.tick().await; // the immediate first tick

        loop {
            tokio::select! {
                _ = self.shutdown.cancelled() => {
                    if self.debug {
                        tracing::debug!(alias = %self.alias, "endpoint shutting down");
                    }
                    self.close();
                    child_token.cancel();
                    for task in children {
                        let _ = task.await;
                    }
                    return Ok(());
                }
                _ = ticker.tick() => {
                    if self.status.load() != EndpointStatus::Suspended {
                        let _ = self.ping().await;
                    }
                }
                _ = self.ping_nudge.notified() => {
                    if self.status.load() != EndpointStatus::Suspended {
                        let _ = self.ping().await;
                    }
                }
            }
        }
    }

    /// Paced reinjection of buffered batches
    ///
    /// While the endpoint is active, pops one batch per tick and reposts
    /// it through `post` - so a failed repost lands back in the buffer.
    /// Corrupt entries are logged and skipped.
    async fn process_backlog(self: Arc<Self>, stop: CancellationToken) {
        let Some(bufferer) = &self.bufferer else {
            return;
        };

        let mut ticker = tokio::time::interval(BACKLOG_TICK);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);

        loop {
            tokio::select! {
                _ = stop.cancelled() => return,
                _ = ticker.tick() => {
                    if self.status.load() != EndpointStatus::Active {
                        continue;
                    }
                    match bufferer.pop() {
                        Ok(Some(batch)) => {
                            if let Err(e) = self.post(&batch).await {
                                tracing::warn!(
                                    alias = %self.alias,
                                    error = %e,
                                    "failed to reinject buffered batch"
                                );
                            }
                        }
                        Ok(None) => {}
                        Err(e) => {
                            tracing::warn!(
                                alias = %self.alias,
                                error = %e,
                                "dropping corrupt buffer entry"
                            );
                        }
                    }
                }
            }
        }
    }
}

impl std::fmt::Debug for Endpoint {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Endpoint")
            .field("alias", &self.alias)
            .field("url", &self.base_url)
            .field("status", &self.status.load())
            .field("buffering", &self.bufferer.is_some())
            .finish()
    }
}

#[cfg(test)]
#[path = "endpoint_test.rs"]
mod endpoint_test;
