//! SIR - HTTP front door
//!
//! Terminates producer writes on one endpoint and hands validated batches
//! to the backend fleet.
//!
//! # Endpoints
//!
//! - `GET|HEAD /ping` -> 204, `X-InfluxDB-Version: relay`
//! - `POST /write?db=<name>&rp=<policy>&precision=<unit>` -> 204 on
//!   accepted; 400 on missing parameters or an unparseable body; 503 when
//!   the fleet cannot take the batch; gzip request bodies supported
//! - `GET /status` -> 200, the fleet's alias -> status JSON
//! - `/query` -> 403 (queries are not relayed)
//! - anything else -> 404 `{"error":"invalid endpoint"}`
//!
//! # Example
//!
//! ```ignore
//! let fleet = Arc::new(Fleet::from_config(&config)?);
//! let listener = HttpListener::new(config.listener.clone(), fleet);
//! listener.run(cancel).await?;
//! ```

mod error;
mod handlers;
mod response;

use std::sync::Arc;

use async_trait::async_trait;
use axum::Router;
use axum::http::HeaderValue;
use axum::middleware::{self, Next};
use axum::response::Response;
use axum::routing::{any, get, post};
use sir_backend::Fleet;
use sir_config::ListenerConfig;
use sir_protocol::Batch;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;

pub use error::ListenerError;

use handlers::{not_found, ping, query, status, write};

/// Every response identifies the relay to influx-aware clients.
const VERSION_HEADER: &str = "x-influxdb-version";
const VERSION_VALUE: &str = "relay";

/// What the front door needs from the backend: take a batch, report status
///
/// The fleet is the production implementation; tests substitute their own.
#[async_trait]
pub trait Backend: Send + Sync + 'static {
    /// Relay one batch to every matching endpoint
    async fn post(&self, batch: &Batch) -> sir_backend::Result<()>;

    /// JSON document mapping alias to status name
    fn status(&self) -> String;
}

#[async_trait]
impl Backend for Fleet {
    async fn post(&self, batch: &Batch) -> sir_backend::Result<()> {
        Fleet::post(self, batch).await
    }

    fn status(&self) -> String {
        Fleet::status(self)
    }
}

/// Shared handler state
pub(crate) struct ListenerState {
    pub(crate) backend: Option<Arc<dyn Backend>>,
    pub(crate) default_retention_policy: String,
    pub(crate) log_connections: bool,
    pub(crate) debug: bool,
}

/// The HTTP front door
pub struct HttpListener {
    config: ListenerConfig,
    backend: Option<Arc<dyn Backend>>,
}

impl HttpListener {
    /// Create a listener relaying to `backend`
    pub fn new(config: ListenerConfig, backend: Arc<dyn Backend>) -> Self {
        Self {
            config,
            backend: Some(backend),
        }
    }

    /// Create a listener with no backend attached
    ///
    /// Writes are accepted and dropped; `/status` answers `{}`.
    pub fn without_backend(config: ListenerConfig) -> Self {
        Self {
            config,
            backend: None,
        }
    }

    /// Bind address
    pub fn addr(&self) -> &str {
        &self.config.addr
    }

    /// Serve until cancelled
    ///
    /// # Errors
    ///
    /// Returns [`ListenerError::Bind`] when the address cannot be bound,
    /// or [`ListenerError::Serve`] when the server loop fails.
    pub async fn run(self, shutdown: CancellationToken) -> Result<(), ListenerError> {
        let addr = self.config.addr.clone();
        let listener = TcpListener::bind(&addr)
            .await
            .map_err(|e| ListenerError::Bind {
                addr: addr.clone(),
                source: e,
            })?;

        tracing::info!(addr = %addr, "front door listening");

        let app = self.into_router();
        axum::serve(listener, app)
            .with_graceful_shutdown(async move { shutdown.cancelled().await })
            .await?;

        tracing::info!(addr = %addr, "front door stopped");
        Ok(())
    }

    /// Build the axum router for this listener
    pub fn into_router(self) -> Router {
        let state = Arc::new(ListenerState {
            backend: self.backend,
            default_retention_policy: self.config.retention_policy.clone(),
            log_connections: self.config.log,
            debug: self.config.debug,
        });
        build_router(state)
    }
}

pub(crate) fn build_router(state: Arc<ListenerState>) -> Router {
    Router::new()
        .route("/ping", get(ping))
        .route("/write", post(write))
        .route("/status", get(status))
        .route("/query", any(query))
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(
            Arc::clone(&state),
            log_connection,
        ))
        .layer(middleware::map_response(add_version_header))
        .with_state(state)
}

async fn add_version_header(mut response: Response) -> Response {
    response
        .headers_mut()
        .insert(VERSION_HEADER, HeaderValue::from_static(VERSION_VALUE));
    response
}

async fn log_connection(
    axum::extract::State(state): axum::extract::State<Arc<ListenerState>>,
    request: axum::extract::Request,
    next: Next,
) -> Response {
    if state.log_connections {
        tracing::info!(
            method = %request.method(),
            uri = %request.uri(),
            "connection"
        );
    }
    next.run(request).await
}
