//! In-process mock downstream server for endpoint and fleet tests
//!
//! Speaks just enough of the write API for the relay to talk to it:
//! `GET /ping` and `POST /write`, both answering 204 while healthy and
//! 503 while not. Health is toggled from the test body to drive the
//! endpoint state machine.

use std::net::SocketAddr;
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};

use axum::Router;
use axum::extract::State;
use axum::http::StatusCode;
use axum::routing::{get, post};
use parking_lot::Mutex;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;

#[derive(Clone)]
struct MockState {
    healthy: Arc<AtomicBool>,
    writes: Arc<AtomicU64>,
    bodies: Arc<Mutex<Vec<String>>>,
}

/// A downstream server the tests can make healthy or unhealthy at will
pub struct MockDownstream {
    addr: SocketAddr,
    state: MockState,
    task: JoinHandle<()>,
}

impl MockDownstream {
    pub async fn start() -> Self {
        let state = MockState {
            healthy: Arc::new(AtomicBool::new(true)),
            writes: Arc::new(AtomicU64::new(0)),
            bodies: Arc::new(Mutex::new(Vec::new())),
        };

        let app = Router::new()
            .route("/ping", get(ping))
            .route("/write", post(write))
            .with_state(state.clone());

        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            let _ = axum::serve(listener, app).await;
        });

        Self { addr, state, task }
    }

    pub fn port(&self) -> u16 {
        self.addr.port()
    }

    pub fn set_healthy(&self, healthy: bool) {
        self.state.healthy.store(healthy, Ordering::SeqCst);
    }

    pub fn write_count(&self) -> u64 {
        self.state.writes.load(Ordering::SeqCst)
    }

    pub fn bodies(&self) -> Vec<String> {
        self.state.bodies.lock().clone()
    }
}

impl Drop for MockDownstream {
    fn drop(&mut self) {
        self.task.abort();
    }
}

async fn ping(State(state): State<MockState>) -> StatusCode {
    if state.healthy.load(Ordering::SeqCst) {
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}

async fn write(State(state): State<MockState>, body: String) -> StatusCode {
    if state.healthy.load(Ordering::SeqCst) {
        state.writes.fetch_add(1, Ordering::SeqCst);
        state.bodies.lock().push(body);
        StatusCode::NO_CONTENT
    } else {
        StatusCode::SERVICE_UNAVAILABLE
    }
}
