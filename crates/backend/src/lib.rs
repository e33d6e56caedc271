//! SIR - Backend fleet
//!
//! The core of the relay: a [`Fleet`] of downstream [`Endpoint`]s, each
//! with an optional disk-backed [`Bufferer`] absorbing batches while its
//! downstream is unavailable.
//!
//! # Architecture
//!
//! ```text
//! [front door] --Batch--> Fleet::post
//!                            |  db_regex routing (cached per database)
//!                            v
//!                    Endpoint::post ----active----> downstream /write
//!                            |                          ^
//!                        not active                     |
//!                            v                          |
//!                       Bufferer (disk) --backlog drain-+
//! ```
//!
//! Each endpoint runs in its own task; buffering endpoints run two more
//! (the bufferer flush loop and the backlog drainer). Shutdown flows
//! fleet -> endpoint -> children, draining and persisting on the way
//! down.

mod bufferer;
mod endpoint;
mod error;
mod fleet;
mod status;

#[cfg(test)]
mod testutil;

pub use bufferer::{BUFFER_MEASUREMENT, BufferFile, Bufferer, INPUT_QUEUE_CAPACITY};
pub use endpoint::{BACKEND_MEASUREMENT, DB_MEASUREMENT, DEFAULT_NUM_RQ, Endpoint};
pub use error::{BackendError, Result};
pub use fleet::{Fleet, FleetTelemetry};
pub use status::EndpointStatus;

/// Wall-clock timestamp in nanoseconds for telemetry points
pub(crate) fn now_nanos() -> i64 {
    std::time::SystemTime::now()
        .duration_since(std::time::UNIX_EPOCH)
        .map(|d| d.as_nanos() as i64)
        .unwrap_or(0)
}
