//! Endpoint status state machine
//!
//! The status is the single word other tasks consult before touching an
//! endpoint, so it lives in one atomic: readers never take a lock, writers
//! store the new state and move on. Transitions are confined to `Endpoint`
//! (connect, ping, run, close); nothing else stores into the cell.

use std::fmt;
use std::sync::atomic::{AtomicU32, Ordering};

/// Lifecycle state of one downstream endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
#[repr(u32)]
pub enum EndpointStatus {
    /// Constructed or shut down; no client exists
    Inactive = 0,
    /// Connect in progress
    Starting = 1,
    /// Healthy; posts go to the wire
    Active = 2,
    /// Administratively disabled; never connects, never pings
    Suspended = 3,
    /// Connect or health check failed; posts buffer or reject
    Failed = 4,
    /// Writes are being discarded
    Drop = 5,
}

impl EndpointStatus {
    /// Lowercase name used in the status document
    pub fn as_str(&self) -> &'static str {
        match self {
            EndpointStatus::Inactive => "inactive",
            EndpointStatus::Starting => "starting",
            EndpointStatus::Active => "active",
            EndpointStatus::Suspended => "suspended",
            EndpointStatus::Failed => "failed",
            EndpointStatus::Drop => "drop",
        }
    }

    fn from_u32(raw: u32) -> Self {
        match raw {
            1 => EndpointStatus::Starting,
            2 => EndpointStatus::Active,
            3 => EndpointStatus::Suspended,
            4 => EndpointStatus::Failed,
            5 => EndpointStatus::Drop,
            _ => EndpointStatus::Inactive,
        }
    }
}

impl fmt::Display for EndpointStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One-word atomic holder for an [`EndpointStatus`]
#[derive(Debug)]
pub(crate) struct StatusCell(AtomicU32);

impl StatusCell {
    pub fn new(initial: EndpointStatus) -> Self {
        Self(AtomicU32::new(initial as u32))
    }

    pub fn load(&self) -> EndpointStatus {
        EndpointStatus::from_u32(self.0.load(Ordering::SeqCst))
    }

    pub fn store(&self, status: EndpointStatus) {
        self.0.store(status as u32, Ordering::SeqCst);
    }
}
