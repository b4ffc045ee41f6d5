//! Fleet error taxonomy
//!
//! Transient, component-local errors (single probe timeouts, single poll
//! failures) are absorbed into counters and never surface here. These
//! variants cover decisions with externally visible consequences: rejected
//! scale requests, exhausted start retries, skipped reloads, forced kills.

use std::time::Duration;

use thiserror::Error;

use crate::runtime::RuntimeError;
use crate::worker::WorkerId;

/// Operator-visible fleet errors
#[derive(Debug, Error)]
pub enum FleetError {
    /// A requested scale/capacity change would exceed the resource ceiling.
    /// Rejected before any mutation; no partial effect.
    #[error("capacity exceeded: requested {requested} exceeds the configured ceiling of {ceiling}")]
    CapacityExceeded { requested: u64, ceiling: u64 },

    /// A requested worker count would exceed the deterministic port layout
    #[error("scale to {requested} workers exceeds the configured maximum of {max}")]
    WorkerLimitExceeded { requested: u16, max: u16 },

    /// The launch capability failed after bounded retries; the slot is
    /// marked Failed and an alert recorded
    #[error("worker {id} failed to start after {attempts} attempts: {reason}")]
    WorkerStartFailed {
        id: WorkerId,
        attempts: u32,
        reason: String,
    },

    /// A probe did not answer within its timeout. Transient: contributes to
    /// the failure counter, never immediately fatal.
    #[error("probe of worker {id} timed out after {timeout:?}")]
    ProbeTimeout { id: WorkerId, timeout: Duration },

    /// Structural validation of generated balancer configuration failed;
    /// the reload is skipped and the last-good config stays active
    #[error("generated balancer config is invalid: {0}")]
    ConfigInvalid(String),

    /// Graceful stop exceeded its bound and was escalated to a forced kill
    #[error("worker {id} did not drain within {timeout:?}; termination was forced")]
    DrainTimeout { id: WorkerId, timeout: Duration },

    /// Command referenced an id the fleet does not track
    #[error("no worker with id {0}")]
    UnknownWorker(WorkerId),

    /// The supervisor actor is gone; its command channel is closed
    #[error("fleet supervisor is not running")]
    SupervisorGone,

    /// Failure in the external process-launch capability
    #[error("worker runtime error: {0}")]
    Runtime(#[from] RuntimeError),
}

/// Result type alias for fleet operations
pub type Result<T> = std::result::Result<T, FleetError>;
