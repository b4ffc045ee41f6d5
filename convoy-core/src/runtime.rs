//! Boundary to the external process-launch capability
//!
//! The proxy binary itself is an opaque external collaborator. Everything
//! Convoy needs from it goes through [`WorkerRuntime`]: launch with derived
//! parameters, stop with drain-then-force semantics, and process-condition
//! queries for the health monitor's out-of-resource watch.

use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

use async_trait::async_trait;
use thiserror::Error;

use crate::worker::{WorkerEndpoint, WorkerId};

/// Parameters for launching one worker process
#[derive(Debug, Clone, PartialEq)]
pub struct LaunchSpec {
    /// Slot identity; also keys the runtime's process tracking
    pub id: WorkerId,
    /// Loopback address the proxy must bind
    pub endpoint: WorkerEndpoint,
    /// Loopback address for the worker's metrics listener
    pub metrics_addr: SocketAddr,
    /// Max concurrent clients the worker may accept
    pub max_clients: u32,
    /// Per-worker bandwidth limit in Mbit/s
    pub bandwidth_mbps: f64,
    /// Directory holding the worker's persistent proxy identity; reused by
    /// replacements so the slot keeps its keys
    pub data_dir: PathBuf,
}

/// How a stop concluded
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StopOutcome {
    /// Exited within the grace period after the termination request
    Graceful,
    /// Still alive after the grace period; killed
    Forced,
    /// No process was tracked for the id
    NotRunning,
}

/// Last observed condition of a worker process
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProcessState {
    Running,
    /// Exited on its own. `oom_suspected` is set when the exit looks like a
    /// kill by the kernel's resource control rather than a clean shutdown.
    Exited {
        code: Option<i32>,
        oom_suspected: bool,
    },
    /// The runtime has no record of the id
    Unknown,
}

/// Errors from the launch capability
#[derive(Debug, Error)]
pub enum RuntimeError {
    #[error("launch failed: {0}")]
    LaunchFailed(String),

    #[error("process operation failed: {0}")]
    Io(#[from] std::io::Error),
}

/// External process-launch capability: an OS process spawner, a container
/// runtime, or a test double. Implementations track processes by worker id.
#[async_trait]
pub trait WorkerRuntime: Send + Sync {
    /// Spawn a worker process. Returns once the process is running;
    /// readiness is the health monitor's concern.
    async fn launch(&self, spec: &LaunchSpec) -> Result<(), RuntimeError>;

    /// Request a graceful stop, escalating to forced termination once
    /// `grace` elapses. Does not return until the process is gone.
    async fn stop(&self, id: WorkerId, grace: Duration) -> Result<StopOutcome, RuntimeError>;

    /// Current condition of the tracked process for `id`
    async fn status(&self, id: WorkerId) -> ProcessState;
}
