//! Worker identity, addressing, and lifecycle state

use std::fmt;
use std::net::{IpAddr, SocketAddr};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::events::TransitionReason;

/// Stable identity of a worker slot (1..=N).
///
/// Ids survive replacement: a fresh worker reuses its predecessor's id,
/// endpoint, and data directory, so the balancer configuration keeps its
/// shape across replacements.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerId(pub u16);

impl WorkerId {
    pub fn as_u16(&self) -> u16 {
        self.0
    }
}

impl fmt::Display for WorkerId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<u16> for WorkerId {
    fn from(id: u16) -> Self {
        WorkerId(id)
    }
}

/// Loopback socket a worker binds to. Never exposed externally; public
/// traffic reaches workers only through the load balancer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct WorkerEndpoint(pub SocketAddr);

impl WorkerEndpoint {
    pub fn new(addr: IpAddr, port: u16) -> Self {
        WorkerEndpoint(SocketAddr::new(addr, port))
    }

    pub fn addr(&self) -> SocketAddr {
        self.0
    }

    pub fn port(&self) -> u16 {
        self.0.port()
    }
}

impl fmt::Display for WorkerEndpoint {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Deterministic port layout.
///
/// Worker and metrics ports are pure functions of the worker id, so a
/// replacement binds exactly where its predecessor did and regeneration of
/// downstream configuration is idempotent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PortPlan {
    /// Loopback address all workers bind to
    pub bind_addr: IpAddr,
    /// Worker `id` listens on `base_port + id`
    pub base_port: u16,
    /// Worker `id` serves metrics on `metrics_base_port + id`
    pub metrics_base_port: u16,
}

impl PortPlan {
    pub fn endpoint(&self, id: WorkerId) -> WorkerEndpoint {
        WorkerEndpoint::new(self.bind_addr, self.base_port + id.as_u16())
    }

    pub fn metrics_addr(&self, id: WorkerId) -> SocketAddr {
        SocketAddr::new(self.bind_addr, self.metrics_base_port + id.as_u16())
    }
}

/// Lifecycle state of a worker slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum WorkerState {
    /// Process launched, no successful probe yet
    Starting,
    /// Probes succeeding
    Healthy,
    /// Probe failures below the failure threshold
    Degraded,
    /// Failure threshold reached, or the process exited; awaiting replacement
    Failed,
    /// Stop issued, draining connections
    Stopping,
    /// Process confirmed gone; slot is free
    Removed,
}

impl WorkerState {
    /// Eligible to receive traffic: appears in balancer upstreams
    pub fn is_routable(&self) -> bool {
        matches!(self, WorkerState::Healthy | WorkerState::Degraded)
    }

    /// On its way out; not probed and not replaced
    pub fn is_terminal(&self) -> bool {
        matches!(self, WorkerState::Stopping | WorkerState::Removed)
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            WorkerState::Starting => "starting",
            WorkerState::Healthy => "healthy",
            WorkerState::Degraded => "degraded",
            WorkerState::Failed => "failed",
            WorkerState::Stopping => "stopping",
            WorkerState::Removed => "removed",
        }
    }
}

impl fmt::Display for WorkerState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// One managed instance of the external proxy binary
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Worker {
    /// Stable slot identity
    pub id: WorkerId,

    /// Loopback endpoint the proxy listens on
    pub endpoint: WorkerEndpoint,

    /// Loopback endpoint of the worker's metrics listener
    pub metrics_addr: SocketAddr,

    /// Max concurrent clients assigned to this worker
    pub desired_capacity: u32,

    /// Current lifecycle state
    pub state: WorkerState,

    /// Probe failures since the last success
    pub consecutive_failures: u32,

    /// Last time a probe of this worker succeeded
    pub last_seen_healthy: Option<DateTime<Utc>>,

    /// Launch time of the current incarnation; a replacement gets a fresh
    /// value under the same id
    pub started_at: DateTime<Utc>,
}

impl Worker {
    pub fn new(id: WorkerId, ports: &PortPlan, desired_capacity: u32) -> Self {
        Self {
            id,
            endpoint: ports.endpoint(id),
            metrics_addr: ports.metrics_addr(id),
            desired_capacity,
            state: WorkerState::Starting,
            consecutive_failures: 0,
            last_seen_healthy: None,
            started_at: Utc::now(),
        }
    }

    /// Apply a classified health transition, keeping the bookkeeping fields
    /// consistent with the reason.
    pub fn apply_transition(&mut self, to: WorkerState, reason: &TransitionReason, at: DateTime<Utc>) {
        match reason {
            TransitionReason::ProbeSucceeded => {
                self.consecutive_failures = 0;
                self.last_seen_healthy = Some(at);
            }
            TransitionReason::ProbeFailures { consecutive } => {
                self.consecutive_failures = *consecutive;
            }
            TransitionReason::ProcessExited { .. }
            | TransitionReason::OutOfResource
            | TransitionReason::Manual => {}
        }
        self.state = to;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::net::Ipv4Addr;

    fn plan() -> PortPlan {
        PortPlan {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 14000,
            metrics_base_port: 15000,
        }
    }

    #[test]
    fn ports_derive_from_id() {
        let ports = plan();
        let id = WorkerId(3);
        assert_eq!(ports.endpoint(id).to_string(), "127.0.0.1:14003");
        assert_eq!(ports.metrics_addr(id).to_string(), "127.0.0.1:15003");
    }

    #[test]
    fn replacement_reuses_endpoint() {
        let ports = plan();
        let first = Worker::new(WorkerId(2), &ports, 250);
        let second = Worker::new(WorkerId(2), &ports, 250);
        assert_eq!(first.endpoint, second.endpoint);
        assert_eq!(first.metrics_addr, second.metrics_addr);
        assert_eq!(second.state, WorkerState::Starting);
    }

    #[test]
    fn routable_states() {
        assert!(WorkerState::Healthy.is_routable());
        assert!(WorkerState::Degraded.is_routable());
        assert!(!WorkerState::Starting.is_routable());
        assert!(!WorkerState::Failed.is_routable());
        assert!(!WorkerState::Stopping.is_routable());
        assert!(!WorkerState::Removed.is_routable());
    }

    #[test]
    fn successful_probe_resets_failures() {
        let mut worker = Worker::new(WorkerId(1), &plan(), 100);
        worker.apply_transition(
            WorkerState::Degraded,
            &TransitionReason::ProbeFailures { consecutive: 2 },
            Utc::now(),
        );
        assert_eq!(worker.consecutive_failures, 2);

        let at = Utc::now();
        worker.apply_transition(WorkerState::Healthy, &TransitionReason::ProbeSucceeded, at);
        assert_eq!(worker.consecutive_failures, 0);
        assert_eq!(worker.last_seen_healthy, Some(at));
        assert_eq!(worker.state, WorkerState::Healthy);
    }
}
