//! Health events flowing from the monitor to the supervisor
//!
//! Detection and remediation are separated: the monitor classifies liveness
//! and emits these events; only the supervisor mutates fleet state.

use std::fmt;
use std::net::SocketAddr;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::worker::{WorkerId, WorkerState};

/// Why a liveness classification changed
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransitionReason {
    /// A probe of the worker's endpoint succeeded
    ProbeSucceeded,
    /// Consecutive probe failures, count at classification time
    ProbeFailures { consecutive: u32 },
    /// The worker process exited on its own
    ProcessExited { code: Option<i32> },
    /// The worker process was killed by resource exhaustion
    OutOfResource,
    /// Operator override
    Manual,
}

impl fmt::Display for TransitionReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TransitionReason::ProbeSucceeded => write!(f, "probe succeeded"),
            TransitionReason::ProbeFailures { consecutive } => {
                write!(f, "{} consecutive probe failures", consecutive)
            }
            TransitionReason::ProcessExited { code: Some(code) } => {
                write!(f, "process exited with code {}", code)
            }
            TransitionReason::ProcessExited { code: None } => write!(f, "process exited"),
            TransitionReason::OutOfResource => write!(f, "killed by resource exhaustion"),
            TransitionReason::Manual => write!(f, "operator override"),
        }
    }
}

/// State-change events emitted by the health monitor
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub enum HealthEvent {
    /// A worker's classified liveness changed
    Transition {
        id: WorkerId,
        to: WorkerState,
        reason: TransitionReason,
        at: DateTime<Utc>,
    },
    /// The external load balancer stopped answering its liveness probe.
    /// The supervisor cannot replace the balancer; it records an alert.
    BalancerUnreachable { endpoint: SocketAddr, error: String },
}

impl HealthEvent {
    pub fn transition(id: WorkerId, to: WorkerState, reason: TransitionReason) -> Self {
        HealthEvent::Transition {
            id,
            to,
            reason,
            at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn reason_display_is_log_friendly() {
        assert_eq!(
            TransitionReason::ProbeFailures { consecutive: 3 }.to_string(),
            "3 consecutive probe failures"
        );
        assert_eq!(
            TransitionReason::ProcessExited { code: Some(137) }.to_string(),
            "process exited with code 137"
        );
        assert_eq!(
            TransitionReason::OutOfResource.to_string(),
            "killed by resource exhaustion"
        );
    }

    #[test]
    fn events_serialize_round_trip() {
        let event = HealthEvent::transition(
            WorkerId(3),
            WorkerState::Failed,
            TransitionReason::ProbeFailures { consecutive: 3 },
        );
        let json = serde_json::to_string(&event).unwrap();
        let back: HealthEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(event, back);
    }
}
