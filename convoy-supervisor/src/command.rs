//! Commands into the supervisor actor and the cloneable operator handle

use tokio::sync::{mpsc, oneshot};

use convoy_core::{FleetError, FleetSnapshot, WorkerId, WorkerState};

/// Operator-forced health classification
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthOverride {
    Healthy,
    Degraded,
    Failed,
}

impl HealthOverride {
    pub fn as_worker_state(&self) -> WorkerState {
        match self {
            HealthOverride::Healthy => WorkerState::Healthy,
            HealthOverride::Degraded => WorkerState::Degraded,
            HealthOverride::Failed => WorkerState::Failed,
        }
    }
}

/// Requests the supervisor actor processes, one at a time
#[derive(Debug)]
pub enum FleetCommand {
    ScaleTo {
        count: u16,
        capacity: u32,
        reply: oneshot::Sender<Result<(), FleetError>>,
    },
    ReplaceWorker {
        id: WorkerId,
        reply: oneshot::Sender<Result<(), FleetError>>,
    },
    OverrideHealth {
        id: WorkerId,
        state: HealthOverride,
        reply: oneshot::Sender<Result<(), FleetError>>,
    },
    CapacityPressure {
        total_observed: u64,
    },
    Snapshot {
        reply: oneshot::Sender<FleetSnapshot>,
    },
    Shutdown {
        reply: oneshot::Sender<()>,
    },
}

/// Cloneable, channel-backed handle to a running supervisor.
///
/// Every method fails with [`FleetError::SupervisorGone`] once the actor has
/// stopped.
#[derive(Debug, Clone)]
pub struct FleetHandle {
    commands: mpsc::Sender<FleetCommand>,
}

impl FleetHandle {
    pub(crate) fn new(commands: mpsc::Sender<FleetCommand>) -> Self {
        Self { commands }
    }

    async fn request<T>(
        &self,
        command: FleetCommand,
        reply: oneshot::Receiver<T>,
    ) -> Result<T, FleetError> {
        self.commands
            .send(command)
            .await
            .map_err(|_| FleetError::SupervisorGone)?;
        reply.await.map_err(|_| FleetError::SupervisorGone)
    }

    /// Request a new desired worker count and per-worker capacity.
    ///
    /// Validated against the fleet limits before any mutation; a rejected
    /// request has no effect at all.
    pub async fn scale_to(&self, count: u16, capacity: u32) -> Result<(), FleetError> {
        let (tx, rx) = oneshot::channel();
        self.request(
            FleetCommand::ScaleTo {
                count,
                capacity,
                reply: tx,
            },
            rx,
        )
        .await?
    }

    /// Mark a worker for replacement. The next reconcile pass drains it and
    /// launches a successor under the same id and endpoint.
    pub async fn replace_worker(&self, id: WorkerId) -> Result<(), FleetError> {
        let (tx, rx) = oneshot::channel();
        self.request(FleetCommand::ReplaceWorker { id, reply: tx }, rx)
            .await?
    }

    /// Force a worker's health classification, bypassing probe evidence
    pub async fn override_health(
        &self,
        id: WorkerId,
        state: HealthOverride,
    ) -> Result<(), FleetError> {
        let (tx, rx) = oneshot::channel();
        self.request(FleetCommand::OverrideHealth { id, state, reply: tx }, rx)
            .await?
    }

    /// Report aggregate observed client load. Fire-and-forget: when the
    /// supervisor's queue is full the report is dropped; the next poll's
    /// report supersedes it anyway.
    pub fn capacity_pressure(&self, total_observed: u64) {
        let _ = self
            .commands
            .try_send(FleetCommand::CapacityPressure { total_observed });
    }

    /// Current fleet state, alerts included
    pub async fn snapshot(&self) -> Result<FleetSnapshot, FleetError> {
        let (tx, rx) = oneshot::channel();
        self.request(FleetCommand::Snapshot { reply: tx }, rx).await
    }

    /// Drain and stop every worker, then stop the actor. Resolves once the
    /// fleet is down.
    pub async fn shutdown(&self) -> Result<(), FleetError> {
        let (tx, rx) = oneshot::channel();
        self.request(FleetCommand::Shutdown { reply: tx }, rx).await
    }
}
