//! The fleet supervisor actor
//!
//! One task owns the mutable [`Fleet`]. Everything reaches it through
//! channels: operator commands over mpsc, health events over mpsc, published
//! state over a watch channel. A reconcile pass runs on a fixed interval and
//! after every command or applied event; before each pass the actor drains
//! whatever queued up, so rapid successive commands converge only to the
//! final desired state.

use std::sync::Arc;

use chrono::Utc;
use tokio::sync::{mpsc, oneshot, watch};
use tokio::time::{interval, sleep, MissedTickBehavior};
use tracing::{debug, error, info, warn};

use convoy_balancer::{generate, Balancer};
use convoy_config::{BalancerConfig, ConvoyConfig, FleetConfig, SupervisorConfig};
use convoy_core::{
    AlertKind, Fleet, FleetError, FleetLimits, FleetSnapshot, HealthEvent, LaunchSpec, PortPlan,
    StopOutcome, TransitionReason, WorkerId, WorkerRuntime, WorkerState,
};

use crate::backoff::StartBackoff;
use crate::command::{FleetCommand, FleetHandle};
use crate::plan::{next_actions, ReconcileAction};

/// Operator commands in flight; senders briefly block past this
const COMMAND_BUFFER: usize = 32;
/// Health events in flight; sized for several sweeps of a full fleet
const EVENT_BUFFER: usize = 256;

/// Owns the fleet and runs the control loop
pub struct Supervisor {
    fleet: Fleet,
    config: SupervisorConfig,
    fleet_config: FleetConfig,
    balancer_config: BalancerConfig,
    runtime: Arc<dyn WorkerRuntime>,
    balancer: Balancer,
    backoff: StartBackoff,
    commands: mpsc::Receiver<FleetCommand>,
    events: mpsc::Receiver<HealthEvent>,
    snapshots: watch::Sender<FleetSnapshot>,
    commands_open: bool,
    events_open: bool,
    /// Edge trigger for balancer alerts: one alert per outage, not per pass
    balancer_failing: bool,
}

impl Supervisor {
    /// Build a supervisor and its channel endpoints. The caller spawns
    /// [`Supervisor::run`], hands the event sender to the health monitor,
    /// and distributes the snapshot receiver to reporting components.
    pub fn new(
        config: &ConvoyConfig,
        runtime: Arc<dyn WorkerRuntime>,
        balancer: Balancer,
    ) -> (
        Self,
        FleetHandle,
        mpsc::Sender<HealthEvent>,
        watch::Receiver<FleetSnapshot>,
    ) {
        let (command_tx, command_rx) = mpsc::channel(COMMAND_BUFFER);
        let (event_tx, event_rx) = mpsc::channel(EVENT_BUFFER);
        let (snapshot_tx, snapshot_rx) = watch::channel(FleetSnapshot::empty());

        let limits = FleetLimits {
            max_total_clients: config.fleet.max_total_clients,
            max_capacity_per_worker: config.fleet.max_capacity_per_worker,
            max_workers: config.fleet.max_workers,
        };
        let ports = PortPlan {
            bind_addr: config.fleet.bind_addr,
            base_port: config.fleet.base_port,
            metrics_base_port: config.fleet.metrics_base_port,
        };

        let supervisor = Self {
            fleet: Fleet::new(limits, ports),
            config: config.supervisor.clone(),
            fleet_config: config.fleet.clone(),
            balancer_config: config.balancer.clone(),
            backoff: StartBackoff::from_config(&config.supervisor),
            runtime,
            balancer,
            commands: command_rx,
            events: event_rx,
            snapshots: snapshot_tx,
            commands_open: true,
            events_open: true,
            balancer_failing: false,
        };

        (supervisor, FleetHandle::new(command_tx), event_tx, snapshot_rx)
    }

    /// Run the control loop until shutdown, then drain the fleet
    pub async fn run(mut self) {
        // Startup takes the same validated path as an operator scale request
        let count = self.fleet_config.target_count;
        let capacity = self.fleet_config.per_worker_capacity;
        if let Err(err) = self.fleet.request_scale(count, capacity) {
            error!(count, capacity, error = %err, "configured fleet size rejected; starting empty");
            self.fleet.push_alert(AlertKind::CapacityExceeded, err.to_string());
        } else {
            info!(count, capacity, "fleet supervisor starting");
        }
        self.publish();

        let shutdown_reply = self.serve().await;

        self.shutdown_fleet().await;
        info!("fleet supervisor stopped");
        if let Some(reply) = shutdown_reply {
            let _ = reply.send(());
        }
    }

    /// The actor loop. Returns the shutdown reply sender once a shutdown
    /// command arrives.
    async fn serve(&mut self) -> Option<oneshot::Sender<()>> {
        let mut ticker = interval(self.config.reconcile_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = ticker.tick() => {}
                command = self.commands.recv(), if self.commands_open => match command {
                    Some(command) => {
                        if let Some(reply) = self.handle_command(command) {
                            return Some(reply);
                        }
                    }
                    None => self.commands_open = false,
                },
                event = self.events.recv(), if self.events_open => match event {
                    Some(event) => self.handle_event(event),
                    None => self.events_open = false,
                },
            }

            // Coalesce everything that queued up before acting on it
            if let Some(reply) = self.drain_pending() {
                return Some(reply);
            }

            self.reconcile().await;
            self.sync_balancer().await;
            self.publish();
        }
    }

    /// Apply all queued events and commands without blocking. Rapid
    /// successive scale requests collapse here: only the final desired
    /// state is reconciled against.
    fn drain_pending(&mut self) -> Option<oneshot::Sender<()>> {
        while let Ok(event) = self.events.try_recv() {
            self.handle_event(event);
        }
        while let Ok(command) = self.commands.try_recv() {
            if let Some(reply) = self.handle_command(command) {
                return Some(reply);
            }
        }
        None
    }

    /// Apply one command to desired state. Commands never touch processes
    /// directly; reconcile does the converging. Returns the reply sender
    /// when the command was a shutdown request.
    fn handle_command(&mut self, command: FleetCommand) -> Option<oneshot::Sender<()>> {
        match command {
            FleetCommand::ScaleTo {
                count,
                capacity,
                reply,
            } => {
                let result = self.fleet.request_scale(count, capacity);
                match &result {
                    Ok(()) => info!(count, capacity, "scale request accepted"),
                    Err(err) => {
                        warn!(count, capacity, error = %err, "scale request rejected");
                        self.fleet.push_alert(AlertKind::CapacityExceeded, err.to_string());
                    }
                }
                let _ = reply.send(result);
            }
            FleetCommand::ReplaceWorker { id, reply } => {
                let result = self
                    .fleet
                    .apply_transition(id, WorkerState::Failed, &TransitionReason::Manual, Utc::now())
                    .map(|_| ());
                if result.is_ok() {
                    info!(worker = %id, "operator requested replacement");
                }
                let _ = reply.send(result);
            }
            FleetCommand::OverrideHealth { id, state, reply } => {
                let to = state.as_worker_state();
                let result = self
                    .fleet
                    .apply_transition(id, to, &TransitionReason::Manual, Utc::now())
                    .map(|_| ());
                if result.is_ok() {
                    info!(worker = %id, state = %to, "operator health override applied");
                }
                let _ = reply.send(result);
            }
            FleetCommand::CapacityPressure { total_observed } => {
                self.handle_capacity_pressure(total_observed);
            }
            FleetCommand::Snapshot { reply } => {
                let _ = reply.send(self.fleet.snapshot());
            }
            FleetCommand::Shutdown { reply } => {
                info!("shutdown requested");
                return Some(reply);
            }
        }
        None
    }

    /// Apply a monitor event to the fleet. Stale events (terminal workers,
    /// ids the fleet no longer tracks) are dropped.
    fn handle_event(&mut self, event: HealthEvent) {
        match event {
            HealthEvent::Transition { id, to, reason, at } => {
                match self.fleet.apply_transition(id, to, &reason, at) {
                    Ok(previous) => {
                        if previous != to && !previous.is_terminal() {
                            info!(worker = %id, from = %previous, to = %to, %reason, "worker state changed");
                        }
                    }
                    Err(err) => debug!(worker = %id, error = %err, "dropping stale health event"),
                }
            }
            HealthEvent::BalancerUnreachable { endpoint, error } => {
                warn!(%endpoint, error, "load balancer unreachable");
                self.fleet.push_alert(
                    AlertKind::BalancerFailed,
                    format!("balancer at {endpoint} unreachable: {error}"),
                );
            }
        }
    }

    /// One reconcile pass: plan against current state, execute serially.
    /// A command arriving mid-pass supersedes the rest of the plan; the
    /// current step always completes (a drain is never abandoned).
    async fn reconcile(&mut self) {
        for action in next_actions(&self.fleet) {
            match action {
                ReconcileAction::Stop(id) => self.drain_and_remove(id).await,
                ReconcileAction::Replace(id) => self.replace(id).await,
                ReconcileAction::Start(id) => self.start_worker(id).await,
            }
            if !self.commands.is_empty() {
                debug!("reconcile pass superseded by queued commands");
                return;
            }
        }
    }

    /// Drain-before-remove: the worker leaves the balancer upstreams first,
    /// then the process is stopped, then the slot is cleared
    async fn drain_and_remove(&mut self, id: WorkerId) {
        if self.fleet.mark_stopping(id).is_err() {
            return;
        }
        self.publish();
        self.sync_balancer().await;
        self.stop_process(id).await;
        self.fleet.remove(id);
        self.publish();
        info!(worker = %id, "worker removed");
    }

    /// Tear down a Failed worker and launch a successor under the same id,
    /// endpoint, and data directory
    async fn replace(&mut self, id: WorkerId) {
        info!(worker = %id, "replacing worker");
        self.drain_and_remove(id).await;
        self.start_worker(id).await;
    }

    /// Stop the process with a bounded grace period. A forced kill is an
    /// operator-visible event.
    async fn stop_process(&mut self, id: WorkerId) {
        match self.runtime.stop(id, self.config.drain_timeout).await {
            Ok(StopOutcome::Graceful) => debug!(worker = %id, "worker stopped gracefully"),
            Ok(StopOutcome::Forced) => {
                let err = FleetError::DrainTimeout {
                    id,
                    timeout: self.config.drain_timeout,
                };
                warn!(worker = %id, grace = ?self.config.drain_timeout, "drain timed out; termination forced");
                self.fleet.push_alert(AlertKind::DrainTimeout, err.to_string());
            }
            Ok(StopOutcome::NotRunning) => debug!(worker = %id, "no process tracked for worker"),
            Err(err) => warn!(worker = %id, error = %err, "stop failed; slot cleared anyway"),
        }
    }

    /// Launch a worker with bounded retries. Exhaustion marks the slot
    /// Failed and records an alert; the next pass tries again from scratch.
    async fn start_worker(&mut self, id: WorkerId) {
        let spec = self.launch_spec(id);
        let attempts = self.config.start_max_attempts.max(1);
        let mut last_error = String::new();

        for attempt in 1..=attempts {
            match self.runtime.launch(&spec).await {
                Ok(()) => {
                    let worker = self.fleet.new_worker(id);
                    info!(worker = %id, endpoint = %worker.endpoint, attempt, "worker launched");
                    self.fleet.insert(worker);
                    return;
                }
                Err(err) => {
                    warn!(worker = %id, attempt, error = %err, "worker launch failed");
                    last_error = err.to_string();
                    if attempt < attempts {
                        sleep(self.backoff.delay_for(attempt)).await;
                    }
                }
            }
        }

        let err = FleetError::WorkerStartFailed {
            id,
            attempts,
            reason: last_error,
        };
        error!(worker = %id, error = %err, "giving up on worker launch");
        self.fleet.push_alert(AlertKind::WorkerStartFailed, err.to_string());
        let mut worker = self.fleet.new_worker(id);
        worker.state = WorkerState::Failed;
        self.fleet.insert(worker);
    }

    fn launch_spec(&self, id: WorkerId) -> LaunchSpec {
        let ports = self.fleet.ports();
        LaunchSpec {
            id,
            endpoint: ports.endpoint(id),
            metrics_addr: ports.metrics_addr(id),
            max_clients: self.fleet.per_worker_capacity(),
            bandwidth_mbps: self.fleet_config.bandwidth_mbps,
            // Replacements reuse the directory, and with it the proxy identity
            data_dir: self.fleet_config.data_root.join(format!("worker-{id}")),
        }
    }

    /// Redistribute observed load over the routable workers, never past the
    /// resource ceiling (fail-closed). Symmetric: when pressure subsides the
    /// capacity falls back to the baseline.
    fn handle_capacity_pressure(&mut self, total_observed: u64) {
        let live = self.fleet.routable().count() as u32;
        if live == 0 {
            debug!(observed = total_observed, "capacity pressure with no routable workers");
            return;
        }

        let limits = *self.fleet.limits();
        let upper = limits
            .max_capacity_per_worker
            .min(limits.max_total_clients / live);
        let baseline = self.fleet.per_worker_capacity();
        let per_worker = total_observed.div_ceil(u64::from(live));
        let target = per_worker.max(u64::from(baseline)).min(u64::from(upper)) as u32;

        let changed = self.fleet.set_routable_capacity(target);
        if changed > 0 {
            info!(
                observed = total_observed,
                live,
                capacity = target,
                "per-worker capacity adjusted"
            );
            self.fleet.push_alert(
                AlertKind::CapacityAdjusted,
                format!(
                    "per-worker capacity set to {target} across {live} routable workers (observed {total_observed})"
                ),
            );
        }
    }

    /// Bring the applied balancer configuration in line with the current
    /// routable set. No-op when the rendered bytes match what is live.
    async fn sync_balancer(&mut self) {
        let snapshot = self.fleet.snapshot();
        // Cold start: nothing applied and nothing routable yet
        if self.balancer.last_applied().is_none() && snapshot.routable().next().is_none() {
            return;
        }

        let config = generate(&snapshot, &self.balancer_config);
        match self.balancer.apply(&config).await {
            Ok(_) => self.balancer_failing = false,
            Err(err) => {
                warn!(error = %err, "balancer update failed; last good configuration stays live");
                if !self.balancer_failing {
                    self.balancer_failing = true;
                    self.fleet.push_alert(AlertKind::BalancerFailed, err.to_string());
                }
            }
        }
    }

    /// Drain every worker and clear the fleet. The applied balancer
    /// configuration is left as-is; the balancer outlives the supervisor.
    async fn shutdown_fleet(&mut self) {
        let ids: Vec<WorkerId> = self.fleet.live().map(|w| w.id).collect();
        if !ids.is_empty() {
            info!(workers = ids.len(), "draining fleet for shutdown");
        }
        for &id in &ids {
            let _ = self.fleet.mark_stopping(id);
        }
        self.publish();

        for id in ids {
            self.stop_process(id).await;
            self.fleet.remove(id);
        }
        self.publish();
    }

    fn publish(&self) {
        self.snapshots.send_replace(self.fleet.snapshot());
    }
}
