//! The probing sweep: classify each worker's liveness and report
//! transitions to the supervisor
//!
//! The monitor never mutates fleet state. It reads the latest snapshot,
//! probes, and emits [`HealthEvent`]s; the supervisor decides what to do
//! with them. Counters live here, keyed by worker incarnation, so a
//! replacement under a reused id starts with a clean slate.

use std::collections::HashMap;
use std::sync::Arc;

use chrono::{DateTime, Utc};
use tokio::sync::{broadcast, mpsc, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, info, warn};

use convoy_config::HealthConfig;
use convoy_core::{
    FleetSnapshot, HealthEvent, ProcessState, TransitionReason, Worker, WorkerId, WorkerRuntime,
    WorkerState,
};

use crate::error::ProbeError;
use crate::probe::WorkerProber;

/// Per-incarnation probe bookkeeping
struct ProbeRecord {
    started_at: DateTime<Utc>,
    failures: u32,
}

/// Periodically probes every probeable worker plus the balancer endpoint
pub struct HealthMonitor {
    config: HealthConfig,
    prober: Arc<dyn WorkerProber>,
    runtime: Arc<dyn WorkerRuntime>,
    snapshots: watch::Receiver<FleetSnapshot>,
    events: mpsc::Sender<HealthEvent>,
    shutdown: broadcast::Receiver<()>,
    records: HashMap<WorkerId, ProbeRecord>,
    balancer_down: bool,
}

impl HealthMonitor {
    pub fn new(
        config: HealthConfig,
        prober: Arc<dyn WorkerProber>,
        runtime: Arc<dyn WorkerRuntime>,
        snapshots: watch::Receiver<FleetSnapshot>,
        events: mpsc::Sender<HealthEvent>,
        shutdown: broadcast::Receiver<()>,
    ) -> Self {
        Self {
            config,
            prober,
            runtime,
            snapshots,
            events,
            shutdown,
            records: HashMap::new(),
            balancer_down: false,
        }
    }

    /// Start the probing loop on its own task
    pub fn spawn(mut self) -> tokio::task::JoinHandle<()> {
        tokio::spawn(async move {
            self.run().await;
        })
    }

    async fn run(&mut self) {
        let mut interval = tokio::time::interval(self.config.probe_interval);
        interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

        loop {
            tokio::select! {
                _ = interval.tick() => self.sweep().await,
                _ = self.shutdown.recv() => {
                    debug!("health monitor stopping");
                    return;
                }
            }
        }
    }

    /// One probing pass over the current snapshot
    async fn sweep(&mut self) {
        let snapshot = self.snapshots.borrow().clone();
        let now = Utc::now();

        self.prune_records(&snapshot);

        // Only states the monitor can still influence are probed. Failed
        // workers await replacement; Stopping and Removed are on their
        // way out.
        let candidates: Vec<Worker> = snapshot
            .workers
            .iter()
            .filter(|w| {
                matches!(
                    w.state,
                    WorkerState::Starting | WorkerState::Healthy | WorkerState::Degraded
                )
            })
            .cloned()
            .collect();

        // Process condition first: a dead process is definitive and the
        // threshold does not apply.
        let mut to_probe = Vec::new();
        for worker in candidates {
            match self.runtime.status(worker.id).await {
                ProcessState::Exited { code, oom_suspected } => {
                    let reason = if oom_suspected {
                        warn!(worker = %worker.id, "worker killed by resource control");
                        TransitionReason::OutOfResource
                    } else {
                        warn!(worker = %worker.id, ?code, "worker process exited");
                        TransitionReason::ProcessExited { code }
                    };
                    self.records.remove(&worker.id);
                    self.emit(HealthEvent::transition(worker.id, WorkerState::Failed, reason))
                        .await;
                }
                ProcessState::Running | ProcessState::Unknown => to_probe.push(worker),
            }
        }

        // Connectivity probes run concurrently, each under the timeout
        let probe_timeout = self.config.probe_timeout;
        let probes: Vec<_> = to_probe
            .into_iter()
            .map(|worker| {
                let prober = Arc::clone(&self.prober);
                async move {
                    let result = prober.probe(worker.endpoint.addr(), probe_timeout).await;
                    (worker, result)
                }
            })
            .collect();
        let results = futures::future::join_all(probes).await;

        for (worker, result) in results {
            if let Some(event) = self.classify(&worker, result, now) {
                self.emit(event).await;
            }
        }

        self.probe_balancer().await;
    }

    /// Turn one probe outcome into at most one state transition
    fn classify(
        &mut self,
        worker: &Worker,
        result: Result<(), ProbeError>,
        now: DateTime<Utc>,
    ) -> Option<HealthEvent> {
        let starting_within_grace =
            worker.state == WorkerState::Starting && self.within_grace(worker, now);
        let record = self.records.entry(worker.id).or_insert(ProbeRecord {
            started_at: worker.started_at,
            failures: 0,
        });
        if record.started_at != worker.started_at {
            // Replacement under the same id; the counter belongs to the
            // old incarnation
            record.started_at = worker.started_at;
            record.failures = 0;
        }

        match result {
            Ok(()) => {
                record.failures = 0;
                match worker.state {
                    WorkerState::Starting | WorkerState::Degraded => Some(HealthEvent::transition(
                        worker.id,
                        WorkerState::Healthy,
                        TransitionReason::ProbeSucceeded,
                    )),
                    _ => None,
                }
            }
            Err(err) => {
                if starting_within_grace {
                    debug!(worker = %worker.id, error = %err, "probe failure within startup grace");
                    return None;
                }

                record.failures += 1;
                let failures = record.failures;

                if failures >= self.config.failure_threshold {
                    warn!(worker = %worker.id, failures, error = %err, "worker reached failure threshold");
                    Some(HealthEvent::transition(
                        worker.id,
                        WorkerState::Failed,
                        TransitionReason::ProbeFailures {
                            consecutive: failures,
                        },
                    ))
                } else if worker.state == WorkerState::Healthy {
                    info!(worker = %worker.id, failures, error = %err, "worker degraded");
                    Some(HealthEvent::transition(
                        worker.id,
                        WorkerState::Degraded,
                        TransitionReason::ProbeFailures {
                            consecutive: failures,
                        },
                    ))
                } else {
                    None
                }
            }
        }
    }

    fn within_grace(&self, worker: &Worker, now: DateTime<Utc>) -> bool {
        match (now - worker.started_at).to_std() {
            Ok(age) => age < self.config.startup_grace,
            // Launch timestamp in the future; treat as just launched
            Err(_) => true,
        }
    }

    /// The balancer is an external collaborator: its failures become
    /// alerts, never replacements. Emits once per outage, not per sweep.
    async fn probe_balancer(&mut self) {
        let Some(addr) = self.config.balancer_probe_addr else {
            return;
        };
        match self.prober.probe(addr, self.config.probe_timeout).await {
            Ok(()) => {
                if self.balancer_down {
                    info!(%addr, "balancer endpoint reachable again");
                    self.balancer_down = false;
                }
            }
            Err(err) => {
                if self.balancer_down {
                    return;
                }
                self.balancer_down = true;
                warn!(%addr, error = %err, "balancer endpoint unreachable");
                self.emit(HealthEvent::BalancerUnreachable {
                    endpoint: addr,
                    error: err.to_string(),
                })
                .await;
            }
        }
    }

    /// Drop counters for ids no longer in the fleet
    fn prune_records(&mut self, snapshot: &FleetSnapshot) {
        self.records
            .retain(|id, _| snapshot.get(*id).is_some_and(|w| !w.state.is_terminal()));
    }

    async fn emit(&mut self, event: HealthEvent) {
        if self.events.send(event).await.is_err() {
            debug!("supervisor gone, dropping health event");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::probe::WorkerProber;
    use async_trait::async_trait;
    use convoy_core::testing::MockWorkerRuntime;
    use convoy_core::PortPlan;
    use std::collections::HashSet;
    use std::net::{IpAddr, Ipv4Addr, SocketAddr};
    use std::sync::Mutex;
    use std::time::Duration;

    /// Probes succeed only for addresses marked up
    struct ScriptedProber {
        up: Mutex<HashSet<SocketAddr>>,
    }

    impl ScriptedProber {
        fn new() -> Self {
            Self {
                up: Mutex::new(HashSet::new()),
            }
        }

        fn set_up(&self, addr: SocketAddr, up: bool) {
            let mut set = self.up.lock().unwrap();
            if up {
                set.insert(addr);
            } else {
                set.remove(&addr);
            }
        }
    }

    #[async_trait]
    impl WorkerProber for ScriptedProber {
        async fn probe(&self, addr: SocketAddr, timeout: Duration) -> Result<(), ProbeError> {
            if self.up.lock().unwrap().contains(&addr) {
                Ok(())
            } else {
                Err(ProbeError::Timeout { timeout })
            }
        }
    }

    fn plan() -> PortPlan {
        PortPlan {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 14000,
            metrics_base_port: 15000,
        }
    }

    fn worker(id: u16, state: WorkerState) -> Worker {
        let mut w = Worker::new(WorkerId(id), &plan(), 250);
        w.state = state;
        w
    }

    /// Worker launched long enough ago that startup grace has lapsed
    fn aged(mut w: Worker) -> Worker {
        w.started_at = Utc::now() - chrono::Duration::seconds(300);
        w
    }

    fn config() -> HealthConfig {
        HealthConfig {
            probe_interval: Duration::from_secs(5),
            probe_timeout: Duration::from_secs(2),
            failure_threshold: 3,
            startup_grace: Duration::from_secs(60),
            balancer_probe_addr: None,
        }
    }

    struct Harness {
        monitor: HealthMonitor,
        snapshots: watch::Sender<FleetSnapshot>,
        events: mpsc::Receiver<HealthEvent>,
        prober: Arc<ScriptedProber>,
        _shutdown: broadcast::Sender<()>,
    }

    fn harness_with(config: HealthConfig, workers: Vec<Worker>, runtime: MockWorkerRuntime) -> Harness {
        let prober = Arc::new(ScriptedProber::new());
        let (snapshot_tx, snapshot_rx) = watch::channel(FleetSnapshot::empty());
        let (event_tx, event_rx) = mpsc::channel(64);
        let (shutdown_tx, shutdown_rx) = broadcast::channel(1);

        let mut snapshot = FleetSnapshot::empty();
        snapshot.workers = workers;
        snapshot_tx.send(snapshot).unwrap();

        let monitor = HealthMonitor::new(
            config,
            prober.clone(),
            Arc::new(runtime),
            snapshot_rx,
            event_tx,
            shutdown_rx,
        );
        Harness {
            monitor,
            snapshots: snapshot_tx,
            events: event_rx,
            prober,
            _shutdown: shutdown_tx,
        }
    }

    fn running_runtime() -> MockWorkerRuntime {
        let mut runtime = MockWorkerRuntime::new();
        runtime.expect_status().returning(|_| ProcessState::Running);
        runtime
    }

    fn endpoint(id: u16) -> SocketAddr {
        plan().endpoint(WorkerId(id)).addr()
    }

    #[tokio::test]
    async fn first_success_promotes_starting_worker() {
        let mut h = harness_with(
            config(),
            vec![worker(1, WorkerState::Starting)],
            running_runtime(),
        );
        h.prober.set_up(endpoint(1), true);

        h.monitor.sweep().await;

        match h.events.try_recv().unwrap() {
            HealthEvent::Transition { id, to, reason, .. } => {
                assert_eq!(id, WorkerId(1));
                assert_eq!(to, WorkerState::Healthy);
                assert_eq!(reason, TransitionReason::ProbeSucceeded);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn healthy_worker_with_passing_probe_stays_silent() {
        let mut h = harness_with(
            config(),
            vec![worker(1, WorkerState::Healthy)],
            running_runtime(),
        );
        h.prober.set_up(endpoint(1), true);

        h.monitor.sweep().await;
        assert!(h.events.try_recv().is_err());
    }

    /// Same worker, same incarnation, different lifecycle state
    fn with_state(w: &Worker, state: WorkerState) -> Worker {
        let mut copy = w.clone();
        copy.state = state;
        copy
    }

    fn publish(h: &Harness, workers: Vec<Worker>) {
        let mut snapshot = FleetSnapshot::empty();
        snapshot.workers = workers;
        h.snapshots.send(snapshot).unwrap();
    }

    #[tokio::test]
    async fn three_failures_degrade_then_fail() {
        let w = worker(1, WorkerState::Healthy);
        let mut h = harness_with(config(), vec![w.clone()], running_runtime());

        // First failure: Healthy -> Degraded
        h.monitor.sweep().await;
        match h.events.try_recv().unwrap() {
            HealthEvent::Transition { to, reason, .. } => {
                assert_eq!(to, WorkerState::Degraded);
                assert_eq!(reason, TransitionReason::ProbeFailures { consecutive: 1 });
            }
            other => panic!("unexpected event {other:?}"),
        }

        // The supervisor applied the transition; reflect it in the snapshot
        publish(&h, vec![with_state(&w, WorkerState::Degraded)]);

        // Second failure: below threshold, no event
        h.monitor.sweep().await;
        assert!(h.events.try_recv().is_err());

        // Third failure: threshold reached, Failed
        h.monitor.sweep().await;
        match h.events.try_recv().unwrap() {
            HealthEvent::Transition { to, reason, .. } => {
                assert_eq!(to, WorkerState::Failed);
                assert_eq!(reason, TransitionReason::ProbeFailures { consecutive: 3 });
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn success_resets_the_failure_counter() {
        let w = worker(1, WorkerState::Healthy);
        let mut h = harness_with(config(), vec![w.clone()], running_runtime());

        // Two failures, then recovery
        h.monitor.sweep().await;
        let _ = h.events.try_recv();
        publish(&h, vec![with_state(&w, WorkerState::Degraded)]);
        h.monitor.sweep().await;

        h.prober.set_up(endpoint(1), true);
        h.monitor.sweep().await;
        match h.events.try_recv().unwrap() {
            HealthEvent::Transition { to, .. } => assert_eq!(to, WorkerState::Healthy),
            other => panic!("unexpected event {other:?}"),
        }

        // Back to failing: the counter starts from scratch, so the next
        // failure degrades rather than fails
        publish(&h, vec![with_state(&w, WorkerState::Healthy)]);
        h.prober.set_up(endpoint(1), false);
        h.monitor.sweep().await;
        match h.events.try_recv().unwrap() {
            HealthEvent::Transition { to, reason, .. } => {
                assert_eq!(to, WorkerState::Degraded);
                assert_eq!(reason, TransitionReason::ProbeFailures { consecutive: 1 });
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn starting_worker_failures_within_grace_are_ignored() {
        let mut h = harness_with(
            config(),
            vec![worker(1, WorkerState::Starting)],
            running_runtime(),
        );

        for _ in 0..5 {
            h.monitor.sweep().await;
        }
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn starting_worker_past_grace_eventually_fails() {
        let mut h = harness_with(
            config(),
            vec![aged(worker(1, WorkerState::Starting))],
            running_runtime(),
        );

        // Below threshold: still Starting, no event
        h.monitor.sweep().await;
        h.monitor.sweep().await;
        assert!(h.events.try_recv().is_err());

        h.monitor.sweep().await;
        match h.events.try_recv().unwrap() {
            HealthEvent::Transition { to, .. } => assert_eq!(to, WorkerState::Failed),
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn process_exit_fails_immediately_bypassing_threshold() {
        let mut runtime = MockWorkerRuntime::new();
        runtime.expect_status().returning(|_| ProcessState::Exited {
            code: Some(1),
            oom_suspected: false,
        });

        let mut h = harness_with(config(), vec![worker(1, WorkerState::Healthy)], runtime);
        // Probe would succeed; the exit wins anyway
        h.prober.set_up(endpoint(1), true);

        h.monitor.sweep().await;
        match h.events.try_recv().unwrap() {
            HealthEvent::Transition { to, reason, .. } => {
                assert_eq!(to, WorkerState::Failed);
                assert_eq!(reason, TransitionReason::ProcessExited { code: Some(1) });
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn oom_kill_reports_a_distinct_reason() {
        let mut runtime = MockWorkerRuntime::new();
        runtime.expect_status().returning(|_| ProcessState::Exited {
            code: None,
            oom_suspected: true,
        });

        let mut h = harness_with(config(), vec![worker(1, WorkerState::Healthy)], runtime);
        h.monitor.sweep().await;

        match h.events.try_recv().unwrap() {
            HealthEvent::Transition { to, reason, .. } => {
                assert_eq!(to, WorkerState::Failed);
                assert_eq!(reason, TransitionReason::OutOfResource);
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn replacement_incarnation_gets_a_fresh_counter() {
        let first = aged(worker(1, WorkerState::Healthy));
        let mut h = harness_with(config(), vec![first.clone()], running_runtime());

        // Two failures against the first incarnation
        h.monitor.sweep().await;
        let _ = h.events.try_recv();
        publish(&h, vec![with_state(&first, WorkerState::Degraded)]);
        h.monitor.sweep().await;

        // Replacement: same id, new started_at, already past its grace
        let mut replacement = with_state(&first, WorkerState::Healthy);
        replacement.started_at = first.started_at + chrono::Duration::seconds(120);
        publish(&h, vec![replacement]);

        // One failure must degrade, not fail; the old count is gone
        h.monitor.sweep().await;
        match h.events.try_recv().unwrap() {
            HealthEvent::Transition { to, reason, .. } => {
                assert_eq!(to, WorkerState::Degraded);
                assert_eq!(reason, TransitionReason::ProbeFailures { consecutive: 1 });
            }
            other => panic!("unexpected event {other:?}"),
        }
    }

    #[tokio::test]
    async fn failed_and_stopping_workers_are_not_probed() {
        let mut runtime = MockWorkerRuntime::new();
        // status() must never be called for unprobeable workers
        runtime.expect_status().never();

        let mut h = harness_with(
            config(),
            vec![worker(1, WorkerState::Failed), worker(2, WorkerState::Stopping)],
            runtime,
        );
        h.monitor.sweep().await;
        assert!(h.events.try_recv().is_err());
    }

    #[tokio::test]
    async fn unreachable_balancer_emits_once_per_outage() {
        let balancer_addr: SocketAddr = "127.0.0.1:8443".parse().unwrap();
        let mut cfg = config();
        cfg.balancer_probe_addr = Some(balancer_addr);

        let mut h = harness_with(cfg, vec![], running_runtime());
        h.monitor.sweep().await;

        match h.events.try_recv().unwrap() {
            HealthEvent::BalancerUnreachable { endpoint, .. } => {
                assert_eq!(endpoint, balancer_addr);
            }
            other => panic!("unexpected event {other:?}"),
        }

        // Still down: no repeat while the outage lasts
        h.monitor.sweep().await;
        assert!(h.events.try_recv().is_err());

        // Recovery arms the edge again; the next outage reports
        h.prober.set_up(balancer_addr, true);
        h.monitor.sweep().await;
        assert!(h.events.try_recv().is_err());

        h.prober.set_up(balancer_addr, false);
        h.monitor.sweep().await;
        assert!(matches!(
            h.events.try_recv().unwrap(),
            HealthEvent::BalancerUnreachable { .. }
        ));
    }

    #[tokio::test]
    async fn aged_starting_worker_recovers_before_threshold() {
        let mut h = harness_with(
            config(),
            vec![aged(worker(1, WorkerState::Starting))],
            running_runtime(),
        );

        h.monitor.sweep().await;
        assert!(h.events.try_recv().is_err());

        // Worker comes up on the next sweep
        h.prober.set_up(endpoint(1), true);
        h.monitor.sweep().await;
        match h.events.try_recv().unwrap() {
            HealthEvent::Transition { to, .. } => assert_eq!(to, WorkerState::Healthy),
            other => panic!("unexpected event {other:?}"),
        }
    }
}
