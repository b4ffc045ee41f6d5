//! Fleet state: the single mutable worker map plus desired-state parameters
//!
//! Exactly one task (the supervisor actor) owns a [`Fleet`] and mutates it.
//! Every other component sees [`FleetSnapshot`] values published over a
//! watch channel, so reporting never contends with the control loop.

use std::collections::{BTreeMap, VecDeque};

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::FleetError;
use crate::events::TransitionReason;
use crate::worker::{PortPlan, Worker, WorkerId, WorkerState};

/// Alerts kept per fleet; older entries are dropped first
const MAX_ALERTS: usize = 16;

/// Hard resource bounds the fleet may never exceed
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct FleetLimits {
    /// Aggregate client ceiling across all workers (the resource budget)
    pub max_total_clients: u32,
    /// Per-worker capacity ceiling, bounding pressure redistribution
    pub max_capacity_per_worker: u32,
    /// Upper bound on worker count, bounding the derived port ranges
    pub max_workers: u16,
}

impl FleetLimits {
    /// Validate a requested desired state against the bounds. Fails without
    /// side effects; callers reject the request before any mutation.
    pub fn check_scale(&self, count: u16, capacity: u32) -> Result<(), FleetError> {
        if count > self.max_workers {
            return Err(FleetError::WorkerLimitExceeded {
                requested: count,
                max: self.max_workers,
            });
        }
        if capacity > self.max_capacity_per_worker {
            return Err(FleetError::CapacityExceeded {
                requested: u64::from(capacity),
                ceiling: u64::from(self.max_capacity_per_worker),
            });
        }
        let projected = u64::from(count) * u64::from(capacity);
        if projected > u64::from(self.max_total_clients) {
            return Err(FleetError::CapacityExceeded {
                requested: projected,
                ceiling: u64::from(self.max_total_clients),
            });
        }
        Ok(())
    }
}

/// Category of an operator-visible alert
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AlertKind {
    CapacityExceeded,
    WorkerStartFailed,
    DrainTimeout,
    CapacityAdjusted,
    BalancerFailed,
}

/// Operator-visible event recorded in the fleet's bounded alert ring.
/// Alerts ride along in every snapshot; the operator boundary reads them
/// there.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetAlert {
    pub at: DateTime<Utc>,
    pub kind: AlertKind,
    pub message: String,
}

/// The complete set of managed workers plus desired-state parameters
#[derive(Debug)]
pub struct Fleet {
    /// Ordered by id; iteration order feeds deterministic config rendering
    workers: BTreeMap<WorkerId, Worker>,
    target_count: u16,
    per_worker_capacity: u32,
    limits: FleetLimits,
    ports: PortPlan,
    alerts: VecDeque<FleetAlert>,
    generation: u64,
}

impl Fleet {
    /// An empty fleet with desired count 0. The initial scale request goes
    /// through [`Fleet::request_scale`] like any other, so startup exercises
    /// the same validation path as operator commands.
    pub fn new(limits: FleetLimits, ports: PortPlan) -> Self {
        Self {
            workers: BTreeMap::new(),
            target_count: 0,
            per_worker_capacity: 0,
            limits,
            ports,
            alerts: VecDeque::new(),
            generation: 0,
        }
    }

    pub fn target_count(&self) -> u16 {
        self.target_count
    }

    pub fn per_worker_capacity(&self) -> u32 {
        self.per_worker_capacity
    }

    pub fn limits(&self) -> &FleetLimits {
        &self.limits
    }

    pub fn ports(&self) -> &PortPlan {
        &self.ports
    }

    pub fn generation(&self) -> u64 {
        self.generation
    }

    pub fn get(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.get(&id)
    }

    /// All tracked workers in id order
    pub fn workers(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values()
    }

    /// Workers not on their way out (everything except Stopping/Removed)
    pub fn live(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values().filter(|w| !w.state.is_terminal())
    }

    /// Workers eligible for balancer upstreams (Healthy or Degraded)
    pub fn routable(&self) -> impl Iterator<Item = &Worker> {
        self.workers.values().filter(|w| w.state.is_routable())
    }

    /// Sum of desired capacity across live workers
    pub fn total_desired_capacity(&self) -> u32 {
        self.live().map(|w| w.desired_capacity).sum()
    }

    /// Validate and commit a new desired state. Existing live workers adopt
    /// the new per-worker capacity immediately; the worker set itself
    /// converges through reconcile passes.
    pub fn request_scale(&mut self, count: u16, capacity: u32) -> Result<(), FleetError> {
        self.limits.check_scale(count, capacity)?;
        self.target_count = count;
        self.per_worker_capacity = capacity;
        for worker in self.workers.values_mut().filter(|w| !w.state.is_terminal()) {
            worker.desired_capacity = capacity;
        }
        self.bump();
        Ok(())
    }

    /// Slot ids the fleet should have but currently does not.
    /// Slots are exactly the ids `1..=target_count`.
    pub fn missing_ids(&self) -> Vec<WorkerId> {
        (1..=self.target_count)
            .map(WorkerId)
            .filter(|id| !self.workers.contains_key(id))
            .collect()
    }

    /// Live workers whose id falls outside `1..=target_count`, highest id
    /// first (the order they are stopped in on scale-down)
    pub fn excess_ids(&self) -> Vec<WorkerId> {
        let mut ids: Vec<WorkerId> = self
            .live()
            .map(|w| w.id)
            .filter(|id| id.as_u16() > self.target_count)
            .collect();
        ids.sort_unstable_by(|a, b| b.cmp(a));
        ids
    }

    /// Ids of workers awaiting replacement
    pub fn failed_ids(&self) -> Vec<WorkerId> {
        self.workers
            .values()
            .filter(|w| w.state == WorkerState::Failed)
            .map(|w| w.id)
            .collect()
    }

    /// True while any worker is mid-start; bounds startup concurrency to one
    pub fn has_starting_worker(&self) -> bool {
        self.workers
            .values()
            .any(|w| w.state == WorkerState::Starting)
    }

    /// Build a fresh worker for a slot, with endpoint and metrics address
    /// derived from the id
    pub fn new_worker(&self, id: WorkerId) -> Worker {
        Worker::new(id, &self.ports, self.per_worker_capacity)
    }

    pub fn insert(&mut self, worker: Worker) {
        self.workers.insert(worker.id, worker);
        self.bump();
    }

    pub fn remove(&mut self, id: WorkerId) -> Option<Worker> {
        let removed = self.workers.remove(&id);
        if removed.is_some() {
            self.bump();
        }
        removed
    }

    /// Apply a classified health transition. Transitions for unknown ids
    /// fail; transitions for workers already on their way out are stale and
    /// ignored. Returns the state the worker held before the call.
    pub fn apply_transition(
        &mut self,
        id: WorkerId,
        to: WorkerState,
        reason: &TransitionReason,
        at: DateTime<Utc>,
    ) -> Result<WorkerState, FleetError> {
        let worker = self.workers.get_mut(&id).ok_or(FleetError::UnknownWorker(id))?;
        let previous = worker.state;
        if previous.is_terminal() || previous == to {
            return Ok(previous);
        }
        worker.apply_transition(to, reason, at);
        self.bump();
        Ok(previous)
    }

    /// Mark a worker as draining. Callers regenerate the balancer config
    /// before actually stopping the process (drain-before-remove).
    pub fn mark_stopping(&mut self, id: WorkerId) -> Result<(), FleetError> {
        let worker = self.workers.get_mut(&id).ok_or(FleetError::UnknownWorker(id))?;
        worker.state = WorkerState::Stopping;
        self.bump();
        Ok(())
    }

    /// Set every routable worker's capacity, returning how many changed
    pub fn set_routable_capacity(&mut self, capacity: u32) -> usize {
        let mut changed = 0;
        for worker in self
            .workers
            .values_mut()
            .filter(|w| w.state.is_routable() && w.desired_capacity != capacity)
        {
            worker.desired_capacity = capacity;
            changed += 1;
        }
        if changed > 0 {
            self.bump();
        }
        changed
    }

    /// Record an operator-visible alert, dropping the oldest past the cap
    pub fn push_alert(&mut self, kind: AlertKind, message: impl Into<String>) {
        if self.alerts.len() == MAX_ALERTS {
            self.alerts.pop_front();
        }
        self.alerts.push_back(FleetAlert {
            at: Utc::now(),
            kind,
            message: message.into(),
        });
        self.bump();
    }

    pub fn alerts(&self) -> impl Iterator<Item = &FleetAlert> {
        self.alerts.iter()
    }

    /// Immutable view for publication on the snapshot channel
    pub fn snapshot(&self) -> FleetSnapshot {
        FleetSnapshot {
            workers: self.workers.values().cloned().collect(),
            target_count: self.target_count,
            per_worker_capacity: self.per_worker_capacity,
            alerts: self.alerts.iter().cloned().collect(),
            generation: self.generation,
            taken_at: Utc::now(),
        }
    }

    fn bump(&mut self) {
        self.generation += 1;
    }
}

/// Immutable, cheaply cloneable view of the fleet at one instant.
/// Workers appear in id order.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FleetSnapshot {
    pub workers: Vec<Worker>,
    pub target_count: u16,
    pub per_worker_capacity: u32,
    pub alerts: Vec<FleetAlert>,
    pub generation: u64,
    pub taken_at: DateTime<Utc>,
}

impl FleetSnapshot {
    /// The value a snapshot channel holds before the supervisor publishes
    pub fn empty() -> Self {
        Self {
            workers: Vec::new(),
            target_count: 0,
            per_worker_capacity: 0,
            alerts: Vec::new(),
            generation: 0,
            taken_at: Utc::now(),
        }
    }

    pub fn get(&self, id: WorkerId) -> Option<&Worker> {
        self.workers.iter().find(|w| w.id == id)
    }

    pub fn routable(&self) -> impl Iterator<Item = &Worker> {
        self.workers.iter().filter(|w| w.state.is_routable())
    }

    /// Live worker count (everything except Stopping/Removed)
    pub fn live_count(&self) -> usize {
        self.workers.iter().filter(|w| !w.state.is_terminal()).count()
    }
}
