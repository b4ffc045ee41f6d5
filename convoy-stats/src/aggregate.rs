//! Concurrent collection across the fleet
//!
//! The aggregate is eventually consistent: each worker is sampled at a
//! slightly different instant, with no cross-worker coordination. A worker
//! that cannot be reached contributes zeros and a `stale` flag instead of
//! failing the round.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::debug;

use convoy_core::{FleetSnapshot, WorkerId, WorkerState};

use crate::source::StatsSource;

/// One worker's slice of an aggregate
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerStats {
    pub id: WorkerId,
    pub state: WorkerState,
    pub connected_clients: u32,
    pub connecting_clients: u32,
    /// Set when this round could not observe the worker; the counts above
    /// are zeros, not measurements
    pub stale: bool,
}

/// A fleet-wide sample, suitable for the report sink and for capacity
/// pressure decisions
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AggregateStats {
    /// Sum of connected clients across workers observed this round
    pub total_clients: u64,
    pub workers: Vec<WorkerStats>,
    /// Fleet generation the sample was taken against
    pub generation: u64,
    pub collected_at: DateTime<Utc>,
}

impl AggregateStats {
    pub fn stale_count(&self) -> usize {
        self.workers.iter().filter(|w| w.stale).count()
    }
}

/// Queries every routable worker's metrics endpoint concurrently
pub struct StatsAggregator {
    source: Arc<dyn StatsSource>,
    per_worker_timeout: Duration,
}

impl StatsAggregator {
    pub fn new(source: Arc<dyn StatsSource>, per_worker_timeout: Duration) -> Self {
        Self {
            source,
            per_worker_timeout,
        }
    }

    /// One collection round over the snapshot's routable workers
    pub async fn collect(&self, snapshot: &FleetSnapshot) -> AggregateStats {
        let fetches: Vec<_> = snapshot
            .routable()
            .map(|w| {
                let source = Arc::clone(&self.source);
                let timeout = self.per_worker_timeout;
                let (id, state, addr) = (w.id, w.state, w.metrics_addr);
                async move {
                    let metrics = match tokio::time::timeout(timeout, source.fetch(addr)).await {
                        Ok(Ok(metrics)) => Some(metrics),
                        Ok(Err(err)) => {
                            debug!(worker = %id, error = %err, "stats fetch failed");
                            None
                        }
                        Err(_) => {
                            debug!(worker = %id, "stats fetch timed out");
                            None
                        }
                    };
                    (id, state, metrics)
                }
            })
            .collect();

        let results = futures::future::join_all(fetches).await;

        let mut workers = Vec::with_capacity(results.len());
        let mut total: u64 = 0;
        for (id, state, metrics) in results {
            match metrics {
                Some(m) => {
                    total += u64::from(m.connected_clients);
                    workers.push(WorkerStats {
                        id,
                        state,
                        connected_clients: m.connected_clients,
                        connecting_clients: m.connecting_clients,
                        stale: false,
                    });
                }
                None => workers.push(WorkerStats {
                    id,
                    state,
                    connected_clients: 0,
                    connecting_clients: 0,
                    stale: true,
                }),
            }
        }

        AggregateStats {
            total_clients: total,
            workers,
            generation: snapshot.generation,
            collected_at: Utc::now(),
        }
    }
}
