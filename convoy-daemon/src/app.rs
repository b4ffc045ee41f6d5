//! Component wiring and the daemon lifecycle
//!
//! Builds the supervisor, health monitor, and stats loop around one shared
//! process runtime, then runs until SIGINT/SIGTERM. Shutdown stops the
//! periphery first and drains the fleet last.

use std::sync::Arc;

use anyhow::Context;
use tokio::sync::{broadcast, watch};
use tokio::time::MissedTickBehavior;
use tracing::{debug, error, info, warn};

use convoy_balancer::{Balancer, CommandReloader};
use convoy_config::ConvoyConfig;
use convoy_core::FleetSnapshot;
use convoy_health::{HealthMonitor, TcpProber};
use convoy_stats::{HttpStatsSource, ReportWriter, StatsAggregator};
use convoy_supervisor::{FleetHandle, Supervisor};

use crate::runtime::ProcessWorkerRuntime;

pub async fn run(config: ConvoyConfig) -> anyhow::Result<()> {
    let runtime = Arc::new(ProcessWorkerRuntime::new(config.fleet.worker_binary.clone()));
    let reloader = CommandReloader::from_config(&config.balancer);
    let balancer = Balancer::new(config.balancer.config_path.clone(), Box::new(reloader));

    let (supervisor, handle, events, snapshots) =
        Supervisor::new(&config, runtime.clone(), balancer);

    let (shutdown_tx, _) = broadcast::channel(1);

    let monitor = HealthMonitor::new(
        config.health.clone(),
        Arc::new(TcpProber),
        runtime,
        snapshots.clone(),
        events,
        shutdown_tx.subscribe(),
    );
    let monitor_task = monitor.spawn();

    let stats_task = tokio::spawn(stats_loop(
        config,
        handle.clone(),
        snapshots,
        shutdown_tx.subscribe(),
    ));

    let supervisor_task = tokio::spawn(supervisor.run());

    wait_for_signal().await?;

    // Periphery first; the fleet drain happens inside the supervisor
    let _ = shutdown_tx.send(());
    if let Err(err) = handle.shutdown().await {
        warn!(error = %err, "supervisor was already gone at shutdown");
    }

    let _ = monitor_task.await;
    let _ = stats_task.await;
    supervisor_task.await.context("supervisor task panicked")?;

    info!("convoyd stopped");
    Ok(())
}

/// Collect fleet statistics on an interval, feed the total into capacity
/// pressure handling, and write the JSON report when one is configured
async fn stats_loop(
    config: ConvoyConfig,
    handle: FleetHandle,
    snapshots: watch::Receiver<FleetSnapshot>,
    mut shutdown: broadcast::Receiver<()>,
) {
    let source = match HttpStatsSource::new(config.stats.per_worker_timeout) {
        Ok(source) => Arc::new(source),
        Err(err) => {
            error!(error = %err, "stats source unavailable, statistics disabled");
            return;
        }
    };
    let aggregator = StatsAggregator::new(source, config.stats.per_worker_timeout);
    let writer = config.stats.report_path.as_ref().map(ReportWriter::new);

    let mut interval = tokio::time::interval(config.stats.poll_interval);
    interval.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        tokio::select! {
            _ = interval.tick() => {}
            _ = shutdown.recv() => {
                debug!("stats loop stopping");
                return;
            }
        }

        let snapshot = snapshots.borrow().clone();
        if snapshot.routable().next().is_none() {
            continue;
        }

        let stats = aggregator.collect(&snapshot).await;
        debug!(
            total = stats.total_clients,
            stale = stats.stale_count(),
            "collected fleet statistics"
        );

        handle.capacity_pressure(stats.total_clients);

        if let Some(writer) = &writer {
            if let Err(err) = writer.write(&stats).await {
                warn!(error = %err, path = %writer.path().display(), "stats report write failed");
            }
        }
    }
}

#[cfg(unix)]
async fn wait_for_signal() -> anyhow::Result<()> {
    use tokio::signal::unix::{signal, SignalKind};

    let mut term = signal(SignalKind::terminate()).context("installing SIGTERM handler")?;
    let mut int = signal(SignalKind::interrupt()).context("installing SIGINT handler")?;
    tokio::select! {
        _ = term.recv() => info!("received SIGTERM"),
        _ = int.recv() => info!("received SIGINT"),
    }
    Ok(())
}

#[cfg(not(unix))]
async fn wait_for_signal() -> anyhow::Result<()> {
    tokio::signal::ctrl_c().await.context("waiting for ctrl-c")?;
    info!("received ctrl-c");
    Ok(())
}
