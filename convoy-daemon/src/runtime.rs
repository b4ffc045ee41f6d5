//! Process-backed worker runtime
//!
//! Spawns one instance of the external proxy binary per worker id and
//! implements drain-then-force termination. An exited child stays tracked
//! until its slot is cleared, so the health monitor observes the exit
//! instead of finding a hole.

use std::collections::HashMap;
use std::path::PathBuf;
use std::process::Stdio;
use std::time::Duration;

use async_trait::async_trait;
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tokio::time::timeout;
use tracing::{debug, warn};

use convoy_core::{LaunchSpec, ProcessState, RuntimeError, StopOutcome, WorkerId, WorkerRuntime};

/// Launches the configured proxy binary and tracks its children by worker id
pub struct ProcessWorkerRuntime {
    binary: PathBuf,
    children: Mutex<HashMap<WorkerId, Child>>,
}

impl ProcessWorkerRuntime {
    pub fn new(binary: impl Into<PathBuf>) -> Self {
        Self {
            binary: binary.into(),
            children: Mutex::new(HashMap::new()),
        }
    }
}

#[async_trait]
impl WorkerRuntime for ProcessWorkerRuntime {
    async fn launch(&self, spec: &LaunchSpec) -> Result<(), RuntimeError> {
        // The data directory holds the worker's proxy identity; it must
        // exist before the binary starts
        tokio::fs::create_dir_all(&spec.data_dir).await?;

        let mut command = Command::new(&self.binary);
        command
            .arg("start")
            .arg("-m")
            .arg(spec.max_clients.to_string())
            .arg("-b")
            .arg(spec.bandwidth_mbps.to_string())
            .arg("--listen")
            .arg(spec.endpoint.to_string())
            .arg("--metrics-addr")
            .arg(spec.metrics_addr.to_string())
            .arg("--data-dir")
            .arg(&spec.data_dir)
            .stdin(Stdio::null())
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .kill_on_drop(true);

        let child = command
            .spawn()
            .map_err(|err| RuntimeError::LaunchFailed(format!("{}: {err}", self.binary.display())))?;
        debug!(worker = %spec.id, pid = ?child.id(), "spawned worker process");

        self.children.lock().await.insert(spec.id, child);
        Ok(())
    }

    async fn stop(&self, id: WorkerId, grace: Duration) -> Result<StopOutcome, RuntimeError> {
        let child = self.children.lock().await.remove(&id);
        let Some(mut child) = child else {
            return Ok(StopOutcome::NotRunning);
        };
        if child.try_wait()?.is_some() {
            return Ok(StopOutcome::NotRunning);
        }

        terminate(&child);

        match timeout(grace, child.wait()).await {
            Ok(Ok(status)) => {
                debug!(worker = %id, ?status, "worker exited within the grace period");
                Ok(StopOutcome::Graceful)
            }
            Ok(Err(err)) => Err(RuntimeError::Io(err)),
            Err(_) => {
                warn!(worker = %id, ?grace, "worker ignored the termination request, killing");
                child.kill().await?;
                Ok(StopOutcome::Forced)
            }
        }
    }

    async fn status(&self, id: WorkerId) -> ProcessState {
        let mut children = self.children.lock().await;
        let Some(child) = children.get_mut(&id) else {
            return ProcessState::Unknown;
        };
        match child.try_wait() {
            Ok(None) => ProcessState::Running,
            Ok(Some(status)) => ProcessState::Exited {
                code: status.code(),
                oom_suspected: oom_suspected(&status),
            },
            Err(err) => {
                warn!(worker = %id, error = %err, "failed to poll worker process");
                ProcessState::Unknown
            }
        }
    }
}

/// Request a graceful exit. On non-Unix targets there is no graceful path;
/// the caller's grace period elapses and the child is killed.
#[cfg(unix)]
fn terminate(child: &Child) {
    use nix::sys::signal::{self, Signal};
    use nix::unistd::Pid;

    if let Some(pid) = child.id() {
        if let Err(err) = signal::kill(Pid::from_raw(pid as i32), Signal::SIGTERM) {
            warn!(pid, error = %err, "failed to send SIGTERM");
        }
    }
}

#[cfg(not(unix))]
fn terminate(_child: &Child) {}

/// A termination by SIGKILL that convoyd did not issue itself is most
/// likely the kernel's resource control
#[cfg(unix)]
fn oom_suspected(status: &std::process::ExitStatus) -> bool {
    use nix::sys::signal::Signal;
    use std::os::unix::process::ExitStatusExt;

    status.signal() == Some(Signal::SIGKILL as i32)
}

#[cfg(not(unix))]
fn oom_suspected(_status: &std::process::ExitStatus) -> bool {
    false
}
