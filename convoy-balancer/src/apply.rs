//! Guarded apply: validate, write atomically, reload, keep the last good
//! configuration live on any failure

use std::path::{Path, PathBuf};
use std::time::Duration;

use async_trait::async_trait;
use tokio::time::timeout;
use tracing::{debug, info, warn};

use crate::error::{BalancerError, BalancerResult};
use crate::model::StreamConfig;
use crate::render::render;

/// External reload capability. Implementations signal the running balancer
/// to pick up a rewritten configuration without dropping established
/// connections (a reload, never a restart).
#[async_trait]
pub trait BalancerReloader: Send + Sync {
    async fn reload(&self) -> BalancerResult<()>;
}

/// Runs a configured reload command, `nginx -s reload` by default
pub struct CommandReloader {
    command: Vec<String>,
    timeout: Duration,
}

impl CommandReloader {
    pub fn new(command: Vec<String>, timeout: Duration) -> Self {
        Self { command, timeout }
    }

    pub fn from_config(config: &convoy_config::BalancerConfig) -> Self {
        Self::new(config.reload_command.clone(), config.reload_timeout)
    }
}

#[async_trait]
impl BalancerReloader for CommandReloader {
    async fn reload(&self) -> BalancerResult<()> {
        let (program, args) = self
            .command
            .split_first()
            .ok_or_else(|| BalancerError::ReloadFailed("empty reload command".to_string()))?;

        let mut cmd = tokio::process::Command::new(program);
        cmd.args(args);

        let output = timeout(self.timeout, cmd.output())
            .await
            .map_err(|_| BalancerError::ReloadTimeout { timeout: self.timeout })?
            .map_err(BalancerError::Io)?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(BalancerError::ReloadFailed(format!(
                "{} exited with {}: {}",
                program,
                output.status,
                stderr.trim()
            )));
        }
        Ok(())
    }
}

/// Owns the live configuration file and performs guarded updates.
///
/// Tracks the last successfully applied rendering so no-op regenerations
/// skip the write and reload entirely.
pub struct Balancer {
    path: PathBuf,
    reloader: Box<dyn BalancerReloader>,
    last_applied: Option<String>,
}

impl Balancer {
    pub fn new(path: impl Into<PathBuf>, reloader: Box<dyn BalancerReloader>) -> Self {
        Self {
            path: path.into(),
            reloader,
            last_applied: None,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// The rendering currently live, if any apply has succeeded
    pub fn last_applied(&self) -> Option<&str> {
        self.last_applied.as_deref()
    }

    /// True when applying `config` would change the live file
    pub fn is_dirty(&self, config: &StreamConfig) -> bool {
        self.last_applied.as_deref() != Some(render(config).as_str())
    }

    /// Validate, write atomically, reload. Returns `Ok(false)` when the
    /// rendering matches what is already live and nothing was done.
    ///
    /// Validation runs before the live file is touched. A failed reload
    /// rewrites the previous rendering back into place, so the balancer
    /// never sits on a configuration that was refused.
    pub async fn apply(&mut self, config: &StreamConfig) -> BalancerResult<bool> {
        config.validate()?;

        let rendered = render(config);
        if self.last_applied.as_deref() == Some(rendered.as_str()) {
            debug!("balancer configuration unchanged, skipping apply");
            return Ok(false);
        }

        self.write_atomic(&rendered).await?;

        match self.reloader.reload().await {
            Ok(()) => {
                info!(path = %self.path.display(), "applied balancer configuration");
                self.last_applied = Some(rendered);
                Ok(true)
            }
            Err(err) => {
                if let Some(previous) = self.last_applied.clone() {
                    if let Err(restore_err) = self.write_atomic(&previous).await {
                        warn!(error = %restore_err, "failed to restore previous balancer configuration");
                    }
                }
                Err(err)
            }
        }
    }

    /// Write via a temp file in the target directory plus rename, so a
    /// concurrent reader never observes a partial file
    async fn write_atomic(&self, rendered: &str) -> BalancerResult<()> {
        if let Some(parent) = self.path.parent() {
            tokio::fs::create_dir_all(parent).await?;
        }
        let tmp = self.path.with_extension("tmp");
        tokio::fs::write(&tmp, rendered).await?;
        tokio::fs::rename(&tmp, &self.path).await?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::model::generate;
    use convoy_config::BalancerConfig;
    use convoy_core::{FleetSnapshot, PortPlan, Worker, WorkerId, WorkerState};
    use std::net::{IpAddr, Ipv4Addr};
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    struct RecordingReloader {
        calls: Arc<AtomicUsize>,
        fail: bool,
    }

    #[async_trait]
    impl BalancerReloader for RecordingReloader {
        async fn reload(&self) -> BalancerResult<()> {
            self.calls.fetch_add(1, Ordering::SeqCst);
            if self.fail {
                Err(BalancerError::ReloadFailed("refused".to_string()))
            } else {
                Ok(())
            }
        }
    }

    fn snapshot_with(ids: &[u16]) -> FleetSnapshot {
        let plan = PortPlan {
            bind_addr: IpAddr::V4(Ipv4Addr::LOCALHOST),
            base_port: 14000,
            metrics_base_port: 15000,
        };
        let mut snapshot = FleetSnapshot::empty();
        snapshot.workers = ids
            .iter()
            .map(|&id| {
                let mut w = Worker::new(WorkerId(id), &plan, 250);
                w.state = WorkerState::Healthy;
                w
            })
            .collect();
        snapshot
    }

    fn balancer_at(dir: &tempfile::TempDir, fail: bool) -> (Balancer, Arc<AtomicUsize>) {
        let calls = Arc::new(AtomicUsize::new(0));
        let reloader = RecordingReloader {
            calls: calls.clone(),
            fail,
        };
        let balancer = Balancer::new(dir.path().join("stream.conf"), Box::new(reloader));
        (balancer, calls)
    }

    #[tokio::test]
    async fn apply_writes_file_and_reloads() {
        let dir = tempfile::tempdir().unwrap();
        let (mut balancer, calls) = balancer_at(&dir, false);
        let config = generate(&snapshot_with(&[1]), &BalancerConfig::default());

        assert!(balancer.apply(&config).await.unwrap());

        let written = std::fs::read_to_string(balancer.path()).unwrap();
        assert!(written.contains("server 127.0.0.1:14001"));
        assert_eq!(calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn unchanged_config_skips_write_and_reload() {
        let dir = tempfile::tempdir().unwrap();
        let (mut balancer, calls) = balancer_at(&dir, false);
        let config = generate(&snapshot_with(&[1, 2]), &BalancerConfig::default());

        assert!(balancer.apply(&config).await.unwrap());
        assert!(!balancer.apply(&config).await.unwrap());
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(!balancer.is_dirty(&config));
    }

    #[tokio::test]
    async fn invalid_config_never_touches_the_file() {
        let dir = tempfile::tempdir().unwrap();
        let (mut balancer, calls) = balancer_at(&dir, false);
        // No routable workers: empty upstreams fail validation
        let config = generate(&snapshot_with(&[]), &BalancerConfig::default());

        let err = balancer.apply(&config).await.unwrap_err();
        assert!(matches!(err, BalancerError::Invalid(_)));
        assert!(!balancer.path().exists());
        assert_eq!(calls.load(Ordering::SeqCst), 0);
    }

    #[tokio::test]
    async fn failed_reload_restores_previous_rendering() {
        let dir = tempfile::tempdir().unwrap();
        let settings = BalancerConfig::default();

        let (mut balancer, _) = balancer_at(&dir, false);
        let first = generate(&snapshot_with(&[1]), &settings);
        balancer.apply(&first).await.unwrap();
        let good = std::fs::read_to_string(balancer.path()).unwrap();

        // Swap in a reloader that refuses, then try to apply a new config
        balancer.reloader = Box::new(RecordingReloader {
            calls: Arc::new(AtomicUsize::new(0)),
            fail: true,
        });
        let second = generate(&snapshot_with(&[1, 2]), &settings);
        let err = balancer.apply(&second).await.unwrap_err();
        assert!(matches!(err, BalancerError::ReloadFailed(_)));

        // The file holds the last-good rendering and is still considered live
        assert_eq!(std::fs::read_to_string(balancer.path()).unwrap(), good);
        assert_eq!(balancer.last_applied(), Some(good.as_str()));
    }

    #[tokio::test]
    async fn command_reloader_reports_nonzero_exit() {
        let reloader = CommandReloader::new(
            vec!["false".to_string()],
            Duration::from_secs(5),
        );
        let err = reloader.reload().await.unwrap_err();
        assert!(matches!(err, BalancerError::ReloadFailed(_)));
    }

    #[tokio::test]
    async fn command_reloader_accepts_zero_exit() {
        let reloader = CommandReloader::new(
            vec!["true".to_string()],
            Duration::from_secs(5),
        );
        assert!(reloader.reload().await.is_ok());
    }
}
