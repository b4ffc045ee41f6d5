//! Stats aggregation configuration

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Stats polling and reporting configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct StatsConfig {
    /// Interval between aggregate collections
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_poll_interval")]
    pub poll_interval: Duration,

    /// Per-worker poll timeout; a worker past it is counted as stale
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_per_worker_timeout")]
    pub per_worker_timeout: Duration,

    /// Where the JSON aggregate report is written for external consumers.
    /// Reporting is skipped when unset.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub report_path: Option<PathBuf>,
}

impl Default for StatsConfig {
    fn default() -> Self {
        Self {
            poll_interval: default_poll_interval(),
            per_worker_timeout: default_per_worker_timeout(),
            report_path: None,
        }
    }
}

impl Validatable for StatsConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.poll_interval.as_secs(), "poll_interval", self.domain_name())?;
        validate_positive(
            self.per_worker_timeout.as_secs(),
            "per_worker_timeout",
            self.domain_name(),
        )?;

        if let Some(path) = &self.report_path {
            if path.as_os_str().is_empty() {
                return Err(self.validation_error("report_path cannot be empty when set"));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "stats"
    }
}

// Default value functions
fn default_poll_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_per_worker_timeout() -> Duration {
    Duration::from_secs(2)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_stats_config_defaults() {
        let config = StatsConfig::default();
        assert_eq!(config.poll_interval, Duration::from_secs(10));
        assert!(config.report_path.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_report_path_rejected() {
        let mut config = StatsConfig::default();
        config.report_path = Some(PathBuf::new());
        assert!(config.validate().is_err());
    }
}
