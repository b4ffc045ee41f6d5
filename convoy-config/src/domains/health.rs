//! Health monitor configuration

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Probe cadence and failure classification configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthConfig {
    /// Interval between probe sweeps
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_probe_interval")]
    pub probe_interval: Duration,

    /// Per-probe timeout; an unanswered probe counts as a failure
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_probe_timeout")]
    pub probe_timeout: Duration,

    /// Consecutive failures that flip a worker to Failed
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,

    /// Window after launch during which a Starting worker's probe failures
    /// are ignored
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_startup_grace")]
    pub startup_grace: Duration,

    /// Optional public balancer listener to probe; failures raise an alert
    #[serde(skip_serializing_if = "Option::is_none")]
    pub balancer_probe_addr: Option<SocketAddr>,
}

impl Default for HealthConfig {
    fn default() -> Self {
        Self {
            probe_interval: default_probe_interval(),
            probe_timeout: default_probe_timeout(),
            failure_threshold: default_failure_threshold(),
            startup_grace: default_startup_grace(),
            balancer_probe_addr: None,
        }
    }
}

impl Validatable for HealthConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.probe_interval.as_secs(), "probe_interval", self.domain_name())?;
        validate_positive(self.probe_timeout.as_secs(), "probe_timeout", self.domain_name())?;
        validate_positive(self.failure_threshold, "failure_threshold", self.domain_name())?;

        if self.probe_timeout >= self.probe_interval {
            log::warn!(
                "probe_timeout {:?} is not below probe_interval {:?}; sweeps may overlap their schedule",
                self.probe_timeout,
                self.probe_interval
            );
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "health"
    }
}

// Default value functions
fn default_probe_interval() -> Duration {
    Duration::from_secs(5)
}

fn default_probe_timeout() -> Duration {
    Duration::from_secs(2)
}

fn default_failure_threshold() -> u32 {
    3
}

fn default_startup_grace() -> Duration {
    Duration::from_secs(60)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_health_config_defaults() {
        let config = HealthConfig::default();
        assert_eq!(config.probe_interval, Duration::from_secs(5));
        assert_eq!(config.probe_timeout, Duration::from_secs(2));
        assert_eq!(config.failure_threshold, 3);
        assert!(config.balancer_probe_addr.is_none());
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_zero_threshold_rejected() {
        let mut config = HealthConfig::default();
        config.failure_threshold = 0;
        assert!(config.validate().is_err());
    }
}
