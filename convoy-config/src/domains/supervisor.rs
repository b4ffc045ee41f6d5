//! Supervisor control-loop configuration

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_positive, Validatable};

/// Reconcile cadence, drain bounds, and start-retry policy
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SupervisorConfig {
    /// Interval between timer-driven reconcile passes
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_reconcile_interval")]
    pub reconcile_interval: Duration,

    /// How long a stopping worker may drain before termination is forced
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_drain_timeout")]
    pub drain_timeout: Duration,

    /// Launch attempts per worker before the slot is marked Failed
    #[serde(default = "default_start_max_attempts")]
    pub start_max_attempts: u32,

    /// Delay before the first launch retry
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_start_initial_backoff")]
    pub start_initial_backoff: Duration,

    /// Upper bound on the launch retry delay
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_start_max_backoff")]
    pub start_max_backoff: Duration,

    /// Multiplier applied to the retry delay after each failed attempt
    #[serde(default = "default_start_backoff_multiplier")]
    pub start_backoff_multiplier: f64,

    /// Whether retry delays are jittered to avoid synchronized launches
    #[serde(default = "default_start_jitter")]
    pub start_jitter: bool,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            reconcile_interval: default_reconcile_interval(),
            drain_timeout: default_drain_timeout(),
            start_max_attempts: default_start_max_attempts(),
            start_initial_backoff: default_start_initial_backoff(),
            start_max_backoff: default_start_max_backoff(),
            start_backoff_multiplier: default_start_backoff_multiplier(),
            start_jitter: default_start_jitter(),
        }
    }
}

impl Validatable for SupervisorConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(
            self.reconcile_interval.as_secs(),
            "reconcile_interval",
            self.domain_name(),
        )?;
        validate_positive(self.drain_timeout.as_secs(), "drain_timeout", self.domain_name())?;
        validate_positive(self.start_max_attempts, "start_max_attempts", self.domain_name())?;
        validate_positive(
            self.start_initial_backoff.as_secs(),
            "start_initial_backoff",
            self.domain_name(),
        )?;

        if self.start_max_backoff < self.start_initial_backoff {
            return Err(self.validation_error(format!(
                "start_max_backoff {:?} is below start_initial_backoff {:?}",
                self.start_max_backoff, self.start_initial_backoff
            )));
        }

        if self.start_backoff_multiplier < 1.0 {
            return Err(self.validation_error(format!(
                "start_backoff_multiplier must be at least 1.0, got {}",
                self.start_backoff_multiplier
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "supervisor"
    }
}

// Default value functions
fn default_reconcile_interval() -> Duration {
    Duration::from_secs(10)
}

fn default_drain_timeout() -> Duration {
    Duration::from_secs(30)
}

fn default_start_max_attempts() -> u32 {
    3
}

fn default_start_initial_backoff() -> Duration {
    Duration::from_secs(1)
}

fn default_start_max_backoff() -> Duration {
    Duration::from_secs(30)
}

fn default_start_backoff_multiplier() -> f64 {
    2.0
}

fn default_start_jitter() -> bool {
    true
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_supervisor_config_defaults() {
        let config = SupervisorConfig::default();
        assert_eq!(config.reconcile_interval, Duration::from_secs(10));
        assert_eq!(config.drain_timeout, Duration::from_secs(30));
        assert_eq!(config.start_max_attempts, 3);
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_backoff_bounds_are_ordered() {
        let mut config = SupervisorConfig::default();
        config.start_max_backoff = Duration::from_millis(100);
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_multiplier_below_one_rejected() {
        let mut config = SupervisorConfig::default();
        config.start_backoff_multiplier = 0.5;
        assert!(config.validate().is_err());
    }
}
