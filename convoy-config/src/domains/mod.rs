//! Domain-specific configuration modules

pub mod balancer;
pub mod fleet;
pub mod health;
pub mod logging;
pub mod stats;
pub mod supervisor;
pub mod utils;

use crate::error::ConfigResult;
use crate::validation::Validatable;
use serde::{Deserialize, Serialize};

/// Main Convoy configuration combining all domains
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct ConvoyConfig {
    /// Fleet sizing and worker launch configuration
    #[serde(default)]
    pub fleet: fleet::FleetConfig,

    /// Supervisor control-loop configuration
    #[serde(default)]
    pub supervisor: supervisor::SupervisorConfig,

    /// Health probing configuration
    #[serde(default)]
    pub health: health::HealthConfig,

    /// Load balancer configuration
    #[serde(default)]
    pub balancer: balancer::BalancerConfig,

    /// Stats aggregation configuration
    #[serde(default)]
    pub stats: stats::StatsConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: logging::LoggingConfig,
}

impl ConvoyConfig {
    /// Validate all domain configurations, then the cross-domain invariants
    pub fn validate_all(&self) -> ConfigResult<()> {
        self.fleet.validate()?;
        self.supervisor.validate()?;
        self.health.validate()?;
        self.balancer.validate()?;
        self.stats.validate()?;
        self.logging.validate()?;

        self.validate_cross_domain()
    }

    /// Invariants spanning more than one domain
    fn validate_cross_domain(&self) -> ConfigResult<()> {
        // Public listener ports must not land inside the derived worker or
        // metrics port ranges, or the balancer would shadow a worker.
        let worker_range =
            u32::from(self.fleet.base_port)..=u32::from(self.fleet.base_port) + u32::from(self.fleet.max_workers);
        let metrics_range = u32::from(self.fleet.metrics_base_port)
            ..=u32::from(self.fleet.metrics_base_port) + u32::from(self.fleet.max_workers);

        for listener in &self.balancer.listeners {
            let port = u32::from(listener.port);
            if worker_range.contains(&port) || metrics_range.contains(&port) {
                return Err(crate::error::ConfigError::DomainError {
                    domain: "balancer".to_string(),
                    message: format!(
                        "listener port {} falls inside a worker port range ({}..={} or {}..={})",
                        port,
                        worker_range.start(),
                        worker_range.end(),
                        metrics_range.start(),
                        metrics_range.end()
                    ),
                });
            }
        }

        Ok(())
    }

    /// Generate a sample configuration file
    pub fn generate_sample() -> String {
        let config = ConvoyConfig::default();
        serde_yaml::to_string(&config)
            .unwrap_or_else(|_| "# Failed to generate sample config".to_string())
    }
}
