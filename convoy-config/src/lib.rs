//! Configuration management for Convoy
//!
//! Provides YAML-backed configuration with environment variable overrides
//! and domain-specific validation for every part of the fleet daemon.
//!
//! # Example
//!
//! ```rust
//! use convoy_config::ConfigLoader;
//!
//! let loader = ConfigLoader::new();
//! let config = loader.from_env().expect("defaults must validate");
//! assert!(config.fleet.target_count > 0);
//! ```

pub mod domains;
pub mod error;
pub mod loader;
pub mod validation;

pub use domains::balancer::{BalancerConfig, ListenerConfig, ListenerProtocol};
pub use domains::fleet::FleetConfig;
pub use domains::health::HealthConfig;
pub use domains::logging::{LogFormat, LogLevel, LoggingConfig};
pub use domains::stats::StatsConfig;
pub use domains::supervisor::SupervisorConfig;
pub use domains::utils::serde_duration;
pub use domains::ConvoyConfig;
pub use error::{ConfigError, ConfigResult};
pub use loader::ConfigLoader;
pub use validation::Validatable;
