//! Configuration loading with file parsing and environment overrides

use std::path::Path;
use std::time::Duration;

use crate::domains::ConvoyConfig;
use crate::error::{ConfigError, ConfigResult};

/// Loads configuration from YAML files and `CONVOY_*` environment variables
pub struct ConfigLoader {
    env_prefix: String,
}

impl ConfigLoader {
    pub fn new() -> Self {
        Self {
            env_prefix: "CONVOY".to_string(),
        }
    }

    /// Use a non-default environment variable prefix
    pub fn with_prefix(prefix: impl Into<String>) -> Self {
        Self {
            env_prefix: prefix.into(),
        }
    }

    /// Load configuration from a YAML file, then apply environment overrides
    pub fn from_file(&self, path: impl AsRef<Path>) -> ConfigResult<ConvoyConfig> {
        let content = std::fs::read_to_string(path.as_ref())?;
        let mut config: ConvoyConfig = serde_yaml::from_str(&content)?;
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Build configuration from defaults plus environment overrides only
    pub fn from_env(&self) -> ConfigResult<ConvoyConfig> {
        let mut config = ConvoyConfig::default();
        self.apply_env_overrides(&mut config)?;
        config.validate_all()?;
        Ok(config)
    }

    /// Load from an optional file path, falling back to defaults
    pub fn load(&self, path: Option<impl AsRef<Path>>) -> ConfigResult<ConvoyConfig> {
        match path {
            Some(p) => self.from_file(p),
            None => self.from_env(),
        }
    }

    fn apply_env_overrides(&self, config: &mut ConvoyConfig) -> ConfigResult<()> {
        self.apply_fleet_overrides(config)?;
        self.apply_supervisor_overrides(config)?;
        self.apply_health_overrides(config)?;
        self.apply_balancer_overrides(config)?;
        self.apply_stats_overrides(config)?;
        self.apply_logging_overrides(config)?;
        Ok(())
    }

    fn apply_fleet_overrides(&self, config: &mut ConvoyConfig) -> ConfigResult<()> {
        if let Some(value) = self.get_env_var("TARGET_COUNT") {
            config.fleet.target_count = self.parse_env("TARGET_COUNT", &value)?;
        }
        if let Some(value) = self.get_env_var("PER_WORKER_CAPACITY") {
            config.fleet.per_worker_capacity = self.parse_env("PER_WORKER_CAPACITY", &value)?;
        }
        if let Some(value) = self.get_env_var("MAX_TOTAL_CLIENTS") {
            config.fleet.max_total_clients = self.parse_env("MAX_TOTAL_CLIENTS", &value)?;
        }
        if let Some(value) = self.get_env_var("WORKER_BINARY") {
            config.fleet.worker_binary = value.into();
        }
        if let Some(value) = self.get_env_var("DATA_ROOT") {
            config.fleet.data_root = value.into();
        }
        Ok(())
    }

    fn apply_supervisor_overrides(&self, config: &mut ConvoyConfig) -> ConfigResult<()> {
        if let Some(value) = self.get_env_var("RECONCILE_SECONDS") {
            config.supervisor.reconcile_interval =
                Duration::from_secs(self.parse_env("RECONCILE_SECONDS", &value)?);
        }
        if let Some(value) = self.get_env_var("DRAIN_TIMEOUT_SECONDS") {
            config.supervisor.drain_timeout =
                Duration::from_secs(self.parse_env("DRAIN_TIMEOUT_SECONDS", &value)?);
        }
        Ok(())
    }

    fn apply_health_overrides(&self, config: &mut ConvoyConfig) -> ConfigResult<()> {
        if let Some(value) = self.get_env_var("PROBE_INTERVAL_SECONDS") {
            config.health.probe_interval =
                Duration::from_secs(self.parse_env("PROBE_INTERVAL_SECONDS", &value)?);
        }
        if let Some(value) = self.get_env_var("FAILURE_THRESHOLD") {
            config.health.failure_threshold = self.parse_env("FAILURE_THRESHOLD", &value)?;
        }
        Ok(())
    }

    fn apply_balancer_overrides(&self, config: &mut ConvoyConfig) -> ConfigResult<()> {
        if let Some(value) = self.get_env_var("BALANCER_CONFIG_PATH") {
            config.balancer.config_path = value.into();
        }
        Ok(())
    }

    fn apply_stats_overrides(&self, config: &mut ConvoyConfig) -> ConfigResult<()> {
        if let Some(value) = self.get_env_var("STATS_INTERVAL_SECONDS") {
            config.stats.poll_interval =
                Duration::from_secs(self.parse_env("STATS_INTERVAL_SECONDS", &value)?);
        }
        if let Some(value) = self.get_env_var("STATS_REPORT_PATH") {
            config.stats.report_path = Some(value.into());
        }
        Ok(())
    }

    fn apply_logging_overrides(&self, config: &mut ConvoyConfig) -> ConfigResult<()> {
        if let Some(value) = self.get_env_var("LOG_LEVEL") {
            config.logging.level = self.parse_env("LOG_LEVEL", &value)?;
        }
        if let Some(value) = self.get_env_var("LOG_FORMAT") {
            config.logging.format = self.parse_env("LOG_FORMAT", &value)?;
        }
        Ok(())
    }

    fn get_env_var(&self, name: &str) -> Option<String> {
        std::env::var(format!("{}_{}", self.env_prefix, name)).ok()
    }

    fn parse_env<T>(&self, name: &str, value: &str) -> ConfigResult<T>
    where
        T: std::str::FromStr,
        T::Err: std::fmt::Display,
    {
        value.parse().map_err(|e| {
            ConfigError::EnvError(format!(
                "invalid {}_{} value '{}': {}",
                self.env_prefix, name, value, e
            ))
        })
    }
}

impl Default for ConfigLoader {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::io::Write;

    #[test]
    fn test_from_env_defaults() {
        let loader = ConfigLoader::with_prefix("CONVOY_TEST_DEFAULTS");
        let config = loader.from_env().unwrap();
        assert_eq!(config.fleet.target_count, 4);
        assert_eq!(config.health.failure_threshold, 3);
    }

    #[test]
    fn test_env_overrides_applied() {
        std::env::set_var("CONVOY_TEST_OVR_TARGET_COUNT", "6");
        std::env::set_var("CONVOY_TEST_OVR_FAILURE_THRESHOLD", "5");
        std::env::set_var("CONVOY_TEST_OVR_LOG_LEVEL", "debug");

        let loader = ConfigLoader::with_prefix("CONVOY_TEST_OVR");
        let config = loader.from_env().unwrap();
        assert_eq!(config.fleet.target_count, 6);
        assert_eq!(config.health.failure_threshold, 5);
        assert_eq!(config.logging.level, crate::domains::logging::LogLevel::Debug);

        std::env::remove_var("CONVOY_TEST_OVR_TARGET_COUNT");
        std::env::remove_var("CONVOY_TEST_OVR_FAILURE_THRESHOLD");
        std::env::remove_var("CONVOY_TEST_OVR_LOG_LEVEL");
    }

    #[test]
    fn test_invalid_env_value_rejected() {
        std::env::set_var("CONVOY_TEST_BAD_TARGET_COUNT", "lots");

        let loader = ConfigLoader::with_prefix("CONVOY_TEST_BAD");
        let result = loader.from_env();
        assert!(matches!(result, Err(ConfigError::EnvError(_))));

        std::env::remove_var("CONVOY_TEST_BAD_TARGET_COUNT");
    }

    #[test]
    fn test_from_file_round_trip() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(
            file,
            "fleet:\n  target_count: 2\n  per_worker_capacity: 100\nhealth:\n  failure_threshold: 4\n"
        )
        .unwrap();

        let loader = ConfigLoader::with_prefix("CONVOY_TEST_FILE");
        let config = loader.from_file(file.path()).unwrap();
        assert_eq!(config.fleet.target_count, 2);
        assert_eq!(config.fleet.per_worker_capacity, 100);
        assert_eq!(config.health.failure_threshold, 4);
        // Untouched domains keep their defaults
        assert_eq!(config.stats.poll_interval, Duration::from_secs(10));
    }

    #[test]
    fn test_invalid_file_rejected() {
        let mut file = tempfile::NamedTempFile::new().unwrap();
        writeln!(file, "fleet:\n  target_count: 100\n").unwrap();

        let loader = ConfigLoader::with_prefix("CONVOY_TEST_INVALID");
        // 100 workers x 250 clients blows the 1200 budget
        assert!(loader.from_file(file.path()).is_err());
    }
}
