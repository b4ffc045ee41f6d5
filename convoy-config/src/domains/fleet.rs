//! Fleet sizing, capacity budget, and worker launch configuration

use serde::{Deserialize, Serialize};
use std::net::{IpAddr, Ipv4Addr};
use std::path::PathBuf;

use crate::error::ConfigResult;
use crate::validation::{validate_port_range, validate_positive, validate_required_string, Validatable};

/// Fleet sizing and worker launch configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct FleetConfig {
    /// Desired number of workers
    #[serde(default = "default_target_count")]
    pub target_count: u16,

    /// Baseline max concurrent clients per worker
    #[serde(default = "default_per_worker_capacity")]
    pub per_worker_capacity: u32,

    /// Aggregate client ceiling across all workers (the resource budget)
    #[serde(default = "default_max_total_clients")]
    pub max_total_clients: u32,

    /// Per-worker capacity ceiling; bounds pressure redistribution
    #[serde(default = "default_max_capacity_per_worker")]
    pub max_capacity_per_worker: u32,

    /// Hard bound on worker count; sizes the derived port ranges
    #[serde(default = "default_max_workers")]
    pub max_workers: u16,

    /// Loopback address workers bind to
    #[serde(default = "default_bind_addr")]
    pub bind_addr: IpAddr,

    /// Worker `id` listens on `base_port + id`
    #[serde(default = "default_base_port")]
    pub base_port: u16,

    /// Worker `id` serves metrics on `metrics_base_port + id`
    #[serde(default = "default_metrics_base_port")]
    pub metrics_base_port: u16,

    /// Per-worker bandwidth limit in Mbit/s, passed to the binary
    #[serde(default = "default_bandwidth_mbps")]
    pub bandwidth_mbps: f64,

    /// Path to the external proxy worker binary
    #[serde(default = "default_worker_binary")]
    pub worker_binary: PathBuf,

    /// Root directory for per-worker data directories
    #[serde(default = "default_data_root")]
    pub data_root: PathBuf,
}

impl Default for FleetConfig {
    fn default() -> Self {
        Self {
            target_count: default_target_count(),
            per_worker_capacity: default_per_worker_capacity(),
            max_total_clients: default_max_total_clients(),
            max_capacity_per_worker: default_max_capacity_per_worker(),
            max_workers: default_max_workers(),
            bind_addr: default_bind_addr(),
            base_port: default_base_port(),
            metrics_base_port: default_metrics_base_port(),
            bandwidth_mbps: default_bandwidth_mbps(),
            worker_binary: default_worker_binary(),
            data_root: default_data_root(),
        }
    }
}

impl FleetConfig {
    /// Highest port a worker or metrics listener can be assigned
    fn port_range_end(&self, base: u16) -> u32 {
        u32::from(base) + u32::from(self.max_workers)
    }
}

impl Validatable for FleetConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_positive(self.per_worker_capacity, "per_worker_capacity", self.domain_name())?;
        validate_positive(self.max_total_clients, "max_total_clients", self.domain_name())?;
        validate_positive(
            self.max_capacity_per_worker,
            "max_capacity_per_worker",
            self.domain_name(),
        )?;
        validate_positive(self.max_workers, "max_workers", self.domain_name())?;
        validate_positive(self.bandwidth_mbps, "bandwidth_mbps", self.domain_name())?;
        validate_port_range(self.base_port, "base_port", self.domain_name())?;
        validate_port_range(self.metrics_base_port, "metrics_base_port", self.domain_name())?;
        validate_required_string(
            &self.worker_binary.to_string_lossy(),
            "worker_binary",
            self.domain_name(),
        )?;
        validate_required_string(
            &self.data_root.to_string_lossy(),
            "data_root",
            self.domain_name(),
        )?;

        if self.target_count > self.max_workers {
            return Err(self.validation_error(format!(
                "target_count {} exceeds max_workers {}",
                self.target_count, self.max_workers
            )));
        }

        if self.per_worker_capacity > self.max_capacity_per_worker {
            return Err(self.validation_error(format!(
                "per_worker_capacity {} exceeds max_capacity_per_worker {}",
                self.per_worker_capacity, self.max_capacity_per_worker
            )));
        }

        let projected = u64::from(self.target_count) * u64::from(self.per_worker_capacity);
        if projected > u64::from(self.max_total_clients) {
            return Err(self.validation_error(format!(
                "target_count x per_worker_capacity = {} exceeds max_total_clients {}",
                projected, self.max_total_clients
            )));
        }

        // Both derived port ranges must fit in u16 and must not overlap
        let worker_end = self.port_range_end(self.base_port);
        let metrics_end = self.port_range_end(self.metrics_base_port);
        if worker_end > u32::from(u16::MAX) || metrics_end > u32::from(u16::MAX) {
            return Err(self.validation_error(format!(
                "port range for {} workers overflows above 65535",
                self.max_workers
            )));
        }
        let worker_range = u32::from(self.base_port)..=worker_end;
        let metrics_range = u32::from(self.metrics_base_port)..=metrics_end;
        if worker_range.contains(metrics_range.start())
            || worker_range.contains(metrics_range.end())
            || metrics_range.contains(worker_range.start())
        {
            return Err(self.validation_error(format!(
                "worker ports {}..={} overlap metrics ports {}..={}",
                worker_range.start(),
                worker_range.end(),
                metrics_range.start(),
                metrics_range.end()
            )));
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "fleet"
    }
}

// Default value functions
fn default_target_count() -> u16 {
    4
}

fn default_per_worker_capacity() -> u32 {
    250
}

fn default_max_total_clients() -> u32 {
    1200
}

fn default_max_capacity_per_worker() -> u32 {
    500
}

fn default_max_workers() -> u16 {
    64
}

fn default_bind_addr() -> IpAddr {
    IpAddr::V4(Ipv4Addr::LOCALHOST)
}

fn default_base_port() -> u16 {
    14000
}

fn default_metrics_base_port() -> u16 {
    15000
}

fn default_bandwidth_mbps() -> f64 {
    5.0
}

fn default_worker_binary() -> PathBuf {
    PathBuf::from("/usr/local/bin/conduit")
}

fn default_data_root() -> PathBuf {
    PathBuf::from("/var/lib/convoy")
}
