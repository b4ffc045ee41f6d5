//! Health monitoring for Convoy workers
//!
//! Probes every probeable worker on a fixed interval, watches the worker
//! runtime for process exits, and reports classified state transitions to
//! the supervisor as events. The monitor holds the failure counters but
//! never mutates fleet state itself.

pub mod error;
pub mod monitor;
pub mod probe;

pub use error::ProbeError;
pub use monitor::HealthMonitor;
pub use probe::{TcpProber, WorkerProber};
