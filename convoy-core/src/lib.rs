//! Core domain model for Convoy
//!
//! This crate contains the fundamental types and traits shared by the fleet
//! supervisor, health monitor, balancer generator, and stats aggregator. It
//! has minimal dependencies and defines the domain language of the system.

pub mod error;
pub mod events;
pub mod fleet;
pub mod runtime;
pub mod worker;

#[cfg(feature = "testing")]
pub mod testing;

// Re-export commonly used types at the crate root
pub use error::{FleetError, Result};
pub use events::{HealthEvent, TransitionReason};
pub use fleet::{AlertKind, Fleet, FleetAlert, FleetLimits, FleetSnapshot};
pub use runtime::{LaunchSpec, ProcessState, RuntimeError, StopOutcome, WorkerRuntime};
pub use worker::{PortPlan, Worker, WorkerEndpoint, WorkerId, WorkerState};
