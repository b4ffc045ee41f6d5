//! Fleet supervisor for Convoy
//!
//! Keeps the running worker set converged on the desired state: launching
//! missing workers, replacing failed ones under the same identity, draining
//! excess ones, and keeping the load balancer configuration in sync. All
//! fleet mutation happens inside the single supervisor task; other
//! components talk to it through a [`FleetHandle`] and read published
//! [`FleetSnapshot`](convoy_core::FleetSnapshot) values.

pub mod backoff;
pub mod command;
pub mod plan;
pub mod supervisor;

pub use backoff::StartBackoff;
pub use command::{FleetHandle, HealthOverride};
pub use plan::{next_actions, ReconcileAction};
pub use supervisor::Supervisor;
