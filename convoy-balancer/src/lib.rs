//! Load balancer configuration generation for Convoy
//!
//! Turns a fleet snapshot into an nginx `stream`-module configuration:
//! a pure [`generate`] step producing a typed [`StreamConfig`], a
//! deterministic [`render`] step, and a guarded [`Balancer::apply`] that
//! validates before touching the live file, writes atomically, and keeps
//! the last good configuration in place when a reload is refused.

pub mod apply;
pub mod error;
pub mod model;
pub mod render;

pub use apply::{Balancer, BalancerReloader, CommandReloader};
pub use error::{BalancerError, BalancerResult};
pub use model::{generate, Listener, StreamConfig, Upstream, UpstreamServer};
pub use render::render;
