//! Testing utilities, enabled via the `testing` feature

pub mod mocks;

pub use mocks::MockWorkerRuntime;
