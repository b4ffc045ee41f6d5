//! Mock implementations of the boundary traits for tests in dependent
//! crates, built with the mockall framework

use std::time::Duration;

use async_trait::async_trait;
use mockall::mock;

use crate::runtime::{LaunchSpec, ProcessState, RuntimeError, StopOutcome, WorkerRuntime};
use crate::worker::WorkerId;

mock! {
    pub WorkerRuntime {}

    #[async_trait]
    impl WorkerRuntime for WorkerRuntime {
        async fn launch(&self, spec: &LaunchSpec) -> Result<(), RuntimeError>;
        async fn stop(&self, id: WorkerId, grace: Duration) -> Result<StopOutcome, RuntimeError>;
        async fn status(&self, id: WorkerId) -> ProcessState;
    }
}
