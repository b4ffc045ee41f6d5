//! Error types for balancer configuration handling

use std::time::Duration;
use thiserror::Error;

/// Errors from generating, validating, or applying balancer configuration
#[derive(Debug, Error)]
pub enum BalancerError {
    /// Structural validation failed; the live configuration was not touched
    #[error("invalid balancer configuration: {0}")]
    Invalid(String),

    #[error("balancer configuration write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("balancer reload failed: {0}")]
    ReloadFailed(String),

    #[error("balancer reload timed out after {timeout:?}")]
    ReloadTimeout { timeout: Duration },
}

pub type BalancerResult<T> = Result<T, BalancerError>;
