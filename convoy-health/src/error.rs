//! Probe failure classification

use std::time::Duration;
use thiserror::Error;

/// Why a single probe attempt failed
#[derive(Debug, Error)]
pub enum ProbeError {
    #[error("probe timed out after {timeout:?}")]
    Timeout { timeout: Duration },

    #[error("probe connection failed: {0}")]
    Connect(#[from] std::io::Error),
}
