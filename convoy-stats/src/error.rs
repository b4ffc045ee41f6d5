//! Error types for stats collection and reporting

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatsError {
    #[error("stats request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("stats endpoint returned HTTP {status}")]
    BadStatus { status: u16 },

    #[error("stats report write failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("stats report serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type StatsResult<T> = Result<T, StatsError>;
