//! Configuration error types

use thiserror::Error;

/// Configuration result type
pub type ConfigResult<T> = Result<T, ConfigError>;

/// Configuration errors
#[derive(Error, Debug)]
pub enum ConfigError {
    /// IO error reading the configuration file
    #[error("cannot read config file: {0}")]
    FileReadError(#[from] std::io::Error),

    /// YAML syntax or shape error
    #[error("cannot parse config: {0}")]
    ParseError(#[from] serde_yaml::Error),

    /// A value failed validation outside any single domain
    #[error("invalid configuration: {0}")]
    ValidationError(String),

    /// An override variable held a value the field cannot take
    #[error("environment override rejected: {0}")]
    EnvError(String),

    /// A domain section failed its own validation
    #[error("invalid {domain} configuration: {message}")]
    DomainError { domain: String, message: String },
}
