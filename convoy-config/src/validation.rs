//! Validation trait and field-level checks shared by the domains

use crate::error::{ConfigError, ConfigResult};

/// Implemented by every configuration domain
pub trait Validatable {
    /// Check the domain's own fields; cross-domain checks live on the root
    fn validate(&self) -> ConfigResult<()>;

    /// Domain name used in error messages
    fn domain_name(&self) -> &'static str;

    fn validation_error(&self, message: impl Into<String>) -> ConfigError {
        ConfigError::DomainError {
            domain: self.domain_name().to_string(),
            message: message.into(),
        }
    }
}

fn domain_error(domain: &str, message: String) -> ConfigError {
    ConfigError::DomainError {
        domain: domain.to_string(),
        message,
    }
}

/// Reject empty strings for fields that must be set
pub fn validate_required_string(value: &str, field: &str, domain: &str) -> ConfigResult<()> {
    if value.is_empty() {
        return Err(domain_error(domain, format!("{field} must not be empty")));
    }
    Ok(())
}

/// Reject zero and negative values. Also rejects NaN for float fields.
pub fn validate_positive<T>(value: T, field: &str, domain: &str) -> ConfigResult<()>
where
    T: Default + PartialOrd + std::fmt::Display,
{
    if value > T::default() {
        Ok(())
    } else {
        Err(domain_error(
            domain,
            format!("{field} must be positive (got {value})"),
        ))
    }
}

/// Reject port 0; warn on ports that usually need elevated privileges
pub fn validate_port_range(port: u16, field: &str, domain: &str) -> ConfigResult<()> {
    if port == 0 {
        return Err(domain_error(domain, format!("{field} must not be port 0")));
    }
    if port < 1024 {
        log::warn!("{field} port {port} is below 1024; binding may need elevated privileges");
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn positive_rejects_zero() {
        assert!(validate_positive(0u32, "count", "fleet").is_err());
        assert!(validate_positive(1u32, "count", "fleet").is_ok());
    }

    #[test]
    fn positive_rejects_nan_bandwidth() {
        assert!(validate_positive(f64::NAN, "bandwidth_mbps", "fleet").is_err());
        assert!(validate_positive(5.0f64, "bandwidth_mbps", "fleet").is_ok());
    }

    #[test]
    fn port_zero_is_rejected() {
        assert!(validate_port_range(0, "base_port", "fleet").is_err());
        assert!(validate_port_range(14000, "base_port", "fleet").is_ok());
    }

    #[test]
    fn required_string_rejects_empty() {
        assert!(validate_required_string("", "worker_binary", "fleet").is_err());
        assert!(validate_required_string("conduit", "worker_binary", "fleet").is_ok());
    }
}
