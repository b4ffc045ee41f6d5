//! Load balancer configuration: listeners, config artifact, reload command

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use crate::error::ConfigResult;
use crate::validation::{validate_port_range, validate_positive, validate_required_string, Validatable};

/// Balancer artifact and listener configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BalancerConfig {
    /// Where the generated config artifact is written
    #[serde(default = "default_config_path")]
    pub config_path: PathBuf,

    /// Command invoked to make the external balancer reload its config
    #[serde(default = "default_reload_command")]
    pub reload_command: Vec<String>,

    /// Bound on the reload command's runtime
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_reload_timeout")]
    pub reload_timeout: Duration,

    /// Public (port, protocol) pairs the balancer exposes
    #[serde(default = "default_listeners")]
    pub listeners: Vec<ListenerConfig>,

    /// Idle session timeout rendered into the balancer config
    #[serde(with = "crate::domains::utils::serde_duration", default = "default_session_timeout")]
    pub session_timeout: Duration,
}

/// One public listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ListenerConfig {
    pub port: u16,
    pub protocol: ListenerProtocol,
}

/// L4 protocol of a listener
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ListenerProtocol {
    Tcp,
    Udp,
}

impl ListenerProtocol {
    pub fn as_str(&self) -> &'static str {
        match self {
            ListenerProtocol::Tcp => "tcp",
            ListenerProtocol::Udp => "udp",
        }
    }
}

impl std::fmt::Display for ListenerProtocol {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl FromStr for ListenerProtocol {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "tcp" => Ok(ListenerProtocol::Tcp),
            "udp" => Ok(ListenerProtocol::Udp),
            _ => Err(format!("Invalid listener protocol: {}", s)),
        }
    }
}

impl Default for BalancerConfig {
    fn default() -> Self {
        Self {
            config_path: default_config_path(),
            reload_command: default_reload_command(),
            reload_timeout: default_reload_timeout(),
            listeners: default_listeners(),
            session_timeout: default_session_timeout(),
        }
    }
}

impl Validatable for BalancerConfig {
    fn validate(&self) -> ConfigResult<()> {
        validate_required_string(
            &self.config_path.to_string_lossy(),
            "config_path",
            self.domain_name(),
        )?;
        validate_positive(self.reload_timeout.as_secs(), "reload_timeout", self.domain_name())?;
        validate_positive(self.session_timeout.as_secs(), "session_timeout", self.domain_name())?;

        if self.reload_command.is_empty() {
            return Err(self.validation_error("reload_command cannot be empty"));
        }

        if self.listeners.is_empty() {
            return Err(self.validation_error("at least one listener must be configured"));
        }

        for listener in &self.listeners {
            validate_port_range(listener.port, "listeners.port", self.domain_name())?;
        }

        for (i, a) in self.listeners.iter().enumerate() {
            if self.listeners[i + 1..].contains(a) {
                return Err(self.validation_error(format!(
                    "duplicate listener {}/{}",
                    a.port, a.protocol
                )));
            }
        }

        Ok(())
    }

    fn domain_name(&self) -> &'static str {
        "balancer"
    }
}

// Default value functions
fn default_config_path() -> PathBuf {
    PathBuf::from("/etc/nginx/stream.d/convoy.conf")
}

fn default_reload_command() -> Vec<String> {
    vec!["nginx".to_string(), "-s".to_string(), "reload".to_string()]
}

fn default_reload_timeout() -> Duration {
    Duration::from_secs(10)
}

fn default_listeners() -> Vec<ListenerConfig> {
    vec![
        ListenerConfig {
            port: 8443,
            protocol: ListenerProtocol::Tcp,
        },
        ListenerConfig {
            port: 8443,
            protocol: ListenerProtocol::Udp,
        },
    ]
}

fn default_session_timeout() -> Duration {
    Duration::from_secs(45)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_balancer_config_defaults() {
        let config = BalancerConfig::default();
        assert_eq!(config.listeners.len(), 2);
        assert_eq!(config.session_timeout, Duration::from_secs(45));
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_duplicate_listeners_rejected() {
        let mut config = BalancerConfig::default();
        config.listeners.push(ListenerConfig {
            port: 8443,
            protocol: ListenerProtocol::Tcp,
        });
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_same_port_different_protocol_allowed() {
        let config = BalancerConfig::default();
        // Default has 8443/tcp and 8443/udp
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_empty_reload_command_rejected() {
        let mut config = BalancerConfig::default();
        config.reload_command.clear();
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_protocol_round_trip() {
        assert_eq!("udp".parse::<ListenerProtocol>().unwrap(), ListenerProtocol::Udp);
        assert_eq!(ListenerProtocol::Tcp.to_string(), "tcp");
        assert!("icmp".parse::<ListenerProtocol>().is_err());
    }
}
