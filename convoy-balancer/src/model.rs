//! Typed model of the generated stream configuration

use std::net::SocketAddr;
use std::time::Duration;

use convoy_config::{BalancerConfig, ListenerProtocol};
use convoy_core::FleetSnapshot;

use crate::error::{BalancerError, BalancerResult};

/// One upstream server entry: a routable worker's loopback endpoint
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UpstreamServer {
    pub endpoint: SocketAddr,
    /// Connection cap, taken from the worker's desired capacity.
    /// Only rendered for TCP upstreams.
    pub max_conns: u32,
}

/// A named group of worker endpoints sharing one balancing policy
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Upstream {
    pub name: String,
    pub protocol: ListenerProtocol,
    pub servers: Vec<UpstreamServer>,
}

/// One public listener forwarding to a named upstream
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Listener {
    pub port: u16,
    pub protocol: ListenerProtocol,
    pub upstream: String,
}

/// The complete generated configuration, ready to render.
///
/// Distinct from the `balancer:` configuration domain: that describes the
/// operator's settings, this is the artifact derived from a fleet snapshot.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StreamConfig {
    pub listeners: Vec<Listener>,
    pub upstreams: Vec<Upstream>,
    /// Session idle timeout applied to every listener
    pub session_timeout: Duration,
}

impl StreamConfig {
    /// Structural validation, run before any live configuration is touched.
    ///
    /// An empty upstream fails here on purpose: a configuration that routes
    /// nowhere must never replace a working one.
    pub fn validate(&self) -> BalancerResult<()> {
        if self.listeners.is_empty() {
            return Err(BalancerError::Invalid("no listeners defined".to_string()));
        }

        let mut seen: Vec<(u16, ListenerProtocol)> = Vec::new();
        for listener in &self.listeners {
            let key = (listener.port, listener.protocol);
            if seen.contains(&key) {
                return Err(BalancerError::Invalid(format!(
                    "duplicate listener {}/{}",
                    listener.port, listener.protocol
                )));
            }
            seen.push(key);

            if !self.upstreams.iter().any(|u| u.name == listener.upstream) {
                return Err(BalancerError::Invalid(format!(
                    "listener {}/{} references unknown upstream '{}'",
                    listener.port, listener.protocol, listener.upstream
                )));
            }
        }

        for upstream in &self.upstreams {
            if upstream.servers.is_empty() {
                return Err(BalancerError::Invalid(format!(
                    "upstream '{}' has no servers",
                    upstream.name
                )));
            }
            for server in &upstream.servers {
                if self.listeners.iter().any(|l| l.port == server.endpoint.port()) {
                    return Err(BalancerError::Invalid(format!(
                        "listener port {} collides with worker endpoint {}",
                        server.endpoint.port(),
                        server.endpoint
                    )));
                }
            }
        }

        Ok(())
    }
}

/// Derive the stream configuration for a fleet snapshot.
///
/// Pure: identical inputs produce identical values, and
/// [`render`](crate::render::render) turns those into byte-identical text.
/// Only routable workers (Healthy or Degraded) appear in upstreams, in id
/// order; one upstream is built per protocol the settings expose.
pub fn generate(snapshot: &FleetSnapshot, settings: &BalancerConfig) -> StreamConfig {
    let servers: Vec<UpstreamServer> = snapshot
        .routable()
        .map(|w| UpstreamServer {
            endpoint: w.endpoint.addr(),
            max_conns: w.desired_capacity,
        })
        .collect();

    let mut upstreams = Vec::new();
    for protocol in [ListenerProtocol::Tcp, ListenerProtocol::Udp] {
        if settings.listeners.iter().any(|l| l.protocol == protocol) {
            upstreams.push(Upstream {
                name: upstream_name(protocol),
                protocol,
                servers: servers.clone(),
            });
        }
    }

    let listeners = settings
        .listeners
        .iter()
        .map(|l| Listener {
            port: l.port,
            protocol: l.protocol,
            upstream: upstream_name(l.protocol),
        })
        .collect();

    StreamConfig {
        listeners,
        upstreams,
        session_timeout: settings.session_timeout,
    }
}

fn upstream_name(protocol: ListenerProtocol) -> String {
    format!("convoy_{}", protocol.as_str())
}
