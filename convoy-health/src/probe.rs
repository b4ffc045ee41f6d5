//! Liveness probes against worker endpoints

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use tokio::net::TcpStream;

use crate::error::ProbeError;

/// A single liveness check against an endpoint. Every probe carries a
/// mandatory timeout; there is no unbounded wait on a wedged worker.
#[async_trait]
pub trait WorkerProber: Send + Sync {
    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> Result<(), ProbeError>;
}

/// Probes by opening and immediately closing a TCP connection.
///
/// The proxy accepts client connections on its endpoint, so a completed
/// handshake is sufficient evidence the process is serving.
pub struct TcpProber;

#[async_trait]
impl WorkerProber for TcpProber {
    async fn probe(&self, addr: SocketAddr, timeout: Duration) -> Result<(), ProbeError> {
        let stream = tokio::time::timeout(timeout, TcpStream::connect(addr))
            .await
            .map_err(|_| ProbeError::Timeout { timeout })??;
        drop(stream);
        Ok(())
    }
}
