//! Where per-worker metrics come from

use std::net::SocketAddr;
use std::time::Duration;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};

use crate::error::{StatsError, StatsResult};

/// Client counts reported by one worker's metrics endpoint
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct WorkerMetrics {
    pub connected_clients: u32,
    pub connecting_clients: u32,
}

/// Fetches one worker's metrics by address
#[async_trait]
pub trait StatsSource: Send + Sync {
    async fn fetch(&self, addr: SocketAddr) -> StatsResult<WorkerMetrics>;
}

/// Production source: `GET http://{metrics_addr}/stats`, JSON body with
/// the worker binary's client counters
pub struct HttpStatsSource {
    client: reqwest::Client,
}

impl HttpStatsSource {
    pub fn new(timeout: Duration) -> StatsResult<Self> {
        let client = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self { client })
    }
}

#[async_trait]
impl StatsSource for HttpStatsSource {
    async fn fetch(&self, addr: SocketAddr) -> StatsResult<WorkerMetrics> {
        let url = format!("http://{}/stats", addr);
        let response = self.client.get(&url).send().await?;
        if !response.status().is_success() {
            return Err(StatsError::BadStatus {
                status: response.status().as_u16(),
            });
        }
        Ok(response.json().await?)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::TcpListener;

    /// Serve one canned HTTP response, then close
    async fn serve_once(body: &'static str, status: &'static str) -> SocketAddr {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            let (mut stream, _) = listener.accept().await.unwrap();
            let mut buf = [0u8; 1024];
            let _ = stream.read(&mut buf).await;
            let response = format!(
                "HTTP/1.1 {}\r\ncontent-type: application/json\r\ncontent-length: {}\r\n\r\n{}",
                status,
                body.len(),
                body
            );
            stream.write_all(response.as_bytes()).await.unwrap();
        });
        addr
    }

    #[tokio::test]
    async fn fetch_parses_worker_metrics() {
        let addr = serve_once(r#"{"connected_clients": 42, "connecting_clients": 3}"#, "200 OK").await;

        let source = HttpStatsSource::new(Duration::from_secs(2)).unwrap();
        let metrics = source.fetch(addr).await.unwrap();
        assert_eq!(metrics.connected_clients, 42);
        assert_eq!(metrics.connecting_clients, 3);
    }

    #[tokio::test]
    async fn fetch_rejects_error_status() {
        let addr = serve_once("{}", "503 Service Unavailable").await;

        let source = HttpStatsSource::new(Duration::from_secs(2)).unwrap();
        let err = source.fetch(addr).await.unwrap_err();
        assert!(matches!(err, StatsError::BadStatus { status: 503 }));
    }

    #[tokio::test]
    async fn fetch_fails_against_closed_port() {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        drop(listener);

        let source = HttpStatsSource::new(Duration::from_millis(500)).unwrap();
        assert!(source.fetch(addr).await.is_err());
    }
}
