//! Socket-level readiness probe.

use async_trait::async_trait;
use dockhand_core::{ConnectionDescriptor, Error, Probe, Result};
use std::time::Duration;
use tokio::io::Interest;
use tokio::net::TcpStream;
use tokio::time::timeout;
use tracing::debug;

/// Probe that treats an accepted TCP connection that stays open as ready.
///
/// Port forwarders in front of a container accept connections before the
/// service behind them listens, then close them straight away. The probe
/// therefore waits `settle` after connecting and fails if the peer hung up.
#[derive(Debug, Clone)]
pub struct TcpProbe {
    connect_timeout: Duration,
    settle: Duration,
}

impl Default for TcpProbe {
    fn default() -> Self {
        Self {
            connect_timeout: Duration::from_secs(5),
            settle: Duration::from_millis(250),
        }
    }
}

impl TcpProbe {
    pub fn new(connect_timeout: Duration, settle: Duration) -> Self {
        Self {
            connect_timeout,
            settle,
        }
    }

    fn address(descriptor: &ConnectionDescriptor) -> Result<(String, u16)> {
        let url = descriptor.to_url()?;
        let host = url
            .host_str()
            .ok_or_else(|| Error::Connection("descriptor has no host".to_string()))?;
        let port = url
            .port()
            .ok_or_else(|| Error::Connection("descriptor has no port".to_string()))?;
        Ok((host.trim_start_matches('[').trim_end_matches(']').to_string(), port))
    }
}

#[async_trait]
impl Probe for TcpProbe {
    type Connection = TcpStream;

    async fn open(&self, descriptor: &ConnectionDescriptor) -> Result<TcpStream> {
        let (host, port) = Self::address(descriptor)?;
        debug!(host = %host, port, "Opening TCP connection");

        timeout(self.connect_timeout, TcpStream::connect((host.as_str(), port)))
            .await
            .map_err(|_| Error::Connection(format!("connect to {host}:{port} timed out")))?
            .map_err(|e| Error::Connection(format!("connect to {host}:{port}: {e}")))
    }

    async fn verify(&self, connection: &mut TcpStream) -> Result<()> {
        match timeout(self.settle, connection.ready(Interest::READABLE)).await {
            // Quiet peer: the connection is being held open.
            Err(_) => Ok(()),
            Ok(Err(e)) => Err(Error::Connection(e.to_string())),
            Ok(Ok(_)) => {
                // Peek so a server greeting stays in the stream for the suite.
                let mut buf = [0u8; 1];
                match connection.peek(&mut buf).await {
                    Ok(0) => Err(Error::Connection(
                        "peer closed the connection".to_string(),
                    )),
                    Ok(_) => Ok(()),
                    Err(e) => Err(Error::Connection(e.to_string())),
                }
            }
        }
    }

    async fn release(&self, connection: TcpStream) {
        drop(connection);
    }
}
