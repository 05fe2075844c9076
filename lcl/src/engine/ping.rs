//! TCP connect latency probe.

use std::net::SocketAddr;
use std::time::Instant;

use async_trait::async_trait;
use tokio::net::{lookup_host, TcpStream};
use tokio::time::{sleep, timeout};
use tokio_util::sync::CancellationToken;
use tracing::{debug, trace};

use super::{EngineError, PingEngine, PingSample, PingSummary};
use crate::config::PingSettings;

/// Latency probe that times TCP handshakes to `host:port`.
///
/// A probe that fails to connect within the timeout is counted as lost. The
/// host is resolved once up front so name lookup never inflates a sample.
#[derive(Debug, Clone)]
pub struct TcpPing {
    settings: PingSettings,
}

impl TcpPing {
    pub fn new(settings: PingSettings) -> Self {
        Self { settings }
    }

    async fn resolve(&self) -> Result<SocketAddr, EngineError> {
        let target = (self.settings.host.as_str(), self.settings.port);
        timeout(self.settings.timeout(), lookup_host(target))
            .await
            .map_err(|_| {
                EngineError::Resolve(format!("{}: lookup timed out", self.settings.host))
            })?
            .map_err(|e| EngineError::Resolve(format!("{}: {e}", self.settings.host)))?
            .next()
            .ok_or_else(|| EngineError::Resolve(self.settings.host.clone()))
    }

    async fn probe(&self, addr: SocketAddr) -> Option<f64> {
        let started = Instant::now();
        match timeout(self.settings.timeout(), TcpStream::connect(addr)).await {
            Ok(Ok(_stream)) => Some(started.elapsed().as_secs_f64() * 1000.0),
            Ok(Err(err)) => {
                trace!("probe to {addr} failed: {err}");
                None
            }
            Err(_) => None,
        }
    }
}

#[async_trait]
impl PingEngine for TcpPing {
    async fn start(&self, cancel: &CancellationToken) -> Result<PingSummary, EngineError> {
        let addr = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            addr = self.resolve() => addr?,
        };
        debug!(%addr, count = self.settings.count, "starting ping");

        let mut samples = Vec::with_capacity(usize::from(self.settings.count));
        let mut lost = Vec::new();
        for seq in 0..self.settings.count {
            if seq > 0 {
                tokio::select! {
                    biased;
                    _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                    _ = sleep(self.settings.interval()) => {}
                }
            }
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                outcome = self.probe(addr) => outcome,
            };
            match outcome {
                Some(latency_ms) => samples.push(PingSample { seq, latency_ms }),
                None => lost.push(seq),
            }
        }

        Ok(PingSummary {
            host: self.settings.host.clone(),
            port: self.settings.port,
            samples,
            lost,
            total: self.settings.count,
        })
    }
}
