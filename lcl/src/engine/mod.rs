//! Network-test engines.
//!
//! The orchestrators only see the [`PingEngine`] and [`SpeedTestEngine`]
//! traits. Each call receives a [`CancellationToken`]; an engine that observes
//! cancellation returns [`EngineError::Cancelled`] promptly.

mod ping;
mod speed;

use async_trait::async_trait;
use serde::Serialize;
use thiserror::Error;
use tokio_util::sync::CancellationToken;

use crate::stats::Summary;

pub use self::ping::TcpPing;
pub use self::speed::HttpSpeedTest;

#[derive(Debug, Error)]
pub enum EngineError {
    #[error("test cancelled")]
    Cancelled,
    #[error("could not resolve {0}")]
    Resolve(String),
    #[error("test failed: {0}")]
    Failed(String),
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct PingSample {
    pub seq: u16,
    pub latency_ms: f64,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct PingSummary {
    pub host: String,
    pub port: u16,
    pub samples: Vec<PingSample>,
    /// Sequence numbers that never got an answer.
    pub lost: Vec<u16>,
    pub total: u16,
}

impl PingSummary {
    pub fn latency(&self) -> Summary {
        let values: Vec<f64> = self.samples.iter().map(|s| s.latency_ms).collect();
        Summary::from_samples(&values)
    }

    /// Fraction of probes lost, in `[0, 1]`. Zero probes count as no loss.
    pub fn packet_loss(&self) -> f64 {
        if self.total == 0 {
            return 0.0;
        }
        f64::from(self.lost.len() as u32) / f64::from(self.total)
    }

    pub fn output(&self) -> PingOutput<'_> {
        PingOutput {
            summary: self,
            packet_loss: self.packet_loss(),
            latency: self.latency(),
        }
    }
}

/// Machine-readable ping result: the raw run plus its aggregates.
#[derive(Debug, Clone, Serialize)]
pub struct PingOutput<'a> {
    #[serde(flatten)]
    pub summary: &'a PingSummary,
    pub packet_loss: f64,
    pub latency: Summary,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Direction {
    Download,
    Upload,
    Both,
}

impl Direction {
    pub fn includes_download(self) -> bool {
        matches!(self, Direction::Download | Direction::Both)
    }

    pub fn includes_upload(self) -> bool {
        matches!(self, Direction::Upload | Direction::Both)
    }
}

/// Per-interval throughput samples in Mbit/s.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct SpeedTestResults {
    pub download: Vec<f64>,
    pub upload: Vec<f64>,
}

impl SpeedTestResults {
    pub fn download_summary(&self) -> Summary {
        Summary::from_samples(&self.download)
    }

    pub fn upload_summary(&self) -> Summary {
        Summary::from_samples(&self.upload)
    }

    /// Summaries of the directions that produced samples.
    pub fn summary(&self) -> SpeedTestSummary {
        SpeedTestSummary {
            download: (!self.download.is_empty()).then(|| self.download_summary()),
            upload: (!self.upload.is_empty()).then(|| self.upload_summary()),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Serialize)]
pub struct SpeedTestSummary {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download: Option<Summary>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub upload: Option<Summary>,
}

#[async_trait]
pub trait PingEngine: Send + Sync {
    async fn start(&self, cancel: &CancellationToken) -> Result<PingSummary, EngineError>;
}

#[async_trait]
pub trait SpeedTestEngine: Send + Sync {
    /// `device` names a network interface to bind to, where supported.
    async fn run(
        &self,
        device: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SpeedTestResults, EngineError>;
}

/// Megabits per second for `bytes` moved in `secs`.
pub(crate) fn mbps(bytes: u64, secs: f64) -> f64 {
    if secs <= 0.0 {
        return 0.0;
    }
    (bytes as f64 * 8.0) / secs / 1_000_000.0
}
