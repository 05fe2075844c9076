//! HTTP throughput test.

use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::{Client, ClientBuilder};
use tokio::time::{timeout_at, Instant};
use tokio_util::sync::CancellationToken;
use tracing::debug;

use super::{mbps, Direction, EngineError, SpeedTestEngine, SpeedTestResults};
use crate::config::SpeedTestSettings;

/// HTTP throughput test: timed download from one URL, timed uploads of
/// fixed-size bodies to another. Each direction is bounded by the configured
/// duration and sampled once per sample interval.
#[derive(Debug, Clone)]
pub struct HttpSpeedTest {
    settings: SpeedTestSettings,
    direction: Direction,
}

impl HttpSpeedTest {
    pub fn new(settings: SpeedTestSettings, direction: Direction) -> Self {
        Self {
            settings,
            direction,
        }
    }

    fn client(&self, device: Option<&str>) -> Result<Client, EngineError> {
        let builder = Client::builder()
            .connect_timeout(self.settings.connect_timeout())
            .no_proxy();
        bind_interface(builder, device)
            .build()
            .map_err(|e| EngineError::Failed(format!("http client: {e}")))
    }

    async fn download(
        &self,
        client: &Client,
        cancel: &CancellationToken,
    ) -> Result<Vec<f64>, EngineError> {
        let deadline = Instant::now() + self.settings.duration();
        let request = client.get(&self.settings.download_url).send();
        let mut response = tokio::select! {
            biased;
            _ = cancel.cancelled() => return Err(EngineError::Cancelled),
            response = timeout_at(deadline, request) => match response {
                Ok(Ok(resp)) => resp
                    .error_for_status()
                    .map_err(|e| EngineError::Failed(format!("download: {e}")))?,
                Ok(Err(e)) => return Err(EngineError::Failed(format!("download: {e}"))),
                Err(_) => return Err(EngineError::Failed("download did not start in time".into())),
            },
        };

        let mut sampler = Sampler::new(self.settings.sample_interval());
        loop {
            let chunk = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                chunk = timeout_at(deadline, response.chunk()) => chunk,
            };
            match chunk {
                Ok(Ok(Some(bytes))) => sampler.record(bytes.len() as u64),
                Ok(Ok(None)) | Err(_) => break,
                Ok(Err(e)) => return Err(EngineError::Failed(format!("download: {e}"))),
            }
        }
        Ok(sampler.finish())
    }

    async fn upload(
        &self,
        client: &Client,
        cancel: &CancellationToken,
    ) -> Result<Vec<f64>, EngineError> {
        let deadline = Instant::now() + self.settings.duration();
        let body = Bytes::from(vec![0u8; self.settings.upload_chunk_bytes]);
        let mut sampler = Sampler::new(self.settings.sample_interval());

        while Instant::now() < deadline {
            let request = client
                .post(&self.settings.upload_url)
                .body(body.clone())
                .send();
            let outcome = tokio::select! {
                biased;
                _ = cancel.cancelled() => return Err(EngineError::Cancelled),
                outcome = timeout_at(deadline, request) => outcome,
            };
            match outcome {
                Ok(Ok(resp)) => {
                    resp.error_for_status()
                        .map_err(|e| EngineError::Failed(format!("upload: {e}")))?;
                    sampler.record(body.len() as u64);
                }
                Ok(Err(e)) => return Err(EngineError::Failed(format!("upload: {e}"))),
                // The in-flight body is abandoned at the deadline and not counted.
                Err(_) => break,
            }
        }
        Ok(sampler.finish())
    }
}

#[async_trait]
impl SpeedTestEngine for HttpSpeedTest {
    async fn run(
        &self,
        device: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SpeedTestResults, EngineError> {
        let client = self.client(device)?;
        let mut results = SpeedTestResults::default();

        if self.direction.includes_download() {
            debug!(url = %self.settings.download_url, "speed test download running");
            results.download = self.download(&client, cancel).await?;
        }
        if self.direction.includes_upload() {
            debug!(url = %self.settings.upload_url, "speed test upload running");
            results.upload = self.upload(&client, cancel).await?;
        }
        Ok(results)
    }
}

#[cfg(any(target_os = "android", target_os = "fuchsia", target_os = "linux"))]
fn bind_interface(builder: ClientBuilder, device: Option<&str>) -> ClientBuilder {
    match device {
        Some(name) => builder.interface(name),
        None => builder,
    }
}

#[cfg(not(any(target_os = "android", target_os = "fuchsia", target_os = "linux")))]
fn bind_interface(builder: ClientBuilder, device: Option<&str>) -> ClientBuilder {
    if let Some(name) = device {
        tracing::warn!("binding to interface {name} is not supported on this platform");
    }
    builder
}

/// Buckets byte counts into fixed windows and emits one Mbit/s value per window.
struct Sampler {
    interval: Duration,
    window_start: Instant,
    window_bytes: u64,
    samples: Vec<f64>,
}

impl Sampler {
    fn new(interval: Duration) -> Self {
        Self {
            interval,
            window_start: Instant::now(),
            window_bytes: 0,
            samples: Vec::new(),
        }
    }

    fn record(&mut self, bytes: u64) {
        self.window_bytes += bytes;
        let elapsed = self.window_start.elapsed();
        if elapsed >= self.interval {
            self.samples.push(mbps(self.window_bytes, elapsed.as_secs_f64()));
            self.window_start = Instant::now();
            self.window_bytes = 0;
        }
    }

    fn finish(mut self) -> Vec<f64> {
        if self.window_bytes > 0 {
            let elapsed = self.window_start.elapsed().as_secs_f64();
            self.samples.push(mbps(self.window_bytes, elapsed));
        }
        self.samples
    }
}

#[cfg(test)]
mod tests {
    use super::{HttpSpeedTest, Sampler};
    use crate::config::SpeedTestSettings;
    use crate::engine::{Direction, EngineError, SpeedTestEngine};
    use std::future::Future;
    use std::time::{Duration, Instant};
    use tokio::io::{AsyncReadExt, AsyncWriteExt};
    use tokio::net::{TcpListener, TcpStream};
    use tokio_util::sync::CancellationToken;

    /// Reads one request head and its body. False once the peer hangs up.
    async fn read_request(stream: &mut TcpStream) -> bool {
        let mut head = Vec::new();
        let mut byte = [0u8; 1];
        while !head.ends_with(b"\r\n\r\n") {
            match stream.read(&mut byte).await {
                Ok(1) => head.push(byte[0]),
                _ => return false,
            }
        }
        let head = String::from_utf8_lossy(&head).to_ascii_lowercase();
        let len = head
            .lines()
            .find_map(|line| line.strip_prefix("content-length:"))
            .and_then(|value| value.trim().parse::<usize>().ok())
            .unwrap_or(0);
        let mut body = vec![0u8; len];
        stream.read_exact(&mut body).await.is_ok()
    }

    async fn serve<F, Fut>(respond: F) -> String
    where
        F: Fn(TcpStream) -> Fut + Send + 'static,
        Fut: Future<Output = ()> + Send + 'static,
    {
        let listener = TcpListener::bind("127.0.0.1:0").await.unwrap();
        let url = format!("http://{}/", listener.local_addr().unwrap());
        tokio::spawn(async move {
            while let Ok((stream, _)) = listener.accept().await {
                tokio::spawn(respond(stream));
            }
        });
        url
    }

    async fn finite_body(mut stream: TcpStream) {
        if read_request(&mut stream).await {
            let body = vec![7u8; 256 * 1024];
            let head = format!(
                "HTTP/1.1 200 OK\r\ncontent-length: {}\r\nconnection: close\r\n\r\n",
                body.len()
            );
            let _ = stream.write_all(head.as_bytes()).await;
            let _ = stream.write_all(&body).await;
        }
    }

    async fn trickled_body(mut stream: TcpStream) {
        if read_request(&mut stream).await {
            let head = b"HTTP/1.1 200 OK\r\ncontent-length: 100000000\r\n\r\n";
            let _ = stream.write_all(head).await;
            let chunk = [0u8; 1024];
            while stream.write_all(&chunk).await.is_ok() {
                tokio::time::sleep(Duration::from_millis(10)).await;
            }
        }
    }

    async fn accept_uploads(mut stream: TcpStream) {
        while read_request(&mut stream).await {
            let reply = b"HTTP/1.1 200 OK\r\ncontent-length: 0\r\n\r\n";
            if stream.write_all(reply).await.is_err() {
                break;
            }
        }
    }

    fn local(url: &str, duration_secs: u64, direction: Direction) -> HttpSpeedTest {
        HttpSpeedTest::new(
            SpeedTestSettings {
                download_url: url.to_string(),
                upload_url: url.to_string(),
                duration_secs,
                upload_chunk_bytes: 16 * 1024,
                sample_interval_ms: 50,
                connect_timeout_secs: 2,
            },
            direction,
        )
    }

    #[test]
    fn sampler_flushes_partial_window() {
        let mut sampler = Sampler::new(Duration::from_secs(3600));
        sampler.record(1_000);
        sampler.record(1_000);
        let samples = sampler.finish();
        assert_eq!(samples.len(), 1);
        assert!(samples[0].is_finite());
    }

    #[test]
    fn sampler_emits_per_window() {
        let mut sampler = Sampler::new(Duration::ZERO);
        sampler.record(10);
        sampler.record(10);
        assert_eq!(sampler.finish().len(), 2);
    }

    #[tokio::test]
    async fn cancellation_before_start() {
        let cancel = CancellationToken::new();
        cancel.cancel();
        let engine = HttpSpeedTest::new(
            SpeedTestSettings {
                download_url: "http://127.0.0.1:9/".into(),
                ..SpeedTestSettings::default()
            },
            Direction::Download,
        );
        let err = engine.run(None, &cancel).await.unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
    }

    #[tokio::test]
    async fn finite_download_is_sampled() {
        let url = serve(finite_body).await;
        let results = local(&url, 10, Direction::Download)
            .run(None, &CancellationToken::new())
            .await
            .unwrap();
        assert!(!results.download.is_empty());
        assert!(results.download.iter().all(|mbps| mbps.is_finite() && *mbps >= 0.0));
        assert!(results.upload.is_empty());
    }

    #[tokio::test]
    async fn upload_stops_at_duration() {
        let url = serve(accept_uploads).await;
        let started = Instant::now();
        let results = local(&url, 1, Direction::Upload)
            .run(None, &CancellationToken::new())
            .await
            .unwrap();
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_secs(1));
        assert!(elapsed < Duration::from_secs(4), "upload ran for {elapsed:?}");
        assert!(!results.upload.is_empty());
        assert!(results.download.is_empty());
    }

    #[tokio::test]
    async fn cancel_mid_download() {
        let url = serve(trickled_body).await;
        let cancel = CancellationToken::new();
        let trigger = cancel.clone();
        tokio::spawn(async move {
            tokio::time::sleep(Duration::from_millis(300)).await;
            trigger.cancel();
        });

        let started = Instant::now();
        let err = local(&url, 30, Direction::Download)
            .run(None, &cancel)
            .await
            .unwrap_err();
        assert!(matches!(err, EngineError::Cancelled));
        assert!(started.elapsed() < Duration::from_secs(5));
    }
}
