//! Test fixtures and fakes for the collaborator traits.

use std::collections::HashMap;
use std::io;
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use bytes::Bytes;
use p256::ecdsa::SigningKey;
use rand::rngs::OsRng;
use rand::RngCore;
use tokio::sync::Notify;
use tokio_util::sync::CancellationToken;
use url::Url;
use zeroize::Zeroizing;

use crate::api::{classify, CellularSite, Endpoint, HttpError, SiteStatus, Transport};
use crate::binding::SecretTriple;
use crate::credential::{CredentialError, CredentialValidator};
use crate::engine::{
    EngineError, PingEngine, PingSample, PingSummary, SpeedTestEngine, SpeedTestResults,
};
use crate::picker::SiteSelector;
use crate::prompt::Confirm;

fn random_bytes(len: usize) -> Vec<u8> {
    let mut bytes = vec![0u8; len];
    OsRng.fill_bytes(&mut bytes);
    bytes
}

/// A fresh triple with a valid P-256 key and random commitments.
pub fn sample_triple() -> SecretTriple {
    let key = SigningKey::random(&mut OsRng);
    SecretTriple {
        r: random_bytes(32),
        h_pkr: random_bytes(32),
        sk_t: Zeroizing::new(key.to_bytes().to_vec()),
    }
}

/// The JSON credential document [`crate::credential::JsonCredentialValidator`] accepts.
pub fn credential_json(triple: &SecretTriple) -> Vec<u8> {
    serde_json::to_vec(&serde_json::json!({
        "R": hex::encode(&triple.r),
        "hPKR": hex::encode(&triple.h_pkr),
        "skT": hex::encode(triple.sk_t.as_slice()),
    }))
    .unwrap()
}

pub fn sample_site() -> CellularSite {
    CellularSite {
        name: "Filipino Community Village".into(),
        address: "5740 Martin Luther King Jr Way S".into(),
        cell_id: vec!["cell-1".into(), "cell-2".into()],
        latitude: 47.5516,
        longitude: -122.2836,
        status: SiteStatus::Active,
    }
}

/// Returns the same triple for any credential, or rejects every credential.
pub struct StaticValidator {
    triple: Option<SecretTriple>,
}

impl StaticValidator {
    pub fn accepting(triple: SecretTriple) -> Self {
        Self {
            triple: Some(triple),
        }
    }

    pub fn rejecting() -> Self {
        Self { triple: None }
    }
}

impl CredentialValidator for StaticValidator {
    fn validate(&self, _credential: &[u8]) -> Result<SecretTriple, CredentialError> {
        self.triple
            .clone()
            .ok_or_else(|| CredentialError::Malformed("rejected".into()))
    }
}

#[derive(Debug, Clone)]
pub struct RecordedRequest {
    pub url: Url,
    pub body: Option<Vec<u8>>,
}

#[derive(Default)]
struct TransportState {
    responses: HashMap<&'static str, (u16, Vec<u8>)>,
    requests: Vec<RecordedRequest>,
}

/// Answers each endpoint with a programmed status and body and records every
/// request. Unprogrammed endpoints answer 201 with an empty body.
#[derive(Clone, Default)]
pub struct RecordingTransport {
    state: Arc<Mutex<TransportState>>,
}

impl RecordingTransport {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn respond_with(&self, endpoint: Endpoint, status: u16, body: Vec<u8>) {
        self.state
            .lock()
            .unwrap()
            .responses
            .insert(endpoint.path(), (status, body));
    }

    pub fn requests(&self) -> Vec<RecordedRequest> {
        self.state.lock().unwrap().requests.clone()
    }

    /// Bodies sent to `endpoint`; a GET records an empty body.
    pub fn requests_to(&self, endpoint: Endpoint) -> Vec<Vec<u8>> {
        self.requests()
            .into_iter()
            .filter(|req| req.url.path().ends_with(endpoint.path()))
            .map(|req| req.body.unwrap_or_default())
            .collect()
    }

    fn answer(&self, url: &Url, body: Option<Vec<u8>>) -> Result<Bytes, HttpError> {
        let mut state = self.state.lock().unwrap();
        state.requests.push(RecordedRequest {
            url: url.clone(),
            body,
        });
        let (status, body) = state
            .responses
            .iter()
            .find(|(path, _)| url.path().ends_with(*path))
            .map(|(_, response)| response.clone())
            .unwrap_or((201, Vec::new()));
        classify(status)?;
        Ok(Bytes::from(body))
    }
}

#[async_trait]
impl Transport for RecordingTransport {
    async fn send(&self, url: &Url, body: Vec<u8>) -> Result<Bytes, HttpError> {
        self.answer(url, Some(body))
    }

    async fn get(&self, url: &Url) -> Result<Bytes, HttpError> {
        self.answer(url, None)
    }
}

pub fn sample_ping() -> PingSummary {
    PingSummary {
        host: "example.org".into(),
        port: 443,
        samples: vec![
            PingSample { seq: 0, latency_ms: 18.0 },
            PingSample { seq: 1, latency_ms: 22.0 },
            PingSample { seq: 2, latency_ms: 20.0 },
        ],
        lost: vec![3],
        total: 4,
    }
}

/// Ping engine that returns a canned summary.
pub struct FakePing {
    summary: PingSummary,
    runs: AtomicUsize,
}

impl FakePing {
    pub fn new(summary: PingSummary) -> Self {
        Self {
            summary,
            runs: AtomicUsize::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PingEngine for FakePing {
    async fn start(&self, cancel: &CancellationToken) -> Result<PingSummary, EngineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        if cancel.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        Ok(self.summary.clone())
    }
}

enum SpeedBehavior {
    Finish(SpeedTestResults),
    /// Signals `started`, then runs until cancelled.
    RunUntilCancelled { started: Arc<Notify> },
}

pub struct FakeSpeedTest {
    behavior: SpeedBehavior,
    runs: AtomicUsize,
}

impl FakeSpeedTest {
    pub fn finishing(results: SpeedTestResults) -> Self {
        Self {
            behavior: SpeedBehavior::Finish(results),
            runs: AtomicUsize::new(0),
        }
    }

    pub fn until_cancelled(started: Arc<Notify>) -> Self {
        Self {
            behavior: SpeedBehavior::RunUntilCancelled { started },
            runs: AtomicUsize::new(0),
        }
    }

    pub fn runs(&self) -> usize {
        self.runs.load(Ordering::SeqCst)
    }
}

pub fn sample_speed() -> SpeedTestResults {
    SpeedTestResults {
        download: vec![80.0, 100.0, 90.0],
        upload: vec![10.0, 12.0],
    }
}

#[async_trait]
impl SpeedTestEngine for FakeSpeedTest {
    async fn run(
        &self,
        _device: Option<&str>,
        cancel: &CancellationToken,
    ) -> Result<SpeedTestResults, EngineError> {
        self.runs.fetch_add(1, Ordering::SeqCst);
        match &self.behavior {
            SpeedBehavior::Finish(results) => Ok(results.clone()),
            SpeedBehavior::RunUntilCancelled { started } => {
                started.notify_one();
                cancel.cancelled().await;
                Err(EngineError::Cancelled)
            }
        }
    }
}

/// Picks the first offered site, or nothing.
pub struct FixedSelector {
    choose_first: bool,
}

impl FixedSelector {
    pub fn first() -> Self {
        Self { choose_first: true }
    }

    pub fn nothing() -> Self {
        Self {
            choose_first: false,
        }
    }
}

#[async_trait]
impl SiteSelector for FixedSelector {
    async fn pick(&self, sites: Vec<CellularSite>) -> io::Result<Option<CellularSite>> {
        Ok(if self.choose_first {
            sites.into_iter().next()
        } else {
            None
        })
    }
}

/// Gives the same answer to every question and counts them.
pub struct ScriptedConfirm {
    answer: bool,
    asked: AtomicUsize,
}

impl ScriptedConfirm {
    pub fn answering(answer: bool) -> Self {
        Self {
            answer,
            asked: AtomicUsize::new(0),
        }
    }

    pub fn asked(&self) -> usize {
        self.asked.load(Ordering::SeqCst)
    }
}

impl Confirm for ScriptedConfirm {
    fn confirm(&self, _question: &str) -> io::Result<bool> {
        self.asked.fetch_add(1, Ordering::SeqCst);
        Ok(self.answer)
    }
}
