//! Client for the coverage service.
//!
//! [`ScnApi`] knows the three endpoints and their JSON shapes. The bytes on
//! the wire go through a [`Transport`], so the orchestrators can be tested
//! against a recording fake.

use std::fmt;
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;
use reqwest::header::CONTENT_TYPE;
use reqwest::Client;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::{debug, info};
use url::Url;

use crate::binding::RegistrationRecord;
use crate::report::MeasurementReport;

const MEDIA_TYPE: &str = "application/json";

#[derive(Debug, Error)]
pub enum HttpError {
    #[error("HTTP client error. Code ({0})")]
    Client(u16),
    #[error("HTTP server error. Code ({0})")]
    Server(u16),
    #[error("unexpected HTTP status {0}")]
    UnexpectedStatus(u16),
    #[error("request failed: {0}")]
    Transport(String),
    #[error("invalid endpoint url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("cannot encode request body: {0}")]
    Encode(#[source] serde_json::Error),
    #[error("cannot decode response body: {0}")]
    Decode(#[source] serde_json::Error),
}

/// 2xx is success, 4xx and 5xx carry their code, anything else is a failure
/// of the exchange itself.
pub(crate) fn classify(status: u16) -> Result<(), HttpError> {
    match status {
        200..=299 => Ok(()),
        400..=499 => Err(HttpError::Client(status)),
        500..=599 => Err(HttpError::Server(status)),
        other => Err(HttpError::UnexpectedStatus(other)),
    }
}

/// Raw HTTP exchange. Bodies are JSON.
#[async_trait]
pub trait Transport: Send + Sync {
    async fn send(&self, url: &Url, body: Vec<u8>) -> Result<Bytes, HttpError>;
    async fn get(&self, url: &Url) -> Result<Bytes, HttpError>;
}

pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Every request made through this transport is bounded by `timeout`.
    pub fn new(timeout: Duration) -> Result<Self, HttpError> {
        let client = Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Ok(Self { client })
    }

    async fn finish(response: reqwest::Response) -> Result<Bytes, HttpError> {
        classify(response.status().as_u16())?;
        response
            .bytes()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))
    }
}

#[async_trait]
impl Transport for ReqwestTransport {
    async fn send(&self, url: &Url, body: Vec<u8>) -> Result<Bytes, HttpError> {
        let response = self
            .client
            .post(url.clone())
            .header(CONTENT_TYPE, MEDIA_TYPE)
            .body(body)
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Self::finish(response).await
    }

    async fn get(&self, url: &Url) -> Result<Bytes, HttpError> {
        let response = self
            .client
            .get(url.clone())
            .send()
            .await
            .map_err(|e| HttpError::Transport(e.to_string()))?;
        Self::finish(response).await
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Endpoint {
    Register,
    Report,
    Sites,
}

impl Endpoint {
    pub fn path(self) -> &'static str {
        match self {
            Endpoint::Register => "/register",
            Endpoint::Report => "/report_measurement",
            Endpoint::Sites => "/sites",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Deserialize, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum SiteStatus {
    Active,
    Confirmed,
    InConversation,
    #[serde(other)]
    Unknown,
}

impl SiteStatus {
    pub fn as_str(self) -> &'static str {
        match self {
            SiteStatus::Active => "active",
            SiteStatus::Confirmed => "confirmed",
            SiteStatus::InConversation => "in-conversation",
            SiteStatus::Unknown => "unknown",
        }
    }
}

#[derive(Debug, Clone, PartialEq, Deserialize, Serialize)]
pub struct CellularSite {
    pub name: String,
    pub address: String,
    pub cell_id: Vec<String>,
    pub latitude: f64,
    pub longitude: f64,
    pub status: SiteStatus,
}

impl fmt::Display for CellularSite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}: {}", self.name, self.address)
    }
}

/// Plain text table of sites, one row per site, columns padded to width.
pub fn render_sites(sites: &[CellularSite]) -> String {
    const HEADERS: [&str; 5] = ["Name", "Latitude", "Longitude", "Status", "Address"];
    let rows: Vec<[String; 5]> = sites
        .iter()
        .map(|s| {
            [
                s.name.clone(),
                s.latitude.to_string(),
                s.longitude.to_string(),
                s.status.as_str().to_string(),
                s.address.clone(),
            ]
        })
        .collect();

    let mut widths = HEADERS.map(str::len);
    for row in &rows {
        for (width, cell) in widths.iter_mut().zip(row) {
            *width = (*width).max(cell.chars().count());
        }
    }

    let line = |cells: &[&str]| -> String {
        let padded: Vec<String> = cells
            .iter()
            .zip(widths)
            .map(|(cell, width)| format!(" {cell:<width$} "))
            .collect();
        format!("|{}|", padded.join("|"))
    };
    let rule = format!(
        "+{}+",
        widths
            .iter()
            .map(|w| "-".repeat(w + 2))
            .collect::<Vec<_>>()
            .join("+")
    );

    let mut out = vec![rule.clone(), line(&HEADERS), rule.clone()];
    for row in &rows {
        let cells: Vec<&str> = row.iter().map(String::as_str).collect();
        out.push(line(&cells));
    }
    out.push(rule);
    out.join("\n")
}

/// The coverage service, reached through `T`.
pub struct ScnApi<T> {
    transport: T,
    base: Url,
}

impl<T: Transport> ScnApi<T> {
    pub fn new(transport: T, base: Url) -> Self {
        Self { transport, base }
    }

    pub fn transport(&self) -> &T {
        &self.transport
    }

    /// `base` is a prefix, so `https://host/api` + `/sites` is `https://host/api/sites`.
    pub fn url(&self, endpoint: Endpoint) -> Result<Url, HttpError> {
        let base = self.base.as_str().trim_end_matches('/');
        Ok(Url::parse(&format!("{base}{}", endpoint.path()))?)
    }

    pub async fn register(&self, record: &RegistrationRecord) -> Result<(), HttpError> {
        let body = serde_json::to_vec(record).map_err(HttpError::Encode)?;
        let url = self.url(Endpoint::Register)?;
        debug!(%url, "sending registration");
        self.transport.send(&url, body).await?;
        info!("registration accepted");
        Ok(())
    }

    pub async fn report(&self, report: &MeasurementReport) -> Result<(), HttpError> {
        let body = serde_json::to_vec(report).map_err(HttpError::Encode)?;
        let url = self.url(Endpoint::Report)?;
        debug!(%url, bytes = body.len(), "uploading measurement");
        self.transport.send(&url, body).await?;
        info!("measurement accepted");
        Ok(())
    }

    pub async fn sites(&self) -> Result<Vec<CellularSite>, HttpError> {
        let url = self.url(Endpoint::Sites)?;
        let body = self.transport.get(&url).await?;
        let sites: Vec<CellularSite> = serde_json::from_slice(&body).map_err(HttpError::Decode)?;
        debug!(count = sites.len(), "fetched cellular sites");
        Ok(sites)
    }
}
