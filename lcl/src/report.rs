//! Measurement report assembly and signing.

use serde::{Deserialize, Serialize};
use thiserror::Error;
use tracing::debug;

use crate::api::CellularSite;
use crate::binding::as_hex;
use crate::crypto::integrity::canonical_json;
use crate::crypto::signing::{self, SigningError};
use crate::engine::{PingSummary, SpeedTestResults};
use crate::stats::Summary;

#[derive(Debug, Error)]
pub enum ReportError {
    #[error("site `{0}` has no cell id")]
    NoCellId(String),
    #[error("statistic `{0}` is not a finite number")]
    NonFinite(&'static str),
    #[error("cannot serialize report: {0}")]
    Serialize(#[from] serde_json::Error),
    #[error(transparent)]
    Signing(#[from] SigningError),
}

/// Aggregates of one run of the network tests.
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct MeasurementStats {
    pub latency: Summary,
    /// Fraction in `[0, 1]`.
    pub packet_loss: f64,
    pub download: Summary,
    pub upload: Summary,
}

impl MeasurementStats {
    pub fn new(ping: &PingSummary, speed: &SpeedTestResults) -> Self {
        Self {
            latency: ping.latency(),
            packet_loss: ping.packet_loss(),
            download: speed.download_summary(),
            upload: speed.upload_summary(),
        }
    }
}

/// Plaintext payload `M`. Field order here is irrelevant; the signed bytes
/// come from [`canonical_json`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ConnectivityReport {
    pub cell_id: String,
    pub device_id: String,
    pub download_speed: f64,
    pub jitter: f64,
    pub latitude: f64,
    pub longitude: f64,
    #[serde(rename = "package_loss")]
    pub packet_loss: f64,
    pub ping: f64,
    pub timestamp: String,
    pub upload_speed: f64,
}

/// The exact bytes of `M` and `Sign(skT, M)` over them.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SignedReport {
    pub payload: Vec<u8>,
    pub signature: Vec<u8>,
}

/// Body of `POST /report_measurement`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MeasurementReport {
    #[serde(serialize_with = "as_hex")]
    pub sigma_m: Vec<u8>,
    #[serde(serialize_with = "as_hex")]
    pub h_pkr: Vec<u8>,
    #[serde(rename = "M", serialize_with = "as_hex")]
    pub m: Vec<u8>,
    pub show_data: bool,
}

impl MeasurementReport {
    pub fn new(signed: SignedReport, h_pkr: &[u8], show_data: bool) -> Self {
        Self {
            sigma_m: signed.signature,
            h_pkr: h_pkr.to_vec(),
            m: signed.payload,
            show_data,
        }
    }
}

fn finite(name: &'static str, value: f64) -> Result<f64, ReportError> {
    if value.is_finite() {
        Ok(value)
    } else {
        Err(ReportError::NonFinite(name))
    }
}

/// Fills a report for `site` from the run's aggregates. The site's first
/// cell id identifies the measurement.
pub fn build(
    stats: &MeasurementStats,
    site: &CellularSite,
    device_id: &str,
    timestamp: &str,
) -> Result<ConnectivityReport, ReportError> {
    let cell_id = site
        .cell_id
        .first()
        .ok_or_else(|| ReportError::NoCellId(site.name.clone()))?;

    Ok(ConnectivityReport {
        cell_id: cell_id.clone(),
        device_id: device_id.to_string(),
        download_speed: finite("download_speed", stats.download.avg)?,
        jitter: finite("jitter", stats.latency.jitter)?,
        latitude: finite("latitude", site.latitude)?,
        longitude: finite("longitude", site.longitude)?,
        packet_loss: finite("package_loss", stats.packet_loss)?,
        ping: finite("ping", stats.latency.avg)?,
        timestamp: timestamp.to_string(),
        upload_speed: finite("upload_speed", stats.upload.avg)?,
    })
}

/// Serializes `report` canonically and signs those bytes with `sk_t`.
pub fn sign(report: &ConnectivityReport, sk_t: &[u8]) -> Result<SignedReport, ReportError> {
    let payload = canonical_json(report)?;
    let key = signing::signing_key(sk_t)?;
    let signature = signing::sign_der(&key, &payload);
    debug!(payload_len = payload.len(), "measurement report signed");
    Ok(SignedReport { payload, signature })
}

#[cfg(test)]
mod tests {
    use super::{build, sign, ConnectivityReport, MeasurementReport, MeasurementStats, ReportError};
    use crate::crypto::signing;
    use crate::engine::{PingSample, PingSummary, SpeedTestResults};
    use crate::testing::{sample_site, sample_triple};

    fn stats() -> MeasurementStats {
        let ping = PingSummary {
            host: "example.org".into(),
            port: 443,
            samples: vec![
                PingSample { seq: 0, latency_ms: 20.0 },
                PingSample { seq: 1, latency_ms: 30.0 },
            ],
            lost: vec![2, 3],
            total: 4,
        };
        let speed = SpeedTestResults {
            download: vec![50.0, 70.0],
            upload: vec![10.0, 20.0],
        };
        MeasurementStats::new(&ping, &speed)
    }

    #[test]
    fn report_takes_site_and_stats() {
        let report = build(&stats(), &sample_site(), "dev-1", "2024-01-01T00:00:00Z").unwrap();
        assert_eq!(report.cell_id, "cell-1");
        assert_eq!(report.device_id, "dev-1");
        assert_eq!(report.download_speed, 60.0);
        assert_eq!(report.upload_speed, 15.0);
        assert_eq!(report.ping, 25.0);
        assert_eq!(report.packet_loss, 0.5);
        assert_eq!(report.jitter, 5.0);
        assert_eq!(report.latitude, sample_site().latitude);
    }

    #[test]
    fn site_without_cell_id_is_rejected() {
        let mut site = sample_site();
        site.cell_id.clear();
        assert!(matches!(
            build(&stats(), &site, "dev", "now"),
            Err(ReportError::NoCellId(_))
        ));
    }

    #[test]
    fn non_finite_statistics_are_rejected() {
        let mut stats = stats();
        stats.packet_loss = f64::NAN;
        assert!(matches!(
            build(&stats, &sample_site(), "dev", "now"),
            Err(ReportError::NonFinite("package_loss"))
        ));
    }

    #[test]
    fn signed_payload_is_canonical_and_verifies() {
        let triple = sample_triple();
        let report = build(&stats(), &sample_site(), "dev-1", "2024-01-01T00:00:00Z").unwrap();
        let signed = sign(&report, &triple.sk_t).unwrap();

        let text = std::str::from_utf8(&signed.payload).unwrap();
        assert!(text.starts_with(r#"{"cell_id":"cell-1","device_id":"dev-1","download_speed":"#));
        assert!(text.contains(r#""package_loss":0.5"#));
        assert!(!text.contains(' '));
        let decoded: ConnectivityReport = serde_json::from_slice(&signed.payload).unwrap();
        assert_eq!(decoded, report);

        let key = signing::signing_key(&triple.sk_t).unwrap();
        assert!(signing::verify_der(
            key.verifying_key(),
            &signed.payload,
            &signed.signature
        ));
        // Same report, same bytes.
        assert_eq!(sign(&report, &triple.sk_t).unwrap().payload, signed.payload);
    }

    #[test]
    fn measurement_report_wire_shape() {
        let triple = sample_triple();
        let report = build(&stats(), &sample_site(), "dev", "now").unwrap();
        let signed = sign(&report, &triple.sk_t).unwrap();
        let payload = signed.payload.clone();
        let body = MeasurementReport::new(signed, &triple.h_pkr, true);
        let json = serde_json::to_value(&body).unwrap();
        assert_eq!(json["M"], hex::encode(&payload));
        assert_eq!(json["h_pkr"], hex::encode(&triple.h_pkr));
        assert_eq!(json["show_data"], true);
        assert!(json["sigma_m"].is_string());
    }

    #[test]
    fn stats_json_shape() {
        let value = serde_json::to_value(stats()).unwrap();
        let mut keys: Vec<&String> = value.as_object().unwrap().keys().collect();
        keys.sort();
        assert_eq!(keys, ["download", "latency", "packet_loss", "upload"]);
        assert_eq!(value["packet_loss"], 0.5);
        assert_eq!(value["latency"]["avg"], 25.0);
        assert_eq!(value["download"]["median"], 50.0);
        assert_eq!(value["upload"]["count"], 2);
    }
}
