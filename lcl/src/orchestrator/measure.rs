//! Measurement run: verified bundle to signed, uploaded report.

use chrono::{Local, SecondsFormat};
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};
use uuid::Uuid;

use crate::api::{CellularSite, ScnApi, Transport};
use crate::binding;
use crate::crypto::integrity::sha256_hex;
use crate::engine::{PingEngine, PingSummary, SpeedTestEngine, SpeedTestResults};
use crate::error::Error;
use crate::picker::SiteSelector;
use crate::report::{self, ConnectivityReport, MeasurementReport, MeasurementStats};
use crate::store::{ArtifactStore, KeyBundleStore};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum MeasureState {
    LoadBundle,
    VerifyBinding,
    SelectSite,
    RunNetworkTests,
    BuildReport,
    Sign,
    Upload,
    Done,
}

/// Everything produced by a measurement run up to, but not including, the upload.
#[derive(Debug, Clone)]
pub struct PreparedReport {
    pub site: CellularSite,
    pub ping: PingSummary,
    pub speed: SpeedTestResults,
    pub stats: MeasurementStats,
    pub report: ConnectivityReport,
    pub body: MeasurementReport,
}

/// Runs the network tests under the registered key and reports the result.
pub struct Measurer<'a, T, A> {
    pub store: &'a KeyBundleStore<A>,
    pub api: &'a ScnApi<T>,
    pub selector: &'a dyn SiteSelector,
    pub ping: &'a dyn PingEngine,
    pub speed: &'a dyn SpeedTestEngine,
    /// Interface the speed test binds to, if any.
    pub device: Option<&'a str>,
    pub show_data: bool,
}

impl<'a, T: Transport, A: ArtifactStore> Measurer<'a, T, A> {
    /// Loads and checks the bundle, runs the tests and signs the report.
    ///
    /// A bundle that fails its integrity check aborts with
    /// [`Error::ContentCorrupted`] before any test runs. Cancelling `cancel`
    /// while the tests run ends with [`Error::UserCancelled`] and nothing is
    /// built or signed.
    pub async fn prepare(&self, cancel: &CancellationToken) -> Result<PreparedReport, Error> {
        enter(MeasureState::LoadBundle);
        let bundle = self.store.load()?;

        enter(MeasureState::VerifyBinding);
        if !binding::verify_stored(&bundle) {
            error!("stored key bundle failed its integrity check");
            return Err(Error::ContentCorrupted);
        }
        debug!(commitment = %sha256_hex(&bundle.h_pkr), "key bundle verified");

        enter(MeasureState::SelectSite);
        let sites = self.api.sites().await?;
        let site = self
            .selector
            .pick(sites)
            .await?
            .ok_or(Error::NoSiteSelected)?;
        info!(site = %site.name, "measuring at site");

        enter(MeasureState::RunNetworkTests);
        let ping = self.ping.start(cancel).await?;
        let speed = self.speed.run(self.device, cancel).await?;
        if cancel.is_cancelled() {
            return Err(Error::UserCancelled);
        }

        enter(MeasureState::BuildReport);
        let stats = MeasurementStats::new(&ping, &speed);
        let device_id = Uuid::new_v4().to_string();
        let timestamp = Local::now().to_rfc3339_opts(SecondsFormat::Secs, false);
        let report = report::build(&stats, &site, &device_id, &timestamp)?;

        enter(MeasureState::Sign);
        let signed = report::sign(&report, &bundle.sk_t)?;
        let body = MeasurementReport::new(signed, &bundle.h_pkr, self.show_data);

        Ok(PreparedReport {
            site,
            ping,
            speed,
            stats,
            report,
            body,
        })
    }

    /// Sends a prepared report once. Failures are returned, never retried.
    pub async fn upload(&self, prepared: &PreparedReport) -> Result<(), Error> {
        enter(MeasureState::Upload);
        self.api.report(&prepared.body).await?;
        enter(MeasureState::Done);
        Ok(())
    }

    pub async fn run(&self, cancel: &CancellationToken) -> Result<PreparedReport, Error> {
        let prepared = self.prepare(cancel).await?;
        self.upload(&prepared).await?;
        Ok(prepared)
    }
}

fn enter(state: MeasureState) {
    debug!(?state, "measurement");
}
