//! `lcl` command line: registration, measurement and the standalone tests.

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand, ValueEnum};
use serde::Serialize;
use tokio::signal;
use tokio_util::sync::CancellationToken;
use tracing::debug;
use tracing_subscriber::EnvFilter;

use lcl_agent::api::{render_sites, ReqwestTransport, ScnApi};
use lcl_agent::config::Config;
use lcl_agent::credential::JsonCredentialValidator;
use lcl_agent::engine::{
    Direction, HttpSpeedTest, PingEngine, PingSummary, SpeedTestEngine, SpeedTestResults, TcpPing,
};
use lcl_agent::interfaces;
use lcl_agent::orchestrator::{Measurer, Registrar};
use lcl_agent::picker::{NamedSiteSelector, SiteSelector, TerminalSelector};
use lcl_agent::prompt::StdinConfirm;
use lcl_agent::stats::Summary;
use lcl_agent::store::{FsArtifacts, KeyBundleStore};
use lcl_agent::Error;

const PICKER_TITLE: &str = "Choose the cellular site you are currently at.";

#[derive(Parser, Debug)]
#[command(name = "lcl", version, about = "Seattle Community Network coverage agent")]
struct Cli {
    /// Config file; defaults to $LCL_CONFIG, then <data dir>/config.json.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Log filter used when RUST_LOG is unset.
    #[arg(long, global = true, default_value = "warn")]
    log_level: String,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Register with the SCN server to report test data.
    Register {
        /// Path to the credential file given by the SCN administrator.
        #[arg(short, long)]
        file_path: PathBuf,
    },
    /// Run the test suite and report the result to SCN.
    Measure {
        /// Show the data point on SCN's public visualization.
        #[arg(short, long)]
        show_data: bool,
        /// Site name; skips the interactive picker.
        #[arg(long)]
        site: Option<String>,
        /// Network interface for the speed test.
        #[arg(long)]
        device: Option<String>,
        /// Print the measured statistics as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List SCN cellular sites.
    Sites,
    /// List network interfaces and their addresses.
    Interfaces,
    /// Measure TCP connect latency.
    Ping {
        #[arg(long)]
        host: Option<String>,
        #[arg(long)]
        port: Option<u16>,
        #[arg(short, long)]
        count: Option<u16>,
        #[arg(long)]
        interval_ms: Option<u64>,
        #[arg(long)]
        timeout_ms: Option<u64>,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
    /// Measure download and upload throughput.
    SpeedTest {
        #[arg(long, value_enum, default_value_t = DirectionArg::Both)]
        direction: DirectionArg,
        #[arg(long)]
        device: Option<String>,
        /// Print the result as JSON.
        #[arg(long)]
        json: bool,
    },
}

#[derive(ValueEnum, Clone, Copy, Debug)]
enum DirectionArg {
    Download,
    Upload,
    Both,
}

impl From<DirectionArg> for Direction {
    fn from(value: DirectionArg) -> Self {
        match value {
            DirectionArg::Download => Direction::Download,
            DirectionArg::Upload => Direction::Upload,
            DirectionArg::Both => Direction::Both,
        }
    }
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    init_tracing(&cli.log_level);

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprintln!("error: {err:#}");
            ExitCode::FAILURE
        }
    }
}

fn init_tracing(fallback: &str) {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(fallback))
        .unwrap_or_else(|_| EnvFilter::new("warn"));
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .init();
}

/// Cancels the returned token on the first Ctrl-C.
fn cancel_on_interrupt() -> CancellationToken {
    let token = CancellationToken::new();
    let trigger = token.clone();
    tokio::spawn(async move {
        if signal::ctrl_c().await.is_ok() {
            debug!("interrupt received");
            trigger.cancel();
        }
    });
    token
}

fn api(config: &Config) -> Result<ScnApi<ReqwestTransport>> {
    let transport = ReqwestTransport::new(config.http_timeout()).map_err(Error::from)?;
    Ok(ScnApi::new(transport, config.api_base()?))
}

async fn run(cli: Cli) -> Result<()> {
    let config = Config::load(cli.config.as_deref()).context("loading configuration")?;
    debug!(?config, "configuration loaded");

    match cli.command {
        Command::Register { file_path } => {
            let store = KeyBundleStore::new(FsArtifacts::new(config.data_dir()?));
            let api = api(&config)?;
            let outcome = Registrar {
                validator: &JsonCredentialValidator,
                confirm: &StdinConfirm,
                api: &api,
                store: &store,
            }
            .run(&file_path)
            .await;
            match outcome {
                Ok(()) => println!("Registration complete!"),
                Err(Error::UserCancelled) => println!("Registration cancelled."),
                Err(err) => return Err(err).context("registration failed"),
            }
        }
        Command::Measure {
            show_data,
            site,
            device,
            json,
        } => {
            let store = KeyBundleStore::new(FsArtifacts::new(config.data_dir()?));
            let api = api(&config)?;
            let selector: Box<dyn SiteSelector> = match site {
                Some(name) => Box::new(NamedSiteSelector::new(name)),
                None => Box::new(TerminalSelector::new(PICKER_TITLE)),
            };
            let ping = TcpPing::new(config.ping.clone());
            let speed = HttpSpeedTest::new(config.speed_test.clone(), Direction::Both);
            let measurer = Measurer {
                store: &store,
                api: &api,
                selector: selector.as_ref(),
                ping: &ping,
                speed: &speed,
                device: device.as_deref(),
                show_data,
            };

            let cancel = cancel_on_interrupt();
            let prepared = match measurer.prepare(&cancel).await {
                Ok(prepared) => prepared,
                Err(Error::UserCancelled) => {
                    println!("Exit from SCN Measurement Test");
                    return Ok(());
                }
                Err(err) => return Err(err.into()),
            };
            if json {
                print_json(&prepared.stats)?;
            } else {
                print_ping(&prepared.ping);
                print_speed(&prepared.speed);
            }
            measurer
                .upload(&prepared)
                .await
                .context("data report failed")?;
            if !json {
                println!("Data reported successfully.");
            }
        }
        Command::Sites => {
            let sites = api(&config)?.sites().await.map_err(Error::from)?;
            if sites.is_empty() {
                println!("No sites available");
            } else {
                println!("{}", render_sites(&sites));
            }
        }
        Command::Interfaces => {
            let found = interfaces::list().context("listing network interfaces")?;
            if found.is_empty() {
                println!("No interfaces found");
            } else {
                println!("{}", interfaces::render(&found));
            }
        }
        Command::Ping {
            host,
            port,
            count,
            interval_ms,
            timeout_ms,
            json,
        } => {
            let mut settings = config.ping.clone();
            settings.host = host.unwrap_or(settings.host);
            settings.port = port.unwrap_or(settings.port);
            settings.count = count.unwrap_or(settings.count);
            settings.interval_ms = interval_ms.unwrap_or(settings.interval_ms);
            settings.timeout_ms = timeout_ms.unwrap_or(settings.timeout_ms);
            if settings.count == 0 {
                anyhow::bail!("--count must be greater than 0");
            }

            let cancel = cancel_on_interrupt();
            let summary = TcpPing::new(settings)
                .start(&cancel)
                .await
                .map_err(Error::from)?;
            if json {
                print_json(&summary.output())?;
            } else {
                print_ping(&summary);
            }
        }
        Command::SpeedTest {
            direction,
            device,
            json,
        } => {
            let engine = HttpSpeedTest::new(config.speed_test.clone(), direction.into());
            let cancel = cancel_on_interrupt();
            let results = engine
                .run(device.as_deref(), &cancel)
                .await
                .map_err(Error::from)?;
            if json {
                print_json(&results.summary())?;
            } else {
                print_speed(&results);
            }
        }
    }
    Ok(())
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

fn print_summary(label: &str, unit: &str, summary: &Summary) {
    println!(
        "{label} ({unit}): min {:.2}  max {:.2}  avg {:.2}  median {:.2}  std dev {:.2}  jitter {:.2}  samples {}",
        summary.min,
        summary.max,
        summary.avg,
        summary.median,
        summary.std_dev,
        summary.jitter,
        summary.count
    );
}

fn print_ping(summary: &PingSummary) {
    println!(
        "Ping {}:{}  {}/{} answered, {:.1}% loss",
        summary.host,
        summary.port,
        summary.samples.len(),
        summary.total,
        summary.packet_loss() * 100.0
    );
    if !summary.samples.is_empty() {
        print_summary("Latency", "ms", &summary.latency());
    }
}

fn print_speed(results: &SpeedTestResults) {
    if !results.download.is_empty() {
        print_summary("Download", "Mbit/s", &results.download_summary());
    }
    if !results.upload.is_empty() {
        print_summary("Upload", "Mbit/s", &results.upload_summary());
    }
}
