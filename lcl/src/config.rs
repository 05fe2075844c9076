//! Configuration loader. Every field has a default so the agent runs without
//! a config file; a file only needs the values it wants to change.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::Deserialize;
use thiserror::Error;
use url::Url;

pub const CONFIG_ENV: &str = "LCL_CONFIG";
pub const HOME_ENV: &str = "LCL_HOME";
const CONFIG_FILE_NAME: &str = "config.json";
const DEFAULT_API_BASE: &str = "https://coverage.seattlecommunitynetwork.org/api";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("config file unreadable at {path}: {source}")]
    Io {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("config parse failed: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid api_base_url: {0}")]
    BadUrl(#[from] url::ParseError),
    #[error("cannot determine a data directory; set LCL_HOME or HOME")]
    NoDataDir,
    #[error("invalid setting: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct PingSettings {
    pub host: String,
    pub port: u16,
    pub count: u16,
    pub interval_ms: u64,
    pub timeout_ms: u64,
}

impl Default for PingSettings {
    fn default() -> Self {
        Self {
            host: "google.com".to_string(),
            port: 443,
            count: 10,
            interval_ms: 1000,
            timeout_ms: 1000,
        }
    }
}

impl PingSettings {
    pub fn interval(&self) -> Duration {
        Duration::from_millis(self.interval_ms)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct SpeedTestSettings {
    pub download_url: String,
    pub upload_url: String,
    pub duration_secs: u64,
    pub upload_chunk_bytes: usize,
    pub sample_interval_ms: u64,
    pub connect_timeout_secs: u64,
}

impl Default for SpeedTestSettings {
    fn default() -> Self {
        Self {
            download_url: "https://speed.cloudflare.com/__down?bytes=250000000".to_string(),
            upload_url: "https://speed.cloudflare.com/__up".to_string(),
            duration_secs: 10,
            upload_chunk_bytes: 1 << 20,
            sample_interval_ms: 250,
            connect_timeout_secs: 10,
        }
    }
}

impl SpeedTestSettings {
    pub fn duration(&self) -> Duration {
        Duration::from_secs(self.duration_secs)
    }

    pub fn sample_interval(&self) -> Duration {
        Duration::from_millis(self.sample_interval_ms)
    }

    pub fn connect_timeout(&self) -> Duration {
        Duration::from_secs(self.connect_timeout_secs)
    }
}

#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(default)]
pub struct Config {
    pub api_base_url: String,
    /// Per-user directory holding the key bundle.
    pub data_dir: Option<PathBuf>,
    pub http_timeout_secs: u64,
    pub ping: PingSettings,
    pub speed_test: SpeedTestSettings,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            api_base_url: DEFAULT_API_BASE.to_string(),
            data_dir: None,
            http_timeout_secs: 30,
            ping: PingSettings::default(),
            speed_test: SpeedTestSettings::default(),
        }
    }
}

impl Config {
    /// Parses a config file. Missing keys fall back to defaults.
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let raw = fs::read_to_string(path).map_err(|source| ConfigError::Io {
            path: path.to_path_buf(),
            source,
        })?;
        let config: Config = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Resolves the config the way the CLI does: an explicit path, then
    /// `LCL_CONFIG`, then `config.json` inside the data directory if present,
    /// then defaults. Only an explicitly named file is required to exist.
    pub fn load(explicit: Option<&Path>) -> Result<Self, ConfigError> {
        if let Some(path) = explicit {
            return Self::from_file(path);
        }
        if let Some(path) = std::env::var_os(CONFIG_ENV) {
            return Self::from_file(PathBuf::from(path));
        }
        let candidate = default_data_dir()?.join(CONFIG_FILE_NAME);
        if candidate.is_file() {
            return Self::from_file(candidate);
        }
        Ok(Self::default())
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        self.api_base()?;
        if self.ping.count == 0 {
            return Err(ConfigError::Invalid("ping.count must be greater than 0".into()));
        }
        if self.speed_test.sample_interval_ms == 0 {
            return Err(ConfigError::Invalid(
                "speed_test.sample_interval_ms must be greater than 0".into(),
            ));
        }
        Ok(())
    }

    pub fn api_base(&self) -> Result<Url, ConfigError> {
        Ok(Url::parse(&self.api_base_url)?)
    }

    pub fn http_timeout(&self) -> Duration {
        Duration::from_secs(self.http_timeout_secs)
    }

    /// The configured data directory, or the platform default.
    pub fn data_dir(&self) -> Result<PathBuf, ConfigError> {
        match &self.data_dir {
            Some(dir) => Ok(dir.clone()),
            None => default_data_dir(),
        }
    }
}

/// `$LCL_HOME`, else `$HOME/.lcl`.
pub fn default_data_dir() -> Result<PathBuf, ConfigError> {
    if let Some(dir) = std::env::var_os(HOME_ENV) {
        return Ok(PathBuf::from(dir));
    }
    std::env::var_os("HOME")
        .map(|home| PathBuf::from(home).join(".lcl"))
        .ok_or(ConfigError::NoDataDir)
}
