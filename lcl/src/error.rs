//! Command-level failures.
//!
//! Each component reports its own error enum; these conversions fold them
//! into the set of outcomes a user can act on. Decrypt failures and binding
//! mismatches always surface as [`Error::ContentCorrupted`].

use thiserror::Error;

use crate::api::HttpError;
use crate::binding::BindingError;
use crate::config::ConfigError;
use crate::credential::CredentialError;
use crate::crypto::signing::SigningError;
use crate::engine::EngineError;
use crate::report::ReportError;
use crate::store::StoreError;

#[derive(Debug, Error)]
pub enum Error {
    #[error("credential rejected: {0}")]
    CredentialInvalid(String),
    #[error("content is corrupted")]
    ContentCorrupted,
    #[error("registration data is incomplete; missing {0}. Register again")]
    StorageIncomplete(String),
    #[error("this device is not registered; run `lcl register` first")]
    NotRegistered,
    #[error("network transport failed: {0}")]
    NetworkTransport(String),
    #[error("HTTP client error. Code ({0})")]
    ClientError(u16),
    #[error("HTTP server error. Code ({0})")]
    ServerError(u16),
    #[error("encoding failed: {0}")]
    EncodingError(String),
    #[error("cancelled by user")]
    UserCancelled,
    #[error("no cellular site selected")]
    NoSiteSelected,
    #[error(transparent)]
    Config(#[from] ConfigError),
    #[error("i/o error: {0}")]
    Io(#[from] std::io::Error),
}

impl From<StoreError> for Error {
    fn from(value: StoreError) -> Self {
        match value {
            StoreError::NotFound => Error::NotRegistered,
            StoreError::Incomplete { missing } => {
                let names: Vec<&str> = missing.iter().map(|a| a.file_name()).collect();
                Error::StorageIncomplete(names.join(", "))
            }
            StoreError::ContentCorrupted => Error::ContentCorrupted,
            StoreError::Encryption(msg) => Error::EncodingError(msg),
            StoreError::Io { artifact, source } => Error::Io(std::io::Error::new(
                source.kind(),
                format!("{artifact}: {source}"),
            )),
        }
    }
}

impl From<CredentialError> for Error {
    fn from(value: CredentialError) -> Self {
        Error::CredentialInvalid(value.to_string())
    }
}

impl From<BindingError> for Error {
    fn from(value: BindingError) -> Self {
        match value {
            BindingError::Signing(SigningError::InvalidPrivateKey) => {
                Error::CredentialInvalid(value.to_string())
            }
            other => Error::EncodingError(other.to_string()),
        }
    }
}

impl From<HttpError> for Error {
    fn from(value: HttpError) -> Self {
        match value {
            HttpError::Client(code) => Error::ClientError(code),
            HttpError::Server(code) => Error::ServerError(code),
            HttpError::Encode(err) | HttpError::Decode(err) => Error::EncodingError(err.to_string()),
            other @ (HttpError::UnexpectedStatus(_)
            | HttpError::Transport(_)
            | HttpError::InvalidUrl(_)) => Error::NetworkTransport(other.to_string()),
        }
    }
}

impl From<EngineError> for Error {
    fn from(value: EngineError) -> Self {
        match value {
            EngineError::Cancelled => Error::UserCancelled,
            other => Error::NetworkTransport(other.to_string()),
        }
    }
}

impl From<ReportError> for Error {
    fn from(value: ReportError) -> Self {
        match value {
            // The key already passed the binding check, so a key that no
            // longer parses means the bundle changed underneath us.
            ReportError::Signing(SigningError::InvalidPrivateKey) => Error::ContentCorrupted,
            other => Error::EncodingError(other.to_string()),
        }
    }
}
