//! Credential validation seam.
//!
//! The credential format is owned by the service administrator; this crate only
//! needs the `(R, hPKR, skT)` triple it yields. [`JsonCredentialValidator`] is
//! the validator shipped with the CLI.

use serde::Deserialize;
use thiserror::Error;
use zeroize::{Zeroize, Zeroizing};

use crate::binding::SecretTriple;
use crate::crypto::signing;

#[derive(Debug, Error)]
pub enum CredentialError {
    #[error("credential is not a valid document: {0}")]
    Malformed(String),
    #[error("credential field `{0}` is empty")]
    EmptyField(&'static str),
    #[error("credential field `{0}` is not valid hex")]
    BadHex(&'static str),
    #[error("credential private key is not usable")]
    BadPrivateKey,
}

/// Turns an opaque credential into the secret triple, or rejects it.
pub trait CredentialValidator: Send + Sync {
    fn validate(&self, credential: &[u8]) -> Result<SecretTriple, CredentialError>;
}

#[derive(Deserialize)]
struct RawCredential {
    #[serde(rename = "R")]
    r: String,
    #[serde(rename = "hPKR")]
    h_pkr: String,
    #[serde(rename = "skT")]
    sk_t: String,
}

/// Accepts `{"R": hex, "hPKR": hex, "skT": hex}`.
#[derive(Debug, Default, Clone, Copy)]
pub struct JsonCredentialValidator;

fn decode_field(name: &'static str, value: &str) -> Result<Vec<u8>, CredentialError> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        return Err(CredentialError::EmptyField(name));
    }
    hex::decode(trimmed).map_err(|_| CredentialError::BadHex(name))
}

impl CredentialValidator for JsonCredentialValidator {
    fn validate(&self, credential: &[u8]) -> Result<SecretTriple, CredentialError> {
        let mut raw: RawCredential = serde_json::from_slice(credential)
            .map_err(|e| CredentialError::Malformed(format!("{e}")))?;

        let r = decode_field("R", &raw.r)?;
        let h_pkr = decode_field("hPKR", &raw.h_pkr)?;
        let decoded = decode_field("skT", &raw.sk_t);
        raw.sk_t.zeroize();
        let sk_t = Zeroizing::new(decoded?);
        signing::signing_key(&sk_t).map_err(|_| CredentialError::BadPrivateKey)?;

        Ok(SecretTriple { r, h_pkr, sk_t })
    }
}
