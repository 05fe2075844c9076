//! Binding between credential-derived secrets and the device signing key.
//!
//! At registration the private key `skT` is tied to the server commitment
//! `hPKR` through `h = hPKR || SHA256(skT || DER(pkT))`, signed with `skT`.
//! A second signature over the canonical JSON of `{R, hPKR, skT}` is kept in
//! the local bundle and re-checked before every later use of the key.

use base64::{engine::general_purpose::STANDARD, Engine};
use serde::{Serialize, Serializer};
use thiserror::Error;
use tracing::{debug, warn};
use zeroize::Zeroizing;

use crate::crypto::integrity::{canonical_json, sha256_concat};
use crate::crypto::signing::{self, SigningError};

#[derive(Debug, Error)]
pub enum BindingError {
    #[error(transparent)]
    Signing(#[from] SigningError),
    #[error("failed to encode binding document: {0}")]
    Encoding(#[from] serde_json::Error),
}

/// Raw output of credential validation.
///
/// `r` and `h_pkr` are opaque values owned by the external protocol; they are
/// carried and bound here but never interpreted.
#[derive(Clone)]
pub struct SecretTriple {
    pub r: Vec<u8>,
    pub h_pkr: Vec<u8>,
    pub sk_t: Zeroizing<Vec<u8>>,
}

/// The four artifacts persisted together. All four exist or none do.
#[derive(Clone, PartialEq, Eq)]
pub struct KeyBundle {
    pub r: Vec<u8>,
    pub h_pkr: Vec<u8>,
    pub sk_t: Zeroizing<Vec<u8>>,
    pub signature: Vec<u8>,
}

impl std::fmt::Debug for KeyBundle {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyBundle")
            .field("r_len", &self.r.len())
            .field("h_pkr", &hex::encode(&self.h_pkr))
            .field("sk_t", &"<redacted>")
            .field("signature_len", &self.signature.len())
            .finish()
    }
}

/// Body of `POST /register`. All fields travel hex encoded.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct RegistrationRecord {
    #[serde(serialize_with = "as_hex")]
    pub sigma_r: Vec<u8>,
    #[serde(serialize_with = "as_hex")]
    pub h: Vec<u8>,
    #[serde(rename = "R", serialize_with = "as_hex")]
    pub r: Vec<u8>,
}

/// Result of [`bind`]: the record to send and the bundle to persist once the
/// server has accepted it.
#[derive(Debug)]
pub struct Binding {
    pub record: RegistrationRecord,
    pub bundle: KeyBundle,
}

pub(crate) fn as_hex<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&hex::encode(bytes))
}

fn as_base64<S: Serializer>(bytes: &[u8], serializer: S) -> Result<S::Ok, S::Error> {
    serializer.serialize_str(&STANDARD.encode(bytes))
}

/// The document covered by the local integrity signature.
#[derive(Serialize)]
struct IntegrityDocument<'a> {
    #[serde(rename = "R", serialize_with = "as_base64")]
    r: &'a [u8],
    #[serde(rename = "hPKR", serialize_with = "as_base64")]
    h_pkr: &'a [u8],
    #[serde(rename = "skT", serialize_with = "as_base64")]
    sk_t: &'a [u8],
}

fn integrity_document(
    r: &[u8],
    h_pkr: &[u8],
    sk_t: &[u8],
) -> Result<Zeroizing<Vec<u8>>, BindingError> {
    let doc = IntegrityDocument { r, h_pkr, sk_t };
    Ok(Zeroizing::new(canonical_json(&doc)?))
}

/// Builds the registration record and the signed local bundle.
pub fn bind(triple: SecretTriple) -> Result<Binding, BindingError> {
    let sk = signing::signing_key(&triple.sk_t)?;
    let pk_der = signing::public_key_der(&sk)?;

    let h_sec = sha256_concat(&[triple.sk_t.as_slice(), pk_der.as_slice()]);
    let mut h = Vec::with_capacity(triple.h_pkr.len() + h_sec.len());
    h.extend_from_slice(&triple.h_pkr);
    h.extend_from_slice(&h_sec);

    let sigma_r = signing::sign_der(&sk, &h);

    let document = integrity_document(&triple.r, &triple.h_pkr, &triple.sk_t)?;
    let signature = signing::sign_der(&sk, &document);
    debug!(h_len = h.len(), "bound signing key to commitment");

    Ok(Binding {
        record: RegistrationRecord {
            sigma_r,
            h,
            r: triple.r.clone(),
        },
        bundle: KeyBundle {
            r: triple.r,
            h_pkr: triple.h_pkr,
            sk_t: triple.sk_t,
            signature,
        },
    })
}

/// Re-derives the integrity document from a stored bundle and checks its
/// signature under the public key derived from the stored `skT`.
///
/// Returns `false` for any mismatch, including an `skT` that no longer parses.
pub fn verify_stored(bundle: &KeyBundle) -> bool {
    let sk = match signing::signing_key(&bundle.sk_t) {
        Ok(sk) => sk,
        Err(err) => {
            warn!("stored signing key unusable: {err}");
            return false;
        }
    };
    let document = match integrity_document(&bundle.r, &bundle.h_pkr, &bundle.sk_t) {
        Ok(doc) => doc,
        Err(err) => {
            warn!("could not rebuild integrity document: {err}");
            return false;
        }
    };
    signing::verify_der(sk.verifying_key(), &document, &bundle.signature)
}
