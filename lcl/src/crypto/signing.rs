//! ECDSA P-256 / SHA-256 helpers over raw key bytes.
//! Private keys arrive as the 32-byte scalar handed out by the credential
//! validator; signatures leave as ASN.1 DER.

use p256::ecdsa::signature::{Signer, Verifier};
use p256::ecdsa::{Signature, SigningKey, VerifyingKey};
use p256::pkcs8::EncodePublicKey;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum SigningError {
    #[error("private key is not a valid P-256 scalar")]
    InvalidPrivateKey,
    #[error("public key encoding failed: {0}")]
    PublicKeyEncoding(String),
}

/// Parses a raw 32-byte private scalar.
pub fn signing_key(raw: &[u8]) -> Result<SigningKey, SigningError> {
    SigningKey::from_slice(raw).map_err(|_| SigningError::InvalidPrivateKey)
}

/// SubjectPublicKeyInfo DER of the public half of `key`.
pub fn public_key_der(key: &SigningKey) -> Result<Vec<u8>, SigningError> {
    key.verifying_key()
        .to_public_key_der()
        .map(|doc| doc.as_bytes().to_vec())
        .map_err(|e| SigningError::PublicKeyEncoding(format!("{e}")))
}

/// Signs `message` (hashed with SHA-256 internally) and returns the DER signature.
pub fn sign_der(key: &SigningKey, message: &[u8]) -> Vec<u8> {
    let signature: Signature = key.sign(message);
    signature.to_der().as_bytes().to_vec()
}

/// Checks a DER signature. Malformed signatures simply fail verification.
pub fn verify_der(key: &VerifyingKey, message: &[u8], signature: &[u8]) -> bool {
    match Signature::from_der(signature) {
        Ok(signature) => key.verify(message, &signature).is_ok(),
        Err(_) => false,
    }
}

#[cfg(test)]
mod tests {
    use super::{public_key_der, sign_der, signing_key, verify_der, SigningError};
    use p256::ecdsa::SigningKey;
    use rand::rngs::OsRng;

    #[test]
    fn signs_and_verifies() {
        let key = SigningKey::random(&mut OsRng);
        let sig = sign_der(&key, b"message");
        assert!(verify_der(key.verifying_key(), b"message", &sig));
        assert!(!verify_der(key.verifying_key(), b"massage", &sig));
    }

    #[test]
    fn garbage_signature_fails_closed() {
        let key = SigningKey::random(&mut OsRng);
        assert!(!verify_der(key.verifying_key(), b"message", &[0x30, 0x01]));
    }

    #[test]
    fn raw_scalar_round_trips() {
        let key = SigningKey::random(&mut OsRng);
        let raw = key.to_bytes();
        let parsed = signing_key(raw.as_slice()).expect("valid scalar");
        assert_eq!(parsed.verifying_key(), key.verifying_key());
    }

    #[test]
    fn zero_scalar_is_rejected() {
        assert!(matches!(
            signing_key(&[0u8; 32]),
            Err(SigningError::InvalidPrivateKey)
        ));
        assert!(signing_key(&[1u8; 7]).is_err());
    }

    #[test]
    fn public_key_der_is_spki() {
        let key = SigningKey::random(&mut OsRng);
        let der = public_key_der(&key).expect("der");
        // SEQUENCE header + uncompressed point; fixed length for P-256 SPKI.
        assert_eq!(der.len(), 91);
        assert_eq!(der[0], 0x30);
    }
}
