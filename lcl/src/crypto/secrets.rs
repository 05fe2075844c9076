//! Authenticated secret codec built on ChaCha20-Poly1305.
//! Each artifact is sealed as nonce + ciphertext + auth tag so that the on-disk
//! bundle never contains plaintext key material, and a wrong key or a flipped
//! byte is caught at decrypt time.

use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};
use chacha20poly1305::aead::generic_array::typenum::Unsigned;
use chacha20poly1305::aead::{Aead, AeadCore, KeyInit};
use chacha20poly1305::{ChaCha20Poly1305, Key, Nonce};
use rand::rngs::OsRng;
use rand::RngCore;
use serde::{Deserialize, Serialize};
use thiserror::Error;
use zeroize::Zeroize;

const TAG_SIZE: usize = 16;
pub const KEY_LEN: usize = 32;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("invalid key length; expected 32 bytes")]
    InvalidKeyLength,
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("content corrupted")]
    ContentCorrupted,
    #[error("base64 decoding failed: {0}")]
    Base64DecodeFailed(String),
}

/// A 256-bit key generated fresh for every registration. It is stored in its
/// own file and never embedded next to the ciphertexts it protects.
pub struct SymmetricKey {
    bytes: [u8; KEY_LEN],
}

impl SymmetricKey {
    /// Draws a new key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self { bytes }
    }

    pub fn from_bytes(key_bytes: &[u8]) -> Result<Self, CodecError> {
        if key_bytes.len() != KEY_LEN {
            return Err(CodecError::InvalidKeyLength);
        }
        let mut bytes = [0u8; KEY_LEN];
        bytes.copy_from_slice(key_bytes);
        Ok(Self { bytes })
    }

    /// Parses the base64 text form written by [`SymmetricKey::encode`].
    pub fn decode(encoded: &[u8]) -> Result<Self, CodecError> {
        let text = String::from_utf8_lossy(encoded);
        let mut decoded = STANDARD_NO_PAD
            .decode(text.trim().as_bytes())
            .map_err(|e| CodecError::Base64DecodeFailed(format!("{e}")))?;
        let key = Self::from_bytes(&decoded);
        decoded.zeroize();
        key
    }

    pub fn encode(&self) -> String {
        STANDARD_NO_PAD.encode(self.bytes)
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.bytes
    }
}

impl PartialEq for SymmetricKey {
    fn eq(&self, other: &Self) -> bool {
        self.bytes == other.bytes
    }
}

impl std::fmt::Debug for SymmetricKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SymmetricKey(<redacted>)")
    }
}

impl Drop for SymmetricKey {
    fn drop(&mut self) {
        self.bytes.zeroize();
    }
}

/// Serializable envelope for one sealed artifact. Fields are base64 encoded so
/// the envelope can be written as a small JSON document.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct SealedSecret {
    pub nonce: String,
    pub ciphertext: String,
    pub tag: String,
}

impl SealedSecret {
    pub fn to_bytes(&self) -> Result<Vec<u8>, CodecError> {
        serde_json::to_vec(self).map_err(|e| CodecError::EncryptionFailed(format!("{e}")))
    }

    /// Any envelope that does not parse is reported as corruption.
    pub fn from_bytes(bytes: &[u8]) -> Result<Self, CodecError> {
        serde_json::from_slice(bytes).map_err(|_| CodecError::ContentCorrupted)
    }
}

/// Pure encrypt/decrypt over a borrowed key. Callers own all I/O.
pub struct SecretCodec {
    key: Key,
}

impl SecretCodec {
    pub fn new(key: &SymmetricKey) -> Self {
        let mut inner = Key::default();
        inner.copy_from_slice(key.as_bytes());
        Self { key: inner }
    }

    /// Encrypts a plaintext artifact into a serializable envelope.
    pub fn encrypt(&self, plaintext: &[u8]) -> Result<SealedSecret, CodecError> {
        let cipher = ChaCha20Poly1305::new(&self.key);
        let nonce = ChaCha20Poly1305::generate_nonce(&mut OsRng);

        let mut ciphertext_and_tag = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|e| CodecError::EncryptionFailed(format!("{e}")))?;
        if ciphertext_and_tag.len() < TAG_SIZE {
            return Err(CodecError::EncryptionFailed(
                "ciphertext shorter than authentication tag".to_string(),
            ));
        }
        let tag_start = ciphertext_and_tag.len() - TAG_SIZE;
        let tag_bytes = ciphertext_and_tag.split_off(tag_start);
        let ciphertext = ciphertext_and_tag;

        Ok(SealedSecret {
            nonce: STANDARD_NO_PAD.encode(nonce),
            ciphertext: STANDARD_NO_PAD.encode(ciphertext),
            tag: STANDARD_NO_PAD.encode(tag_bytes),
        })
    }

    /// Decrypts an envelope. Tampering, truncation and wrong keys all surface
    /// as [`CodecError::ContentCorrupted`].
    pub fn decrypt(&self, secret: &SealedSecret) -> Result<Vec<u8>, CodecError> {
        let decode = |field: &str| {
            STANDARD_NO_PAD
                .decode(field.as_bytes())
                .map_err(|_| CodecError::ContentCorrupted)
        };
        let nonce_bytes = decode(&secret.nonce)?;
        let ciphertext = decode(&secret.ciphertext)?;
        let tag = decode(&secret.tag)?;

        if nonce_bytes.len() != <ChaCha20Poly1305 as AeadCore>::NonceSize::USIZE || tag.len() != TAG_SIZE {
            return Err(CodecError::ContentCorrupted);
        }

        let mut combined = Vec::with_capacity(ciphertext.len() + tag.len());
        combined.extend_from_slice(&ciphertext);
        combined.extend_from_slice(&tag);

        let cipher = ChaCha20Poly1305::new(&self.key);
        cipher
            .decrypt(Nonce::from_slice(&nonce_bytes), combined.as_ref())
            .map_err(|_| CodecError::ContentCorrupted)
    }

    /// Convenience pair used by the bundle store: plaintext in, envelope bytes out.
    pub fn seal(&self, plaintext: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.encrypt(plaintext)?.to_bytes()
    }

    pub fn open(&self, sealed: &[u8]) -> Result<Vec<u8>, CodecError> {
        self.decrypt(&SealedSecret::from_bytes(sealed)?)
    }
}

impl Drop for SecretCodec {
    fn drop(&mut self) {
        self.key.as_mut_slice().zeroize();
    }
}

#[cfg(test)]
mod tests {
    use super::{CodecError, SealedSecret, SecretCodec, SymmetricKey};
    use base64::{engine::general_purpose::STANDARD_NO_PAD, Engine};

    #[test]
    fn encrypts_and_decrypts_round_trip() {
        let key = SymmetricKey::from_bytes(&[42u8; 32]).expect("key should be valid");
        let codec = SecretCodec::new(&key);
        let sealed = codec.encrypt(b"sk-bytes").expect("encryption should succeed");
        let plaintext = codec.decrypt(&sealed).expect("decryption should succeed");
        assert_eq!(plaintext, b"sk-bytes");
    }

    #[test]
    fn wrong_key_is_content_corrupted() {
        let sealed = SecretCodec::new(&SymmetricKey::generate())
            .seal(b"payload")
            .expect("seal");
        let err = SecretCodec::new(&SymmetricKey::generate())
            .open(&sealed)
            .unwrap_err();
        assert!(matches!(err, CodecError::ContentCorrupted));
    }

    #[test]
    fn flipped_ciphertext_is_rejected() {
        let key = SymmetricKey::generate();
        let codec = SecretCodec::new(&key);
        let mut sealed = codec.encrypt(b"payload").expect("encrypt");
        let mut raw = STANDARD_NO_PAD.decode(sealed.ciphertext.as_bytes()).unwrap();
        raw[0] ^= 0x01;
        sealed.ciphertext = STANDARD_NO_PAD.encode(raw);
        assert!(matches!(
            codec.decrypt(&sealed),
            Err(CodecError::ContentCorrupted)
        ));
    }

    #[test]
    fn rejects_bad_keys() {
        let err = SymmetricKey::from_bytes(&[1u8; 16]).unwrap_err();
        assert!(format!("{err}").contains("invalid key length"));
    }

    #[test]
    fn garbage_envelope_is_corruption() {
        let codec = SecretCodec::new(&SymmetricKey::generate());
        assert!(matches!(
            codec.open(b"not json"),
            Err(CodecError::ContentCorrupted)
        ));
        let bogus = SealedSecret {
            nonce: STANDARD_NO_PAD.encode([0u8; 12]),
            ciphertext: STANDARD_NO_PAD.encode([0u8; 5]),
            tag: STANDARD_NO_PAD.encode([0u8; 16]),
        };
        assert!(matches!(
            codec.decrypt(&bogus),
            Err(CodecError::ContentCorrupted)
        ));
    }

    #[test]
    fn key_text_form_round_trips() {
        let key = SymmetricKey::generate();
        let restored = SymmetricKey::decode(key.encode().as_bytes()).expect("decode");
        assert_eq!(key, restored);
        assert_ne!(key, SymmetricKey::generate());
    }
}
