//! Encrypted key-bundle storage.
//!
//! [`KeyBundleStore`] owns the all-or-nothing discipline for the four bundle
//! artifacts plus the key file; where the bytes actually live is delegated to
//! an [`ArtifactStore`] so tests can run the same logic against memory.

mod fs;
mod memory;

use std::fmt;

use thiserror::Error;
use tracing::{debug, info, warn};
use zeroize::Zeroizing;

use crate::binding::KeyBundle;
use crate::crypto::secrets::{CodecError, SecretCodec, SymmetricKey};

pub use self::fs::FsArtifacts;
pub use self::memory::MemoryArtifacts;

#[derive(Debug, Error)]
pub enum StoreError {
    #[error("unable to access `{artifact}`: {source}")]
    Io {
        artifact: Artifact,
        #[source]
        source: std::io::Error,
    },
    #[error("no key bundle present")]
    NotFound,
    #[error("key bundle incomplete; missing {missing:?}")]
    Incomplete { missing: Vec<Artifact> },
    #[error("key bundle content corrupted")]
    ContentCorrupted,
    #[error("encryption failed: {0}")]
    Encryption(String),
}

impl From<CodecError> for StoreError {
    fn from(value: CodecError) -> Self {
        match value {
            CodecError::EncryptionFailed(msg) => StoreError::Encryption(msg),
            // Key length and base64 problems can only come from a damaged key file.
            CodecError::ContentCorrupted
            | CodecError::InvalidKeyLength
            | CodecError::Base64DecodeFailed(_) => StoreError::ContentCorrupted,
        }
    }
}

/// One file in the per-user configuration directory.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Artifact {
    R,
    HPkr,
    SkT,
    Signature,
    Key,
}

impl Artifact {
    /// Every artifact, ciphertexts first and the key file last. Writes follow
    /// this order so a crash never leaves a key next to a partial bundle.
    pub const ALL: [Artifact; 5] = [
        Artifact::R,
        Artifact::HPkr,
        Artifact::SkT,
        Artifact::Signature,
        Artifact::Key,
    ];

    pub fn file_name(self) -> &'static str {
        match self {
            Artifact::R => "r",
            Artifact::HPkr => "hpkr",
            Artifact::SkT => "sk",
            Artifact::Signature => "sig",
            Artifact::Key => "key",
        }
    }
}

impl fmt::Display for Artifact {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.file_name())
    }
}

/// Raw byte storage keyed by artifact.
pub trait ArtifactStore: Send + Sync {
    fn exists(&self, artifact: Artifact) -> bool;

    /// `Ok(None)` when the artifact is absent.
    fn load(&self, artifact: Artifact) -> Result<Option<Vec<u8>>, StoreError>;

    /// Overwrites any existing content.
    fn save(&self, artifact: Artifact, bytes: &[u8]) -> Result<(), StoreError>;

    /// Removing an absent artifact is not an error.
    fn delete(&self, artifact: Artifact) -> Result<(), StoreError>;
}

impl<T: ArtifactStore + ?Sized> ArtifactStore for &T {
    fn exists(&self, artifact: Artifact) -> bool {
        (**self).exists(artifact)
    }
    fn load(&self, artifact: Artifact) -> Result<Option<Vec<u8>>, StoreError> {
        (**self).load(artifact)
    }
    fn save(&self, artifact: Artifact, bytes: &[u8]) -> Result<(), StoreError> {
        (**self).save(artifact, bytes)
    }
    fn delete(&self, artifact: Artifact) -> Result<(), StoreError> {
        (**self).delete(artifact)
    }
}

pub struct KeyBundleStore<A> {
    artifacts: A,
}

impl<A: ArtifactStore> KeyBundleStore<A> {
    pub fn new(artifacts: A) -> Self {
        Self { artifacts }
    }

    pub fn artifacts(&self) -> &A {
        &self.artifacts
    }

    /// True if any artifact, including the key file, is present.
    pub fn exists(&self) -> bool {
        Artifact::ALL.iter().any(|a| self.artifacts.exists(*a))
    }

    /// Replaces whatever is stored with `bundle` sealed under `key`.
    ///
    /// Every artifact is sealed before anything is touched, then all prior
    /// artifacts are removed, then the new ones are written with the key file
    /// last. An interruption can leave an incomplete bundle, never a mix of
    /// old and new artifacts that would pass as valid.
    pub fn save(&self, bundle: &KeyBundle, key: &SymmetricKey) -> Result<(), StoreError> {
        let codec = SecretCodec::new(key);
        let sealed = [
            (Artifact::R, codec.seal(&bundle.r)?),
            (Artifact::HPkr, codec.seal(&bundle.h_pkr)?),
            (Artifact::SkT, codec.seal(&bundle.sk_t)?),
            (Artifact::Signature, codec.seal(&bundle.signature)?),
        ];

        self.delete()?;
        for (artifact, bytes) in &sealed {
            self.artifacts.save(*artifact, bytes)?;
        }
        let encoded_key = Zeroizing::new(key.encode());
        self.artifacts.save(Artifact::Key, encoded_key.as_bytes())?;
        info!("key bundle saved");
        Ok(())
    }

    /// Reads and decrypts all four artifacts.
    pub fn load(&self) -> Result<KeyBundle, StoreError> {
        let missing: Vec<Artifact> = Artifact::ALL
            .iter()
            .copied()
            .filter(|a| !self.artifacts.exists(*a))
            .collect();
        if missing.len() == Artifact::ALL.len() {
            return Err(StoreError::NotFound);
        }
        if !missing.is_empty() {
            warn!(?missing, "key bundle is partially present");
            return Err(StoreError::Incomplete { missing });
        }

        let key_text = Zeroizing::new(self.require(Artifact::Key)?);
        let key = SymmetricKey::decode(&key_text)?;
        let codec = SecretCodec::new(&key);
        let open = |artifact: Artifact| -> Result<Vec<u8>, StoreError> {
            let sealed = self.require(artifact)?;
            codec.open(&sealed).map_err(|err| {
                debug!(%artifact, "artifact failed to decrypt");
                StoreError::from(err)
            })
        };

        Ok(KeyBundle {
            r: open(Artifact::R)?,
            h_pkr: open(Artifact::HPkr)?,
            sk_t: Zeroizing::new(open(Artifact::SkT)?),
            signature: open(Artifact::Signature)?,
        })
    }

    /// Removes the four artifacts and the key file.
    pub fn delete(&self) -> Result<(), StoreError> {
        for artifact in Artifact::ALL {
            self.artifacts.delete(artifact)?;
        }
        Ok(())
    }

    fn require(&self, artifact: Artifact) -> Result<Vec<u8>, StoreError> {
        // Vanished between the presence check and the read: still a broken bundle.
        self.artifacts
            .load(artifact)?
            .ok_or(StoreError::Incomplete {
                missing: vec![artifact],
            })
    }
}
