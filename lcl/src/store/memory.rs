//! In-memory artifact backend.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};

use super::{Artifact, ArtifactStore, StoreError};

/// In-memory artifacts for tests and dry runs.
///
/// Clones share the same underlying map, so a test can keep a handle to
/// inspect or corrupt what an orchestrator wrote.
#[derive(Debug, Clone, Default)]
pub struct MemoryArtifacts {
    inner: Arc<Mutex<HashMap<Artifact, Vec<u8>>>>,
}

impl MemoryArtifacts {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of artifacts currently held.
    pub fn len(&self) -> usize {
        self.lock().len()
    }

    pub fn is_empty(&self) -> bool {
        self.lock().is_empty()
    }

    fn lock(&self) -> MutexGuard<'_, HashMap<Artifact, Vec<u8>>> {
        // The map holds plain bytes, so a poisoned lock leaves nothing half-updated.
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl ArtifactStore for MemoryArtifacts {
    fn exists(&self, artifact: Artifact) -> bool {
        self.lock().contains_key(&artifact)
    }

    fn load(&self, artifact: Artifact) -> Result<Option<Vec<u8>>, StoreError> {
        Ok(self.lock().get(&artifact).cloned())
    }

    fn save(&self, artifact: Artifact, bytes: &[u8]) -> Result<(), StoreError> {
        self.lock().insert(artifact, bytes.to_vec());
        Ok(())
    }

    fn delete(&self, artifact: Artifact) -> Result<(), StoreError> {
        self.lock().remove(&artifact);
        Ok(())
    }
}
