//! Directory-backed artifacts: one file per artifact under the per-user
//! configuration directory.

use std::fs::{self, DirBuilder, OpenOptions};
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

use super::{Artifact, ArtifactStore, StoreError};

#[derive(Debug, Clone)]
pub struct FsArtifacts {
    dir: PathBuf,
}

impl FsArtifacts {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn path_of(&self, artifact: Artifact) -> PathBuf {
        self.dir.join(artifact.file_name())
    }

    fn ensure_dir(&self, artifact: Artifact) -> Result<(), StoreError> {
        let mut builder = DirBuilder::new();
        builder.recursive(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::DirBuilderExt;
            builder.mode(0o700);
        }
        builder
            .create(&self.dir)
            .map_err(|source| StoreError::Io { artifact, source })
    }
}

impl ArtifactStore for FsArtifacts {
    fn exists(&self, artifact: Artifact) -> bool {
        self.path_of(artifact).is_file()
    }

    fn load(&self, artifact: Artifact) -> Result<Option<Vec<u8>>, StoreError> {
        match fs::read(self.path_of(artifact)) {
            Ok(bytes) => Ok(Some(bytes)),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(None),
            Err(source) => Err(StoreError::Io { artifact, source }),
        }
    }

    fn save(&self, artifact: Artifact, bytes: &[u8]) -> Result<(), StoreError> {
        self.ensure_dir(artifact)?;
        let mut options = OpenOptions::new();
        options.write(true).create(true).truncate(true);
        #[cfg(unix)]
        {
            use std::os::unix::fs::OpenOptionsExt;
            options.mode(0o600);
        }
        let io = |source| StoreError::Io { artifact, source };
        let mut file = options.open(self.path_of(artifact)).map_err(io)?;
        file.write_all(bytes).map_err(io)?;
        file.sync_all().map_err(io)
    }

    fn delete(&self, artifact: Artifact) -> Result<(), StoreError> {
        match fs::remove_file(self.path_of(artifact)) {
            Ok(()) => Ok(()),
            Err(err) if err.kind() == ErrorKind::NotFound => Ok(()),
            Err(source) => Err(StoreError::Io { artifact, source }),
        }
    }
}
