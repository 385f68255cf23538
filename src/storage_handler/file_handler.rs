use crate::StorageHandler;
use anyhow::{ensure, Context, Result};
use async_trait::async_trait;
use log::{trace, warn};
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::time::{Duration, SystemTime};
use tempfile::NamedTempFile;

/// A durable storage handler keeping one file per session in a directory.
///
/// Session ids are used as file names, hence only ids consisting of ASCII alphanumerics,
/// `-` and `_` are accepted.
/// Other ids are rejected, so a crafted cookie value can never address a file outside
/// the session directory.
///
/// Records are replaced atomically: a payload is written to a temporary file in the session
/// directory and then renamed over the record, so readers never observe a partial write.
///
/// All file system calls are blocking and run on the executor thread that polls the
/// handler.
#[derive(Debug, Clone)]
pub struct FileHandler {
    directory: PathBuf,
}

impl FileHandler {
    /// Create a file handler storing sessions in `directory`.
    /// The directory is created if it does not exist.
    pub fn new(directory: impl Into<PathBuf>) -> Result<Self> {
        let directory = directory.into();
        fs::create_dir_all(&directory).with_context(|| {
            format!("session directory does not exist: {:?}", directory.display())
        })?;
        let metadata = fs::metadata(&directory)
            .with_context(|| format!("cannot inspect session directory {:?}", directory.display()))?;
        ensure!(
            metadata.is_dir() && !metadata.permissions().readonly(),
            "session directory is not writable: {:?}",
            directory.display()
        );

        Ok(Self { directory })
    }

    /// The directory the sessions are stored in.
    pub fn directory(&self) -> &Path {
        &self.directory
    }

    fn record_path(&self, id: &str) -> Result<PathBuf> {
        ensure!(
            !id.is_empty()
                && id
                    .bytes()
                    .all(|byte| byte.is_ascii_alphanumeric() || byte == b'-' || byte == b'_'),
            "session id {id:?} cannot be used as a file name"
        );
        Ok(self.directory.join(id))
    }
}

#[async_trait]
impl StorageHandler for FileHandler {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn read(&self, id: &str) -> Result<Vec<u8>> {
        let path = self.record_path(id)?;
        match fs::read(&path) {
            Ok(payload) => Ok(payload),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(Vec::new()),
            Err(error) => {
                Err(error).with_context(|| format!("cannot read session file {:?}", path.display()))
            }
        }
    }

    async fn write(&self, id: &str, payload: &[u8]) -> Result<()> {
        let path = self.record_path(id)?;
        let mut file = NamedTempFile::new_in(&self.directory).with_context(|| {
            format!("cannot create a file in {:?}", self.directory.display())
        })?;
        file.write_all(payload)
            .and_then(|()| file.as_file().sync_all())
            .with_context(|| format!("cannot write session file {:?}", file.path().display()))?;
        file.persist(&path)
            .with_context(|| format!("cannot write session file {:?}", path.display()))?;
        Ok(())
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        let path = self.record_path(id)?;
        match fs::remove_file(&path) {
            Ok(()) => Ok(()),
            Err(error) if error.kind() == ErrorKind::NotFound => Ok(()),
            Err(error) => Err(error)
                .with_context(|| format!("cannot remove session file {:?}", path.display())),
        }
    }

    async fn gc(&self, max_lifetime: Duration) -> Result<()> {
        let now = SystemTime::now();
        let entries = fs::read_dir(&self.directory).with_context(|| {
            format!("cannot list session directory {:?}", self.directory.display())
        })?;

        let mut removed = 0usize;
        for entry in entries.flatten() {
            let path = entry.path();
            let Ok(metadata) = entry.metadata() else {
                continue;
            };
            let Ok(modified) = metadata.modified() else {
                continue;
            };
            if !metadata.is_file() {
                continue;
            }
            // Lifetimes beyond the range of the clock never expire.
            if modified
                .checked_add(max_lifetime)
                .map_or(true, |expiry| expiry >= now)
            {
                continue;
            }
            match fs::remove_file(&path) {
                Ok(()) => removed += 1,
                Err(error) => warn!("Cannot remove expired session file {:?}: {error}", path.display()),
            }
        }
        trace!("Deleted {removed} expired session files");

        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
