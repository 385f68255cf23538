use crate::StorageHandler;
use anyhow::Result;
use async_trait::async_trait;
use log::{log, warn, Level};
use std::time::Duration;

/// A decorator that logs every call to the wrapped storage handler.
///
/// Results are passed through unchanged.
/// Failures of the inner handler are additionally logged as warnings,
/// since the session machinery itself swallows them.
#[derive(Debug, Clone)]
pub struct LogHandler<Inner> {
    inner: Inner,
    level: Level,
}

impl<Inner> LogHandler<Inner> {
    /// Wrap `inner`, logging calls at [`Level::Debug`].
    pub fn new(inner: Inner) -> Self {
        Self::with_level(inner, Level::Debug)
    }

    /// Wrap `inner`, logging calls at the given level.
    pub fn with_level(inner: Inner, level: Level) -> Self {
        Self { inner, level }
    }

    /// Returns a reference to the wrapped handler.
    pub fn inner(&self) -> &Inner {
        &self.inner
    }

    /// Unwrap the wrapped handler.
    pub fn into_inner(self) -> Inner {
        self.inner
    }
}

fn report<T>(operation: &str, result: Result<T>) -> Result<T> {
    if let Err(error) = &result {
        warn!("Session storage {operation} failed: {error:#}");
    }
    result
}

#[async_trait]
impl<Inner: StorageHandler> StorageHandler for LogHandler<Inner> {
    async fn open(&self) -> Result<()> {
        log!(self.level, "Opened session storage");
        report("open", self.inner.open().await)
    }

    async fn read(&self, id: &str) -> Result<Vec<u8>> {
        log!(self.level, "Read session data for id: {id}");
        report("read", self.inner.read(id).await)
    }

    async fn write(&self, id: &str, payload: &[u8]) -> Result<()> {
        log!(
            self.level,
            "Write {} bytes of session data for id: {id}",
            payload.len()
        );
        report("write", self.inner.write(id, payload).await)
    }

    async fn destroy(&self, id: &str) -> Result<()> {
        log!(self.level, "Destroyed session for id: {id}");
        report("destroy", self.inner.destroy(id).await)
    }

    async fn gc(&self, max_lifetime: Duration) -> Result<()> {
        log!(
            self.level,
            "Garbage collected sessions older than: {}s",
            max_lifetime.as_secs()
        );
        report("gc", self.inner.gc(max_lifetime).await)
    }

    async fn close(&self) -> Result<()> {
        log!(self.level, "Closed session storage");
        report("close", self.inner.close().await)
    }
}
