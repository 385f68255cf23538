use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

mod file_handler;
mod log_handler;
mod null_handler;

pub use file_handler::FileHandler;
pub use log_handler::LogHandler;
pub use null_handler::NullHandler;

/// This is the backend-facing interface of the session machinery.
/// It stores opaque encoded payloads under session ids.
///
/// The session id is expected to be the primary key, uniquely identifying a record.
/// Errors returned from any of these methods are logged and otherwise ignored by
/// [`Session`](crate::Session), so an implementation should only fail where it truly cannot
/// perform the operation.
#[async_trait]
pub trait StorageHandler: Send + Sync {
    /// Prepare the backend for the current request. Must be idempotent.
    async fn open(&self) -> Result<()>;

    /// Read the payload stored under `id`.
    /// A missing record is not an error, it is represented by an empty payload.
    async fn read(&self, id: &str) -> Result<Vec<u8>>;

    /// Store `payload` under `id`, replacing any previous payload.
    async fn write(&self, id: &str, payload: &[u8]) -> Result<()>;

    /// Remove the record stored under `id`.
    /// Removing a record that does not exist succeeds.
    async fn destroy(&self, id: &str) -> Result<()>;

    /// Remove records that were last written more than `max_lifetime` ago.
    /// This is advisory, a backend may remove fewer records.
    async fn gc(&self, max_lifetime: Duration) -> Result<()>;

    /// Release any resources acquired in [`open`](StorageHandler::open).
    async fn close(&self) -> Result<()>;
}
