use crate::{Result, SessionPayload, StorageHandler};
use async_trait::async_trait;
use chrono::{DateTime, Utc};
use log::trace;
use std::collections::HashMap;
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

/// # in-memory storage handler
/// Because there is no external
/// persistence, this handler is ephemeral and will be cleared
/// on server restart.
///
/// It can be preloaded with records and records every call made to it,
/// which makes it suitable for deterministic tests.
///
/// # ***READ THIS BEFORE USING IN A PRODUCTION DEPLOYMENT***
///
/// Storing sessions only in memory brings the following problems:
///
/// 1. All sessions must fit in available memory (important for high load services)
/// 2. The list of recorded operations grows with every call and is only emptied by
///    [MemoryHandler::clear_operations]
/// 3. All sessions will be lost on shutdown
/// 4. If the service is clustered particular session will be stored only on a single instance.
#[derive(Debug, Default)]
pub struct MemoryHandler {
    inner: Mutex<MemoryHandlerInner>,
}

#[derive(Debug, Default)]
struct MemoryHandlerInner {
    records: HashMap<String, Record>,
    operations: Vec<Operation>,
}

#[derive(Debug, Clone)]
struct Record {
    payload: Vec<u8>,
    written_at: DateTime<Utc>,
}

/// A call made to a [MemoryHandler].
#[derive(Debug, Clone, Eq, PartialEq)]
pub enum Operation {
    /// [StorageHandler::open] was called.
    Open,
    /// [StorageHandler::read] was called.
    Read {
        /// The id of the record.
        id: String,
    },
    /// [StorageHandler::write] was called.
    Write {
        /// The id of the record.
        id: String,
    },
    /// [StorageHandler::destroy] was called.
    Destroy {
        /// The id of the record.
        id: String,
    },
    /// [StorageHandler::gc] was called.
    Gc {
        /// The maximum lifetime of a record.
        max_lifetime: Duration,
    },
    /// [StorageHandler::close] was called.
    Close,
}

impl MemoryHandler {
    /// Create a new empty memory handler.
    pub fn new() -> Self {
        Default::default()
    }

    /// Store `payload` under `id` without recording an operation.
    pub fn with_payload(self, id: impl Into<String>, payload: &SessionPayload) -> Result<Self> {
        let payload = payload.encode()?;
        Ok(self.with_raw_payload(id, payload))
    }

    /// Store the raw bytes `payload` under `id` without recording an operation.
    pub fn with_raw_payload(self, id: impl Into<String>, payload: impl Into<Vec<u8>>) -> Self {
        self.lock().records.insert(
            id.into(),
            Record {
                payload: payload.into(),
                written_at: Utc::now(),
            },
        );
        self
    }

    /// Returns the decoded payload stored under `id`, if there is one.
    pub fn payload(&self, id: &str) -> Option<SessionPayload> {
        self.lock()
            .records
            .get(id)
            .map(|record| SessionPayload::decode(&record.payload))
    }

    /// Returns true if a record is stored under `id`.
    pub fn contains(&self, id: &str) -> bool {
        self.lock().records.contains_key(id)
    }

    /// Returns the number of records in the memory handler.
    pub fn len(&self) -> usize {
        self.lock().records.len()
    }

    /// Returns true if the memory handler holds no records.
    pub fn is_empty(&self) -> bool {
        self.lock().records.is_empty()
    }

    /// Returns all operations performed on this handler so far, in order.
    pub fn operations(&self) -> Vec<Operation> {
        self.lock().operations.clone()
    }

    /// Forget all recorded operations.
    pub fn clear_operations(&self) {
        self.lock().operations.clear();
    }

    fn lock(&self) -> MutexGuard<'_, MemoryHandlerInner> {
        self.inner.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn record(&self, operation: Operation) -> MutexGuard<'_, MemoryHandlerInner> {
        let mut inner = self.lock();
        inner.operations.push(operation);
        inner
    }
}

#[async_trait]
impl StorageHandler for MemoryHandler {
    async fn open(&self) -> anyhow::Result<()> {
        self.record(Operation::Open);
        Ok(())
    }

    async fn read(&self, id: &str) -> anyhow::Result<Vec<u8>> {
        let inner = self.record(Operation::Read { id: id.to_owned() });
        Ok(inner
            .records
            .get(id)
            .map(|record| record.payload.clone())
            .unwrap_or_default())
    }

    async fn write(&self, id: &str, payload: &[u8]) -> anyhow::Result<()> {
        let mut inner = self.record(Operation::Write { id: id.to_owned() });
        inner.records.insert(
            id.to_owned(),
            Record {
                payload: payload.to_vec(),
                written_at: Utc::now(),
            },
        );
        Ok(())
    }

    async fn destroy(&self, id: &str) -> anyhow::Result<()> {
        self.record(Operation::Destroy { id: id.to_owned() })
            .records
            .remove(id);
        Ok(())
    }

    async fn gc(&self, max_lifetime: Duration) -> anyhow::Result<()> {
        let mut inner = self.record(Operation::Gc { max_lifetime });
        let max_lifetime = chrono::Duration::from_std(max_lifetime)?;
        let now = Utc::now();
        let initial_len = inner.records.len();
        inner.records.retain(|_, record| {
            record
                .written_at
                .checked_add_signed(max_lifetime)
                .map_or(true, |expiry| expiry >= now)
        });
        trace!(
            "Deleted {} expired sessions",
            initial_len - inner.records.len()
        );
        Ok(())
    }

    async fn close(&self) -> anyhow::Result<()> {
        self.record(Operation::Close);
        Ok(())
    }
}
