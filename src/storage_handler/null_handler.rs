use crate::StorageHandler;
use anyhow::Result;
use async_trait::async_trait;
use std::time::Duration;

/// A storage handler that discards everything written to it.
/// Every session read from it starts out empty.
#[derive(Debug, Default, Clone, Copy)]
pub struct NullHandler;

impl NullHandler {
    /// Create a new null handler.
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl StorageHandler for NullHandler {
    async fn open(&self) -> Result<()> {
        Ok(())
    }

    async fn read(&self, _id: &str) -> Result<Vec<u8>> {
        Ok(Vec::new())
    }

    async fn write(&self, _id: &str, _payload: &[u8]) -> Result<()> {
        Ok(())
    }

    async fn destroy(&self, _id: &str) -> Result<()> {
        Ok(())
    }

    async fn gc(&self, _max_lifetime: Duration) -> Result<()> {
        Ok(())
    }

    async fn close(&self) -> Result<()> {
        Ok(())
    }
}
