//! In-memory queue store for testing.

use crate::error::{StoreError, StoreResult};
use crate::store::QueueStore;
use parking_lot::RwLock;
use tidemark_protocol::{insert_by_priority, SyncOperation};

/// An in-memory queue store.
///
/// This store keeps everything in memory and is suitable for:
/// - Unit tests
/// - Integration tests
/// - Clients that do not need pending work to survive a restart
///
/// # Thread Safety
///
/// This store is thread-safe and can be shared across tasks.
#[derive(Debug, Default)]
pub struct InMemoryQueueStore {
    operations: RwLock<Vec<SyncOperation>>,
}

impl InMemoryQueueStore {
    /// Creates a new empty store.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Returns the number of stored operations.
    #[must_use]
    pub fn len(&self) -> usize {
        self.operations.read().len()
    }

    /// Returns true if nothing is stored.
    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.operations.read().is_empty()
    }
}

impl QueueStore for InMemoryQueueStore {
    fn enqueue(&self, op: &SyncOperation) -> StoreResult<()> {
        let mut operations = self.operations.write();
        operations.retain(|existing| existing.id() != op.id());
        insert_by_priority(&mut operations, op.clone());
        Ok(())
    }

    fn dequeue(&self) -> StoreResult<Option<SyncOperation>> {
        let mut operations = self.operations.write();
        if operations.is_empty() {
            return Ok(None);
        }
        Ok(Some(operations.remove(0)))
    }

    fn peek(&self) -> StoreResult<Option<SyncOperation>> {
        Ok(self.operations.read().first().cloned())
    }

    fn get_all(&self) -> StoreResult<Vec<SyncOperation>> {
        Ok(self.operations.read().clone())
    }

    fn remove(&self, id: &str) -> StoreResult<()> {
        self.operations.write().retain(|op| op.id() != id);
        Ok(())
    }

    fn update_retry(&self, id: &str, retries: u32, error: &str) -> StoreResult<()> {
        let mut operations = self.operations.write();
        let op = operations
            .iter_mut()
            .find(|op| op.id() == id)
            .ok_or_else(|| StoreError::NotFound(id.to_string()))?;
        op.advance_retries(retries, error);
        Ok(())
    }
}
