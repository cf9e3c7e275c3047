//! Queue store trait definition.

use crate::error::StoreResult;
use tidemark_protocol::SyncOperation;

/// A durability mirror for the operation queue.
///
/// Stores keep operations in priority order (lowest `priority` first, FIFO
/// among equals), the same order the in-memory queue uses.
///
/// # Invariants
///
/// - `enqueue` of an id that is already stored replaces the stored copy
/// - `remove` of an unknown id is a no-op
/// - `update_retry` never lowers a stored retry count
/// - Stores must be `Send + Sync`; the engine calls them from any task
///
/// # Implementors
///
/// - [`super::InMemoryQueueStore`] - For testing
/// - [`super::FileQueueStore`] - For persistent storage
pub trait QueueStore: Send + Sync {
    /// Adds an operation.
    ///
    /// # Errors
    ///
    /// Returns an error if the operation cannot be persisted.
    fn enqueue(&self, op: &SyncOperation) -> StoreResult<()>;

    /// Removes and returns the next operation, if any.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    fn dequeue(&self) -> StoreResult<Option<SyncOperation>>;

    /// Returns the next operation without removing it.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn peek(&self) -> StoreResult<Option<SyncOperation>>;

    /// Returns every stored operation in processing order.
    ///
    /// # Errors
    ///
    /// Returns an error if the store cannot be read.
    fn get_all(&self) -> StoreResult<Vec<SyncOperation>>;

    /// Removes an operation by id.
    ///
    /// # Errors
    ///
    /// Returns an error if the removal cannot be persisted.
    fn remove(&self, id: &str) -> StoreResult<()>;

    /// Records the retry count and last error of a stored operation.
    ///
    /// # Errors
    ///
    /// Returns [`crate::StoreError::NotFound`] if no operation has the id,
    /// or an error if the update cannot be persisted.
    fn update_retry(&self, id: &str, retries: u32, error: &str) -> StoreResult<()>;
}
