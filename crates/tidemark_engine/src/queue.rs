//! Priority-ordered operation queue.

use crate::error::SyncResult;
use chrono::Utc;
use parking_lot::RwLock;
use std::sync::Arc;
use tidemark_protocol::{insert_by_priority, sort_by_priority, SyncOperation};
use tidemark_storage::QueueStore;

/// Pending operations ordered by priority (lowest first), FIFO within a
/// priority.
///
/// The in-memory queue is authoritative. An attached [`QueueStore`] is a
/// mirror: its failures are logged and reported, but never undo an
/// in-memory change.
pub struct OperationQueue {
    operations: RwLock<Vec<SyncOperation>>,
    store: Option<Arc<dyn QueueStore>>,
}

impl OperationQueue {
    /// Creates an empty, memory-only queue.
    pub fn new() -> Self {
        Self {
            operations: RwLock::new(Vec::new()),
            store: None,
        }
    }

    /// Creates an empty queue mirrored to `store`.
    ///
    /// Existing store contents are not loaded; see [`OperationQueue::restore`].
    pub fn with_store(store: Arc<dyn QueueStore>) -> Self {
        Self {
            operations: RwLock::new(Vec::new()),
            store: Some(store),
        }
    }

    /// Creates a queue holding the operations already in `store`.
    pub fn restore(store: Arc<dyn QueueStore>) -> SyncResult<Self> {
        let mut operations = store.get_all()?;
        sort_by_priority(&mut operations);
        tracing::info!(restored = operations.len(), "restored operation queue");
        Ok(Self {
            operations: RwLock::new(operations),
            store: Some(store),
        })
    }

    /// Returns true if a store is attached.
    pub fn is_persistent(&self) -> bool {
        self.store.is_some()
    }

    /// Adds an operation and returns its id.
    ///
    /// A missing id and creation time are assigned. The operation is placed
    /// after every pending operation of lower or equal priority.
    ///
    /// # Errors
    ///
    /// Returns a store error if mirroring fails. The operation is queued in
    /// memory regardless.
    pub fn enqueue(&self, mut operation: SyncOperation) -> SyncResult<String> {
        operation.assign_identity(Utc::now());
        let id = operation.id().to_string();
        tracing::debug!(
            operation_id = %id,
            op_type = %operation.op_type,
            resource = %operation.resource,
            priority = operation.priority,
            retries = operation.retries(),
            "operation enqueued"
        );

        let mirrored = self.store.is_some().then(|| operation.clone());
        insert_by_priority(&mut self.operations.write(), operation);

        if let (Some(store), Some(operation)) = (&self.store, mirrored) {
            if let Err(e) = store.enqueue(&operation) {
                tracing::warn!(operation_id = %id, error = %e, "failed to persist operation");
                return Err(e.into());
            }
        }
        Ok(id)
    }

    /// Removes and returns the highest-priority operation.
    ///
    /// A failure to mirror the removal is logged; the operation is still
    /// returned so it cannot be lost.
    pub fn dequeue(&self) -> Option<SyncOperation> {
        let operation = {
            let mut operations = self.operations.write();
            if operations.is_empty() {
                return None;
            }
            operations.remove(0)
        };

        if let Some(store) = &self.store {
            if let Err(e) = store.remove(operation.id()) {
                tracing::warn!(
                    operation_id = %operation.id(),
                    error = %e,
                    "failed to remove dequeued operation from store"
                );
            }
        }
        tracing::debug!(operation_id = %operation.id(), "operation dequeued");
        Some(operation)
    }

    /// Returns the highest-priority operation without removing it.
    pub fn peek(&self) -> Option<SyncOperation> {
        self.operations.read().first().cloned()
    }

    /// Returns a snapshot of all pending operations in processing order.
    pub fn peek_all(&self) -> Vec<SyncOperation> {
        self.operations.read().clone()
    }

    /// Returns the number of pending operations.
    pub fn size(&self) -> usize {
        self.operations.read().len()
    }

    /// Returns true if nothing is pending.
    pub fn is_empty(&self) -> bool {
        self.operations.read().is_empty()
    }
}

impl Default for OperationQueue {
    fn default() -> Self {
        Self::new()
    }
}
