//! Error types for the sync engine.

use thiserror::Error;
use tidemark_protocol::{Conflict, ConnectivityState, ProtocolError};
use tidemark_storage::StoreError;

/// Result type for sync engine operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Errors that can occur in the sync engine.
#[derive(Error, Debug)]
pub enum SyncError {
    /// A sync cycle was requested while not connected.
    #[error("not connected (state: {state})")]
    NotConnected {
        /// State at the time of the request.
        state: ConnectivityState,
    },

    /// The cache key is absent or its entry has expired.
    #[error("not found: {0}")]
    NotFound(String),

    /// A value could not be serialized or deserialized.
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),

    /// The queue store failed. The in-memory queue is unaffected.
    #[error("store error: {0}")]
    Store(#[from] StoreError),

    /// A protocol type could not be encoded or decoded.
    #[error("protocol error: {0}")]
    Protocol(#[from] ProtocolError),

    /// A handler failed to apply an operation.
    #[error("handler error: {0}")]
    Handler(String),

    /// A handler panicked while applying an operation.
    #[error("handler panicked: {0}")]
    HandlerPanic(String),

    /// A handler found the remote version diverged from the local one.
    #[error("conflict on key {}", .0.key)]
    Conflict(Box<Conflict>),

    /// The sync cycle was cancelled or ran out of time.
    #[error("sync cancelled")]
    Cancelled,

    /// A conflict strategy name was not recognised.
    #[error("unknown conflict strategy: {0}")]
    UnknownStrategy(String),
}

impl SyncError {
    /// Creates a handler error.
    pub fn handler(message: impl Into<String>) -> Self {
        Self::Handler(message.into())
    }

    /// Creates a conflict error for the manager to resolve.
    pub fn conflict(conflict: Conflict) -> Self {
        Self::Conflict(Box::new(conflict))
    }

    /// Returns true for a cache miss or an expired entry.
    pub fn is_not_found(&self) -> bool {
        matches!(self, SyncError::NotFound(_))
    }
}
