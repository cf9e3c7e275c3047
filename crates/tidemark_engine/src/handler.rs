//! Per-resource sync handlers.

use crate::error::SyncResult;
use async_trait::async_trait;
use tidemark_protocol::SyncOperation;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Cancellation and deadline for one sync cycle.
///
/// Handlers should stop early once [`SyncContext::is_done`] is true. A
/// handler still running when the context ends is abandoned and its
/// operation re-queued.
#[derive(Debug, Clone)]
pub struct SyncContext {
    token: CancellationToken,
    deadline: Option<Instant>,
}

impl SyncContext {
    /// Creates a context cancelled by `token`, without a deadline.
    pub fn new(token: CancellationToken) -> Self {
        Self {
            token,
            deadline: None,
        }
    }

    /// Sets a deadline.
    pub fn with_deadline(mut self, deadline: Instant) -> Self {
        self.deadline = Some(deadline);
        self
    }

    /// Returns the cancellation token.
    pub fn token(&self) -> &CancellationToken {
        &self.token
    }

    /// Returns the deadline, if any.
    pub fn deadline(&self) -> Option<Instant> {
        self.deadline
    }

    /// Returns true once cancelled or past the deadline.
    pub fn is_done(&self) -> bool {
        self.token.is_cancelled() || self.deadline.is_some_and(|d| Instant::now() >= d)
    }

    /// Completes when the context is cancelled or the deadline passes.
    pub async fn done(&self) {
        match self.deadline {
            Some(deadline) => {
                tokio::select! {
                    _ = self.token.cancelled() => {}
                    _ = tokio::time::sleep_until(deadline) => {}
                }
            }
            None => self.token.cancelled().await,
        }
    }
}

/// Applies queued operations of one or more resources to a remote system.
///
/// A handler reports divergence by returning
/// [`SyncError::Conflict`](crate::SyncError::Conflict); the manager resolves
/// it with the configured strategy. Any other error is retried.
#[async_trait]
pub trait SyncHandler: Send + Sync {
    /// Returns true if this handler processes `resource`.
    fn can_handle(&self, resource: &str) -> bool;

    /// Applies one operation.
    async fn handle(&self, ctx: &SyncContext, operation: &SyncOperation) -> SyncResult<()>;
}
