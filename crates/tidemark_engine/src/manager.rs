//! Connectivity state machine and sync cycle.

use crate::config::SyncConfig;
use crate::error::{SyncError, SyncResult};
use crate::events::{Subscribers, SyncEvent};
use crate::handler::{SyncContext, SyncHandler};
use crate::queue::OperationQueue;
use crate::resolver::ConflictResolver;
use chrono::{DateTime, Utc};
use futures::FutureExt;
use parking_lot::{ReentrantMutex, RwLock};
use serde::{Deserialize, Serialize};
use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::Arc;
use std::time::Duration;
use tidemark_protocol::{Conflict, ConnectivityState, Resolution, ResolutionSource, SyncOperation};
use tokio::sync::broadcast;
use tokio::time::Instant;
use tokio_util::sync::CancellationToken;

/// Outcome counters for one sync cycle.
///
/// `total` counts every operation dequeued. Each is counted once more as
/// succeeded, failed or retried, so `total == succeeded + failed + retried`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncStats {
    /// When the cycle started.
    pub started_at: DateTime<Utc>,
    /// When the cycle finished.
    pub completed_at: DateTime<Utc>,
    /// Wall-clock duration of the cycle.
    pub duration: Duration,
    /// Operations dequeued.
    pub total: usize,
    /// Operations applied (or settled in favour of the server).
    pub succeeded: usize,
    /// Operations dropped.
    pub failed: usize,
    /// Operations put back on the queue.
    pub retried: usize,
    /// True if the cycle stopped early on cancellation or timeout.
    pub cancelled: bool,
}

impl SyncStats {
    fn begin() -> Self {
        let now = Utc::now();
        Self {
            started_at: now,
            completed_at: now,
            duration: Duration::ZERO,
            total: 0,
            succeeded: 0,
            failed: 0,
            retried: 0,
            cancelled: false,
        }
    }

    fn finish(&mut self) {
        self.completed_at = Utc::now();
        self.duration = (self.completed_at - self.started_at)
            .to_std()
            .unwrap_or_default();
    }
}

struct RegisteredHandler {
    name: String,
    handler: Arc<dyn SyncHandler>,
}

struct StateCell {
    current: ConnectivityState,
    active_cycles: usize,
}

struct Shared {
    config: SyncConfig,
    queue: Arc<OperationQueue>,
    resolver: ConflictResolver,
    handlers: RwLock<Vec<RegisteredHandler>>,
    state: RwLock<StateCell>,
    // Held from a state change until its callbacks return, so listeners see
    // transitions in the order they happened.
    transitions: ReentrantMutex<()>,
    subscribers: Subscribers,
    last_stats: RwLock<Option<SyncStats>>,
    shutdown: CancellationToken,
}

/// Drives queued operations through their handlers.
///
/// The manager owns the connectivity state. A transition from offline to
/// online starts a sync cycle in the background on the current tokio
/// runtime. Cloning is cheap; clones share all state.
///
/// # Cycle rules
///
/// - Sync only runs while online (or already syncing)
/// - At most `batch_size` operations are dequeued per cycle
/// - Failures are re-queued until `max_retries`, then dropped
/// - Conflicts reported by a handler are settled with the configured strategy
/// - Handler panics are contained and treated as failures
#[derive(Clone)]
pub struct SyncManager {
    shared: Arc<Shared>,
}

impl SyncManager {
    /// Creates a manager for `queue`, starting offline.
    pub fn new(config: SyncConfig, queue: Arc<OperationQueue>) -> Self {
        let subscribers = Subscribers::new(config.event_capacity);
        let resolver = ConflictResolver::new(config.conflict_strategy);
        Self {
            shared: Arc::new(Shared {
                config,
                queue,
                resolver,
                handlers: RwLock::new(Vec::new()),
                state: RwLock::new(StateCell {
                    current: ConnectivityState::Offline,
                    active_cycles: 0,
                }),
                transitions: ReentrantMutex::new(()),
                subscribers,
                last_stats: RwLock::new(None),
                shutdown: CancellationToken::new(),
            }),
        }
    }

    /// Returns the configuration.
    pub fn config(&self) -> &SyncConfig {
        &self.shared.config
    }

    /// Returns the queue drained by this manager.
    pub fn queue(&self) -> &Arc<OperationQueue> {
        &self.shared.queue
    }

    /// Registers a handler under `name`, replacing any handler of that name.
    ///
    /// Handlers are consulted in registration order; the first whose
    /// [`SyncHandler::can_handle`] accepts the resource processes it.
    pub fn register_handler(&self, name: impl Into<String>, handler: Arc<dyn SyncHandler>) {
        let name = name.into();
        let mut handlers = self.shared.handlers.write();
        if let Some(existing) = handlers.iter_mut().find(|h| h.name == name) {
            existing.handler = handler;
            tracing::debug!(handler = %name, "replaced sync handler");
        } else {
            tracing::debug!(handler = %name, "registered sync handler");
            handlers.push(RegisteredHandler { name, handler });
        }
    }

    /// Calls `callback` with `(from, to)` on every state change.
    ///
    /// Changes are delivered one at a time in the order they happened, so
    /// each `from` is the previous `to`. Callbacks run on the thread that
    /// made the change.
    pub fn on_state_change<F>(&self, callback: F)
    where
        F: Fn(ConnectivityState, ConnectivityState) + Send + Sync + 'static,
    {
        self.shared.subscribers.add_state(Arc::new(callback));
    }

    /// Calls `callback` with the stats of every completed cycle.
    pub fn on_sync_complete<F>(&self, callback: F)
    where
        F: Fn(&SyncStats) + Send + Sync + 'static,
    {
        self.shared.subscribers.add_cycle(Arc::new(callback));
    }

    /// Calls `callback` for every operation a handler applied.
    pub fn on_operation_synced<F>(&self, callback: F)
    where
        F: Fn(&SyncOperation) + Send + Sync + 'static,
    {
        self.shared.subscribers.add_synced(Arc::new(callback));
    }

    /// Calls `callback` for every resolved conflict.
    pub fn on_conflict_resolved<F>(&self, callback: F)
    where
        F: Fn(&Resolution) + Send + Sync + 'static,
    {
        self.shared.subscribers.add_resolved(Arc::new(callback));
    }

    /// Returns a receiver for all future events.
    pub fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.shared.subscribers.subscribe()
    }

    /// Returns the current connectivity state.
    pub fn state(&self) -> ConnectivityState {
        self.shared.state.read().current
    }

    /// Sets the connectivity state.
    ///
    /// Setting the current state is a no-op. Going from offline to online
    /// starts a background sync; without a tokio runtime it is skipped with a
    /// warning.
    pub fn set_state(&self, state: ConnectivityState) {
        let _order = self.shared.transitions.lock();
        let previous = {
            let mut cell = self.shared.state.write();
            if cell.current == state {
                return;
            }
            std::mem::replace(&mut cell.current, state)
        };
        tracing::info!(from = %previous, to = %state, "connectivity state changed");
        self.shared.subscribers.state_changed(previous, state);

        if previous == ConnectivityState::Offline && state == ConnectivityState::Online {
            self.spawn_auto_sync();
        }
    }

    /// Returns a snapshot of pending operations.
    pub fn pending(&self) -> Vec<SyncOperation> {
        self.shared.queue.peek_all()
    }

    /// Returns the stats of the most recent completed cycle.
    pub fn last_stats(&self) -> Option<SyncStats> {
        self.shared.last_stats.read().clone()
    }

    /// Cancels background syncs started by connectivity changes.
    pub fn shutdown(&self) {
        tracing::debug!("sync manager shutting down");
        self.shared.shutdown.cancel();
    }

    /// Runs one sync cycle.
    ///
    /// Up to `batch_size` operations are dequeued and handed to their
    /// handlers. Cancelling `cancel`, or reaching the configured cycle
    /// timeout, stops the cycle early; the interrupted operation is
    /// re-queued and `stats.cancelled` is set.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotConnected`] unless online or syncing. Handler
    /// failures never fail the cycle; they are reflected in the stats.
    pub async fn sync(&self, cancel: &CancellationToken) -> SyncResult<SyncStats> {
        self.enter_cycle()?;
        let guard = CycleGuard { manager: self };

        let ctx = self.cycle_context(cancel);
        let batch_size = self.shared.config.batch_size;
        let mut stats = SyncStats::begin();
        tracing::info!(
            pending = self.shared.queue.size(),
            batch_size,
            "sync cycle started"
        );

        while stats.total < batch_size {
            if ctx.is_done() {
                stats.cancelled = true;
                tracing::info!("sync cycle interrupted");
                break;
            }
            let Some(operation) = self.shared.queue.dequeue() else {
                break;
            };
            stats.total += 1;
            self.process(&ctx, operation, &mut stats).await;
        }

        stats.finish();
        drop(guard);

        tracing::info!(
            total = stats.total,
            succeeded = stats.succeeded,
            failed = stats.failed,
            retried = stats.retried,
            cancelled = stats.cancelled,
            duration_ms = stats.duration.as_millis() as u64,
            "sync cycle completed"
        );
        *self.shared.last_stats.write() = Some(stats.clone());
        self.shared.subscribers.cycle_completed(&stats);
        Ok(stats)
    }

    fn enter_cycle(&self) -> SyncResult<()> {
        let _order = self.shared.transitions.lock();
        let previous = {
            let mut cell = self.shared.state.write();
            if !cell.current.is_connected() {
                return Err(SyncError::NotConnected {
                    state: cell.current,
                });
            }
            cell.active_cycles += 1;
            std::mem::replace(&mut cell.current, ConnectivityState::Syncing)
        };
        if previous != ConnectivityState::Syncing {
            tracing::info!(from = %previous, to = %ConnectivityState::Syncing, "connectivity state changed");
            self.shared
                .subscribers
                .state_changed(previous, ConnectivityState::Syncing);
        }
        Ok(())
    }

    // Only the last cycle out restores Online, and only if nothing else
    // changed the state in the meantime.
    fn exit_cycle(&self) {
        let _order = self.shared.transitions.lock();
        let restored = {
            let mut cell = self.shared.state.write();
            cell.active_cycles = cell.active_cycles.saturating_sub(1);
            if cell.active_cycles == 0 && cell.current == ConnectivityState::Syncing {
                cell.current = ConnectivityState::Online;
                true
            } else {
                false
            }
        };
        if restored {
            tracing::info!(from = %ConnectivityState::Syncing, to = %ConnectivityState::Online, "connectivity state changed");
            self.shared
                .subscribers
                .state_changed(ConnectivityState::Syncing, ConnectivityState::Online);
        }
    }

    fn cycle_context(&self, cancel: &CancellationToken) -> SyncContext {
        let ctx = SyncContext::new(cancel.child_token());
        match self.shared.config.cycle_timeout {
            Some(timeout) => ctx.with_deadline(Instant::now() + timeout),
            None => ctx,
        }
    }

    fn spawn_auto_sync(&self) {
        let Ok(runtime) = tokio::runtime::Handle::try_current() else {
            tracing::warn!("no tokio runtime; automatic sync skipped");
            return;
        };
        let manager = self.clone();
        let token = self.shared.shutdown.child_token();
        runtime.spawn(async move {
            match manager.sync(&token).await {
                Ok(stats) => {
                    tracing::debug!(total = stats.total, "automatic sync finished");
                }
                Err(e) => {
                    tracing::debug!(error = %e, "automatic sync did not run");
                }
            }
        });
    }

    // `can_handle` is user code too; a panic there is reported, not unwound.
    fn find_handler(&self, resource: &str) -> Result<Option<Arc<dyn SyncHandler>>, String> {
        std::panic::catch_unwind(AssertUnwindSafe(|| {
            self.shared
                .handlers
                .read()
                .iter()
                .find(|h| h.handler.can_handle(resource))
                .map(|h| Arc::clone(&h.handler))
        }))
        .map_err(|panic| panic_message(&*panic))
    }

    async fn process(&self, ctx: &SyncContext, mut operation: SyncOperation, stats: &mut SyncStats) {
        let handler = match self.find_handler(&operation.resource) {
            Ok(Some(handler)) => handler,
            Ok(None) => {
                tracing::warn!(
                    operation_id = %operation.id(),
                    resource = %operation.resource,
                    "no handler for resource, dropping operation"
                );
                stats.failed += 1;
                return;
            }
            Err(message) => {
                let error = SyncError::HandlerPanic(message).to_string();
                self.retry_or_drop(operation, error, stats);
                return;
            }
        };

        let outcome = tokio::select! {
            biased;
            result = AssertUnwindSafe(handler.handle(ctx, &operation)).catch_unwind() => {
                result.unwrap_or_else(|panic| Err(SyncError::HandlerPanic(panic_message(&*panic))))
            }
            _ = ctx.done() => Err(SyncError::Cancelled),
        };

        match outcome {
            Ok(()) => {
                tracing::debug!(operation_id = %operation.id(), "operation synced");
                stats.succeeded += 1;
                self.shared.subscribers.operation_synced(&operation);
            }
            Err(SyncError::Cancelled) => {
                tracing::info!(operation_id = %operation.id(), "operation interrupted, re-queued");
                operation.note_error(SyncError::Cancelled.to_string());
                stats.retried += 1;
                self.requeue(operation);
            }
            Err(SyncError::Conflict(conflict)) => self.settle_conflict(operation, &conflict, stats),
            Err(e) => self.retry_or_drop(operation, e.to_string(), stats),
        }
    }

    fn settle_conflict(&self, mut operation: SyncOperation, conflict: &Conflict, stats: &mut SyncStats) {
        let resolution = self.shared.resolver.resolve(conflict);
        tracing::info!(
            operation_id = %operation.id(),
            key = %resolution.key,
            source = %resolution.source,
            strategy = %self.shared.resolver.strategy(),
            "conflict resolved"
        );
        self.shared.subscribers.conflict_resolved(&resolution);

        if resolution.source == ResolutionSource::Server {
            stats.succeeded += 1;
            self.shared.subscribers.operation_synced(&operation);
            return;
        }
        let message = format!("conflict on {} resolved as {}", resolution.key, resolution.source);
        operation.payload = resolution.data;
        self.retry_or_drop(operation, message, stats);
    }

    fn retry_or_drop(&self, mut operation: SyncOperation, error: String, stats: &mut SyncStats) {
        if operation.retries() < self.shared.config.max_retries {
            operation.record_failure(error);
            tracing::warn!(
                operation_id = %operation.id(),
                retries = operation.retries(),
                error = operation.last_error().unwrap_or_default(),
                "operation failed, re-queued"
            );
            stats.retried += 1;
            self.requeue(operation);
        } else {
            tracing::error!(
                operation_id = %operation.id(),
                resource = %operation.resource,
                retries = operation.retries(),
                error = %error,
                "operation failed permanently, dropping"
            );
            stats.failed += 1;
        }
    }

    fn requeue(&self, operation: SyncOperation) {
        // The queue keeps the operation in memory even if the store fails.
        if let Err(e) = self.shared.queue.enqueue(operation) {
            tracing::warn!(error = %e, "re-queued operation was not persisted");
        }
    }
}

struct CycleGuard<'a> {
    manager: &'a SyncManager,
}

impl Drop for CycleGuard<'_> {
    fn drop(&mut self) {
        self.manager.exit_cycle();
    }
}

fn panic_message(panic: &(dyn Any + Send)) -> String {
    if let Some(message) = panic.downcast_ref::<&str>() {
        (*message).to_string()
    } else if let Some(message) = panic.downcast_ref::<String>() {
        message.clone()
    } else {
        "non-string panic payload".to_string()
    }
}
