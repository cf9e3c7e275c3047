//! Sync notifications.
//!
//! Every notification is delivered twice: synchronously to the callbacks
//! registered on the manager, and to any [`broadcast`] receivers obtained
//! from [`SyncManager::subscribe`](crate::SyncManager::subscribe). Receivers
//! that fall behind the channel capacity miss events; callbacks never do.

use crate::manager::SyncStats;
use parking_lot::RwLock;
use std::sync::Arc;
use tidemark_protocol::{ConnectivityState, Resolution, SyncOperation};
use tokio::sync::broadcast;

/// An observable change in the sync engine.
#[derive(Debug, Clone)]
pub enum SyncEvent {
    /// The connectivity state changed.
    StateChanged {
        /// Previous state.
        from: ConnectivityState,
        /// New state.
        to: ConnectivityState,
    },
    /// A handler applied an operation.
    OperationSynced(SyncOperation),
    /// A handler-reported conflict was resolved.
    ConflictResolved(Resolution),
    /// A sync cycle finished.
    CycleCompleted(SyncStats),
}

pub(crate) type StateListener = Arc<dyn Fn(ConnectivityState, ConnectivityState) + Send + Sync>;
pub(crate) type CycleListener = Arc<dyn Fn(&SyncStats) + Send + Sync>;
pub(crate) type OperationListener = Arc<dyn Fn(&SyncOperation) + Send + Sync>;
pub(crate) type ResolutionListener = Arc<dyn Fn(&Resolution) + Send + Sync>;

/// Callback registries plus the broadcast channel.
///
/// Listener lists are cloned before invocation so a callback may register
/// further callbacks or call back into the manager.
pub(crate) struct Subscribers {
    state: RwLock<Vec<StateListener>>,
    cycle: RwLock<Vec<CycleListener>>,
    synced: RwLock<Vec<OperationListener>>,
    resolved: RwLock<Vec<ResolutionListener>>,
    channel: broadcast::Sender<SyncEvent>,
}

impl Subscribers {
    pub(crate) fn new(capacity: usize) -> Self {
        let (channel, _) = broadcast::channel(capacity.max(1));
        Self {
            state: RwLock::new(Vec::new()),
            cycle: RwLock::new(Vec::new()),
            synced: RwLock::new(Vec::new()),
            resolved: RwLock::new(Vec::new()),
            channel,
        }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<SyncEvent> {
        self.channel.subscribe()
    }

    pub(crate) fn add_state(&self, listener: StateListener) {
        self.state.write().push(listener);
    }

    pub(crate) fn add_cycle(&self, listener: CycleListener) {
        self.cycle.write().push(listener);
    }

    pub(crate) fn add_synced(&self, listener: OperationListener) {
        self.synced.write().push(listener);
    }

    pub(crate) fn add_resolved(&self, listener: ResolutionListener) {
        self.resolved.write().push(listener);
    }

    pub(crate) fn state_changed(&self, from: ConnectivityState, to: ConnectivityState) {
        let listeners = self.state.read().clone();
        for listener in listeners {
            listener(from, to);
        }
        self.publish(SyncEvent::StateChanged { from, to });
    }

    pub(crate) fn cycle_completed(&self, stats: &SyncStats) {
        let listeners = self.cycle.read().clone();
        for listener in listeners {
            listener(stats);
        }
        self.publish(SyncEvent::CycleCompleted(stats.clone()));
    }

    pub(crate) fn operation_synced(&self, operation: &SyncOperation) {
        let listeners = self.synced.read().clone();
        for listener in listeners {
            listener(operation);
        }
        self.publish(SyncEvent::OperationSynced(operation.clone()));
    }

    pub(crate) fn conflict_resolved(&self, resolution: &Resolution) {
        let listeners = self.resolved.read().clone();
        for listener in listeners {
            listener(resolution);
        }
        self.publish(SyncEvent::ConflictResolved(resolution.clone()));
    }

    fn publish(&self, event: SyncEvent) {
        // No receivers is not an error.
        if self.channel.receiver_count() > 0 {
            let _ = self.channel.send(event);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    #[test]
    fn callbacks_and_channel_both_receive() {
        let subscribers = Subscribers::new(8);
        let calls = Arc::new(AtomicUsize::new(0));
        let counter = Arc::clone(&calls);
        subscribers.add_state(Arc::new(move |from, to| {
            assert_eq!(from, ConnectivityState::Offline);
            assert_eq!(to, ConnectivityState::Online);
            counter.fetch_add(1, Ordering::SeqCst);
        }));
        let mut rx = subscribers.subscribe();

        subscribers.state_changed(ConnectivityState::Offline, ConnectivityState::Online);

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        match rx.try_recv().unwrap() {
            SyncEvent::StateChanged { from, to } => {
                assert_eq!(from, ConnectivityState::Offline);
                assert_eq!(to, ConnectivityState::Online);
            }
            other => panic!("unexpected event: {other:?}"),
        }
    }

    #[test]
    fn publish_without_receivers_is_silent() {
        let subscribers = Subscribers::new(1);
        subscribers.state_changed(ConnectivityState::Online, ConnectivityState::Offline);
    }

    #[test]
    fn listener_may_register_another() {
        let subscribers = Arc::new(Subscribers::new(1));
        let inner = Arc::clone(&subscribers);
        subscribers.add_state(Arc::new(move |_, _| {
            inner.add_state(Arc::new(|_, _| {}));
        }));
        subscribers.state_changed(ConnectivityState::Offline, ConnectivityState::Online);
        assert_eq!(subscribers.state.read().len(), 2);
    }
}
