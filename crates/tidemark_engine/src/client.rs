//! Application-facing facade.

use crate::cache::LocalCache;
use crate::config::SyncConfig;
use crate::error::SyncResult;
use crate::manager::{SyncManager, SyncStats};
use crate::queue::OperationQueue;
use crate::resolver::ConflictResolver;
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;
use tidemark_protocol::{
    Conflict, ConnectivityState, OperationType, Resolution, ResolutionSource, SyncOperation,
};
use tidemark_storage::QueueStore;
use tokio_util::sync::CancellationToken;

/// Offline-first client.
///
/// Writes land in the local cache immediately and are queued for the sync
/// manager. Reads are always served from the cache. Synced operations and
/// resolved conflicts are written back into the cache.
///
/// ```
/// use tidemark_engine::{Client, SyncConfig};
///
/// let client = Client::new(SyncConfig::default());
/// client.store("emissions", "reading-1", &serde_json::json!({"tonnes": 4.2})).unwrap();
///
/// let value: serde_json::Value = client.load("reading-1").unwrap();
/// assert_eq!(value["tonnes"], 4.2);
/// assert_eq!(client.pending().len(), 1);
/// ```
pub struct Client {
    manager: SyncManager,
    cache: Arc<LocalCache>,
    resolver: ConflictResolver,
}

impl Client {
    /// Creates a memory-only client.
    pub fn new(config: SyncConfig) -> Self {
        Self::from_queue(config, OperationQueue::new())
    }

    /// Creates a client whose queue is persisted to `store`, restoring any
    /// operations already there.
    pub fn with_store(config: SyncConfig, store: Arc<dyn QueueStore>) -> SyncResult<Self> {
        Ok(Self::from_queue(config, OperationQueue::restore(store)?))
    }

    fn from_queue(config: SyncConfig, queue: OperationQueue) -> Self {
        let resolver = ConflictResolver::new(config.conflict_strategy);
        let manager = SyncManager::new(config, Arc::new(queue));
        let cache = Arc::new(LocalCache::new());

        let synced = Arc::clone(&cache);
        manager.on_operation_synced(move |operation| {
            if let Some(key) = &operation.idempotency_key {
                synced.mark_synced(key, &operation.payload);
            }
        });

        let resolved = Arc::clone(&cache);
        manager.on_conflict_resolved(move |resolution| {
            apply_resolution(&resolved, resolution);
        });

        Self {
            manager,
            cache,
            resolver,
        }
    }

    /// Caches `value` under `key` and queues it for `resource`.
    ///
    /// Returns the id of the queued operation. The key doubles as the
    /// operation's idempotency key.
    ///
    /// # Errors
    ///
    /// Returns a codec error if `value` cannot be serialized, and a store
    /// error if the queue could not be persisted. In the latter case the
    /// value is still cached and queued in memory.
    pub fn store<T: Serialize + ?Sized>(
        &self,
        resource: &str,
        key: &str,
        value: &T,
    ) -> SyncResult<String> {
        let data = serde_json::to_vec(value)?;
        self.cache.set_raw(key, data.clone(), Duration::ZERO);
        let operation =
            SyncOperation::new(OperationType::Create, resource, data).with_idempotency_key(key);
        self.manager.queue().enqueue(operation)
    }

    /// Reads `key` from the cache.
    ///
    /// # Errors
    ///
    /// Returns [`SyncError::NotFound`](crate::SyncError::NotFound) if the key
    /// is absent or expired.
    pub fn load<T: DeserializeOwned>(&self, key: &str) -> SyncResult<T> {
        self.cache.get(key)
    }

    /// Runs one sync cycle.
    pub async fn sync(&self, cancel: &CancellationToken) -> SyncResult<SyncStats> {
        self.manager.sync(cancel).await
    }

    /// Marks the client online, starting a background sync if it was offline.
    pub fn set_online(&self) {
        self.manager.set_state(ConnectivityState::Online);
    }

    /// Marks the client offline.
    pub fn set_offline(&self) {
        self.manager.set_state(ConnectivityState::Offline);
    }

    /// Returns the connectivity state.
    pub fn state(&self) -> ConnectivityState {
        self.manager.state()
    }

    /// Returns a snapshot of operations awaiting sync.
    pub fn pending(&self) -> Vec<SyncOperation> {
        self.manager.pending()
    }

    /// Resolves a conflict found outside a sync cycle and caches the result.
    pub fn resolve_conflict(&self, conflict: &Conflict) -> Resolution {
        let resolution = self.resolver.resolve(conflict);
        tracing::info!(
            key = %resolution.key,
            source = %resolution.source,
            "conflict resolved"
        );
        apply_resolution(&self.cache, &resolution);
        resolution
    }

    /// Returns the sync manager, for registering handlers and subscribers.
    pub fn manager(&self) -> &SyncManager {
        &self.manager
    }

    /// Returns the local cache.
    pub fn cache(&self) -> &LocalCache {
        &self.cache
    }

    /// Stops background syncs.
    pub fn shutdown(&self) {
        self.manager.shutdown();
    }
}

fn apply_resolution(cache: &LocalCache, resolution: &Resolution) {
    cache.set_raw(&resolution.key, resolution.data.clone(), Duration::ZERO);
    if resolution.source == ResolutionSource::Server {
        cache.mark_synced(&resolution.key, &resolution.data);
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::handler::{SyncContext, SyncHandler};
    use crate::resolver::ConflictStrategy;
    use crate::SyncError;
    use async_trait::async_trait;
    use chrono::{Duration as ChronoDuration, Utc};
    use serde::Deserialize;
    use tidemark_storage::InMemoryQueueStore;

    #[derive(Debug, PartialEq, Serialize, Deserialize)]
    struct Reading {
        site: String,
        tonnes: u32,
    }

    struct Accept;

    #[async_trait]
    impl SyncHandler for Accept {
        fn can_handle(&self, resource: &str) -> bool {
            resource == "emissions"
        }

        async fn handle(&self, _: &SyncContext, _: &SyncOperation) -> SyncResult<()> {
            Ok(())
        }
    }

    fn go_online(client: &Client) {
        client.manager().set_state(ConnectivityState::Connecting);
        client.set_online();
    }

    #[test]
    fn store_then_load_offline() {
        let client = Client::new(SyncConfig::default());
        let reading = Reading {
            site: "north".into(),
            tonnes: 7,
        };
        let id = client.store("emissions", "reading-1", &reading).unwrap();

        let loaded: Reading = client.load("reading-1").unwrap();
        assert_eq!(loaded, reading);

        let pending = client.pending();
        assert_eq!(pending.len(), 1);
        assert_eq!(pending[0].id(), id);
        assert_eq!(pending[0].op_type, OperationType::Create);
        assert_eq!(pending[0].idempotency_key.as_deref(), Some("reading-1"));
        assert_eq!(client.state(), ConnectivityState::Offline);
    }

    #[test]
    fn load_missing_is_not_found() {
        let client = Client::new(SyncConfig::default());
        assert!(client.load::<Reading>("nope").unwrap_err().is_not_found());
    }

    #[tokio::test]
    async fn sync_offline_fails() {
        let client = Client::new(SyncConfig::default());
        client.store("emissions", "k", &1).unwrap();
        let result = client.sync(&CancellationToken::new()).await;
        assert!(matches!(result, Err(SyncError::NotConnected { .. })));
        assert_eq!(client.pending().len(), 1);
    }

    #[tokio::test]
    async fn synced_writes_are_marked_in_cache() {
        let client = Client::new(SyncConfig::default());
        client.manager().register_handler("emissions", Arc::new(Accept));
        client.store("emissions", "reading-1", &1).unwrap();
        assert!(!client.cache().entry("reading-1").unwrap().is_synced());

        go_online(&client);
        let stats = client.sync(&CancellationToken::new()).await.unwrap();
        assert_eq!(stats.succeeded, 1);
        assert!(client.cache().entry("reading-1").unwrap().is_synced());
    }

    #[test]
    fn resolve_conflict_updates_cache() {
        let client = Client::new(SyncConfig::new().with_conflict_strategy(ConflictStrategy::Merge));
        client.store("emissions", "reading-1", &serde_json::json!({"a": 1})).unwrap();

        let now = Utc::now();
        let conflict = Conflict::new(
            "reading-1",
            br#"{"a":1}"#.to_vec(),
            now,
            br#"{"a":2,"b":3}"#.to_vec(),
            now - ChronoDuration::seconds(1),
        );
        let resolution = client.resolve_conflict(&conflict);
        assert_eq!(resolution.source, ResolutionSource::Merged);

        let cached: serde_json::Value = client.load("reading-1").unwrap();
        assert_eq!(cached, serde_json::json!({"a": 1, "b": 3}));
        assert!(!client.cache().entry("reading-1").unwrap().is_synced());
    }

    #[test]
    fn server_resolution_counts_as_synced() {
        let client = Client::new(SyncConfig::default());
        let now = Utc::now();
        let conflict = Conflict::new("k", b"1".to_vec(), now, b"2".to_vec(), now);
        client.resolve_conflict(&conflict);

        assert_eq!(client.load::<i32>("k").unwrap(), 2);
        assert!(client.cache().entry("k").unwrap().is_synced());
    }

    #[test]
    fn with_store_restores_queue() {
        let store: Arc<dyn QueueStore> = Arc::new(InMemoryQueueStore::new());
        {
            let client = Client::with_store(SyncConfig::default(), Arc::clone(&store)).unwrap();
            client.store("emissions", "a", &1).unwrap();
            client.store("emissions", "b", &2).unwrap();
        }

        let client = Client::with_store(SyncConfig::default(), store).unwrap();
        let keys: Vec<_> = client
            .pending()
            .into_iter()
            .filter_map(|op| op.idempotency_key)
            .collect();
        assert_eq!(keys, vec!["a", "b"]);
        // The cache is memory-only.
        assert!(client.load::<i32>("a").unwrap_err().is_not_found());
    }
}
