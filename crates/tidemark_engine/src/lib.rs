//! # Tidemark Engine
//!
//! Offline-first sync engine.
//!
//! This crate provides:
//! - A priority-ordered operation queue, optionally persisted
//! - A local cache with per-entry expiry
//! - Conflict resolution strategies
//! - A connectivity state machine that drains the queue through handlers
//! - A client facade tying them together
//!
//! ## Model
//!
//! Applications write through [`Client::store`]. The value is cached at
//! once and an operation is queued. When the client is online,
//! [`SyncManager::sync`] hands queued operations to registered
//! [`SyncHandler`]s, lowest priority value first. Failed operations are
//! retried up to [`SyncConfig::max_retries`] times, then dropped.
//!
//! ## Key Invariants
//!
//! - Reads never wait for the network
//! - Each dequeued operation is counted exactly once as succeeded, failed or retried
//! - Sync never runs while offline
//! - Handler failures and panics never abort a cycle

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod client;
mod config;
mod error;
mod events;
mod handler;
mod manager;
mod queue;
mod resolver;

pub use cache::LocalCache;
pub use client::Client;
pub use config::{SyncConfig, DEFAULT_BATCH_SIZE, DEFAULT_EVENT_CAPACITY, DEFAULT_MAX_RETRIES};
pub use error::{SyncError, SyncResult};
pub use events::SyncEvent;
pub use handler::{SyncContext, SyncHandler};
pub use manager::{SyncManager, SyncStats};
pub use queue::OperationQueue;
pub use resolver::{ConflictResolver, ConflictStrategy};

pub use tidemark_protocol::{
    CacheEntry, Conflict, ConnectivityState, OperationType, Resolution, ResolutionSource,
    SyncOperation,
};
