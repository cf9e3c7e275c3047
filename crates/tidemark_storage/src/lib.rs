//! # Tidemark Storage
//!
//! Durability mirror for the Tidemark operation queue.
//!
//! The in-memory queue in `tidemark_engine` is the source of truth. A
//! [`QueueStore`] mirrors it best-effort so pending operations survive a
//! restart.
//!
//! ## Available Stores
//!
//! - [`InMemoryQueueStore`] - For testing and ephemeral clients
//! - [`FileQueueStore`] - Append-only JSON-lines journal with replay and compaction
//!
//! ## Example
//!
//! ```rust
//! use tidemark_protocol::{OperationType, SyncOperation};
//! use tidemark_storage::{InMemoryQueueStore, QueueStore};
//!
//! let store = InMemoryQueueStore::new();
//! let op = SyncOperation::new(OperationType::Create, "emissions", b"{}".to_vec())
//!     .with_id("op-1");
//! store.enqueue(&op).unwrap();
//! assert_eq!(store.peek().unwrap().unwrap().id(), "op-1");
//! ```

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod error;
mod file;
mod memory;
mod store;

pub use error::{StoreError, StoreResult};
pub use file::{FileQueueStore, JournalScan};
pub use memory::InMemoryQueueStore;
pub use store::QueueStore;
