//! # Tidemark Protocol
//!
//! Data model shared by every Tidemark crate.
//!
//! This crate provides:
//! - [`SyncOperation`] - a queued mutation intent routed to a resource handler
//! - [`ConnectivityState`] - the four connectivity states of the sync manager
//! - [`CacheEntry`] - a locally cached, versioned payload
//! - [`Conflict`] and [`Resolution`] - divergent local/server versions and their outcome
//! - JSON encoding for operations (payload bytes are carried as base64)
//!
//! This is a pure data crate with no I/O operations. Payloads are opaque
//! bytes; only handlers and the merge conflict path ever interpret them.

#![deny(unsafe_code)]
#![warn(missing_docs)]

mod cache;
mod conflict;
mod error;
mod operation;
pub mod payload;
mod state;

pub use cache::CacheEntry;
pub use conflict::{Conflict, Resolution, ResolutionSource};
pub use error::{ProtocolError, ProtocolResult};
pub use operation::{insert_by_priority, sort_by_priority, OperationType, SyncOperation};
pub use state::ConnectivityState;
