//! Sync operations.

use crate::error::{ProtocolError, ProtocolResult};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use uuid::Uuid;

/// Semantic intent of a queued operation.
///
/// This is not a network verb; handlers decide how each intent maps onto
/// the remote system.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum OperationType {
    /// A new entity was written locally.
    Create,
    /// An existing entity was changed locally.
    Update,
    /// An entity was removed locally.
    Delete,
    /// A full resynchronisation of a resource was requested.
    Sync,
}

impl OperationType {
    /// Returns the wire name of this operation type.
    pub fn as_str(&self) -> &'static str {
        match self {
            OperationType::Create => "create",
            OperationType::Update => "update",
            OperationType::Delete => "delete",
            OperationType::Sync => "sync",
        }
    }
}

impl fmt::Display for OperationType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A queued mutation intent.
///
/// `SyncOperation` is created by the client on a write, mutated only by the
/// sync manager while it is being processed, and dropped from the queue on
/// success or permanent failure.
///
/// # Invariants
///
/// - `id` and `created_at` are assigned once (see [`SyncOperation::assign_identity`])
///   and never change afterwards
/// - `retries` only increases
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SyncOperation {
    #[serde(default, skip_serializing_if = "String::is_empty")]
    id: String,
    /// Semantic intent.
    #[serde(rename = "type")]
    pub op_type: OperationType,
    /// Tag selecting the handler that processes this operation.
    pub resource: String,
    /// Opaque serialized data, never interpreted by the queue.
    #[serde(with = "crate::payload")]
    pub payload: Vec<u8>,
    /// Owning tenant. Carried for callers, not enforced by the engine.
    #[serde(default)]
    pub tenant_id: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    created_at: Option<DateTime<Utc>>,
    #[serde(default)]
    retries: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    last_error: Option<String>,
    /// Processing priority. Lower values are processed first.
    #[serde(default)]
    pub priority: i32,
    /// Caller-supplied key letting a handler detect re-application.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub idempotency_key: Option<String>,
}

impl SyncOperation {
    /// Creates a new operation without identity.
    ///
    /// The id and creation time are assigned when the operation is enqueued.
    pub fn new(
        op_type: OperationType,
        resource: impl Into<String>,
        payload: impl Into<Vec<u8>>,
    ) -> Self {
        Self {
            id: String::new(),
            op_type,
            resource: resource.into(),
            payload: payload.into(),
            tenant_id: String::new(),
            created_at: None,
            retries: 0,
            last_error: None,
            priority: 0,
            idempotency_key: None,
        }
    }

    /// Sets an explicit id. Has no effect once an id is assigned.
    pub fn with_id(mut self, id: impl Into<String>) -> Self {
        if self.id.is_empty() {
            self.id = id.into();
        }
        self
    }

    /// Sets the priority.
    pub fn with_priority(mut self, priority: i32) -> Self {
        self.priority = priority;
        self
    }

    /// Sets the owning tenant.
    pub fn with_tenant(mut self, tenant_id: impl Into<String>) -> Self {
        self.tenant_id = tenant_id.into();
        self
    }

    /// Sets the idempotency key.
    pub fn with_idempotency_key(mut self, key: impl Into<String>) -> Self {
        self.idempotency_key = Some(key.into());
        self
    }

    /// Sets an explicit creation time. Has no effect once one is assigned.
    pub fn with_created_at(mut self, created_at: DateTime<Utc>) -> Self {
        if self.created_at.is_none() {
            self.created_at = Some(created_at);
        }
        self
    }

    /// Returns the operation id, empty until assigned.
    pub fn id(&self) -> &str {
        &self.id
    }

    /// Returns the creation time, if assigned.
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.created_at
    }

    /// Returns the number of failed attempts so far.
    pub fn retries(&self) -> u32 {
        self.retries
    }

    /// Returns the most recent failure message.
    pub fn last_error(&self) -> Option<&str> {
        self.last_error.as_deref()
    }

    /// Assigns an id and creation time where they are missing.
    ///
    /// Returns `true` if anything was assigned. Existing values are kept.
    pub fn assign_identity(&mut self, now: DateTime<Utc>) -> bool {
        let mut assigned = false;
        if self.id.is_empty() {
            self.id = format!("op-{}", Uuid::new_v4());
            assigned = true;
        }
        if self.created_at.is_none() {
            self.created_at = Some(now);
            assigned = true;
        }
        assigned
    }

    /// Records a failed attempt: increments `retries` and stores the message.
    pub fn record_failure(&mut self, error: impl Into<String>) {
        self.retries = self.retries.saturating_add(1);
        self.last_error = Some(error.into());
    }

    /// Raises the retry count to `retries` and stores the message.
    ///
    /// Used when replaying persisted retry records. A lower count than the
    /// current one leaves the count unchanged.
    pub fn advance_retries(&mut self, retries: u32, error: impl Into<String>) {
        self.retries = self.retries.max(retries);
        self.last_error = Some(error.into());
    }

    /// Stores a diagnostic message without counting an attempt.
    pub fn note_error(&mut self, error: impl Into<String>) {
        self.last_error = Some(error.into());
    }

    /// Encodes to JSON bytes.
    pub fn encode(&self) -> ProtocolResult<Vec<u8>> {
        Ok(serde_json::to_vec(self)?)
    }

    /// Decodes from JSON bytes.
    ///
    /// # Errors
    ///
    /// Returns an error if the bytes are not a valid operation or the
    /// resource tag is empty.
    pub fn decode(bytes: &[u8]) -> ProtocolResult<Self> {
        let op: Self = serde_json::from_slice(bytes)?;
        if op.resource.is_empty() {
            return Err(ProtocolError::invalid_structure(
                "operation resource must not be empty",
            ));
        }
        Ok(op)
    }
}

/// Inserts `op` after every operation with a lower or equal priority.
///
/// `ops` must already be in priority order. Equal priorities keep their
/// insertion order, so a re-enqueued operation lands at the back of its tier.
pub fn insert_by_priority(ops: &mut Vec<SyncOperation>, op: SyncOperation) {
    let index = ops.partition_point(|existing| existing.priority <= op.priority);
    ops.insert(index, op);
}

/// Stable sort by priority (lowest first).
pub fn sort_by_priority(ops: &mut [SyncOperation]) {
    ops.sort_by_key(|op| op.priority);
}

#[cfg(test)]
mod tests {
    use super::*;
    use proptest::prelude::*;

    fn op(id: &str, priority: i32) -> SyncOperation {
        SyncOperation::new(OperationType::Create, "emissions", b"{}".to_vec())
            .with_id(id)
            .with_priority(priority)
    }

    #[test]
    fn operation_type_names() {
        assert_eq!(OperationType::Create.to_string(), "create");
        assert_eq!(OperationType::Update.as_str(), "update");
        assert_eq!(OperationType::Delete.as_str(), "delete");
        assert_eq!(OperationType::Sync.as_str(), "sync");
    }

    #[test]
    fn assign_identity_fills_missing_fields_once() {
        let mut op = SyncOperation::new(OperationType::Create, "billing", vec![1, 2]);
        assert!(op.id().is_empty());
        assert!(op.created_at().is_none());

        let now = Utc::now();
        assert!(op.assign_identity(now));
        let id = op.id().to_string();
        assert!(id.starts_with("op-"));
        assert_eq!(op.created_at(), Some(now));

        let later = now + chrono::Duration::seconds(10);
        assert!(!op.assign_identity(later));
        assert_eq!(op.id(), id);
        assert_eq!(op.created_at(), Some(now));
    }

    #[test]
    fn explicit_id_is_kept() {
        let mut op = op("op-1", 0);
        op.assign_identity(Utc::now());
        assert_eq!(op.id(), "op-1");

        let op = op.with_id("op-2");
        assert_eq!(op.id(), "op-1");
    }

    #[test]
    fn record_failure_increments_retries() {
        let mut op = op("op-1", 0);
        op.record_failure("timeout");
        op.record_failure("503");
        assert_eq!(op.retries(), 2);
        assert_eq!(op.last_error(), Some("503"));

        op.note_error("cancelled");
        assert_eq!(op.retries(), 2);
        assert_eq!(op.last_error(), Some("cancelled"));
    }

    #[test]
    fn advance_retries_never_decreases() {
        let mut op = op("op-1", 0);
        op.advance_retries(3, "replayed");
        assert_eq!(op.retries(), 3);

        op.advance_retries(1, "stale");
        assert_eq!(op.retries(), 3);
        assert_eq!(op.last_error(), Some("stale"));
    }

    #[test]
    fn json_field_names() {
        let mut op = op("op-1", 3)
            .with_tenant("tenant-1")
            .with_idempotency_key("reading-7");
        op.assign_identity(Utc::now());

        let json = String::from_utf8(op.encode().unwrap()).unwrap();
        assert!(json.contains("\"type\":\"create\""));
        assert!(json.contains("\"tenantId\":\"tenant-1\""));
        assert!(json.contains("\"idempotencyKey\":\"reading-7\""));
        assert!(json.contains("\"createdAt\""));

        let parsed = SyncOperation::decode(json.as_bytes()).unwrap();
        assert_eq!(parsed, op);
    }

    #[test]
    fn decode_rejects_empty_resource() {
        let json = br#"{"type":"create","resource":"","payload":""}"#;
        assert!(matches!(
            SyncOperation::decode(json),
            Err(ProtocolError::InvalidStructure(_))
        ));
    }

    #[test]
    fn insert_keeps_fifo_within_priority() {
        let mut ops = Vec::new();
        insert_by_priority(&mut ops, op("a", 5));
        insert_by_priority(&mut ops, op("b", 1));
        insert_by_priority(&mut ops, op("c", 5));
        insert_by_priority(&mut ops, op("d", 1));
        insert_by_priority(&mut ops, op("e", 3));

        let ids: Vec<_> = ops.iter().map(|o| o.id()).collect();
        assert_eq!(ids, vec!["b", "d", "e", "a", "c"]);
    }

    proptest! {
        #[test]
        fn insertion_matches_stable_sort(priorities in prop::collection::vec(-5i32..5, 0..40)) {
            let mut inserted = Vec::new();
            let mut sorted = Vec::new();
            for (i, p) in priorities.iter().enumerate() {
                insert_by_priority(&mut inserted, op(&format!("op-{i}"), *p));
                sorted.push(op(&format!("op-{i}"), *p));
            }
            sort_by_priority(&mut sorted);

            let a: Vec<_> = inserted.iter().map(|o| o.id().to_string()).collect();
            let b: Vec<_> = sorted.iter().map(|o| o.id().to_string()).collect();
            prop_assert_eq!(a, b);
        }
    }
}
