//! Inspect command implementation.

use super::{CommandError, OutputFormat};
use chrono::{DateTime, Utc};
use serde::Serialize;
use std::collections::BTreeMap;
use std::path::Path;
use tidemark_protocol::SyncOperation;
use tidemark_storage::FileQueueStore;

/// Queue inspection result.
#[derive(Debug, Serialize)]
pub struct InspectResult {
    /// Journal path.
    pub path: String,
    /// Records in the journal, including superseded ones.
    pub record_count: usize,
    /// Pending operations.
    pub pending: usize,
    /// Pending operations per resource.
    pub by_resource: BTreeMap<String, usize>,
    /// Pending operations that have failed at least once.
    pub retrying: usize,
    /// Listed operations, in processing order.
    pub operations: Vec<OperationSummary>,
}

/// One pending operation.
#[derive(Debug, Serialize)]
pub struct OperationSummary {
    /// Operation id.
    pub id: String,
    /// Operation type.
    pub op_type: String,
    /// Resource tag.
    pub resource: String,
    /// Priority.
    pub priority: i32,
    /// Failed attempts.
    pub retries: u32,
    /// Most recent failure.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_error: Option<String>,
    /// Creation time.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub created_at: Option<DateTime<Utc>>,
    /// Payload size in bytes.
    pub payload_size: usize,
}

impl From<&SyncOperation> for OperationSummary {
    fn from(op: &SyncOperation) -> Self {
        Self {
            id: op.id().to_string(),
            op_type: op.op_type.to_string(),
            resource: op.resource.clone(),
            priority: op.priority,
            retries: op.retries(),
            last_error: op.last_error().map(str::to_string),
            created_at: op.created_at(),
            payload_size: op.payload.len(),
        }
    }
}

/// Runs the inspect command.
pub fn run(path: &Path, limit: Option<usize>, format: OutputFormat) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(CommandError::QueueNotFound(path.to_path_buf()).into());
    }

    let scan = FileQueueStore::scan(path)?;
    if scan.torn_tail {
        tracing::warn!(path = %path.display(), "journal ends in a torn record");
    }
    let result = summarize(path, scan.records, &scan.operations, limit);
    tracing::debug!(pending = result.pending, records = result.record_count, "inspected queue");

    match format {
        OutputFormat::Json => println!("{}", serde_json::to_string_pretty(&result)?),
        OutputFormat::Text => print_text_output(&result),
    }
    Ok(())
}

/// Builds the inspection result for `operations`, listing at most `limit`.
pub fn summarize(
    path: &Path,
    record_count: usize,
    operations: &[SyncOperation],
    limit: Option<usize>,
) -> InspectResult {
    let mut by_resource = BTreeMap::new();
    for op in operations {
        *by_resource.entry(op.resource.clone()).or_insert(0) += 1;
    }

    InspectResult {
        path: path.display().to_string(),
        record_count,
        pending: operations.len(),
        by_resource,
        retrying: operations.iter().filter(|op| op.retries() > 0).count(),
        operations: operations
            .iter()
            .take(limit.unwrap_or(usize::MAX))
            .map(OperationSummary::from)
            .collect(),
    }
}

fn print_text_output(result: &InspectResult) {
    println!("Queue: {}", result.path);
    println!();
    println!("Summary:");
    println!("  Journal records:  {}", result.record_count);
    println!("  Pending:          {}", result.pending);
    println!("  Retrying:         {}", result.retrying);

    if !result.by_resource.is_empty() {
        println!();
        println!("By resource:");
        for (resource, count) in &result.by_resource {
            println!("  {:<20} {}", resource, count);
        }
    }

    if !result.operations.is_empty() {
        println!();
        println!("{:<42} {:<8} {:<16} {:>8} {:>7}", "ID", "TYPE", "RESOURCE", "PRIORITY", "RETRIES");
        for op in &result.operations {
            println!(
                "{:<42} {:<8} {:<16} {:>8} {:>7}",
                op.id, op.op_type, op.resource, op.priority, op.retries
            );
            if let Some(error) = &op.last_error {
                println!("    last error: {}", error);
            }
        }
        if result.operations.len() < result.pending {
            println!("  ... {} more", result.pending - result.operations.len());
        }
    }
}
