//! Compact command implementation.

use super::CommandError;
use std::path::Path;
use tidemark_storage::FileQueueStore;

/// Runs the compact command.
pub fn run(path: &Path, dry_run: bool) -> Result<(), Box<dyn std::error::Error>> {
    if !path.exists() {
        return Err(CommandError::QueueNotFound(path.to_path_buf()).into());
    }

    println!("Compacting queue at {:?}", path);
    if dry_run {
        println!("(dry run - no changes will be made)");
    }
    println!();

    let bytes_before = std::fs::metadata(path)?.len();
    // Scanning never writes, so the dry run leaves a torn tail in place.
    let scan = FileQueueStore::scan(path)?;
    let records = scan.records;
    let pending = scan.operations.len();

    println!("Compaction Analysis:");
    println!("  Journal records:   {}", records);
    println!("  Pending:           {}", pending);
    println!("  Superseded:        {}", records.saturating_sub(pending));
    if scan.torn_tail {
        println!("  Torn tail:         yes (will be dropped)");
    }
    println!("  Size before:       {} bytes", bytes_before);

    if dry_run {
        return Ok(());
    }
    if records <= pending && !scan.torn_tail {
        println!();
        println!("No compaction needed - journal is already minimal");
        return Ok(());
    }

    let store = FileQueueStore::open(path)?;
    let dropped = store.compact()?;
    let bytes_after = std::fs::metadata(path)?.len();
    tracing::debug!(bytes_before, bytes_after, "journal size after compaction");

    println!("  Size after:        {} bytes", bytes_after);
    println!();
    println!("✓ Compaction complete ({} records dropped)", dropped);
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tidemark_protocol::{OperationType, SyncOperation};
    use tidemark_storage::QueueStore;

    #[test]
    fn compacts_superseded_records() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");
        {
            let store = FileQueueStore::open(&path).unwrap();
            for i in 0..4 {
                let op = SyncOperation::new(OperationType::Create, "emissions", vec![i])
                    .with_id(format!("op-{i}"));
                store.enqueue(&op).unwrap();
            }
            store.remove("op-0").unwrap();
            store.remove("op-1").unwrap();
        }

        run(&path, true).unwrap();
        assert_eq!(FileQueueStore::open(&path).unwrap().record_count(), 6);

        run(&path, false).unwrap();
        let store = FileQueueStore::open(&path).unwrap();
        assert_eq!(store.record_count(), 2);
        assert_eq!(store.len(), 2);
    }

    #[test]
    fn dry_run_leaves_torn_tail_untouched() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("queue.jsonl");
        {
            let store = FileQueueStore::open(&path).unwrap();
            let op = SyncOperation::new(OperationType::Create, "emissions", vec![1]).with_id("op-1");
            store.enqueue(&op).unwrap();
        }
        {
            let mut file = std::fs::OpenOptions::new().append(true).open(&path).unwrap();
            std::io::Write::write_all(&mut file, b"{\"kind\":\"enq").unwrap();
        }
        let before = std::fs::read(&path).unwrap();

        run(&path, true).unwrap();
        assert_eq!(std::fs::read(&path).unwrap(), before);

        run(&path, false).unwrap();
        let scan = FileQueueStore::scan(&path).unwrap();
        assert!(!scan.torn_tail);
        assert_eq!(scan.records, 1);
    }
}
