//! Configuration for the sync engine.

use crate::resolver::ConflictStrategy;
use std::time::Duration;

/// Default number of retries before an operation is dropped.
pub const DEFAULT_MAX_RETRIES: u32 = 5;
/// Default number of operations drained per sync cycle.
pub const DEFAULT_BATCH_SIZE: usize = 50;
/// Default capacity of the event broadcast channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration for the sync manager and client.
#[derive(Debug, Clone)]
pub struct SyncConfig {
    /// Failed attempts allowed before an operation is dropped.
    pub max_retries: u32,
    /// Maximum operations dequeued per sync cycle.
    pub batch_size: usize,
    /// Upper bound on the duration of one sync cycle.
    pub cycle_timeout: Option<Duration>,
    /// Strategy for handler-reported conflicts.
    pub conflict_strategy: ConflictStrategy,
    /// Capacity of the event broadcast channel.
    pub event_capacity: usize,
}

impl SyncConfig {
    /// Creates a configuration with default values.
    pub fn new() -> Self {
        Self {
            max_retries: DEFAULT_MAX_RETRIES,
            batch_size: DEFAULT_BATCH_SIZE,
            cycle_timeout: None,
            conflict_strategy: ConflictStrategy::default(),
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }

    /// Sets the maximum number of retries.
    pub fn with_max_retries(mut self, max_retries: u32) -> Self {
        self.max_retries = max_retries;
        self
    }

    /// Sets the batch size. Zero selects the default.
    pub fn with_batch_size(mut self, size: usize) -> Self {
        self.batch_size = if size == 0 { DEFAULT_BATCH_SIZE } else { size };
        self
    }

    /// Bounds each sync cycle to the given duration.
    pub fn with_cycle_timeout(mut self, timeout: Duration) -> Self {
        self.cycle_timeout = Some(timeout);
        self
    }

    /// Sets the conflict strategy.
    pub fn with_conflict_strategy(mut self, strategy: ConflictStrategy) -> Self {
        self.conflict_strategy = strategy;
        self
    }

    /// Sets the event channel capacity (at least 1).
    pub fn with_event_capacity(mut self, capacity: usize) -> Self {
        self.event_capacity = capacity.max(1);
        self
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sync_config_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.max_retries, 5);
        assert_eq!(config.batch_size, 50);
        assert!(config.cycle_timeout.is_none());
        assert_eq!(config.conflict_strategy, ConflictStrategy::ServerWins);
    }

    #[test]
    fn sync_config_builder() {
        let config = SyncConfig::new()
            .with_max_retries(3)
            .with_batch_size(10)
            .with_cycle_timeout(Duration::from_secs(5))
            .with_conflict_strategy(ConflictStrategy::Merge)
            .with_event_capacity(0);

        assert_eq!(config.max_retries, 3);
        assert_eq!(config.batch_size, 10);
        assert_eq!(config.cycle_timeout, Some(Duration::from_secs(5)));
        assert_eq!(config.conflict_strategy, ConflictStrategy::Merge);
        assert_eq!(config.event_capacity, 1);
    }

    #[test]
    fn zero_batch_size_falls_back_to_default() {
        let config = SyncConfig::new().with_batch_size(0);
        assert_eq!(config.batch_size, DEFAULT_BATCH_SIZE);
    }
}
