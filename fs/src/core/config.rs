//! Sync layer configuration.

use core::time::Duration;

/// Default bound on a single wait for slot completion (HZ/10).
pub const DEFAULT_POLL_INTERVAL: Duration = Duration::from_millis(100);

/// Default name of the sync worker queue.
pub const DEFAULT_QUEUE_NAME: &str = "intr_syncd";

/// Configuration of the coalescing sync scheduler.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SyncConfig {
    /// Route requests through the coalescing scheduler. When `false`, every
    /// request calls the flush primitive directly.
    pub interruptible: bool,
    /// Upper bound of one completion wait between wakeup checks
    pub poll_interval: Duration,
    /// Name given to the worker queue when it is created
    pub queue_name: &'static str,
    /// Worker threads for queues that support more than one (ordered if 1)
    pub workers: usize,
}

impl SyncConfig {
    /// Default configuration
    pub const fn new() -> Self {
        Self {
            interruptible: cfg!(feature = "interruptible"),
            poll_interval: DEFAULT_POLL_INTERVAL,
            queue_name: DEFAULT_QUEUE_NAME,
            workers: 1,
        }
    }

    /// Enable or disable the coalescing path
    pub const fn with_interruptible(mut self, interruptible: bool) -> Self {
        self.interruptible = interruptible;
        self
    }

    /// Set the completion poll interval
    pub const fn with_poll_interval(mut self, poll_interval: Duration) -> Self {
        self.poll_interval = poll_interval;
        self
    }

    /// Set the worker queue name
    pub const fn with_queue_name(mut self, queue_name: &'static str) -> Self {
        self.queue_name = queue_name;
        self
    }

    /// Set the worker count (clamped to at least one)
    pub const fn with_workers(mut self, workers: usize) -> Self {
        self.workers = if workers == 0 { 1 } else { workers };
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
    fn test_defaults() {
        let config = SyncConfig::default();
        assert_eq!(config.poll_interval, Duration::from_millis(100));
        assert_eq!(config.queue_name, "intr_syncd");
        assert_eq!(config.workers, 1);
        assert_eq!(config.interruptible, cfg!(feature = "interruptible"));
    }

    #[test]
    fn test_builders() {
        let config = SyncConfig::new()
            .with_interruptible(false)
            .with_poll_interval(Duration::from_millis(5))
            .with_workers(0);
        assert!(!config.interruptible);
        assert_eq!(config.poll_interval, Duration::from_millis(5));
        assert_eq!(config.workers, 1);
    }
}
