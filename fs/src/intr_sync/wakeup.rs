//! # Wakeup Events
//!
//! The sync scheduler must never hold up a wake from suspend. It samples a
//! wakeup event counter before it commits to a slot and re-checks it
//! between bounded waits; any change aborts the request with `Busy`.
//!
//! [`WakeupCounter`] packs the registered event count and the number of
//! events in progress into one atomic word, so a reader always sees a
//! consistent pair.

use core::sync::atomic::{AtomicU64, Ordering};

use crate::core::error::{SyncError, SyncResult};

/// Source of wakeup events (the power management facility)
pub trait WakeupSource: Send + Sync {
    /// Read the wakeup event count.
    ///
    /// Returns `(count, idle)` where `idle` is `true` when no wakeup event
    /// is in progress.
    fn read_count(&self) -> (u32, bool);

    /// Diagnostic hook called when a request aborts on a wakeup event.
    fn report_active(&self) {}
}

/// Wakeup count captured at the start of a request
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WakeupSnapshot {
    count: u32,
}

impl WakeupSnapshot {
    /// Capture the count, failing with `Busy` if an event is in progress
    pub fn prepare(source: &dyn WakeupSource) -> SyncResult<Self> {
        let (count, idle) = source.read_count();
        if idle {
            return Ok(Self { count });
        }

        log::info!("intr_sync: detected wakeup events before sync");
        source.report_active();
        Err(SyncError::Busy)
    }

    /// Captured count
    #[inline]
    pub fn count(&self) -> u32 {
        self.count
    }

    /// Has any wakeup event happened, or started, since the snapshot?
    pub fn changed(&self, source: &dyn WakeupSource) -> bool {
        let (count, idle) = source.read_count();
        if idle && count == self.count {
            return false;
        }

        log::info!(
            "intr_sync: detected wakeup events(idle: {} cnt: {}->{})",
            idle,
            self.count,
            count
        );
        source.report_active();
        true
    }
}

// =============================================================================
// Wakeup Counter
// =============================================================================

const IN_PROGRESS_BITS: u32 = 32;
const IN_PROGRESS_MASK: u64 = (1 << IN_PROGRESS_BITS) - 1;
const ONE_REGISTERED: u64 = 1 << IN_PROGRESS_BITS;

/// Atomic wakeup event counter.
///
/// High half: events registered so far. Low half: events in progress.
#[derive(Debug, Default)]
pub struct WakeupCounter {
    combined: AtomicU64,
}

impl WakeupCounter {
    /// Counter with no events
    pub const fn new() -> Self {
        Self {
            combined: AtomicU64::new(0),
        }
    }

    /// Register an instantaneous wakeup event
    pub fn report_event(&self) {
        self.combined.fetch_add(ONE_REGISTERED, Ordering::SeqCst);
    }

    /// Mark the start of a wakeup event
    pub fn activate(&self) {
        self.combined.fetch_add(1, Ordering::SeqCst);
    }

    /// Mark the end of a wakeup event, registering it.
    ///
    /// Unbalanced calls are ignored.
    pub fn deactivate(&self) {
        let _ = self
            .combined
            .fetch_update(Ordering::SeqCst, Ordering::SeqCst, |combined| {
                if combined & IN_PROGRESS_MASK == 0 {
                    None
                } else {
                    Some(combined.wrapping_add(ONE_REGISTERED - 1))
                }
            });
    }

    /// Keep a wakeup event in progress for the lifetime of the guard
    pub fn stay_awake(&self) -> StayAwake<'_> {
        self.activate();
        StayAwake { counter: self }
    }

    /// Events registered so far
    pub fn registered(&self) -> u32 {
        (self.combined.load(Ordering::SeqCst) >> IN_PROGRESS_BITS) as u32
    }

    /// Events currently in progress
    pub fn in_progress(&self) -> u32 {
        (self.combined.load(Ordering::SeqCst) & IN_PROGRESS_MASK) as u32
    }
}

impl WakeupSource for WakeupCounter {
    fn read_count(&self) -> (u32, bool) {
        let combined = self.combined.load(Ordering::SeqCst);
        let count = (combined >> IN_PROGRESS_BITS) as u32;
        let in_progress = combined & IN_PROGRESS_MASK;
        (count, in_progress == 0)
    }

    fn report_active(&self) {
        log::debug!(
            "intr_sync: active wakeup sources: {}, registered: {}",
            self.in_progress(),
            self.registered()
        );
    }
}

/// RAII guard for an in-progress wakeup event
#[derive(Debug)]
#[must_use = "the wakeup event ends when the guard is dropped"]
pub struct StayAwake<'a> {
    counter: &'a WakeupCounter,
}

impl Drop for StayAwake<'_> {
    fn drop(&mut self) {
        self.counter.deactivate();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_snapshot_unchanged() {
        let counter = WakeupCounter::new();
        let snapshot = WakeupSnapshot::prepare(&counter).unwrap();
        assert_eq!(snapshot.count(), 0);
        assert!(!snapshot.changed(&counter));
    }

    #[test]
    fn test_event_changes_snapshot() {
        let counter = WakeupCounter::new();
        let snapshot = WakeupSnapshot::prepare(&counter).unwrap();
        counter.report_event();
        assert!(snapshot.changed(&counter));
        assert_eq!(counter.registered(), 1);
    }

    #[test]
    fn test_in_progress_event_is_busy() {
        let counter = WakeupCounter::new();
        let snapshot = WakeupSnapshot::prepare(&counter).unwrap();

        let guard = counter.stay_awake();
        assert_eq!(WakeupSnapshot::prepare(&counter), Err(SyncError::Busy));
        assert!(snapshot.changed(&counter));

        drop(guard);
        assert_eq!(counter.in_progress(), 0);
        assert_eq!(counter.registered(), 1);
        // Count moved on, so the old snapshot stays changed
        assert!(snapshot.changed(&counter));
        assert!(WakeupSnapshot::prepare(&counter).is_ok());
    }

    #[test]
    fn test_unbalanced_deactivate_is_ignored() {
        let counter = WakeupCounter::new();
        counter.deactivate();
        assert_eq!(counter.read_count(), (0, true));
    }
}
