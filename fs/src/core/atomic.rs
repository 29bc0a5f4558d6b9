//! Atomic counters used for sync layer statistics.
//!
//! Statistics are advisory: they never participate in the slot protocol,
//! which is lock-protected.

use core::sync::atomic::{AtomicU64, Ordering};

// ============================================================================
// Memory Ordering Helpers
// ============================================================================

/// Acquire ordering - subsequent reads see prior writes
pub const ACQUIRE: Ordering = Ordering::Acquire;

/// Acquire-Release ordering - both acquire and release
pub const ACQ_REL: Ordering = Ordering::AcqRel;

// ============================================================================
// Atomic Counter
// ============================================================================

/// Atomic counter with various operations.
#[derive(Debug, Default)]
#[repr(transparent)]
pub struct AtomicCounter {
    value: AtomicU64,
}

impl AtomicCounter {
    /// Create a new counter with initial value
    #[inline]
    pub const fn new(initial: u64) -> Self {
        Self {
            value: AtomicU64::new(initial),
        }
    }

    /// Load current value
    #[inline]
    pub fn load(&self) -> u64 {
        self.value.load(ACQUIRE)
    }

    /// Increment and return new value
    #[inline]
    pub fn increment(&self) -> u64 {
        self.value.fetch_add(1, ACQ_REL) + 1
    }

    /// Decrement and return new value
    #[inline]
    pub fn decrement(&self) -> u64 {
        self.value.fetch_sub(1, ACQ_REL) - 1
    }

    /// Get maximum of current and new value
    #[inline]
    pub fn fetch_max(&self, value: u64) -> u64 {
        self.value.fetch_max(value, ACQ_REL)
    }
}

// ============================================================================
// Gauge
// ============================================================================

/// Counter of currently active things that also remembers its peak.
#[derive(Debug, Default)]
pub struct PeakGauge {
    current: AtomicCounter,
    peak: AtomicCounter,
}

impl PeakGauge {
    /// Create an empty gauge
    pub const fn new() -> Self {
        Self {
            current: AtomicCounter::new(0),
            peak: AtomicCounter::new(0),
        }
    }

    /// Enter: bump current and fold it into the peak
    #[inline]
    pub fn enter(&self) {
        let now = self.current.increment();
        self.peak.fetch_max(now);
    }

    /// Leave: drop current by one
    #[inline]
    pub fn leave(&self) {
        self.current.decrement();
    }

    /// Currently active
    #[inline]
    pub fn current(&self) -> u64 {
        self.current.load()
    }

    /// Highest value `current` ever reached
    #[inline]
    pub fn peak(&self) -> u64 {
        self.peak.load()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_counter() {
        let c = AtomicCounter::new(0);
        assert_eq!(c.increment(), 1);
        assert_eq!(c.increment(), 2);
        assert_eq!(c.decrement(), 1);
        assert_eq!(c.load(), 1);
    }

    #[test]
    fn test_peak_gauge() {
        let g = PeakGauge::new();
        g.enter();
        g.enter();
        g.leave();
        g.enter();
        g.leave();
        g.leave();
        assert_eq!(g.current(), 0);
        assert_eq!(g.peak(), 2);
    }
}
