//! Time handling for the sync layer.
//!
//! The scheduler never sleeps on a kernel timer directly: bounded waits are
//! expressed against a [`ClockSource`], which gives monotonic time and a
//! relax hook that the waiter calls between polls.

use core::fmt;
use core::ops::Add;
use core::sync::atomic::{AtomicU64, Ordering};
use core::time::Duration;

/// Nanoseconds per second
pub const NSEC_PER_SEC: u64 = 1_000_000_000;

/// Nanoseconds per millisecond
pub const NSEC_PER_MSEC: u64 = 1_000_000;

/// Nanoseconds per microsecond
pub const NSEC_PER_USEC: u64 = 1_000;

/// Monotonic timestamp in nanoseconds since an arbitrary, clock-defined origin.
#[derive(Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Default)]
#[repr(transparent)]
pub struct Timestamp(pub u64);

impl Timestamp {
    /// Clock origin
    pub const ZERO: Self = Self(0);

    /// Create timestamp from nanoseconds
    #[inline]
    pub const fn from_nanos(nanos: u64) -> Self {
        Self(nanos)
    }

    /// Create timestamp from milliseconds
    #[inline]
    pub const fn from_millis(millis: u64) -> Self {
        Self(millis * NSEC_PER_MSEC)
    }

    /// Get raw nanosecond value
    #[inline]
    pub const fn as_nanos(self) -> u64 {
        self.0
    }

    /// Duration since another timestamp (zero if `earlier` is later)
    #[inline]
    pub const fn duration_since(self, earlier: Self) -> Duration {
        Duration::from_nanos(self.0.saturating_sub(earlier.0))
    }

    /// Add a duration, saturating at the end of the representable range
    #[inline]
    pub fn saturating_add(self, duration: Duration) -> Self {
        let nanos = u64::try_from(duration.as_nanos()).unwrap_or(u64::MAX);
        Self(self.0.saturating_add(nanos))
    }
}

impl fmt::Debug for Timestamp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(
            f,
            "Timestamp({}.{:09}s)",
            self.0 / NSEC_PER_SEC,
            self.0 % NSEC_PER_SEC
        )
    }
}

impl Add<Duration> for Timestamp {
    type Output = Self;

    #[inline]
    fn add(self, rhs: Duration) -> Self {
        self.saturating_add(rhs)
    }
}

// ============================================================================
// Clock Sources
// ============================================================================

/// Clock source used for bounded waits.
///
/// Implementations must be provided by the kernel/runtime environment.
pub trait ClockSource: Send + Sync {
    /// Get monotonic time (for measuring durations)
    fn monotonic(&self) -> Timestamp;

    /// Give up the CPU briefly while polling a condition.
    fn relax(&self) {
        core::hint::spin_loop();
    }
}

/// Counter-based clock for deterministic tests and early boot.
///
/// Time only moves when [`advance`](Self::advance) is called or when a
/// waiter relaxes, which advances the counter by the configured tick. A
/// bounded wait against this clock therefore always terminates.
#[derive(Debug)]
pub struct CounterClock {
    counter: AtomicU64,
    tick: u64,
}

impl CounterClock {
    /// Create a counter clock that advances `tick` nanoseconds per relax
    pub const fn new(tick: u64) -> Self {
        Self {
            counter: AtomicU64::new(0),
            tick,
        }
    }

    /// Advance time by given nanoseconds
    pub fn advance(&self, nanos: u64) {
        self.counter.fetch_add(nanos, Ordering::SeqCst);
    }

    /// Set time to specific value
    pub fn set(&self, nanos: u64) {
        self.counter.store(nanos, Ordering::SeqCst);
    }
}

impl ClockSource for CounterClock {
    fn monotonic(&self) -> Timestamp {
        Timestamp::from_nanos(self.counter.load(Ordering::SeqCst))
    }

    fn relax(&self) {
        self.advance(self.tick);
        core::hint::spin_loop();
    }
}

impl Default for CounterClock {
    fn default() -> Self {
        Self::new(NSEC_PER_MSEC)
    }
}

/// Host clock backed by `std::time::Instant`.
#[cfg(feature = "std")]
#[derive(Debug, Clone, Copy)]
pub struct StdClock {
    origin: std::time::Instant,
}

#[cfg(feature = "std")]
impl StdClock {
    /// Sleep granularity used while polling
    pub const RELAX_INTERVAL: Duration = Duration::from_micros(50);

    /// Create a clock whose origin is now
    pub fn new() -> Self {
        Self {
            origin: std::time::Instant::now(),
        }
    }
}

#[cfg(feature = "std")]
impl Default for StdClock {
    fn default() -> Self {
        Self::new()
    }
}

#[cfg(feature = "std")]
impl ClockSource for StdClock {
    fn monotonic(&self) -> Timestamp {
        let elapsed = self.origin.elapsed().as_nanos();
        Timestamp::from_nanos(u64::try_from(elapsed).unwrap_or(u64::MAX))
    }

    fn relax(&self) {
        std::thread::sleep(Self::RELAX_INTERVAL);
    }
}
