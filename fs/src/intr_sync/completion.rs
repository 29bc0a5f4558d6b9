//! # Completion
//!
//! Resettable broadcast "done" signal with a bounded wait.
//!
//! A completion does not protect anything by itself: the owner resets and
//! fires it while holding its own lock, so that the signal and the state it
//! describes change in the same critical section. Waiters poll it without
//! that lock.

use core::sync::atomic::{AtomicBool, Ordering};
use core::time::Duration;

use crate::core::time::ClockSource;

/// Broadcast completion signal
#[derive(Debug, Default)]
pub struct Completion {
    done: AtomicBool,
}

impl Completion {
    /// Create a completion that has not fired
    pub const fn new() -> Self {
        Self {
            done: AtomicBool::new(false),
        }
    }

    /// Re-arm the completion for the next run
    #[inline]
    pub fn reinit(&self) {
        self.done.store(false, Ordering::Release);
    }

    /// Release every current and future waiter until the next `reinit`
    #[inline]
    pub fn complete_all(&self) {
        self.done.store(true, Ordering::Release);
    }

    /// Has the completion fired?
    #[inline]
    pub fn is_done(&self) -> bool {
        self.done.load(Ordering::Acquire)
    }

    /// Wait for the completion for at most `timeout`.
    ///
    /// Returns `true` if the completion fired, `false` on timeout.
    pub fn wait_timeout(&self, clock: &dyn ClockSource, timeout: Duration) -> bool {
        if self.is_done() {
            return true;
        }

        let deadline = clock.monotonic() + timeout;
        loop {
            clock.relax();
            if self.is_done() {
                return true;
            }
            if clock.monotonic() >= deadline {
                return self.is_done();
            }
        }
    }
}
