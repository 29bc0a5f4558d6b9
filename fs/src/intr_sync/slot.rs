//! # Sync Slots
//!
//! A slot is one reusable execution context of the global sync. There are
//! exactly [`SLOT_COUNT`] of them for the lifetime of a scheduler.
//!
//! ```text
//!            attach (first waiter)          worker picks it up
//!   ┌──────┐ ───────────────────▶ ┌────────┐ ─────────────────▶ ┌─────────┐
//!   │ Idle │                      │ Queued │                    │ Running │
//!   └──────┘ ◀──────────────────────────────────────────────────└─────────┘
//!             version += 1, store status, complete_all
//! ```
//!
//! Every transition is a single critical section under the slot lock. The
//! completion signal is re-armed before the work is queued and fired after
//! the version is bumped, both under that lock, so a waiter never observes
//! the signal of a previous run.

use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::Mutex;

use super::completion::Completion;
use super::SyncWork;
use crate::core::error::SyncStatus;

/// Number of slots per scheduler
pub const SLOT_COUNT: usize = 2;

/// Identity of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[repr(transparent)]
pub struct SlotId(u8);

impl SlotId {
    /// Slot 0
    pub const FIRST: Self = Self(0);
    /// Slot 1
    pub const SECOND: Self = Self(1);

    /// All slots, in id order
    pub const ALL: [Self; SLOT_COUNT] = [Self::FIRST, Self::SECOND];

    /// Slot for an array index (wrapped into range)
    #[inline]
    pub const fn from_index(index: usize) -> Self {
        Self((index % SLOT_COUNT) as u8)
    }

    /// Array index of the slot
    #[inline]
    pub const fn index(self) -> usize {
        self.0 as usize
    }

    /// The other slot
    #[inline]
    pub const fn other(self) -> Self {
        Self::from_index(self.index() + 1)
    }
}

impl fmt::Display for SlotId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Slot state
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
#[repr(u32)]
pub enum SlotState {
    /// No work pending, no execution active
    Idle    = 0,
    /// Handed to the worker queue, not started yet
    Queued  = 1,
    /// Worker owns the slot until it records a result
    Running = 2,
}

/// Point-in-time view of a slot
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct SlotInfo {
    /// Slot identity
    pub id: SlotId,
    /// Current state
    pub state: SlotState,
    /// Callers relying on the current or next run
    pub waiters: u32,
    /// Completed executions so far
    pub version: u64,
    /// Status of the most recent execution
    pub last_status: SyncStatus,
}

/// Outcome of trying to attach to a slot
pub(crate) enum Attach {
    /// The slot is running; the caller must pick another one
    Running,
    /// The caller is now counted as a waiter
    Attached {
        /// Slot version at attach time
        version: u64,
        /// This caller moved the slot from Idle to Queued
        queued: bool,
        /// Work item the queue refused; the caller must run it
        rejected: Option<SyncWork>,
    },
}

struct SlotInner {
    state: SlotState,
    waiters: u32,
    version: u64,
    last_status: SyncStatus,
}

/// One of the scheduler's execution contexts
pub struct SyncSlot {
    id: SlotId,
    inner: Mutex<SlotInner>,
    done: Completion,
}

impl SyncSlot {
    /// Create an idle slot
    pub(crate) const fn new(id: SlotId) -> Self {
        Self {
            id,
            inner: Mutex::new(SlotInner {
                state: SlotState::Idle,
                waiters: 0,
                version: 0,
                last_status: SyncStatus::OK,
            }),
            done: Completion::new(),
        }
    }

    /// Slot identity
    #[inline]
    pub fn id(&self) -> SlotId {
        self.id
    }

    /// Snapshot of the slot fields, taken under the lock
    pub fn info(&self) -> SlotInfo {
        let inner = self.inner.lock();
        SlotInfo {
            id: self.id,
            state: inner.state,
            waiters: inner.waiters,
            version: inner.version,
            last_status: inner.last_status,
        }
    }

    /// Completed executions so far
    #[inline]
    pub fn version(&self) -> u64 {
        self.inner.lock().version
    }

    #[inline]
    pub(crate) fn completion(&self) -> &Completion {
        &self.done
    }

    /// Count the caller as a waiter, queueing the slot if it was idle.
    ///
    /// `enqueue` runs under the slot lock right after the completion is
    /// re-armed; it returns the work item back if the queue refused it.
    pub(crate) fn attach<F>(&self, enqueue: F) -> Attach
    where
        F: FnOnce() -> Option<SyncWork>,
    {
        let mut inner = self.inner.lock();
        if inner.state == SlotState::Running {
            return Attach::Running;
        }

        inner.waiters += 1;
        let queued = inner.state == SlotState::Idle;
        let mut rejected = None;
        if queued {
            inner.state = SlotState::Queued;
            self.done.reinit();
            rejected = enqueue();
        }

        Attach::Attached {
            version: inner.version,
            queued,
            rejected,
        }
    }

    /// Stop waiting on the slot and read the most recent status.
    ///
    /// Returns `None` if the caller was not counted as a waiter, which is an
    /// accounting bug; the count is left at zero in that case.
    pub(crate) fn detach(&self) -> Option<SyncStatus> {
        let mut inner = self.inner.lock();
        match inner.waiters.checked_sub(1) {
            Some(waiters) => {
                inner.waiters = waiters;
                Some(inner.last_status)
            },
            None => {
                log::error!("intr_sync: waiter underflow on work[{}]", self.id);
                None
            },
        }
    }

    /// Worker entry: Queued -> Running.
    ///
    /// Publishes the slot as the running one and returns the waiter count
    /// and version observed at that moment.
    pub(crate) fn start(&self, running: &AtomicUsize) -> (u32, u64) {
        let mut inner = self.inner.lock();
        running.store(self.id.index(), Ordering::Release);
        inner.state = SlotState::Running;
        (inner.waiters, inner.version)
    }

    /// Worker exit: Running -> Idle, releasing every waiter.
    pub(crate) fn finish(&self, status: SyncStatus) -> u64 {
        let mut inner = self.inner.lock();
        inner.version += 1;
        inner.last_status = status;
        inner.state = SlotState::Idle;
        self.done.complete_all();
        inner.version
    }
}

impl fmt::Debug for SyncSlot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let info = self.info();
        f.debug_struct("SyncSlot")
            .field("id", &info.id)
            .field("state", &info.state)
            .field("waiters", &info.waiters)
            .field("version", &info.version)
            .field("last_status", &info.last_status)
            .finish()
    }
}
