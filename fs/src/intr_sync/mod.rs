//! # Interruptible Sync
//!
//! `intr_sync` behaves like a global `sync()` except that a wakeup event
//! makes it return `Busy` instead of holding up the wake path.
//!
//! ## Coalescing
//!
//! The flush runs on a work queue, in one of two [`SyncSlot`]s:
//!
//! ```text
//!   request ──▶ pick slot != running hint ──▶ Running? ──yes──▶ other slot
//!                                               │ no
//!                                               ▼
//!                 waiters += 1 ; Idle? ──yes──▶ Queued + re-arm + queue_work
//!                                               │
//!                                               ▼
//!        ┌────────────── wait loop (poll_interval) ───────────────┐
//!        │  wakeup count changed? ──▶ waiters -= 1, Busy          │
//!        │  completion fired or version moved? ──▶ leave loop     │
//!        └────────────────────────────────────────────────────────┘
//!                                               │
//!                                               ▼
//!                         waiters -= 1, read last status, Ok
//! ```
//!
//! A request attached to a Queued slot shares the run that another request
//! queued. A Running slot is never joined: its worker already decided
//! whether to flush, and a run that started before the request cannot
//! cover writes the caller made before asking.
//!
//! ## Cancellation
//!
//! Cancellation only drops the caller's waiter count. A worker that finds no
//! waiters when it starts skips the flush but still completes the
//! Queued -> Running -> Idle cycle.
//!
//! ## Degraded Mode
//!
//! If the work queue cannot be created, the request calls the flush
//! directly: no coalescing, no cancellation, always progress.

pub mod completion;
pub mod queue;
pub mod slot;
pub mod wakeup;

use alloc::boxed::Box;
use alloc::sync::Arc;
use core::fmt;
use core::sync::atomic::{AtomicUsize, Ordering};

use spin::{Mutex, Once};

pub use completion::Completion;
pub use queue::{DeferredQueue, WorkQueue, WorkQueueFactory};
#[cfg(feature = "std")]
pub use queue::{ThreadQueue, ThreadQueueFactory};
pub use slot::{SlotId, SlotInfo, SlotState, SyncSlot, SLOT_COUNT};
pub use wakeup::{StayAwake, WakeupCounter, WakeupSnapshot, WakeupSource};

use crate::core::atomic::{AtomicCounter, PeakGauge};
use crate::core::config::SyncConfig;
use crate::core::error::{SyncError, SyncResult, SyncStatus};
use crate::core::time::ClockSource;
use slot::Attach;

static_assertions::const_assert_eq!(SLOT_COUNT, 2);

// =============================================================================
// GLOBAL SYNC
// =============================================================================

/// The expensive "flush everything to stable storage" operation
pub trait GlobalSync: Send + Sync {
    /// Flush now, blocking until done
    fn sync_all(&self) -> SyncStatus;
}

impl<F> GlobalSync for F
where
    F: Fn() -> SyncStatus + Send + Sync,
{
    fn sync_all(&self) -> SyncStatus {
        self()
    }
}

// =============================================================================
// STATISTICS
// =============================================================================

/// Scheduler counters
#[derive(Debug, Default)]
pub struct SyncStats {
    requests: AtomicCounter,
    enqueued: AtomicCounter,
    coalesced: AtomicCounter,
    executed: AtomicCounter,
    skipped: AtomicCounter,
    busy_before: AtomicCounter,
    busy_waiting: AtomicCounter,
    degraded: AtomicCounter,
    direct: AtomicCounter,
    inline_runs: AtomicCounter,
    slot_retries: AtomicCounter,
    waiter_underflows: AtomicCounter,
    in_flight: PeakGauge,
}

/// Point-in-time copy of [`SyncStats`]
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SyncStatsSnapshot {
    /// Calls to `request_sync`
    pub requests: u64,
    /// Idle -> Queued transitions
    pub enqueued: u64,
    /// Requests that joined an already queued run
    pub coalesced: u64,
    /// Worker runs that called the flush
    pub executed: u64,
    /// Worker runs that found no waiters and skipped the flush
    pub skipped: u64,
    /// Requests rejected before attaching (event in progress)
    pub busy_before: u64,
    /// Requests aborted while waiting
    pub busy_waiting: u64,
    /// Requests served without a work queue
    pub degraded: u64,
    /// Requests served directly because coalescing is disabled
    pub direct: u64,
    /// Runs executed by a requester because the queue refused them
    pub inline_runs: u64,
    /// Attempts that found the candidate slot running
    pub slot_retries: u64,
    /// Detaches that found no waiter to remove
    pub waiter_underflows: u64,
    /// Highest number of concurrent flushes observed
    pub peak_concurrent_syncs: u64,
}

impl SyncStats {
    fn snapshot(&self) -> SyncStatsSnapshot {
        SyncStatsSnapshot {
            requests: self.requests.load(),
            enqueued: self.enqueued.load(),
            coalesced: self.coalesced.load(),
            executed: self.executed.load(),
            skipped: self.skipped.load(),
            busy_before: self.busy_before.load(),
            busy_waiting: self.busy_waiting.load(),
            degraded: self.degraded.load(),
            direct: self.direct.load(),
            inline_runs: self.inline_runs.load(),
            slot_retries: self.slot_retries.load(),
            waiter_underflows: self.waiter_underflows.load(),
            peak_concurrent_syncs: self.in_flight.peak(),
        }
    }
}

// =============================================================================
// SCHEDULER STATE
// =============================================================================

struct Inner {
    slots: [SyncSlot; SLOT_COUNT],
    /// Index of the slot that most recently started running
    running: AtomicUsize,
    queue: Once<Box<dyn WorkQueue>>,
    queue_lock: Mutex<()>,
    factory: Box<dyn WorkQueueFactory>,
    global: Arc<dyn GlobalSync>,
    wakeup: Arc<dyn WakeupSource>,
    clock: Arc<dyn ClockSource>,
    config: SyncConfig,
    stats: SyncStats,
}

impl Inner {
    fn slot(&self, id: SlotId) -> &SyncSlot {
        &self.slots[id.index()]
    }

    fn flush(&self) -> SyncStatus {
        self.stats.in_flight.enter();
        let status = self.global.sync_all();
        self.stats.in_flight.leave();
        status
    }

    /// Worker body of one slot run
    fn execute(&self, id: SlotId) {
        let slot = self.slot(id);
        let (waiters, version) = slot.start(&self.running);

        let status = if waiters > 0 {
            log::trace!("intr_sync: call sync on work[{}]-{}", id, version);
            self.stats.executed.increment();
            let status = self.flush();
            log::trace!("intr_sync: done sync on work[{}]-{}", id, version);
            status
        } else {
            log::trace!("intr_sync: cancel,no_wait on work[{}]-{}", id, version);
            self.stats.skipped.increment();
            SyncStatus::OK
        };

        slot.finish(status);
    }
}

/// One queued run of a slot
pub struct SyncWork {
    inner: Arc<Inner>,
    slot: SlotId,
}

impl SyncWork {
    fn new(inner: Arc<Inner>, slot: SlotId) -> Self {
        Self { inner, slot }
    }

    /// Slot this run belongs to
    #[inline]
    pub fn slot(&self) -> SlotId {
        self.slot
    }

    /// Execute the run on the current thread
    pub fn run(self) {
        self.inner.execute(self.slot);
    }
}

impl fmt::Debug for SyncWork {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SyncWork").field("slot", &self.slot).finish()
    }
}

// =============================================================================
// COALESCER
// =============================================================================

/// Request-coalescing, cancellable scheduler for the global sync
#[derive(Clone)]
pub struct Coalescer {
    inner: Arc<Inner>,
}

static_assertions::assert_impl_all!(Coalescer: Send, Sync, Clone);
static_assertions::assert_impl_all!(SyncWork: Send);

impl Coalescer {
    /// Start building a scheduler around a flush primitive
    pub fn builder(global: Arc<dyn GlobalSync>) -> CoalescerBuilder {
        CoalescerBuilder::new(global)
    }

    /// Request a global sync.
    ///
    /// Returns the status of a flush that started after the request
    /// attached, or `Busy` if a wakeup event was detected before or during
    /// the wait.
    pub fn request_sync(&self) -> SyncResult<SyncStatus> {
        let inner = &*self.inner;
        inner.stats.requests.increment();

        if !inner.config.interruptible {
            inner.stats.direct.increment();
            return Ok(inner.flush());
        }

        let Some(queue) = self.ensure_queue() else {
            log::warn!("intr_sync: allocation failed, just call sync()");
            inner.stats.degraded.increment();
            return Ok(inner.flush());
        };

        let (id, snapshot, version) = self.attach(queue)?;
        self.wait(id, snapshot, version)
    }

    /// Create the work queue if it does not exist yet
    fn ensure_queue(&self) -> Option<&dyn WorkQueue> {
        let inner = &*self.inner;
        if let Some(queue) = inner.queue.get() {
            return Some(&**queue);
        }

        let _guard = inner.queue_lock.lock();
        if inner.queue.get().is_none() {
            log::debug!("intr_sync: try to allocate {}", inner.config.queue_name);
            match inner.factory.create(&inner.config) {
                Ok(queue) => {
                    inner.queue.call_once(move || queue);
                },
                Err(err) => {
                    log::warn!(
                        "intr_sync: cannot create {}: {}",
                        inner.config.queue_name,
                        err
                    );
                    return None;
                },
            }
        }

        inner.queue.get().map(|queue| &**queue)
    }

    /// Pick a slot that is not running and count the caller as its waiter
    fn attach(&self, queue: &dyn WorkQueue) -> SyncResult<(SlotId, WakeupSnapshot, u64)> {
        let inner = &*self.inner;
        let mut candidate = self.running_hint().other();
        let mut running_seen = 0usize;

        loop {
            let snapshot = match WakeupSnapshot::prepare(&*inner.wakeup) {
                Ok(snapshot) => snapshot,
                Err(err) => {
                    log::trace!(
                        "intr_sync: detect wakeup event before waiting work[{}]",
                        candidate
                    );
                    inner.stats.busy_before.increment();
                    return Err(err);
                },
            };

            log::trace!("intr_sync: try to wait work[{}]", candidate);
            let slot = inner.slot(candidate);
            let attached = slot.attach(|| {
                log::trace!("intr_sync: enqueue work[{}]", candidate);
                let work = SyncWork::new(Arc::clone(&self.inner), candidate);
                queue.queue_work(work).err()
            });

            match attached {
                Attach::Running => {
                    log::trace!(
                        "intr_sync: work[{}] is already running, find idle work",
                        candidate
                    );
                    inner.stats.slot_retries.increment();
                    running_seen += 1;
                    if running_seen % SLOT_COUNT == 0 {
                        inner.clock.relax();
                    }
                    candidate = candidate.other();
                },
                Attach::Attached {
                    version,
                    queued,
                    rejected,
                } => {
                    if queued {
                        inner.stats.enqueued.increment();
                    } else {
                        inner.stats.coalesced.increment();
                    }
                    if let Some(work) = rejected {
                        log::warn!(
                            "intr_sync: {} refused work[{}], running it inline",
                            queue.name(),
                            candidate
                        );
                        inner.stats.inline_runs.increment();
                        work.run();
                    }
                    return Ok((candidate, snapshot, version));
                },
            }
        }
    }

    /// Wait for a run of `id` newer than `version`, or a wakeup event
    fn wait(&self, id: SlotId, snapshot: WakeupSnapshot, version: u64) -> SyncResult<SyncStatus> {
        let inner = &*self.inner;
        let slot = inner.slot(id);

        loop {
            if snapshot.changed(&*inner.wakeup) {
                self.detach(slot);
                inner.stats.busy_waiting.increment();
                log::trace!("intr_sync: detect wakeup event while waiting work[{}]", id);
                return Err(SyncError::Busy);
            }

            let completed = slot
                .completion()
                .wait_timeout(&*inner.clock, inner.config.poll_interval);
            if completed || slot.version() != version {
                break;
            }
        }

        let status = self.detach(slot);
        log::trace!("intr_sync: sync work[{}] is done with ret({})", id, status.code());
        Ok(status)
    }

    fn detach(&self, slot: &SyncSlot) -> SyncStatus {
        match slot.detach() {
            Some(status) => status,
            None => {
                self.inner.stats.waiter_underflows.increment();
                slot.info().last_status
            },
        }
    }

    /// Slot most recently started by a worker
    pub fn running_hint(&self) -> SlotId {
        SlotId::from_index(self.inner.running.load(Ordering::Acquire))
    }

    /// Snapshot of one slot
    pub fn slot_info(&self, id: SlotId) -> SlotInfo {
        self.inner.slot(id).info()
    }

    /// Has the work queue been created?
    pub fn has_queue(&self) -> bool {
        self.inner.queue.get().is_some()
    }

    /// Scheduler configuration
    pub fn config(&self) -> &SyncConfig {
        &self.inner.config
    }

    /// Counter snapshot
    pub fn stats(&self) -> SyncStatsSnapshot {
        self.inner.stats.snapshot()
    }
}

impl fmt::Debug for Coalescer {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Coalescer")
            .field("slots", &self.inner.slots)
            .field("running", &self.running_hint())
            .field("has_queue", &self.has_queue())
            .field("config", &self.inner.config)
            .finish()
    }
}

// =============================================================================
// BUILDER
// =============================================================================

/// Builder for [`Coalescer`]
pub struct CoalescerBuilder {
    global: Arc<dyn GlobalSync>,
    wakeup: Option<Arc<dyn WakeupSource>>,
    clock: Option<Arc<dyn ClockSource>>,
    factory: Option<Box<dyn WorkQueueFactory>>,
    config: SyncConfig,
}

impl CoalescerBuilder {
    fn new(global: Arc<dyn GlobalSync>) -> Self {
        Self {
            global,
            wakeup: None,
            clock: None,
            factory: None,
            config: SyncConfig::new(),
        }
    }

    /// Wakeup event source (default: a private counter nobody reports to)
    pub fn wakeup(mut self, wakeup: Arc<dyn WakeupSource>) -> Self {
        self.wakeup = Some(wakeup);
        self
    }

    /// Clock for bounded waits (default: `StdClock` with `std`, else a
    /// counter clock)
    pub fn clock(mut self, clock: Arc<dyn ClockSource>) -> Self {
        self.clock = Some(clock);
        self
    }

    /// Work queue factory (default: `ThreadQueueFactory` with `std`, else
    /// none, which keeps the scheduler in degraded mode)
    pub fn queue_factory<F>(mut self, factory: F) -> Self
    where
        F: WorkQueueFactory + 'static,
    {
        self.factory = Some(Box::new(factory));
        self
    }

    /// Scheduler configuration
    pub fn config(mut self, config: SyncConfig) -> Self {
        self.config = config;
        self
    }

    /// Build the scheduler. No queue is created until the first request.
    pub fn build(self) -> Coalescer {
        let wakeup = self
            .wakeup
            .unwrap_or_else(|| Arc::new(WakeupCounter::new()));
        let clock = self.clock.unwrap_or_else(default_clock);
        let factory = self.factory.unwrap_or_else(default_factory);

        Coalescer {
            inner: Arc::new(Inner {
                slots: [SyncSlot::new(SlotId::FIRST), SyncSlot::new(SlotId::SECOND)],
                running: AtomicUsize::new(SlotId::FIRST.index()),
                queue: Once::new(),
                queue_lock: Mutex::new(()),
                factory,
                global: self.global,
                wakeup,
                clock,
                config: self.config,
                stats: SyncStats::default(),
            }),
        }
    }
}

impl fmt::Debug for CoalescerBuilder {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("CoalescerBuilder")
            .field("config", &self.config)
            .finish_non_exhaustive()
    }
}

#[cfg(feature = "std")]
fn default_clock() -> Arc<dyn ClockSource> {
    Arc::new(crate::core::time::StdClock::new())
}

#[cfg(not(feature = "std"))]
fn default_clock() -> Arc<dyn ClockSource> {
    Arc::new(crate::core::time::CounterClock::default())
}

#[cfg(feature = "std")]
fn default_factory() -> Box<dyn WorkQueueFactory> {
    Box::new(ThreadQueueFactory)
}

#[cfg(not(feature = "std"))]
fn default_factory() -> Box<dyn WorkQueueFactory> {
    Box::new(|_: &SyncConfig| -> SyncResult<Box<dyn WorkQueue>> {
        Err(SyncError::NotSupported)
    })
}
