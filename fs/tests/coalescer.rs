//! Coalescer behaviour on real worker threads.

#![cfg(feature = "std")]

use std::sync::atomic::{AtomicBool, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread;
use std::time::{Duration, Instant};

use helix_fs_sync::{
    Coalescer, GlobalSync, SlotId, SlotState, StdClock, SyncConfig, SyncError, SyncStatus,
    WakeupCounter,
};
use proptest::prelude::*;

/// Flush that takes a while and tracks how many copies run at once
struct SlowSync {
    delay: Duration,
    calls: AtomicU64,
    current: AtomicUsize,
    peak: AtomicUsize,
    gate: AtomicBool,
}

impl SlowSync {
    fn new(delay: Duration) -> Arc<Self> {
        Arc::new(Self {
            delay,
            calls: AtomicU64::new(0),
            current: AtomicUsize::new(0),
            peak: AtomicUsize::new(0),
            gate: AtomicBool::new(true),
        })
    }

    /// Flush blocks until `open` is called
    fn gated() -> Arc<Self> {
        let sync = Self::new(Duration::from_millis(1));
        sync.gate.store(false, Ordering::SeqCst);
        sync
    }

    fn open(&self) {
        self.gate.store(true, Ordering::SeqCst);
    }

    fn calls(&self) -> u64 {
        self.calls.load(Ordering::SeqCst)
    }

    fn peak(&self) -> usize {
        self.peak.load(Ordering::SeqCst)
    }
}

impl GlobalSync for SlowSync {
    fn sync_all(&self) -> SyncStatus {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let now = self.current.fetch_add(1, Ordering::SeqCst) + 1;
        self.peak.fetch_max(now, Ordering::SeqCst);

        while !self.gate.load(Ordering::SeqCst) {
            thread::sleep(Duration::from_millis(1));
        }
        thread::sleep(self.delay);

        self.current.fetch_sub(1, Ordering::SeqCst);
        SyncStatus::OK
    }
}

fn build(global: Arc<SlowSync>, wakeup: Arc<WakeupCounter>, workers: usize) -> Coalescer {
    Coalescer::builder(global)
        .wakeup(wakeup)
        .clock(Arc::new(StdClock::new()))
        .config(
            SyncConfig::new()
                .with_interruptible(true)
                .with_poll_interval(Duration::from_millis(2))
                .with_workers(workers),
        )
        .build()
}

fn wait_until<F: Fn() -> bool>(what: &str, cond: F) {
    let start = Instant::now();
    while !cond() {
        assert!(start.elapsed() < Duration::from_secs(10), "timed out waiting for {}", what);
        thread::sleep(Duration::from_millis(1));
    }
}

fn quiesce(coalescer: &Coalescer) {
    wait_until("slots to go idle", || {
        let stats = coalescer.stats();
        stats.executed + stats.skipped == stats.enqueued
            && SlotId::ALL
                .iter()
                .all(|&id| coalescer.slot_info(id).state == SlotState::Idle)
    });
}

fn concurrent_requests(coalescer: &Coalescer, count: usize) -> Vec<Result<SyncStatus, SyncError>> {
    let handles: Vec<_> = (0..count)
        .map(|_| {
            let c = coalescer.clone();
            thread::spawn(move || c.request_sync())
        })
        .collect();
    handles.into_iter().map(|h| h.join().unwrap()).collect()
}

#[test]
fn test_concurrent_requests_coalesce() {
    let global = SlowSync::new(Duration::from_millis(20));
    let coalescer = build(global.clone(), Arc::new(WakeupCounter::new()), 1);

    let results = concurrent_requests(&coalescer, 16);
    assert!(results.iter().all(|r| *r == Ok(SyncStatus::OK)));

    quiesce(&coalescer);
    let stats = coalescer.stats();
    assert_eq!(stats.requests, 16);
    assert!(global.calls() >= 1);
    assert!(global.calls() <= 16);
    // One ordered worker: flushes never overlap
    assert_eq!(global.peak(), 1);
    assert!(stats.peak_concurrent_syncs <= 2);
    assert_eq!(stats.waiter_underflows, 0);
    assert!(coalescer.has_queue());
}

#[test]
fn test_two_workers_bound_concurrency() {
    let global = SlowSync::new(Duration::from_millis(10));
    let coalescer = build(global.clone(), Arc::new(WakeupCounter::new()), 2);

    for _ in 0..3 {
        let results = concurrent_requests(&coalescer, 8);
        assert!(results.iter().all(|r| *r == Ok(SyncStatus::OK)));
    }

    quiesce(&coalescer);
    assert!(global.peak() <= 2);
    assert!(coalescer.stats().peak_concurrent_syncs <= 2);
}

#[test]
fn test_request_during_run_gets_fresh_run() {
    let global = SlowSync::gated();
    let coalescer = build(global.clone(), Arc::new(WakeupCounter::new()), 1);

    let first = {
        let c = coalescer.clone();
        thread::spawn(move || c.request_sync())
    };
    wait_until("first flush to start", || global.calls() == 1);
    assert_eq!(coalescer.running_hint(), SlotId::SECOND);
    assert_eq!(coalescer.slot_info(SlotId::SECOND).state, SlotState::Running);

    // The running slot is never joined; the other one is queued instead
    let second = {
        let c = coalescer.clone();
        thread::spawn(move || c.request_sync())
    };
    wait_until("second request to queue", || {
        coalescer.slot_info(SlotId::FIRST).state == SlotState::Queued
    });

    global.open();
    assert_eq!(first.join().unwrap(), Ok(SyncStatus::OK));
    assert_eq!(second.join().unwrap(), Ok(SyncStatus::OK));

    quiesce(&coalescer);
    assert_eq!(global.calls(), 2);
    assert_eq!(coalescer.slot_info(SlotId::FIRST).version, 1);
    assert_eq!(coalescer.slot_info(SlotId::SECOND).version, 1);
}

#[test]
fn test_wakeup_during_long_sync() {
    let global = SlowSync::gated();
    let wakeup = Arc::new(WakeupCounter::new());
    let coalescer = build(global.clone(), wakeup.clone(), 1);

    let caller = {
        let c = coalescer.clone();
        thread::spawn(move || c.request_sync())
    };
    wait_until("flush to start", || global.calls() == 1);

    wakeup.report_event();
    assert_eq!(caller.join().unwrap(), Err(SyncError::Busy));
    assert_eq!(coalescer.slot_info(SlotId::SECOND).waiters, 0);
    assert_eq!(coalescer.slot_info(SlotId::SECOND).state, SlotState::Running);

    global.open();
    quiesce(&coalescer);
    let info = coalescer.slot_info(SlotId::SECOND);
    assert_eq!(info.state, SlotState::Idle);
    assert_eq!(info.version, 1);
    assert_eq!(coalescer.stats().busy_waiting, 1);
}

proptest! {
    #![proptest_config(ProptestConfig::with_cases(12))]

    #[test]
    fn random_schedules_keep_waiter_accounting(
        requests in 1_usize..8,
        wake_delays in proptest::collection::vec(0_u64..6, 0..3),
        workers in 1_usize..3,
    ) {
        let global = SlowSync::new(Duration::from_millis(2));
        let wakeup = Arc::new(WakeupCounter::new());
        let coalescer = build(global.clone(), wakeup.clone(), workers);

        let waker = {
            let wakeup = wakeup.clone();
            thread::spawn(move || {
                for delay in wake_delays {
                    thread::sleep(Duration::from_millis(delay));
                    wakeup.report_event();
                }
            })
        };
        let results = concurrent_requests(&coalescer, requests);
        waker.join().unwrap();

        for result in &results {
            prop_assert!(*result == Ok(SyncStatus::OK) || *result == Err(SyncError::Busy));
        }

        quiesce(&coalescer);
        let stats = coalescer.stats();
        prop_assert_eq!(stats.requests, requests as u64);
        prop_assert_eq!(stats.waiter_underflows, 0);
        prop_assert!(global.peak() <= 2);

        let mut versions = 0;
        for id in SlotId::ALL {
            let info = coalescer.slot_info(id);
            prop_assert_eq!(info.waiters, 0);
            prop_assert_eq!(info.state, SlotState::Idle);
            versions += info.version;
        }
        prop_assert_eq!(versions, stats.enqueued);
        prop_assert_eq!(stats.executed, global.calls());
    }
}
