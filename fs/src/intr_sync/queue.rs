//! # Work Queues
//!
//! The scheduler hands slot runs to a [`WorkQueue`] and never runs the
//! flush on a requesting thread (except when the queue refuses work). The
//! queue is created lazily through a [`WorkQueueFactory`] on the first
//! request; a factory failure puts the scheduler in degraded mode for that
//! request and the next request tries again.
//!
//! Two queues are provided:
//!
//! - [`DeferredQueue`]: holds work items until the host drains it from its
//!   own worker context. Usable without `std`.
//! - [`ThreadQueue`] (`std`): dedicated worker threads. With one worker the
//!   queue is ordered, so at most one run executes at a time.

use alloc::boxed::Box;
use alloc::collections::VecDeque;
use alloc::sync::Arc;

use spin::Mutex;

use super::SyncWork;
use crate::core::config::SyncConfig;
use crate::core::error::SyncResult;

/// Executes slot runs asynchronously
pub trait WorkQueue: Send + Sync {
    /// Queue name, for diagnostics
    fn name(&self) -> &str;

    /// Queue a slot run.
    ///
    /// Called with the slot lock held, so it must not block on the flush.
    /// Returns the work item back if it could not be queued.
    fn queue_work(&self, work: SyncWork) -> Result<(), SyncWork>;
}

impl<Q: WorkQueue + ?Sized> WorkQueue for Arc<Q> {
    fn name(&self) -> &str {
        (**self).name()
    }

    fn queue_work(&self, work: SyncWork) -> Result<(), SyncWork> {
        (**self).queue_work(work)
    }
}

/// Builds the work queue on first use
pub trait WorkQueueFactory: Send + Sync {
    /// Create the queue described by `config`
    fn create(&self, config: &SyncConfig) -> SyncResult<Box<dyn WorkQueue>>;
}

impl<F> WorkQueueFactory for F
where
    F: Fn(&SyncConfig) -> SyncResult<Box<dyn WorkQueue>> + Send + Sync,
{
    fn create(&self, config: &SyncConfig) -> SyncResult<Box<dyn WorkQueue>> {
        self(config)
    }
}

// =============================================================================
// Deferred Queue
// =============================================================================

/// Queue drained explicitly by a host worker
#[derive(Debug)]
pub struct DeferredQueue {
    name: &'static str,
    pending: Mutex<VecDeque<SyncWork>>,
}

impl DeferredQueue {
    /// Create an empty queue
    pub fn new(name: &'static str) -> Arc<Self> {
        Arc::new(Self {
            name,
            pending: Mutex::new(VecDeque::new()),
        })
    }

    /// Factory handing out this queue
    pub fn factory(self: &Arc<Self>) -> impl WorkQueueFactory {
        let queue = Arc::clone(self);
        move |_: &SyncConfig| -> SyncResult<Box<dyn WorkQueue>> {
            Ok(Box::new(Arc::clone(&queue)))
        }
    }

    /// Number of queued runs
    pub fn pending(&self) -> usize {
        self.pending.lock().len()
    }

    /// Run the oldest queued run, if any
    pub fn run_next(&self) -> bool {
        // Pop first: the run takes the slot lock and may block on the flush
        let next = self.pending.lock().pop_front();
        match next {
            Some(work) => {
                work.run();
                true
            },
            None => false,
        }
    }

    /// Run queued runs until the queue is empty, returning how many ran
    pub fn run_pending(&self) -> usize {
        let mut ran = 0;
        while self.run_next() {
            ran += 1;
        }
        ran
    }
}

impl WorkQueue for DeferredQueue {
    fn name(&self) -> &str {
        self.name
    }

    fn queue_work(&self, work: SyncWork) -> Result<(), SyncWork> {
        self.pending.lock().push_back(work);
        Ok(())
    }
}

// =============================================================================
// Thread Queue
// =============================================================================

#[cfg(feature = "std")]
pub use self::thread::{ThreadQueue, ThreadQueueFactory};

#[cfg(feature = "std")]
mod thread {
    use std::sync::mpsc::{self, Sender};

    use super::{WorkQueue, WorkQueueFactory};
    use crate::core::config::SyncConfig;
    use crate::core::error::{SyncError, SyncResult};
    use crate::intr_sync::SyncWork;

    /// Work queue backed by dedicated worker threads.
    ///
    /// Runs of the same slot always go to the same worker, so they execute
    /// in queue order. Workers exit once the queue is dropped.
    #[derive(Debug)]
    pub struct ThreadQueue {
        name: &'static str,
        workers: Vec<Sender<SyncWork>>,
    }

    impl ThreadQueue {
        /// Spawn `workers` worker threads (at least one)
        pub fn spawn(name: &'static str, workers: usize) -> SyncResult<Self> {
            let count = workers.max(1);
            let mut senders = Vec::with_capacity(count);

            for index in 0..count {
                let (tx, rx) = mpsc::channel::<SyncWork>();
                std::thread::Builder::new()
                    .name(format!("{}/{}", name, index))
                    .spawn(move || {
                        for work in rx {
                            work.run();
                        }
                    })
                    .map_err(|err| {
                        log::warn!("intr_sync: cannot spawn {} worker {}: {}", name, index, err);
                        SyncError::ResourceExhausted
                    })?;
                senders.push(tx);
            }

            log::debug!("intr_sync: created {} with {} worker(s)", name, count);
            Ok(Self {
                name,
                workers: senders,
            })
        }

        /// Number of worker threads
        pub fn workers(&self) -> usize {
            self.workers.len()
        }
    }

    impl WorkQueue for ThreadQueue {
        fn name(&self) -> &str {
            self.name
        }

        fn queue_work(&self, work: SyncWork) -> Result<(), SyncWork> {
            let worker = work.slot().index() % self.workers.len();
            self.workers[worker].send(work).map_err(|err| err.0)
        }
    }

    /// Factory spawning a [`ThreadQueue`] from the scheduler configuration
    #[derive(Debug, Clone, Copy, Default)]
    pub struct ThreadQueueFactory;

    impl WorkQueueFactory for ThreadQueueFactory {
        fn create(&self, config: &SyncConfig) -> SyncResult<Box<dyn WorkQueue>> {
            let queue = ThreadQueue::spawn(config.queue_name, config.workers)?;
            Ok(Box::new(queue))
        }
    }
}
