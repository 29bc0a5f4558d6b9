//! # Helix Filesystem Sync
//!
//! Interruptible, coalescing `sync()` for Helix OS.
//!
//! ## Overview
//!
//! A full filesystem sync is expensive and globally serializing. Many
//! callers (suspend preparation, package managers, shutdown paths) may ask
//! for one at the same time, and the suspend path must not hold up a wake
//! event behind it. This crate provides:
//!
//! - [`intr_sync`](mod@intr_sync): the coalescing scheduler. Concurrent
//!   requests share at most two in-flight runs of the flush, and a wakeup
//!   event aborts the wait with [`SyncError::Busy`].
//! - [`vfs`]: the flush itself ([`VfsSync`]) over mounted filesystems and
//!   block devices, single-filesystem sync, emergency sync, and per-file
//!   `fsync` / `fdatasync` / `sync_file_range`.
//! - [`core`](mod@crate::core): errors, configuration, clocks and counters
//!   shared by both.
//!
//! ## Example
//!
//! ```ignore
//! use std::sync::Arc;
//! use helix_fs_sync::{Coalescer, VfsSync};
//!
//! let vfs = Arc::new(VfsSync::new());
//! let coalescer = helix_fs_sync::install(Coalescer::builder(vfs).build());
//!
//! match helix_fs_sync::intr_sync() {
//!     Ok(status) => log::info!("sync finished: {}", status),
//!     Err(err) => log::info!("sync aborted: {}", err),
//! }
//! ```
//!
//! ## Features
//!
//! - `std` (default): thread-backed work queue and `Instant` clock
//! - `interruptible` (default): route requests through the scheduler;
//!   without it, [`SyncConfig`] defaults to calling the flush directly

#![cfg_attr(not(feature = "std"), no_std)]
#![deny(unsafe_code)]
#![warn(missing_docs)]

extern crate alloc;

pub mod core;
pub mod intr_sync;
pub mod vfs;

pub use crate::core::config::{SyncConfig, DEFAULT_POLL_INTERVAL, DEFAULT_QUEUE_NAME};
pub use crate::core::error::{SyncError, SyncResult, SyncStatus};
pub use crate::core::time::{ClockSource, CounterClock, Timestamp};
#[cfg(feature = "std")]
pub use crate::core::time::StdClock;
pub use intr_sync::{
    Coalescer, CoalescerBuilder, GlobalSync, SlotId, SlotInfo, SlotState, SyncStatsSnapshot,
    WakeupCounter, WakeupSource,
};
pub use vfs::{FileTable, SyncFileRangeFlags, VfsSync};

/// Crate version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");

/// System-wide scheduler used by [`intr_sync()`]
static INTR_SYNC: spin::Once<Coalescer> = spin::Once::new();

/// Install the system-wide scheduler.
///
/// Only the first call installs; later calls return the scheduler that is
/// already in place and drop `coalescer`.
pub fn install(coalescer: Coalescer) -> &'static Coalescer {
    INTR_SYNC.call_once(move || {
        log::info!("intr_sync: installed ({:?})", coalescer.config());
        coalescer
    })
}

/// The system-wide scheduler, if installed
pub fn installed() -> Option<&'static Coalescer> {
    INTR_SYNC.get()
}

/// Interruptible global sync through the system-wide scheduler.
///
/// Returns the flush status, or [`SyncError::Busy`] when a wakeup event
/// aborted the request. Fails with [`SyncError::NotInitialized`] before
/// [`install`].
pub fn intr_sync() -> SyncResult<SyncStatus> {
    INTR_SYNC
        .get()
        .ok_or(SyncError::NotInitialized)?
        .request_sync()
}
