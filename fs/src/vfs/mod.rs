//! # VFS Sync
//!
//! The filesystem side of the sync layer: the interfaces a mounted
//! filesystem and a block device expose to the sync paths, the global
//! flush ([`VfsSync`]), single-superblock sync and the per-file
//! primitives in [`file`].
//!
//! Filesystems plug in through [`SuperBlock`]; block devices through
//! [`BlockDevice`]. Neither trait knows about the coalescing scheduler:
//! [`VfsSync`] is just one [`GlobalSync`](crate::intr_sync::GlobalSync)
//! implementation it can drive.

pub mod file;
pub mod global;

#[cfg(test)]
pub(crate) mod mock;

use alloc::sync::Arc;

pub use file::{
    fsync, fsync_range, sync_file_range, File, FileTable, FileType, SyncFileRangeFlags,
    WritebackMode,
};
pub use global::{emergency_sync, sync_filesystem, VfsSync};

use crate::core::error::SyncResult;

/// Byte offset at which an inclusive range runs to end of file
pub const LLONG_MAX: i64 = i64::MAX;

/// Page size shift of the page cache
pub const PAGE_SHIFT: u32 = 12;

// =============================================================================
// Block Devices
// =============================================================================

/// Page cache of a block device
pub trait BlockDevice: Send + Sync {
    /// Device name, for diagnostics
    fn name(&self) -> &str;

    /// Start writeback of every dirty page of the device
    fn fdatawrite(&self) -> SyncResult<()>;

    /// Wait for writeback of the device to finish.
    ///
    /// Reports a writeback error recorded since the last wait, leaving it
    /// recorded for `fsync` callers.
    fn fdatawait(&self) -> SyncResult<()>;
}

// =============================================================================
// Superblocks
// =============================================================================

/// Mounted filesystem instance
pub trait SuperBlock: Send + Sync {
    /// Filesystem name, for diagnostics
    fn name(&self) -> &str;

    /// Mounted read-only? Read-only filesystems are never synced.
    fn is_read_only(&self) -> bool;

    /// Write back every dirty inode and wait for it
    fn sync_inodes(&self);

    /// Start writeback of dirty inodes without waiting
    fn writeback_inodes(&self);

    /// Filesystem specific metadata sync. The default does nothing.
    fn sync_fs(&self, wait: bool) -> SyncResult<()> {
        let _ = wait;
        Ok(())
    }

    /// Block device backing the filesystem, if any
    fn block_device(&self) -> Option<Arc<dyn BlockDevice>> {
        None
    }
}

// =============================================================================
// Writeback Control
// =============================================================================

/// Background writeback facility
pub trait Writeback: Send + Sync {
    /// Kick the flusher threads of every device
    fn wakeup_flushers(&self);

    /// Is laptop mode enabled?
    fn laptop_mode(&self) -> bool {
        false
    }

    /// Tell laptop mode that a full sync just completed
    fn laptop_sync_completion(&self) {}
}
