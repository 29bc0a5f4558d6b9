//! Global and per-superblock sync.

use alloc::sync::Arc;
use alloc::vec::Vec;
use core::fmt;

use spin::RwLock;

use super::{BlockDevice, SuperBlock, Writeback};
use crate::core::error::{SyncResult, SyncStatus};
use crate::intr_sync::GlobalSync;

/// Registry of mounted filesystems and block devices, and the full flush
/// over them.
pub struct VfsSync {
    supers: RwLock<Vec<Arc<dyn SuperBlock>>>,
    bdevs: RwLock<Vec<Arc<dyn BlockDevice>>>,
    writeback: Option<Arc<dyn Writeback>>,
}

impl VfsSync {
    /// Empty registry without a writeback facility
    pub const fn new() -> Self {
        Self {
            supers: RwLock::new(Vec::new()),
            bdevs: RwLock::new(Vec::new()),
            writeback: None,
        }
    }

    /// Attach the background writeback facility
    pub fn with_writeback(mut self, writeback: Arc<dyn Writeback>) -> Self {
        self.writeback = Some(writeback);
        self
    }

    /// Register a mounted filesystem
    pub fn mount(&self, sb: Arc<dyn SuperBlock>) {
        log::debug!("vfs: mount {}", sb.name());
        self.supers.write().push(sb);
    }

    /// Remove a filesystem by name
    pub fn unmount(&self, name: &str) -> Option<Arc<dyn SuperBlock>> {
        let mut supers = self.supers.write();
        let index = supers.iter().position(|sb| sb.name() == name)?;
        Some(supers.remove(index))
    }

    /// Register a block device
    pub fn add_block_device(&self, bdev: Arc<dyn BlockDevice>) {
        self.bdevs.write().push(bdev);
    }

    /// Remove a block device by name
    pub fn remove_block_device(&self, name: &str) -> Option<Arc<dyn BlockDevice>> {
        let mut bdevs = self.bdevs.write();
        let index = bdevs.iter().position(|bdev| bdev.name() == name)?;
        Some(bdevs.remove(index))
    }

    /// Mounted filesystems, in mount order
    pub fn superblocks(&self) -> Vec<Arc<dyn SuperBlock>> {
        self.supers.read().clone()
    }

    /// Registered block devices, in registration order
    pub fn block_devices(&self) -> Vec<Arc<dyn BlockDevice>> {
        self.bdevs.read().clone()
    }

    // Iterate over snapshots: a filesystem callback may mount or unmount.
    fn for_each_writable<F: FnMut(&dyn SuperBlock)>(&self, mut f: F) {
        for sb in self.superblocks() {
            if !sb.is_read_only() {
                f(&*sb);
            }
        }
    }

    fn sync_fs_all(&self, wait: bool) {
        self.for_each_writable(|sb| {
            if let Err(err) = sb.sync_fs(wait) {
                log::warn!("vfs: sync_fs({}) on {} failed: {}", wait, sb.name(), err);
            }
        });
    }

    fn fdatawrite_all(&self) {
        for bdev in self.block_devices() {
            if let Err(err) = bdev.fdatawrite() {
                log::warn!("vfs: writeback of {} failed to start: {}", bdev.name(), err);
            }
        }
    }

    /// Flush every writable filesystem and every block device.
    ///
    /// Flushers are woken first so writeback runs on all devices in
    /// parallel; inode sync then waits for them, after which metadata is
    /// stable and each filesystem syncs it. Block devices are written last
    /// for filesystems that leave metadata in the device page cache.
    ///
    /// Returns the first block device wait error.
    pub fn sync(&self) -> SyncResult<()> {
        if let Some(writeback) = &self.writeback {
            writeback.wakeup_flushers();
        }

        self.for_each_writable(|sb| sb.sync_inodes());
        self.sync_fs_all(false);
        self.sync_fs_all(true);
        self.fdatawrite_all();

        let mut result = Ok(());
        for bdev in self.block_devices() {
            if let Err(err) = bdev.fdatawait() {
                log::warn!("vfs: writeback error on {}: {}", bdev.name(), err);
                if result.is_ok() {
                    result = Err(err);
                }
            }
        }

        if let Some(writeback) = &self.writeback {
            if writeback.laptop_mode() {
                writeback.laptop_sync_completion();
            }
        }

        result
    }

    /// Best-effort flush for crash paths: two non-waiting passes, to
    /// catch inodes and pages that were locked during the first one.
    pub fn emergency_sync(&self) {
        for _ in 0..2 {
            self.for_each_writable(|sb| sb.sync_inodes());
            self.sync_fs_all(false);
            self.fdatawrite_all();
        }
        log::info!("Emergency Sync complete");
    }
}

impl Default for VfsSync {
    fn default() -> Self {
        Self::new()
    }
}

impl GlobalSync for VfsSync {
    fn sync_all(&self) -> SyncStatus {
        self.sync().into()
    }
}

impl fmt::Debug for VfsSync {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("VfsSync")
            .field("superblocks", &self.supers.read().len())
            .field("block_devices", &self.bdevs.read().len())
            .field("writeback", &self.writeback.is_some())
            .finish()
    }
}

/// See [`VfsSync::emergency_sync`]
pub fn emergency_sync(vfs: &VfsSync) {
    vfs.emergency_sync();
}

/// One pass over a single filesystem
fn sync_one(sb: &dyn SuperBlock, wait: bool) -> SyncResult<()> {
    if wait {
        sb.sync_inodes();
    } else {
        sb.writeback_inodes();
    }

    if let Err(err) = sb.sync_fs(wait) {
        log::warn!("vfs: sync_fs({}) on {} failed: {}", wait, sb.name(), err);
    }

    match sb.block_device() {
        Some(bdev) if wait => {
            bdev.fdatawrite()?;
            bdev.fdatawait()
        },
        Some(bdev) => bdev.fdatawrite(),
        None => Ok(()),
    }
}

/// Write out and wait upon all dirty data of one filesystem, including
/// its block device. Read-only filesystems succeed without doing anything.
pub fn sync_filesystem(sb: &dyn SuperBlock) -> SyncResult<()> {
    if sb.is_read_only() {
        return Ok(());
    }

    sync_one(sb, false)?;
    sync_one(sb, true)
}
