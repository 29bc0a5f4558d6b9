//! Recording filesystem doubles for the VFS unit tests.

use alloc::format;
use alloc::string::String;
use alloc::sync::Arc;
use alloc::vec::Vec;
use core::sync::atomic::{AtomicBool, Ordering};

use spin::Mutex;

use super::file::{File, FileType, WritebackMode};
use super::{BlockDevice, SuperBlock, Writeback};
use crate::core::error::{SyncError, SyncResult};

/// Shared, ordered log of calls
#[derive(Debug, Clone, Default)]
pub struct Journal(Arc<Mutex<Vec<String>>>);

impl Journal {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record(&self, call: String) {
        self.0.lock().push(call);
    }

    pub fn take(&self) -> Vec<String> {
        core::mem::take(&mut *self.0.lock())
    }
}

#[derive(Debug)]
pub struct MockBlockDevice {
    name: &'static str,
    journal: Journal,
    write_error: Option<SyncError>,
    wait_error: Option<SyncError>,
}

impl MockBlockDevice {
    pub fn new(name: &'static str, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name,
            journal: journal.clone(),
            write_error: None,
            wait_error: None,
        })
    }

    pub fn failing(name: &'static str, journal: &Journal, err: SyncError) -> Arc<Self> {
        Arc::new(Self {
            name,
            journal: journal.clone(),
            write_error: None,
            wait_error: Some(err),
        })
    }

    pub fn failing_write(name: &'static str, journal: &Journal, err: SyncError) -> Arc<Self> {
        Arc::new(Self {
            name,
            journal: journal.clone(),
            write_error: Some(err),
            wait_error: None,
        })
    }
}

impl BlockDevice for MockBlockDevice {
    fn name(&self) -> &str {
        self.name
    }

    fn fdatawrite(&self) -> SyncResult<()> {
        self.journal.record(format!("{}:fdatawrite", self.name));
        self.write_error.map_or(Ok(()), Err)
    }

    fn fdatawait(&self) -> SyncResult<()> {
        self.journal.record(format!("{}:fdatawait", self.name));
        self.wait_error.map_or(Ok(()), Err)
    }
}

pub struct MockSuperBlock {
    name: &'static str,
    read_only: bool,
    journal: Journal,
    bdev: Mutex<Option<Arc<dyn BlockDevice>>>,
}

impl MockSuperBlock {
    pub fn new(name: &'static str, read_only: bool, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            name,
            read_only,
            journal: journal.clone(),
            bdev: Mutex::new(None),
        })
    }

    pub fn with_bdev(self: Arc<Self>, bdev: Arc<dyn BlockDevice>) -> Arc<Self> {
        *self.bdev.lock() = Some(bdev);
        self
    }
}

impl SuperBlock for MockSuperBlock {
    fn name(&self) -> &str {
        self.name
    }

    fn is_read_only(&self) -> bool {
        self.read_only
    }

    fn sync_inodes(&self) {
        self.journal.record(format!("{}:sync_inodes", self.name));
    }

    fn writeback_inodes(&self) {
        self.journal.record(format!("{}:writeback_inodes", self.name));
    }

    fn sync_fs(&self, wait: bool) -> SyncResult<()> {
        self.journal.record(format!("{}:sync_fs({})", self.name, wait));
        Ok(())
    }

    fn block_device(&self) -> Option<Arc<dyn BlockDevice>> {
        self.bdev.lock().clone()
    }
}

#[derive(Debug)]
pub struct MockWriteback {
    journal: Journal,
    laptop_mode: bool,
}

impl MockWriteback {
    pub fn new(journal: &Journal, laptop_mode: bool) -> Arc<Self> {
        Arc::new(Self {
            journal: journal.clone(),
            laptop_mode,
        })
    }
}

impl Writeback for MockWriteback {
    fn wakeup_flushers(&self) {
        self.journal.record("wakeup_flushers".into());
    }

    fn laptop_mode(&self) -> bool {
        self.laptop_mode
    }

    fn laptop_sync_completion(&self) {
        self.journal.record("laptop_sync_completion".into());
    }
}

pub struct MockFile {
    file_type: FileType,
    sb: Arc<dyn SuperBlock>,
    journal: Journal,
    has_fsync: AtomicBool,
    dirty_time: AtomicBool,
    wait_error: Mutex<Option<SyncError>>,
}

impl MockFile {
    pub fn new(file_type: FileType, sb: Arc<dyn SuperBlock>, journal: &Journal) -> Arc<Self> {
        Arc::new(Self {
            file_type,
            sb,
            journal: journal.clone(),
            has_fsync: AtomicBool::new(true),
            dirty_time: AtomicBool::new(false),
            wait_error: Mutex::new(None),
        })
    }

    pub fn without_fsync(self: Arc<Self>) -> Arc<Self> {
        self.has_fsync.store(false, Ordering::SeqCst);
        self
    }

    pub fn with_dirty_time(self: Arc<Self>) -> Arc<Self> {
        self.dirty_time.store(true, Ordering::SeqCst);
        self
    }

    pub fn with_wait_error(self: Arc<Self>, err: SyncError) -> Arc<Self> {
        *self.wait_error.lock() = Some(err);
        self
    }
}

impl File for MockFile {
    fn file_type(&self) -> FileType {
        self.file_type
    }

    fn has_fsync(&self) -> bool {
        self.has_fsync.load(Ordering::SeqCst)
    }

    fn is_dirty_time(&self) -> bool {
        self.dirty_time.load(Ordering::SeqCst)
    }

    fn mark_inode_dirty_sync(&self) {
        self.journal.record("mark_inode_dirty_sync".into());
    }

    fn fsync(&self, start: i64, end: i64, datasync: bool) -> SyncResult<()> {
        self.journal
            .record(format!("fsync({},{},{})", start, end, datasync));
        Ok(())
    }

    fn fdatawrite_range(&self, start: i64, end: i64, mode: WritebackMode) -> SyncResult<()> {
        self.journal
            .record(format!("fdatawrite_range({},{},{:?})", start, end, mode));
        Ok(())
    }

    fn fdatawait_range(&self, start: i64, end: i64) -> SyncResult<()> {
        self.journal
            .record(format!("fdatawait_range({},{})", start, end));
        let wait_error = *self.wait_error.lock();
        wait_error.map_or(Ok(()), Err)
    }

    fn superblock(&self) -> Arc<dyn SuperBlock> {
        Arc::clone(&self.sb)
    }
}
