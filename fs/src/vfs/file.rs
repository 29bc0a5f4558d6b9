//! # Per-File Sync
//!
//! `fsync`, `fdatasync` and `sync_file_range` over an open [`File`], and
//! the descriptor-level entry points of [`FileTable`].
//!
//! Ranges are byte offsets, inclusive at both ends; [`LLONG_MAX`] as the
//! end means "to end of file".

use alloc::collections::BTreeMap;
use alloc::sync::Arc;
use core::fmt;

use bitflags::bitflags;
use spin::RwLock;

use super::global::sync_filesystem;
use super::{SuperBlock, LLONG_MAX, PAGE_SHIFT};
use crate::core::error::{SyncError, SyncResult};
use crate::sync_ensure;

// =============================================================================
// File Types
// =============================================================================

/// Type of the inode behind a file
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default)]
pub enum FileType {
    /// Regular file
    Regular,
    /// Directory
    Directory,
    /// Symbolic link
    Symlink,
    /// Character device
    CharDevice,
    /// Block device
    BlockDevice,
    /// Named pipe
    Fifo,
    /// Socket
    Socket,
    /// Unknown type
    #[default]
    Unknown,
}

impl FileType {
    /// Does the type have a page cache that `sync_file_range` can act on?
    pub const fn has_page_cache(self) -> bool {
        matches!(
            self,
            Self::Regular | Self::BlockDevice | Self::Directory | Self::Symlink
        )
    }
}

impl From<u32> for FileType {
    fn from(mode: u32) -> Self {
        match (mode >> 12) & 0xF {
            0x1 => Self::Fifo,
            0x2 => Self::CharDevice,
            0x4 => Self::Directory,
            0x6 => Self::BlockDevice,
            0x8 => Self::Regular,
            0xA => Self::Symlink,
            0xC => Self::Socket,
            _ => Self::Unknown,
        }
    }
}

/// Writeback mode of a range write
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum WritebackMode {
    /// Start writeout of pages not already under writeback
    None,
    /// Write every dirty page, waiting on pages already under writeback
    All,
}

// =============================================================================
// Files
// =============================================================================

/// Open file, as seen by the sync paths
pub trait File: Send + Sync {
    /// Type of the underlying inode
    fn file_type(&self) -> FileType;

    /// Does the filesystem implement `fsync` for this file?
    fn has_fsync(&self) -> bool {
        true
    }

    /// Does the inode carry timestamp-only dirtiness?
    fn is_dirty_time(&self) -> bool {
        false
    }

    /// Promote timestamp-only dirtiness to a real metadata update
    fn mark_inode_dirty_sync(&self) {}

    /// Filesystem `fsync` of the inclusive byte range `start..=end`
    fn fsync(&self, start: i64, end: i64, datasync: bool) -> SyncResult<()>;

    /// Start writeback of the dirty pages in `start..=end`
    fn fdatawrite_range(&self, start: i64, end: i64, mode: WritebackMode) -> SyncResult<()>;

    /// Wait for writeback of `start..=end`, reporting writeback errors
    fn fdatawait_range(&self, start: i64, end: i64) -> SyncResult<()>;

    /// Filesystem the file lives on
    fn superblock(&self) -> Arc<dyn SuperBlock>;
}

/// Sync data and metadata of `start..=end` of `file`.
///
/// With `datasync` only the metadata needed to read the data back is
/// written.
pub fn fsync_range(file: &dyn File, start: i64, end: i64, datasync: bool) -> SyncResult<()> {
    sync_ensure!(file.has_fsync(), SyncError::InvalidArgument);

    if !datasync && file.is_dirty_time() {
        file.mark_inode_dirty_sync();
    }
    file.fsync(start, end, datasync)
}

/// Sync the whole of `file`
pub fn fsync(file: &dyn File, datasync: bool) -> SyncResult<()> {
    fsync_range(file, 0, LLONG_MAX, datasync)
}

// =============================================================================
// sync_file_range
// =============================================================================

bitflags! {
    /// Steps of [`sync_file_range`]
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct SyncFileRangeFlags: u32 {
        /// Wait for writeout already in progress before writing
        const WAIT_BEFORE = 1 << 0;
        /// Start writeout of dirty pages not under writeback
        const WRITE = 1 << 1;
        /// Wait for writeout after writing
        const WAIT_AFTER = 1 << 2;
        /// All of the above: a write for data integrity
        const WRITE_AND_WAIT = Self::WAIT_BEFORE.bits()
            | Self::WRITE.bits()
            | Self::WAIT_AFTER.bits();
    }
}

/// First byte a 32-bit page cache cannot address
const PAGECACHE_LIMIT: Option<i64> = if usize::BITS == 32 {
    Some(1 << (32 + PAGE_SHIFT))
} else {
    None
};

/// Sync the range `offset..offset + nbytes` of `file`; `nbytes == 0`
/// means "to end of file".
///
/// Metadata is not written, and disk caches are not flushed.
pub fn sync_file_range(
    file: &dyn File,
    offset: i64,
    nbytes: i64,
    flags: SyncFileRangeFlags,
) -> SyncResult<()> {
    sync_ensure!(offset >= 0, SyncError::InvalidArgument);
    let endbyte = offset
        .checked_add(nbytes)
        .ok_or(SyncError::InvalidArgument)?;
    sync_ensure!(endbyte >= 0, SyncError::InvalidArgument);
    sync_ensure!(endbyte >= offset, SyncError::InvalidArgument);

    let mut nbytes = nbytes;
    if let Some(limit) = PAGECACHE_LIMIT {
        if offset >= limit {
            // Outside what the page cache can address: nothing to do
            return Ok(());
        }
        if endbyte >= limit {
            nbytes = 0;
        }
    }

    let endbyte = if nbytes == 0 { LLONG_MAX } else { endbyte - 1 };

    sync_ensure!(file.file_type().has_page_cache(), SyncError::IllegalSeek);

    if flags.contains(SyncFileRangeFlags::WAIT_BEFORE) {
        file.fdatawait_range(offset, endbyte)?;
    }

    if flags.contains(SyncFileRangeFlags::WRITE) {
        let mode = if flags.contains(SyncFileRangeFlags::WRITE_AND_WAIT) {
            WritebackMode::All
        } else {
            WritebackMode::None
        };
        file.fdatawrite_range(offset, endbyte, mode)?;
    }

    if flags.contains(SyncFileRangeFlags::WAIT_AFTER) {
        file.fdatawait_range(offset, endbyte)?;
    }

    Ok(())
}

// =============================================================================
// File Table
// =============================================================================

/// Descriptor table: maps file descriptors to open files
pub struct FileTable {
    files: RwLock<BTreeMap<u32, Arc<dyn File>>>,
}

impl FileTable {
    /// Empty table
    pub const fn new() -> Self {
        Self {
            files: RwLock::new(BTreeMap::new()),
        }
    }

    /// Install `file` at the lowest free descriptor
    pub fn install(&self, file: Arc<dyn File>) -> u32 {
        let mut files = self.files.write();
        let mut fd = 0;
        for &used in files.keys() {
            if used != fd {
                break;
            }
            fd += 1;
        }
        files.insert(fd, file);
        fd
    }

    /// Close a descriptor
    pub fn close(&self, fd: u32) -> SyncResult<Arc<dyn File>> {
        self.files
            .write()
            .remove(&fd)
            .ok_or(SyncError::BadFileDescriptor)
    }

    /// Resolve a descriptor
    pub fn get(&self, fd: u32) -> SyncResult<Arc<dyn File>> {
        self.files
            .read()
            .get(&fd)
            .cloned()
            .ok_or(SyncError::BadFileDescriptor)
    }

    /// Number of open descriptors
    pub fn len(&self) -> usize {
        self.files.read().len()
    }

    /// No open descriptors?
    pub fn is_empty(&self) -> bool {
        self.files.read().is_empty()
    }

    /// `fsync(2)`
    pub fn fsync(&self, fd: u32) -> SyncResult<()> {
        let file = self.get(fd)?;
        log::trace!("vfs: fsync fd {}", fd);
        fsync(&*file, false)
    }

    /// `fdatasync(2)`
    pub fn fdatasync(&self, fd: u32) -> SyncResult<()> {
        let file = self.get(fd)?;
        log::trace!("vfs: fdatasync fd {}", fd);
        fsync(&*file, true)
    }

    /// `sync_file_range(2)` with raw flag bits; unknown bits are rejected
    pub fn sync_file_range(&self, fd: u32, offset: i64, nbytes: i64, flags: u32) -> SyncResult<()> {
        let flags = SyncFileRangeFlags::from_bits(flags).ok_or(SyncError::InvalidArgument)?;
        let file = self.get(fd)?;
        sync_file_range(&*file, offset, nbytes, flags)
    }

    /// `syncfs(2)`: sync the filesystem `fd` lives on
    pub fn syncfs(&self, fd: u32) -> SyncResult<()> {
        let file = self.get(fd)?;
        let sb = file.superblock();
        log::trace!("vfs: syncfs fd {} on {}", fd, sb.name());
        sync_filesystem(&*sb)
    }
}

impl Default for FileTable {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for FileTable {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("FileTable")
            .field("open", &self.len())
            .finish()
    }
}
