//! Error types and result handling for the sync layer.
//!
//! Two things cross the boundary of this crate: coordination errors
//! ([`SyncError`], of which only `Busy` is produced by the scheduler itself)
//! and the status of a completed global sync ([`SyncStatus`]), which is
//! carried verbatim from the flush primitive to every waiter it serviced.

use core::fmt;

/// Result type alias for sync layer operations.
pub type SyncResult<T> = Result<T, SyncError>;

/// Error type for sync layer operations.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Debug)]
#[repr(u32)]
pub enum SyncError {
    // ========================================================================
    // General Errors (0-99)
    // ========================================================================
    /// Generic I/O error
    Io                   = 1,

    /// Out of memory
    NoMemory             = 2,

    /// Invalid argument
    InvalidArgument      = 3,

    /// Operation not supported
    NotSupported         = 4,

    /// Operation interrupted
    Interrupted          = 6,

    /// Try again later
    Again                = 7,

    /// Operation timed out
    TimedOut             = 10,

    /// Resource busy (a wakeup event is in progress)
    Busy                 = 12,

    /// Not initialized
    NotInitialized       = 22,

    // ========================================================================
    // File Errors (100-199)
    // ========================================================================
    /// Bad file descriptor
    BadFileDescriptor    = 106,

    /// Illegal seek (file type has no page cache range)
    IllegalSeek          = 116,

    /// Read-only filesystem
    ReadOnly             = 202,

    // ========================================================================
    // Space/Resource Errors (300-399)
    // ========================================================================
    /// No space left on device
    NoSpace              = 300,

    /// Disk quota exceeded
    QuotaExceeded        = 301,

    /// Worker or queue resources exhausted
    ResourceExhausted    = 310,

    // ========================================================================
    // Device Errors (900-999)
    // ========================================================================
    /// Device removed
    DeviceRemoved        = 901,

    /// Device I/O error
    DeviceIoError        = 902,
}

impl SyncError {
    /// Convert error code to errno-compatible value
    pub const fn to_errno(self) -> i32 {
        match self {
            Self::Io | Self::DeviceIoError => 5, // EIO
            Self::BadFileDescriptor => 9,        // EBADF
            Self::Again => 11,                   // EAGAIN
            Self::NoMemory => 12,                // ENOMEM
            Self::Busy => 16,                    // EBUSY
            Self::DeviceRemoved => 19,           // ENODEV
            Self::InvalidArgument => 22,         // EINVAL
            Self::NoSpace => 28,                 // ENOSPC
            Self::IllegalSeek => 29,             // ESPIPE
            Self::ReadOnly => 30,                // EROFS
            Self::Interrupted => 4,              // EINTR
            Self::NotSupported => 95,            // EOPNOTSUPP
            Self::TimedOut => 110,               // ETIMEDOUT
            Self::QuotaExceeded => 122,          // EDQUOT
            Self::ResourceExhausted => 11,       // EAGAIN
            Self::NotInitialized => 6,           // ENXIO
        }
    }

    /// Map an errno value back to an error, if it names one we produce
    pub const fn from_errno(errno: i32) -> Option<Self> {
        let err = match errno {
            4 => Self::Interrupted,
            5 => Self::Io,
            6 => Self::NotInitialized,
            9 => Self::BadFileDescriptor,
            11 => Self::Again,
            12 => Self::NoMemory,
            16 => Self::Busy,
            19 => Self::DeviceRemoved,
            22 => Self::InvalidArgument,
            28 => Self::NoSpace,
            29 => Self::IllegalSeek,
            30 => Self::ReadOnly,
            95 => Self::NotSupported,
            110 => Self::TimedOut,
            122 => Self::QuotaExceeded,
            _ => return None,
        };
        Some(err)
    }

    /// Get human-readable error message
    pub const fn message(self) -> &'static str {
        match self {
            Self::Io => "I/O error",
            Self::NoMemory => "Out of memory",
            Self::InvalidArgument => "Invalid argument",
            Self::NotSupported => "Operation not supported",
            Self::Interrupted => "Operation interrupted",
            Self::Again => "Resource temporarily unavailable",
            Self::TimedOut => "Operation timed out",
            Self::Busy => "Wakeup event in progress",
            Self::NotInitialized => "Not initialized",
            Self::BadFileDescriptor => "Bad file descriptor",
            Self::IllegalSeek => "Illegal seek",
            Self::ReadOnly => "Read-only filesystem",
            Self::NoSpace => "No space left on device",
            Self::QuotaExceeded => "Disk quota exceeded",
            Self::ResourceExhausted => "Resources exhausted",
            Self::DeviceIoError => "Device I/O error",
            Self::DeviceRemoved => "Device removed",
        }
    }

    /// Check if retrying the same request is expected to succeed
    pub const fn is_recoverable(self) -> bool {
        matches!(
            self,
            Self::Busy | Self::Again | Self::Interrupted | Self::TimedOut
        )
    }

    /// Check if this error is reported by writeback
    pub const fn is_writeback_error(self) -> bool {
        matches!(
            self,
            Self::Io | Self::DeviceIoError | Self::NoSpace | Self::QuotaExceeded
        )
    }
}

impl fmt::Display for SyncError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.message())
    }
}

// ============================================================================
// Sync Status
// ============================================================================

/// Status code of a completed global sync.
///
/// `0` on success, otherwise a negative errno, the way the flush primitive
/// reports it. The scheduler never interprets it.
#[derive(Clone, Copy, PartialEq, Eq, Hash, Default)]
#[repr(transparent)]
pub struct SyncStatus(i32);

impl SyncStatus {
    /// Successful (or skipped) sync
    pub const OK: Self = Self(0);

    /// Build a status from a raw code
    #[inline]
    pub const fn from_raw(code: i32) -> Self {
        Self(code)
    }

    /// Build a failure status from an error
    #[inline]
    pub const fn from_error(err: SyncError) -> Self {
        Self(-err.to_errno())
    }

    /// Raw status code
    #[inline]
    pub const fn code(self) -> i32 {
        self.0
    }

    /// Whether the sync succeeded
    #[inline]
    pub const fn is_ok(self) -> bool {
        self.0 == 0
    }

    /// Convert into a `SyncResult`, mapping unknown codes to `Io`
    pub fn into_result(self) -> SyncResult<()> {
        if self.is_ok() {
            return Ok(());
        }
        Err(SyncError::from_errno(self.0.saturating_neg()).unwrap_or(SyncError::Io))
    }
}

impl From<SyncResult<()>> for SyncStatus {
    fn from(result: SyncResult<()>) -> Self {
        match result {
            Ok(()) => Self::OK,
            Err(err) => Self::from_error(err),
        }
    }
}

impl fmt::Debug for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "SyncStatus({})", self.0)
    }
}

impl fmt::Display for SyncStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self.into_result() {
            Ok(()) => write!(f, "ok"),
            Err(err) => write!(f, "{} ({})", err, self.0),
        }
    }
}

// ============================================================================
// Helper Macros
// ============================================================================

/// Ensure a condition is true, returning error if not.
#[macro_export]
macro_rules! sync_ensure {
    ($cond:expr, $err:expr) => {
        if !($cond) {
            return Err($err);
        }
    };
}
