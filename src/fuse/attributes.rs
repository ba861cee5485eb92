//! Translation from cached items to the stat-like structures the kernel
//! shim hands back to userspace.

use crate::cache::Item;
use crate::remote::models::DriveQuota;

/// Synthetic block size reported to userspace (the default ext4 block size).
pub const BLOCK_SIZE: u64 = 4096;

/// The server does not reliably expose file counts for personal accounts,
/// so inode totals are synthesized.
const SYNTHETIC_FILE_COUNT: u64 = 100_000;

/// Maximum filename length OneDrive accepts.
const NAME_LENGTH: u32 = 260;

/// A UNIX stat for a single item.
#[derive(Debug, Clone, Copy)]
pub struct FileAttributes {
    pub size: u64,
    pub nlink: u32,
    pub mode: u32,
    pub atime: i64,
    pub mtime: i64,
    pub ctime: i64,
    pub uid: u32,
    pub gid: u32,
}

impl FileAttributes {
    pub fn from_item(item: &Item) -> Self {
        Self {
            size: item.display_size(),
            nlink: item.nlink(),
            mode: item.mode,
            atime: item.mtime,
            mtime: item.mtime,
            ctime: item.mtime,
            uid: unsafe { libc::getuid() },
            gid: unsafe { libc::getgid() },
        }
    }
}

/// One directory listing entry.
#[derive(Debug, Clone)]
pub struct DirEntry {
    pub name: String,
    pub mode: u32,
}

/// Filesystem-wide statistics derived from the drive quota.
#[derive(Debug, Clone, Copy)]
pub struct StatFs {
    pub block_size: u32,
    pub blocks: u64,
    pub blocks_free: u64,
    pub blocks_available: u64,
    pub files: u64,
    pub files_free: u64,
    pub name_length: u32,
}

impl StatFs {
    pub fn from_quota(quota: &DriveQuota) -> Self {
        Self {
            block_size: BLOCK_SIZE as u32,
            blocks: quota.total / BLOCK_SIZE,
            blocks_free: quota.remaining / BLOCK_SIZE,
            blocks_available: quota.remaining / BLOCK_SIZE,
            files: SYNTHETIC_FILE_COUNT,
            files_free: SYNTHETIC_FILE_COUNT.saturating_sub(quota.file_count),
            name_length: NAME_LENGTH,
        }
    }
}
