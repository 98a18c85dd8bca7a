//! Generic trait for implementing filesystems.
//!
//! Note that this is a slightly cleaner interface than directly using fuser.
//! The whole point of this is to abstract away fuser-specific details.
use async_trait::async_trait;
use std::{
    ffi::{OsStr, OsString},
    time::SystemTime,
};

use bitflags::bitflags;
use bytes::Bytes;

/// Type representing an inode.
pub type Inode = u64;

/// Type representing a file handle.
pub type FileHandle = u64;

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct Permissions: u16 {
        // Other
        const OTHER_EXECUTE = 1 << 0;
        const OTHER_WRITE   = 1 << 1;
        const OTHER_READ    = 1 << 2;

        // Group
        const GROUP_EXECUTE = 1 << 3;
        const GROUP_WRITE   = 1 << 4;
        const GROUP_READ    = 1 << 5;

        // Owner
        const OWNER_EXECUTE = 1 << 6;
        const OWNER_WRITE   = 1 << 7;
        const OWNER_READ    = 1 << 8;

        // Special bits
        const STICKY        = 1 << 9;
        const SETGID        = 1 << 10;
        const SETUID        = 1 << 11;

        const OTHER_RWX = Self::OTHER_READ.bits()
            | Self::OTHER_WRITE.bits()
            | Self::OTHER_EXECUTE.bits();
        const GROUP_RWX = Self::GROUP_READ.bits()
            | Self::GROUP_WRITE.bits()
            | Self::GROUP_EXECUTE.bits();
        const OWNER_RWX = Self::OWNER_READ.bits()
            | Self::OWNER_WRITE.bits()
            | Self::OWNER_EXECUTE.bits();
    }
}

bitflags! {
    #[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
    pub struct OpenFlags: i32 {
        // Access modes (mutually exclusive)
        const RDONLY = libc::O_RDONLY;
        const WRONLY = libc::O_WRONLY;
        const RDWR = libc::O_RDWR;

        // Creation/status flags
        const APPEND = libc::O_APPEND;
        const TRUNC = libc::O_TRUNC;
        const CREAT = libc::O_CREAT;
        const EXCL = libc::O_EXCL;

        // Behavior flags
        const NONBLOCK = libc::O_NONBLOCK;
        const SYNC = libc::O_SYNC;
        const DSYNC = libc::O_DSYNC;
        const NOFOLLOW = libc::O_NOFOLLOW;
        const CLOEXEC = libc::O_CLOEXEC;
        const DIRECTORY = libc::O_DIRECTORY;

        #[cfg(target_os = "linux")]
        const NOATIME = libc::O_NOATIME;
    }
}

impl OpenFlags {
    /// Whether the access mode permits writing.
    #[must_use]
    pub fn is_writable(self) -> bool {
        self.bits() & libc::O_ACCMODE != libc::O_RDONLY
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct CommonFileAttr {
    pub ino: Inode,
    pub atime: SystemTime,
    pub mtime: SystemTime,
    pub ctime: SystemTime,
    pub crtime: SystemTime,
    pub perm: Permissions,
    pub nlink: u32,
    pub uid: u32,
    pub gid: u32,
    pub blksize: u32,
}

/// Attributes of the three node kinds the filesystem can surface.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum FileAttr {
    RegularFile {
        common: CommonFileAttr,
        size: u64,
        blocks: u64,
    },
    Directory {
        common: CommonFileAttr,
    },
    Symlink {
        common: CommonFileAttr,
        size: u64,
    },
}

impl FileAttr {
    #[must_use]
    pub fn common(&self) -> &CommonFileAttr {
        match self {
            Self::RegularFile { common, .. }
            | Self::Directory { common }
            | Self::Symlink { common, .. } => common,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct OpenFile {
    pub handle: FileHandle,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum DirEntryType {
    RegularFile,
    Directory,
    Symlink,
}

impl From<FileAttr> for DirEntryType {
    fn from(attr: FileAttr) -> Self {
        match attr {
            FileAttr::RegularFile { .. } => Self::RegularFile,
            FileAttr::Directory { .. } => Self::Directory,
            FileAttr::Symlink { .. } => Self::Symlink,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct DirEntry {
    pub ino: Inode,
    pub name: OsString,
    pub kind: DirEntryType,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct FilesystemStats {
    pub block_size: u32,
    pub total_blocks: u64,
    pub free_blocks: u64,
    pub available_blocks: u64,
    pub total_inodes: u64,
    pub free_inodes: u64,
    pub max_filename_length: u32,
}

#[async_trait]
pub trait Fs: Send + Sync {
    type LookupError: std::error::Error;
    type GetAttrError: std::error::Error;
    type ReadlinkError: std::error::Error;
    type ReaddirError: std::error::Error;
    type OpenError: std::error::Error;
    type CreateError: std::error::Error;
    type ReadError: std::error::Error;
    type WriteError: std::error::Error;
    type FlushError: std::error::Error;
    type ReleaseError: std::error::Error;

    /// Resolve `name` under the directory `parent`.
    async fn lookup(&self, parent: Inode, name: &OsStr) -> Result<FileAttr, Self::LookupError>;

    /// Can be called in two contexts -- the file is not open (in which case
    /// `fh` is `None`), or the file is open (in which case `fh` is `Some`).
    async fn getattr(
        &self,
        ino: Inode,
        fh: Option<FileHandle>,
    ) -> Result<FileAttr, Self::GetAttrError>;

    /// The target of a symlink.
    async fn readlink(&self, ino: Inode) -> Result<Bytes, Self::ReadlinkError>;

    /// Read the contents of a directory.
    async fn readdir(&self, ino: Inode) -> Result<Vec<DirEntry>, Self::ReaddirError>;

    /// Open a file.
    async fn open(&self, ino: Inode, flags: OpenFlags) -> Result<OpenFile, Self::OpenError>;

    /// Create a file under `parent` and open it for writing.
    async fn create(
        &self,
        parent: Inode,
        name: &OsStr,
        mode: u32,
        flags: OpenFlags,
    ) -> Result<(FileAttr, OpenFile), Self::CreateError>;

    /// Read data from an open file.
    async fn read(
        &self,
        ino: Inode,
        fh: FileHandle,
        offset: u64,
        size: u32,
    ) -> Result<Bytes, Self::ReadError>;

    /// Write data to an open file. Returns the number of bytes accepted.
    async fn write(
        &self,
        ino: Inode,
        fh: FileHandle,
        offset: u64,
        data: Bytes,
    ) -> Result<u32, Self::WriteError>;

    /// Push any buffered writes on `fh` out to the backing store.
    async fn flush(&self, ino: Inode, fh: FileHandle) -> Result<(), Self::FlushError>;

    /// Called when the kernel closes a file handle.
    async fn release(
        &self,
        ino: Inode,
        fh: FileHandle,
        flags: OpenFlags,
        flush: bool,
    ) -> Result<(), Self::ReleaseError>;

    /// Called when the kernel is done with an inode.
    async fn forget(&self, ino: Inode, nlookups: u64);

    /// Get filesystem statistics.
    async fn statfs(&self) -> Result<FilesystemStats, std::io::Error>;
}
