//! The container-backed filesystem.
//!
//! Directory listings come from the mount-time snapshot combined with the
//! change list; attributes and file contents are served live through the
//! container-control API; writes are buffered per handle and wrapped into a
//! single-entry tar archive on flush.

use std::collections::HashMap;
use std::ffi::OsStr;
use std::sync::Arc;
use std::sync::atomic::{AtomicU64, Ordering};
use std::time::{Duration, SystemTime};

use async_trait::async_trait;
use bytes::Bytes;
use futures::TryStreamExt as _;
use thiserror::Error;
use tokio::sync::{Mutex, RwLock};
use tracing::{instrument, trace};

use docker_api::error::ApiError;
use docker_api::http_client::ByteStream;
use docker_api::models::{ChangeKind, FileMode, PathStat};

use crate::api::ContainerApi;
use crate::archive;
use crate::changes::ChangesCache;
use crate::fs::r#trait::{
    CommonFileAttr, DirEntry, DirEntryType, FileAttr, FileHandle, FilesystemStats, Fs, Inode,
    OpenFile, OpenFlags, Permissions,
};
use crate::inodes::{InodeTable, ROOT_INO};
use crate::path;
use crate::snapshot::{Snapshot, SnapshotChild};

/// The runtime reports sizes as signed; clamp anything nonsensical to zero.
fn stat_size(stat: &PathStat) -> u64 {
    u64::try_from(stat.size).unwrap_or(0)
}

fn api_errno(e: &ApiError) -> i32 {
    match e {
        ApiError::NotFound => libc::ENOENT,
        ApiError::Canceled => libc::EINTR,
        ApiError::Protocol(_) | ApiError::Transport(_) => libc::EIO,
    }
}

#[derive(Debug, Error)]
pub enum LookupError {
    #[error("inode not found")]
    InodeNotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("file does not exist")]
    FileDoesNotExist,

    #[error("container api error: {0}")]
    Api(ApiError),
}

impl From<ApiError> for LookupError {
    fn from(e: ApiError) -> Self {
        match e {
            ApiError::NotFound => Self::FileDoesNotExist,
            other => Self::Api(other),
        }
    }
}

impl From<LookupError> for i32 {
    fn from(e: LookupError) -> Self {
        match e {
            LookupError::InodeNotFound | LookupError::FileDoesNotExist => libc::ENOENT,
            LookupError::NotADirectory => libc::ENOTDIR,
            LookupError::Api(api) => api_errno(&api),
        }
    }
}

#[derive(Debug, Error)]
pub enum GetAttrError {
    #[error("inode not found")]
    InodeNotFound,

    #[error("file does not exist")]
    FileDoesNotExist,

    #[error("container api error: {0}")]
    Api(ApiError),
}

impl From<GetAttrError> for i32 {
    fn from(e: GetAttrError) -> Self {
        match e {
            GetAttrError::InodeNotFound | GetAttrError::FileDoesNotExist => libc::ENOENT,
            GetAttrError::Api(api) => api_errno(&api),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadlinkError {
    #[error("inode not found")]
    InodeNotFound,

    #[error("inode is not a symlink")]
    NotASymlink,
}

impl From<ReadlinkError> for i32 {
    fn from(e: ReadlinkError) -> Self {
        match e {
            ReadlinkError::InodeNotFound => libc::ENOENT,
            ReadlinkError::NotASymlink => libc::EINVAL,
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadDirError {
    #[error("inode not found")]
    InodeNotFound,

    #[error("inode is not a directory")]
    NotADirectory,

    #[error("container api error: {0}")]
    Api(ApiError),
}

impl From<ReadDirError> for i32 {
    fn from(e: ReadDirError) -> Self {
        match e {
            ReadDirError::InodeNotFound => libc::ENOENT,
            ReadDirError::NotADirectory => libc::ENOTDIR,
            ReadDirError::Api(api) => api_errno(&api),
        }
    }
}

#[derive(Debug, Error)]
pub enum OpenError {
    #[error("inode not found")]
    InodeNotFound,

    #[error("inode is a directory")]
    IsADirectory,

    #[error("inode is not an openable file")]
    NotAFile,

    #[error("container api error: {0}")]
    Api(ApiError),
}

impl From<OpenError> for i32 {
    fn from(e: OpenError) -> Self {
        match e {
            OpenError::InodeNotFound => libc::ENOENT,
            OpenError::IsADirectory => libc::EISDIR,
            OpenError::NotAFile => libc::EINVAL,
            OpenError::Api(api) => api_errno(&api),
        }
    }
}

#[derive(Debug, Error)]
pub enum CreateError {
    #[error("inode not found")]
    InodeNotFound,

    #[error("not a directory")]
    NotADirectory,

    #[error("file already exists")]
    AlreadyExists,

    #[error("container api error: {0}")]
    Api(ApiError),
}

impl From<CreateError> for i32 {
    fn from(e: CreateError) -> Self {
        match e {
            CreateError::InodeNotFound => libc::ENOENT,
            CreateError::NotADirectory => libc::ENOTDIR,
            CreateError::AlreadyExists => libc::EEXIST,
            CreateError::Api(api) => api_errno(&api),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReadError {
    #[error("file not open")]
    FileNotOpen,

    #[error("container api error: {0}")]
    Api(ApiError),
}

impl From<ReadError> for i32 {
    fn from(e: ReadError) -> Self {
        match e {
            ReadError::FileNotOpen => libc::EBADF,
            ReadError::Api(api) => api_errno(&api),
        }
    }
}

#[derive(Debug, Error)]
pub enum WriteError {
    #[error("file not open")]
    FileNotOpen,

    #[error("file handle is read-only")]
    ReadOnlyHandle,

    #[error("container api error: {0}")]
    Api(ApiError),
}

impl From<WriteError> for i32 {
    fn from(e: WriteError) -> Self {
        match e {
            WriteError::FileNotOpen => libc::EBADF,
            WriteError::ReadOnlyHandle => libc::EBADF,
            WriteError::Api(api) => api_errno(&api),
        }
    }
}

#[derive(Debug, Error)]
pub enum FlushError {
    #[error("file not open")]
    FileNotOpen,

    #[error("building upload archive failed: {0}")]
    Archive(std::io::Error),

    #[error("container api error: {0}")]
    Api(ApiError),
}

impl From<FlushError> for i32 {
    fn from(e: FlushError) -> Self {
        match e {
            FlushError::FileNotOpen => libc::EBADF,
            FlushError::Archive(_) => libc::EIO,
            FlushError::Api(api) => api_errno(&api),
        }
    }
}

#[derive(Debug, Error)]
pub enum ReleaseError {
    #[error("file not open")]
    FileNotOpen,

    #[error(transparent)]
    Flush(#[from] FlushError),
}

impl From<ReleaseError> for i32 {
    fn from(e: ReleaseError) -> Self {
        match e {
            ReleaseError::FileNotOpen => libc::EBADF,
            ReleaseError::Flush(flush) => flush.into(),
        }
    }
}

/// A node surfaced to the kernel. Nodes are registered on lookup and create
/// and retained for the lifetime of the mount so inode numbers stay stable.
#[derive(Debug, Clone)]
enum Node {
    Dir {
        fullpath: String,
    },
    File {
        fullpath: String,
        /// Mode handed to `create` for a file that has not been uploaded
        /// yet. Cleared by the first successful flush.
        pending_mode: Option<FileMode>,
    },
    Symlink {
        fullpath: String,
        target: String,
        mode: FileMode,
    },
}

/// Per-handle state. The buffer belongs exclusively to its handle; writes
/// never touch the container until a flush.
struct Handle {
    fullpath: String,
    mode: FileMode,
    writable: bool,
    data: Option<Vec<u8>>,
    dirty: bool,
}

/// Filesystem over one container, combining the static snapshot, the change
/// list, and the live archive endpoints.
pub struct ContainerFs<A: ContainerApi> {
    api: Arc<A>,
    snapshot: Snapshot,
    changes: ChangesCache<A>,
    inodes: InodeTable,
    nodes: RwLock<HashMap<Inode, Node>>,
    handles: Mutex<HashMap<FileHandle, Handle>>,
    next_fh: AtomicU64,
    fs_owner: (u32, u32),
}

impl<A: ContainerApi> ContainerFs<A> {
    const BLOCK_SIZE: u32 = 4096;

    /// Build the filesystem over `api` with a parsed export snapshot.
    ///
    /// `fs_owner` is the uid/gid every node is reported as owned by;
    /// `refresh_interval` bounds the staleness of directory listings.
    pub fn new(
        api: Arc<A>,
        snapshot: Snapshot,
        fs_owner: (u32, u32),
        refresh_interval: Duration,
    ) -> Self {
        let mut nodes = HashMap::new();
        nodes.insert(
            ROOT_INO,
            Node::Dir {
                fullpath: String::from("/"),
            },
        );
        Self {
            changes: ChangesCache::with_interval(Arc::clone(&api), refresh_interval),
            api,
            snapshot,
            inodes: InodeTable::new(),
            nodes: RwLock::new(nodes),
            handles: Mutex::new(HashMap::new()),
            next_fh: AtomicU64::new(1),
            fs_owner,
        }
    }

    fn blocks_of_size(size: u64) -> u64 {
        size.div_ceil(u64::from(Self::BLOCK_SIZE))
    }

    fn common_attr(&self, ino: Inode, perm: u32) -> CommonFileAttr {
        let now = SystemTime::now();
        CommonFileAttr {
            ino,
            atime: now,
            mtime: now,
            ctime: now,
            crtime: now,
            perm: Permissions::from_bits_truncate(u16::try_from(perm & 0o7777).unwrap_or(0)),
            nlink: 1,
            uid: self.fs_owner.0,
            gid: self.fs_owner.1,
            blksize: Self::BLOCK_SIZE,
        }
    }

    fn dir_attr(&self, ino: Inode) -> FileAttr {
        FileAttr::Directory {
            common: self.common_attr(ino, 0o755),
        }
    }

    fn file_attr(&self, ino: Inode, mode: FileMode, size: u64) -> FileAttr {
        FileAttr::RegularFile {
            common: self.common_attr(ino, mode.perm()),
            size,
            blocks: Self::blocks_of_size(size),
        }
    }

    fn symlink_attr(&self, ino: Inode, mode: FileMode, target_len: u64) -> FileAttr {
        FileAttr::Symlink {
            common: self.common_attr(ino, mode.perm()),
            size: target_len,
        }
    }

    async fn node(&self, ino: Inode) -> Option<Node> {
        self.nodes.read().await.get(&ino).cloned()
    }

    async fn register(&self, ino: Inode, node: Node) {
        self.nodes.write().await.insert(ino, node);
    }

    fn allocate_fh(&self) -> FileHandle {
        self.next_fh.fetch_add(1, Ordering::Relaxed)
    }

    /// Fetch a file's content: the single entry of the copy-from archive.
    async fn fetch_file(&self, fullpath: &str) -> Result<Vec<u8>, ApiError> {
        let stream = self.api.copy_from(fullpath).await?;
        let raw = collect_stream(stream).await?;

        let mut tar = tar::Archive::new(raw.as_slice());
        let entries = tar
            .entries()
            .map_err(|e| ApiError::Protocol(format!("unreadable copy-from archive: {e}")))?;
        for entry in entries {
            let mut entry =
                entry.map_err(|e| ApiError::Protocol(format!("malformed archive entry: {e}")))?;
            if entry.header().entry_type().is_file() {
                let mut content = Vec::with_capacity(usize::try_from(entry.size()).unwrap_or(0));
                std::io::Read::read_to_end(&mut entry, &mut content)
                    .map_err(|e| ApiError::Protocol(format!("truncated archive entry: {e}")))?;
                return Ok(content);
            }
        }
        Err(ApiError::Protocol(format!(
            "copy-from archive for {fullpath:?} has no file entry"
        )))
    }

    /// Upload the handle's buffer, wrapped as a single-entry tar archive
    /// extracted at the file's parent directory.
    ///
    /// Uploads when the handle has unflushed writes, or when the node was
    /// created but never uploaded: fsync or close of an empty created file
    /// must still realize it in the container.
    async fn upload_handle(&self, ino: Inode, fh: FileHandle) -> Result<(), FlushError> {
        let never_uploaded = {
            let nodes = self.nodes.read().await;
            matches!(
                nodes.get(&ino),
                Some(Node::File {
                    pending_mode: Some(_),
                    ..
                })
            )
        };

        let (fullpath, data, mode) = {
            let handles = self.handles.lock().await;
            let handle = handles.get(&fh).ok_or(FlushError::FileNotOpen)?;
            if !handle.writable || (!handle.dirty && !never_uploaded) {
                return Ok(());
            }
            (
                handle.fullpath.clone(),
                handle.data.clone().unwrap_or_default(),
                handle.mode,
            )
        };

        let upload =
            archive::single_file_archive(&fullpath, &data, mode).map_err(FlushError::Archive)?;
        self.api
            .copy_to(&path::parent(&fullpath), Bytes::from(upload))
            .await
            .map_err(FlushError::Api)?;
        trace!(%fullpath, bytes = data.len(), "uploaded file content");

        if let Some(handle) = self.handles.lock().await.get_mut(&fh) {
            handle.dirty = false;
        }

        // The file exists in the container now; getattr no longer needs the
        // in-memory fallback.
        let mut nodes = self.nodes.write().await;
        if let Some(Node::File { pending_mode, .. }) = nodes.get_mut(&ino) {
            *pending_mode = None;
        }
        Ok(())
    }

    /// Load the handle's buffer if it has none yet.
    ///
    /// A handle on a file that does not exist in the container yet starts
    /// from an empty buffer.
    async fn ensure_handle_data(&self, fh: FileHandle) -> Result<(), ApiError> {
        let fullpath = {
            let handles = self.handles.lock().await;
            let Some(handle) = handles.get(&fh) else {
                return Ok(());
            };
            if handle.data.is_some() {
                return Ok(());
            }
            handle.fullpath.clone()
        };

        let content = match self.fetch_file(&fullpath).await {
            Ok(content) => content,
            Err(ApiError::NotFound) => Vec::new(),
            Err(e) => return Err(e),
        };

        let mut handles = self.handles.lock().await;
        if let Some(handle) = handles.get_mut(&fh)
            && handle.data.is_none()
        {
            handle.data = Some(content);
        }
        Ok(())
    }
}

#[async_trait]
impl<A: ContainerApi> Fs for ContainerFs<A> {
    type LookupError = LookupError;
    type GetAttrError = GetAttrError;
    type ReadlinkError = ReadlinkError;
    type ReaddirError = ReadDirError;
    type OpenError = OpenError;
    type CreateError = CreateError;
    type ReadError = ReadError;
    type WriteError = WriteError;
    type FlushError = FlushError;
    type ReleaseError = ReleaseError;

    #[instrument(name = "ContainerFs::lookup", skip(self))]
    async fn lookup(&self, parent: Inode, name: &OsStr) -> Result<FileAttr, LookupError> {
        let parent_node = self.node(parent).await.ok_or(LookupError::InodeNotFound)?;
        let Node::Dir {
            fullpath: parent_path,
        } = parent_node
        else {
            return Err(LookupError::NotADirectory);
        };
        // Paths that reached the kernel are valid UTF-8; anything else
        // cannot exist in the container.
        let name = name.to_str().ok_or(LookupError::FileDoesNotExist)?;
        let fullpath = path::join(&parent_path, name);

        let stat = self.api.stat_path(&fullpath).await?;
        let ino = self.inodes.inode_for(&fullpath);
        trace!(ino, %fullpath, mode = ?stat.mode, "resolved node");

        let attr = if stat.mode.is_symlink() {
            let attr = self.symlink_attr(ino, stat.mode, stat.link_target.len() as u64);
            self.register(
                ino,
                Node::Symlink {
                    fullpath,
                    target: stat.link_target,
                    mode: stat.mode,
                },
            )
            .await;
            attr
        } else if stat.mode.is_dir() {
            self.register(ino, Node::Dir { fullpath }).await;
            self.dir_attr(ino)
        } else {
            self.register(
                ino,
                Node::File {
                    fullpath,
                    pending_mode: None,
                },
            )
            .await;
            self.file_attr(ino, stat.mode, stat_size(&stat))
        };
        Ok(attr)
    }

    #[instrument(name = "ContainerFs::getattr", skip(self))]
    async fn getattr(
        &self,
        ino: Inode,
        fh: Option<FileHandle>,
    ) -> Result<FileAttr, GetAttrError> {
        let node = self.node(ino).await.ok_or(GetAttrError::InodeNotFound)?;
        match node {
            Node::Dir { .. } => Ok(self.dir_attr(ino)),
            Node::Symlink { mode, target, .. } => {
                Ok(self.symlink_attr(ino, mode, target.len() as u64))
            }
            Node::File {
                fullpath,
                pending_mode,
            } => {
                // An open handle's buffer is the freshest size we have.
                if let Some(fh) = fh {
                    let handles = self.handles.lock().await;
                    if let Some(handle) = handles.get(&fh)
                        && let Some(data) = &handle.data
                    {
                        return Ok(self.file_attr(ino, handle.mode, data.len() as u64));
                    }
                }

                match self.api.stat_path(&fullpath).await {
                    Ok(stat) => Ok(self.file_attr(ino, stat.mode, stat_size(&stat))),
                    Err(ApiError::NotFound) => match pending_mode {
                        Some(mode) => Ok(self.file_attr(ino, mode, 0)),
                        None => Err(GetAttrError::FileDoesNotExist),
                    },
                    Err(e) => Err(GetAttrError::Api(e)),
                }
            }
        }
    }

    #[instrument(name = "ContainerFs::readlink", skip(self))]
    async fn readlink(&self, ino: Inode) -> Result<Bytes, ReadlinkError> {
        match self.node(ino).await.ok_or(ReadlinkError::InodeNotFound)? {
            Node::Symlink { target, .. } => Ok(Bytes::from(target.into_bytes())),
            Node::Dir { .. } | Node::File { .. } => Err(ReadlinkError::NotASymlink),
        }
    }

    #[instrument(name = "ContainerFs::readdir", skip(self))]
    async fn readdir(&self, ino: Inode) -> Result<Vec<DirEntry>, ReadDirError> {
        let node = self.node(ino).await.ok_or(ReadDirError::InodeNotFound)?;
        let Node::Dir { fullpath: dir } = node else {
            return Err(ReadDirError::NotADirectory);
        };

        let changes = self
            .changes
            .changes_in_dir(&dir)
            .await
            .map_err(ReadDirError::Api)?;

        let mut children: HashMap<String, DirEntryType> = HashMap::new();

        for (name, kind) in self.snapshot.children_of(&dir) {
            let child_path = path::join(&dir, &name);
            let removed = changes
                .iter()
                .any(|c| c.kind == ChangeKind::Removed && path::clean(&c.path) == child_path);
            if removed {
                continue;
            }
            let kind = match kind {
                SnapshotChild::Directory => DirEntryType::Directory,
                SnapshotChild::Entry(mode) if mode.is_symlink() => DirEntryType::Symlink,
                SnapshotChild::Entry(_) => DirEntryType::RegularFile,
            };
            children.insert(name, kind);
        }

        // Added entries win over snapshot entries of the same name.
        for change in &changes {
            if change.kind != ChangeKind::Added {
                continue;
            }
            let Some(mode) = change.mode else {
                continue;
            };
            let kind = if mode.is_dir() {
                DirEntryType::Directory
            } else if mode.is_symlink() {
                DirEntryType::Symlink
            } else {
                DirEntryType::RegularFile
            };
            children.insert(path::file_name(&change.path), kind);
        }

        let mut entries = Vec::with_capacity(children.len());
        for (name, kind) in children {
            let child_ino = self.inodes.inode_for(&path::join(&dir, &name));
            entries.push(DirEntry {
                ino: child_ino,
                name: name.into(),
                kind,
            });
        }
        trace!(count = entries.len(), "listed directory");
        Ok(entries)
    }

    #[instrument(name = "ContainerFs::open", skip(self))]
    async fn open(&self, ino: Inode, flags: OpenFlags) -> Result<OpenFile, OpenError> {
        let node = self.node(ino).await.ok_or(OpenError::InodeNotFound)?;
        let (fullpath, pending_mode) = match node {
            Node::Dir { .. } => return Err(OpenError::IsADirectory),
            Node::Symlink { .. } => return Err(OpenError::NotAFile),
            Node::File {
                fullpath,
                pending_mode,
            } => (fullpath, pending_mode),
        };

        let writable = flags.is_writable();
        let (mode, data) = if let Some(pending) = pending_mode {
            // Not uploaded yet; there is nothing to fetch.
            (pending, Some(Vec::new()))
        } else if writable {
            let stat = self
                .api
                .stat_path(&fullpath)
                .await
                .map_err(|e| match e {
                    ApiError::NotFound => OpenError::InodeNotFound,
                    other => OpenError::Api(other),
                })?;
            let data = flags.contains(OpenFlags::TRUNC).then(Vec::new);
            (stat.mode, data)
        } else {
            // Read-only handles fetch lazily on first read; the mode is
            // never used for an upload.
            (FileMode::new(0o644), None)
        };

        let fh = self.allocate_fh();
        self.handles.lock().await.insert(
            fh,
            Handle {
                fullpath,
                mode,
                writable,
                data,
                dirty: false,
            },
        );
        trace!(fh, writable, "assigned file handle");
        Ok(OpenFile { handle: fh })
    }

    #[instrument(name = "ContainerFs::create", skip(self))]
    async fn create(
        &self,
        parent: Inode,
        name: &OsStr,
        mode: u32,
        _flags: OpenFlags,
    ) -> Result<(FileAttr, OpenFile), CreateError> {
        let parent_node = self.node(parent).await.ok_or(CreateError::InodeNotFound)?;
        let Node::Dir {
            fullpath: parent_path,
        } = parent_node
        else {
            return Err(CreateError::NotADirectory);
        };
        let name = name.to_str().ok_or(CreateError::NotADirectory)?;
        let fullpath = path::join(&parent_path, name);

        match self.api.stat_path(&fullpath).await {
            Ok(_) => return Err(CreateError::AlreadyExists),
            Err(ApiError::NotFound) => {}
            Err(e) => return Err(CreateError::Api(e)),
        }

        let mode = FileMode::new(mode & 0o7777);
        let ino = self.inodes.inode_for(&fullpath);
        self.register(
            ino,
            Node::File {
                fullpath: fullpath.clone(),
                pending_mode: Some(mode),
            },
        )
        .await;

        // The container is not touched until the first flush.
        let fh = self.allocate_fh();
        self.handles.lock().await.insert(
            fh,
            Handle {
                fullpath,
                mode,
                writable: true,
                data: Some(Vec::new()),
                dirty: false,
            },
        );
        trace!(ino, fh, "created pending file node");
        Ok((self.file_attr(ino, mode, 0), OpenFile { handle: fh }))
    }

    #[instrument(name = "ContainerFs::read", skip(self))]
    async fn read(
        &self,
        ino: Inode,
        fh: FileHandle,
        offset: u64,
        size: u32,
    ) -> Result<Bytes, ReadError> {
        {
            let handles = self.handles.lock().await;
            if !handles.contains_key(&fh) {
                return Err(ReadError::FileNotOpen);
            }
        }
        self.ensure_handle_data(fh).await.map_err(ReadError::Api)?;

        let handles = self.handles.lock().await;
        let handle = handles.get(&fh).ok_or(ReadError::FileNotOpen)?;
        let Some(data) = &handle.data else {
            return Err(ReadError::FileNotOpen);
        };

        let start = usize::try_from(offset).unwrap_or(data.len()).min(data.len());
        let end = start.saturating_add(size as usize).min(data.len());
        Ok(Bytes::copy_from_slice(&data[start..end]))
    }

    #[instrument(name = "ContainerFs::write", skip(self, data))]
    async fn write(
        &self,
        ino: Inode,
        fh: FileHandle,
        offset: u64,
        data: Bytes,
    ) -> Result<u32, WriteError> {
        {
            let handles = self.handles.lock().await;
            let handle = handles.get(&fh).ok_or(WriteError::FileNotOpen)?;
            if !handle.writable {
                return Err(WriteError::ReadOnlyHandle);
            }
        }
        self.ensure_handle_data(fh).await.map_err(WriteError::Api)?;

        let mut handles = self.handles.lock().await;
        let handle = handles.get_mut(&fh).ok_or(WriteError::FileNotOpen)?;
        let Some(buf) = &mut handle.data else {
            return Err(WriteError::FileNotOpen);
        };

        #[expect(
            clippy::cast_possible_truncation,
            reason = "kernel write offsets fit in usize on supported targets"
        )]
        let offset = offset as usize;
        let end = offset + data.len();
        if buf.len() < end {
            buf.resize(end, 0);
        }
        buf[offset..end].copy_from_slice(&data);
        handle.dirty = true;
        trace!(fh, offset, len = data.len(), "buffered write");
        Ok(u32::try_from(data.len()).unwrap_or(u32::MAX))
    }

    #[instrument(name = "ContainerFs::flush", skip(self))]
    async fn flush(&self, ino: Inode, fh: FileHandle) -> Result<(), FlushError> {
        self.upload_handle(ino, fh).await
    }

    #[instrument(name = "ContainerFs::release", skip(self))]
    async fn release(
        &self,
        ino: Inode,
        fh: FileHandle,
        _flags: OpenFlags,
        flush: bool,
    ) -> Result<(), ReleaseError> {
        let writable = {
            let handles = self.handles.lock().await;
            let handle = handles.get(&fh).ok_or(ReleaseError::FileNotOpen)?;
            handle.writable
        };
        // Closing a writable handle flushes; upload_handle is a no-op for
        // handles with nothing to realize.
        if flush || writable {
            self.upload_handle(ino, fh).await?;
        }

        self.handles
            .lock()
            .await
            .remove(&fh)
            .ok_or(ReleaseError::FileNotOpen)?;
        trace!(fh, "closed file handle");
        Ok(())
    }

    #[instrument(name = "ContainerFs::forget", skip(self))]
    async fn forget(&self, ino: Inode, nlookups: u64) {
        // Nodes are persistent: the kernel may come back with any inode
        // number it has ever seen.
        trace!(ino, nlookups, "ignoring forget for persistent inode");
    }

    async fn statfs(&self) -> Result<FilesystemStats, std::io::Error> {
        Ok(FilesystemStats {
            block_size: Self::BLOCK_SIZE,
            total_blocks: u64::from(u32::MAX),
            free_blocks: u64::from(u32::MAX) / 2,
            available_blocks: u64::from(u32::MAX) / 2,
            total_inodes: self.inodes.len() as u64,
            free_inodes: u64::from(u32::MAX),
            max_filename_length: 255,
        })
    }
}

async fn collect_stream(mut stream: ByteStream) -> Result<Vec<u8>, ApiError> {
    let mut buf = Vec::new();
    while let Some(chunk) = stream.try_next().await? {
        buf.extend_from_slice(&chunk);
    }
    Ok(buf)
}
