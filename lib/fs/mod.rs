//! Filesystem abstractions realized over the container-control API.
//!
//! # Staleness
//!
//! Directory listings combine the immutable mount-time snapshot with the
//! change list, which is refreshed at most once per
//! [`DEFAULT_REFRESH_INTERVAL`](crate::changes::DEFAULT_REFRESH_INTERVAL).
//! A reader observing a path right after a writer on a *different* handle
//! may therefore see the old listing for up to one interval. Attributes and
//! file contents are always served live.

/// The container-backed [`Fs`](r#trait::Fs) implementation.
pub mod container;
/// FUSE adapter: maps [`fuser::Filesystem`] callbacks to [`Fs`](r#trait::Fs).
pub mod fuser;
pub mod r#trait;

pub use r#trait::{
    CommonFileAttr, DirEntry, DirEntryType, FileAttr, FileHandle, FilesystemStats, Fs, Inode,
    OpenFile, OpenFlags, Permissions,
};
