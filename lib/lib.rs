//! dockerfs shared library: the container filesystem core.
//!
//! Translates the kernel filesystem protocol into container-control API
//! calls. The core owns a static snapshot of the container export, a
//! periodically refreshed view of the container's changes, a stable inode
//! allocator keyed on path, and the upload path that wraps bytes into
//! single-entry tar archives.

pub mod api;
pub mod archive;
pub mod changes;
/// Filesystem abstractions and the FUSE adapter.
pub mod fs;
pub mod inodes;
pub mod path;
pub mod snapshot;
