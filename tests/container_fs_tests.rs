#![allow(clippy::unwrap_used, missing_docs)]

use std::ffi::OsStr;
use std::sync::Arc;
use std::time::Duration;

use bytes::Bytes;
use docker_api::error::ApiError;
use docker_api::models::ChangeKind;
use dockerfs::fs::container::LookupError;
use dockerfs::fs::{DirEntryType, FileAttr, Fs as _, OpenFlags};
use dockerfs::inodes::ROOT_INO;

mod common;
use common::{MockState, make_fs, reg, symlink};

/// No TTL: every readdir observes the current mock change list.
const LIVE: Duration = Duration::ZERO;

/// A container whose export held `/etc/hostname` and the `/bin/sh` symlink.
fn sample_state() -> Arc<MockState> {
    let state = Arc::new(MockState::default());
    state.insert_dir_stat("/etc");
    state.insert_dir_stat("/bin");
    state.insert_dir_stat("/tmp");
    state.insert_file_stat("/etc/hostname", 0o644, 5);
    state.insert_symlink_stat("/bin/sh", "busybox");
    state.insert_file("/etc/hostname", b"box01");
    state
}

fn sample_entries() -> Vec<dockerfs::archive::SnapshotEntry> {
    vec![reg("/etc/hostname", 0o644), symlink("/bin/sh")]
}

async fn lookup_ino(
    fs: &dockerfs::fs::container::ContainerFs<common::MockContainerApi>,
    parent: u64,
    name: &str,
) -> u64 {
    fs.lookup(parent, OsStr::new(name))
        .await
        .unwrap()
        .common()
        .ino
}

#[tokio::test]
async fn readdir_lists_snapshot_children_with_types() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let etc = lookup_ino(&fs, ROOT_INO, "etc").await;
    let entries = fs.readdir(etc).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "hostname");
    assert_eq!(entries[0].kind, DirEntryType::RegularFile);

    let bin = lookup_ino(&fs, ROOT_INO, "bin").await;
    let entries = fs.readdir(bin).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "sh");
    assert_eq!(entries[0].kind, DirEntryType::Symlink);
}

#[tokio::test]
async fn readlink_returns_stored_target() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let sh = lookup_ino(&fs, ROOT_INO, "bin").await;
    let sh = lookup_ino(&fs, sh, "sh").await;
    assert_eq!(fs.readlink(sh).await.unwrap(), Bytes::from_static(b"busybox"));
}

#[tokio::test]
async fn lookup_missing_path_is_enoent() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let err = fs.lookup(ROOT_INO, OsStr::new("nope")).await.unwrap_err();
    let errno: i32 = err.into();
    assert_eq!(errno, libc::ENOENT);
}

#[tokio::test]
async fn lookup_and_getattr_agree_on_type() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let etc = fs.lookup(ROOT_INO, OsStr::new("etc")).await.unwrap();
    assert!(matches!(etc, FileAttr::Directory { .. }));
    let attr = fs.getattr(etc.common().ino, None).await.unwrap();
    assert!(matches!(attr, FileAttr::Directory { .. }));

    let etc_ino = etc.common().ino;
    let hostname = fs.lookup(etc_ino, OsStr::new("hostname")).await.unwrap();
    assert!(matches!(hostname, FileAttr::RegularFile { .. }));
    let attr = fs.getattr(hostname.common().ino, None).await.unwrap();
    assert!(matches!(attr, FileAttr::RegularFile { size: 5, .. }));

    let bin_ino = lookup_ino(&fs, ROOT_INO, "bin").await;
    let sh = fs.lookup(bin_ino, OsStr::new("sh")).await.unwrap();
    assert!(matches!(sh, FileAttr::Symlink { .. }));
    let attr = fs.getattr(sh.common().ino, None).await.unwrap();
    assert!(matches!(attr, FileAttr::Symlink { .. }));
}

#[tokio::test]
async fn open_and_read_serves_live_content() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let etc = lookup_ino(&fs, ROOT_INO, "etc").await;
    let hostname = lookup_ino(&fs, etc, "hostname").await;

    let open = fs.open(hostname, OpenFlags::RDONLY).await.unwrap();
    assert_eq!(
        fs.read(hostname, open.handle, 0, 4096).await.unwrap(),
        Bytes::from_static(b"box01")
    );
    // Arbitrary offset/length slicing.
    assert_eq!(
        fs.read(hostname, open.handle, 3, 2).await.unwrap(),
        Bytes::from_static(b"01")
    );
    assert_eq!(fs.read(hostname, open.handle, 10, 4).await.unwrap().len(), 0);

    fs.release(hostname, open.handle, OpenFlags::RDONLY, false)
        .await
        .unwrap();
    let errno: i32 = fs
        .read(hostname, open.handle, 0, 1)
        .await
        .unwrap_err()
        .into();
    assert_eq!(errno, libc::EBADF);
}

#[tokio::test]
async fn create_write_flush_uploads_single_entry_tar() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let tmp = lookup_ino(&fs, ROOT_INO, "tmp").await;
    let (attr, open) = fs
        .create(tmp, OsStr::new("x"), 0o644, OpenFlags::WRONLY)
        .await
        .unwrap();
    assert!(matches!(attr, FileAttr::RegularFile { size: 0, .. }));
    assert!(
        state.uploads.lock().unwrap().is_empty(),
        "creation must not touch the container"
    );

    let ino = attr.common().ino;
    assert_eq!(
        fs.write(ino, open.handle, 0, Bytes::from_static(b"hi"))
            .await
            .unwrap(),
        2
    );
    fs.flush(ino, open.handle).await.unwrap();

    let uploads = state.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    let (dir, raw) = &uploads[0];
    assert_eq!(dir, "/tmp");

    let mut tar = tar::Archive::new(raw.as_slice());
    let mut entries: Vec<_> = tar.entries().unwrap().map(Result::unwrap).collect();
    assert_eq!(entries.len(), 1);
    let entry = &mut entries[0];
    assert_eq!(entry.path().unwrap().to_str().unwrap(), "x");
    assert_eq!(entry.header().size().unwrap(), 2);
    assert_eq!(entry.header().mode().unwrap(), 0o644);
    let mut body = Vec::new();
    std::io::Read::read_to_end(entry, &mut body).unwrap();
    assert_eq!(body, b"hi");
}

#[tokio::test]
async fn flush_of_empty_created_file_still_uploads() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let tmp = lookup_ino(&fs, ROOT_INO, "tmp").await;
    let (attr, open) = fs
        .create(tmp, OsStr::new("empty"), 0o644, OpenFlags::WRONLY)
        .await
        .unwrap();
    let ino = attr.common().ino;

    // No writes at all: fsync alone must realize the file.
    fs.flush(ino, open.handle).await.unwrap();

    {
        let uploads = state.uploads.lock().unwrap();
        assert_eq!(uploads.len(), 1);
        let (dir, raw) = &uploads[0];
        assert_eq!(dir, "/tmp");

        let mut tar = tar::Archive::new(raw.as_slice());
        let entry = tar.entries().unwrap().next().unwrap().unwrap();
        assert_eq!(entry.path().unwrap().to_str().unwrap(), "empty");
        assert_eq!(entry.header().size().unwrap(), 0);
        assert_eq!(entry.header().mode().unwrap(), 0o644);
    }

    // The file is realized now; a second clean flush has nothing to do.
    fs.flush(ino, open.handle).await.unwrap();
    assert_eq!(state.uploads.lock().unwrap().len(), 1);
}

#[tokio::test]
async fn close_of_empty_created_file_still_uploads() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let tmp = lookup_ino(&fs, ROOT_INO, "tmp").await;
    let (attr, open) = fs
        .create(tmp, OsStr::new("touched"), 0o600, OpenFlags::WRONLY)
        .await
        .unwrap();

    fs.release(attr.common().ino, open.handle, OpenFlags::WRONLY, false)
        .await
        .unwrap();

    let uploads = state.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    assert_eq!(uploads[0].0, "/tmp");
}

#[tokio::test]
async fn created_file_appears_in_readdir_once_diff_reports_it() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let tmp = lookup_ino(&fs, ROOT_INO, "tmp").await;
    let (attr, open) = fs
        .create(tmp, OsStr::new("x"), 0o644, OpenFlags::WRONLY)
        .await
        .unwrap();
    fs.write(attr.common().ino, open.handle, 0, Bytes::from_static(b"hi"))
        .await
        .unwrap();
    fs.release(attr.common().ino, open.handle, OpenFlags::WRONLY, true)
        .await
        .unwrap();

    // The container runtime now reports the new file.
    state.push_change("/tmp/x", ChangeKind::Added);
    state.insert_file_stat("/tmp/x", 0o644, 2);

    let entries = fs.readdir(tmp).await.unwrap();
    assert_eq!(entries.len(), 1);
    assert_eq!(entries[0].name, "x");
    assert_eq!(entries[0].kind, DirEntryType::RegularFile);

    let attr = fs.getattr(attr.common().ino, None).await.unwrap();
    assert!(matches!(attr, FileAttr::RegularFile { size: 2, .. }));
}

#[tokio::test]
async fn create_existing_file_is_eexist_without_upload() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let etc = lookup_ino(&fs, ROOT_INO, "etc").await;
    let err = fs
        .create(etc, OsStr::new("hostname"), 0o644, OpenFlags::WRONLY)
        .await
        .unwrap_err();
    let errno: i32 = err.into();
    assert_eq!(errno, libc::EEXIST);
    assert!(state.uploads.lock().unwrap().is_empty());
}

#[tokio::test]
async fn removed_file_disappears_from_readdir_and_lookup() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);
    let etc = lookup_ino(&fs, ROOT_INO, "etc").await;

    // Deleted inside the container: diff reports it, stat answers 404.
    state.push_change("/etc/hostname", ChangeKind::Removed);
    state.remove_stat("/etc/hostname");

    let entries = fs.readdir(etc).await.unwrap();
    assert!(entries.is_empty(), "removed names never appear");

    let err = fs.lookup(etc, OsStr::new("hostname")).await.unwrap_err();
    let errno: i32 = err.into();
    assert_eq!(errno, libc::ENOENT);
}

#[tokio::test]
async fn added_entry_shadows_snapshot_entry() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);
    let etc = lookup_ino(&fs, ROOT_INO, "etc").await;

    state.push_change("/etc/hostname", ChangeKind::Added);

    let entries = fs.readdir(etc).await.unwrap();
    assert_eq!(entries.len(), 1, "no duplicate names");
    assert_eq!(entries[0].name, "hostname");
}

#[tokio::test]
async fn concurrent_lookups_agree_on_inode() {
    let state = sample_state();
    let fs = Arc::new(make_fs(Arc::clone(&state), sample_entries(), LIVE));
    let etc = lookup_ino(&fs, ROOT_INO, "etc").await;

    let a = {
        let fs = Arc::clone(&fs);
        tokio::spawn(async move { lookup_ino(&fs, etc, "hostname").await })
    };
    let b = {
        let fs = Arc::clone(&fs);
        tokio::spawn(async move { lookup_ino(&fs, etc, "hostname").await })
    };
    assert_eq!(a.await.unwrap(), b.await.unwrap());
}

#[tokio::test]
async fn transport_error_is_eio_and_mount_stays_usable() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);
    state
        .failing_stats
        .lock()
        .unwrap()
        .insert(String::from("/etc"));

    let err = fs.lookup(ROOT_INO, OsStr::new("etc")).await.unwrap_err();
    let errno: i32 = err.into();
    assert_eq!(errno, libc::EIO);

    // Unrelated paths keep working.
    let bin = fs.lookup(ROOT_INO, OsStr::new("bin")).await.unwrap();
    assert!(matches!(bin, FileAttr::Directory { .. }));
}

#[test]
fn canceled_requests_map_to_eintr() {
    let errno: i32 = LookupError::Api(ApiError::Canceled).into();
    assert_eq!(errno, libc::EINTR);
}

#[tokio::test]
async fn write_then_read_on_one_handle_returns_last_write() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let tmp = lookup_ino(&fs, ROOT_INO, "tmp").await;
    let (attr, open) = fs
        .create(tmp, OsStr::new("notes"), 0o600, OpenFlags::RDWR)
        .await
        .unwrap();
    let ino = attr.common().ino;

    fs.write(ino, open.handle, 0, Bytes::from_static(b"hello"))
        .await
        .unwrap();
    fs.write(ino, open.handle, 6, Bytes::from_static(b"world"))
        .await
        .unwrap();

    let data = fs.read(ino, open.handle, 0, 4096).await.unwrap();
    assert_eq!(&data[..], b"hello\0world", "gaps are zero-filled");

    fs.write(ino, open.handle, 0, Bytes::from_static(b"HELLO"))
        .await
        .unwrap();
    let data = fs.read(ino, open.handle, 0, 5).await.unwrap();
    assert_eq!(&data[..], b"HELLO");
}

#[tokio::test]
async fn overwriting_existing_file_loads_current_content() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let etc = lookup_ino(&fs, ROOT_INO, "etc").await;
    let hostname = lookup_ino(&fs, etc, "hostname").await;

    let open = fs.open(hostname, OpenFlags::RDWR).await.unwrap();
    fs.write(hostname, open.handle, 0, Bytes::from_static(b"X"))
        .await
        .unwrap();
    fs.flush(hostname, open.handle).await.unwrap();

    let uploads = state.uploads.lock().unwrap();
    assert_eq!(uploads.len(), 1);
    let mut tar = tar::Archive::new(uploads[0].1.as_slice());
    let mut entry = tar.entries().unwrap().next().unwrap().unwrap();
    let mut body = Vec::new();
    std::io::Read::read_to_end(&mut entry, &mut body).unwrap();
    assert_eq!(body, b"Xox01", "partial write patches the fetched content");
}

#[tokio::test]
async fn truncating_open_starts_from_empty_buffer() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let etc = lookup_ino(&fs, ROOT_INO, "etc").await;
    let hostname = lookup_ino(&fs, etc, "hostname").await;

    let open = fs
        .open(hostname, OpenFlags::WRONLY | OpenFlags::TRUNC)
        .await
        .unwrap();
    fs.write(hostname, open.handle, 0, Bytes::from_static(b"new"))
        .await
        .unwrap();
    fs.flush(hostname, open.handle).await.unwrap();

    let uploads = state.uploads.lock().unwrap();
    let mut tar = tar::Archive::new(uploads[0].1.as_slice());
    let mut entry = tar.entries().unwrap().next().unwrap().unwrap();
    let mut body = Vec::new();
    std::io::Read::read_to_end(&mut entry, &mut body).unwrap();
    assert_eq!(body, b"new");
}

#[tokio::test]
async fn clean_flush_is_a_no_op() {
    let state = sample_state();
    let fs = make_fs(Arc::clone(&state), sample_entries(), LIVE);

    let etc = lookup_ino(&fs, ROOT_INO, "etc").await;
    let hostname = lookup_ino(&fs, etc, "hostname").await;
    let open = fs.open(hostname, OpenFlags::RDONLY).await.unwrap();

    fs.flush(hostname, open.handle).await.unwrap();
    assert!(state.uploads.lock().unwrap().is_empty());
}
