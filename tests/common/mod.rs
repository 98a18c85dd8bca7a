#![allow(missing_docs, clippy::unwrap_used, dead_code)]

use std::collections::{HashMap, HashSet};
use std::sync::atomic::{AtomicBool, AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;
use bytes::Bytes;

use docker_api::error::{ApiError, HttpClientError};
use docker_api::http_client::ByteStream;
use docker_api::models::{Change, ChangeKind, FileMode, PathStat};
use dockerfs::api::ContainerApi;
use dockerfs::archive::SnapshotEntry;
use dockerfs::fs::container::ContainerFs;
use dockerfs::snapshot::Snapshot;

/// Shared state backing [`MockContainerApi`].
#[derive(Default)]
pub struct MockState {
    /// `path -> stat` responses; paths not present answer `NotFound`.
    pub stats: Mutex<HashMap<String, PathStat>>,
    /// Paths whose stat fails with a transport error.
    pub failing_stats: Mutex<HashSet<String>>,
    /// Recorded `stat_path` calls.
    pub stat_calls: Mutex<Vec<String>>,
    /// The change list served by `changes`.
    pub changes: Mutex<Vec<Change>>,
    /// When true, `changes` fails with a transport error.
    pub fail_changes: AtomicBool,
    /// Counts `changes` calls.
    pub change_calls: AtomicU64,
    /// `path -> content` served by `copy_from` as a single-entry tar.
    pub files: Mutex<HashMap<String, Vec<u8>>>,
    /// Recorded `copy_to` calls: `(dir, raw tar bytes)`.
    pub uploads: Mutex<Vec<(String, Vec<u8>)>>,
    /// Raw tar served by `export`.
    pub export_tar: Mutex<Vec<u8>>,
}

impl MockState {
    pub fn insert_file_stat(&self, path: &str, mode: u32, size: i64) {
        self.stats.lock().unwrap().insert(
            path.to_owned(),
            PathStat {
                name: path.rsplit('/').next().unwrap_or(path).to_owned(),
                size,
                mode: FileMode::new(mode),
                link_target: String::new(),
            },
        );
    }

    pub fn insert_dir_stat(&self, path: &str) {
        self.stats.lock().unwrap().insert(
            path.to_owned(),
            PathStat {
                name: path.rsplit('/').next().unwrap_or(path).to_owned(),
                size: 0,
                mode: FileMode::new(FileMode::DIR | 0o755),
                link_target: String::new(),
            },
        );
    }

    pub fn insert_symlink_stat(&self, path: &str, target: &str) {
        self.stats.lock().unwrap().insert(
            path.to_owned(),
            PathStat {
                name: path.rsplit('/').next().unwrap_or(path).to_owned(),
                size: 0,
                mode: FileMode::new(FileMode::SYMLINK | 0o777),
                link_target: target.to_owned(),
            },
        );
    }

    pub fn remove_stat(&self, path: &str) {
        self.stats.lock().unwrap().remove(path);
    }

    pub fn push_change(&self, path: &str, kind: ChangeKind) {
        self.changes.lock().unwrap().push(Change {
            path: path.to_owned(),
            kind,
            mode: None,
        });
    }

    pub fn insert_file(&self, path: &str, content: &[u8]) {
        self.files
            .lock()
            .unwrap()
            .insert(path.to_owned(), content.to_vec());
    }
}

/// A [`ContainerApi`] over canned [`MockState`].
#[derive(Clone)]
pub struct MockContainerApi {
    pub state: Arc<MockState>,
}

impl MockContainerApi {
    pub fn new(state: Arc<MockState>) -> Self {
        Self { state }
    }
}

fn transport_error() -> ApiError {
    ApiError::Transport(HttpClientError::Connection(String::from(
        "mock transport failure",
    )))
}

fn byte_stream(data: Vec<u8>) -> ByteStream {
    Box::pin(futures::stream::once(async move { Ok(Bytes::from(data)) }))
}

/// Wrap `content` the way the runtime's copy-from endpoint does: a tar
/// archive holding the single requested file.
pub fn single_entry_tar(name: &str, content: &[u8], mode: u32) -> Vec<u8> {
    let mut header = tar::Header::new_gnu();
    header.set_entry_type(tar::EntryType::Regular);
    header.set_size(content.len() as u64);
    header.set_mode(mode);
    let mut builder = tar::Builder::new(Vec::new());
    builder.append_data(&mut header, name, content).unwrap();
    builder.into_inner().unwrap()
}

#[async_trait]
impl ContainerApi for MockContainerApi {
    async fn export(&self) -> Result<ByteStream, ApiError> {
        Ok(byte_stream(self.state.export_tar.lock().unwrap().clone()))
    }

    async fn stat_path(&self, path: &str) -> Result<PathStat, ApiError> {
        self.state.stat_calls.lock().unwrap().push(path.to_owned());
        if self.state.failing_stats.lock().unwrap().contains(path) {
            return Err(transport_error());
        }
        self.state
            .stats
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or(ApiError::NotFound)
    }

    async fn changes(&self) -> Result<Vec<Change>, ApiError> {
        self.state.change_calls.fetch_add(1, Ordering::SeqCst);
        if self.state.fail_changes.load(Ordering::SeqCst) {
            return Err(transport_error());
        }
        Ok(self.state.changes.lock().unwrap().clone())
    }

    async fn copy_from(&self, path: &str) -> Result<ByteStream, ApiError> {
        let content = self
            .state
            .files
            .lock()
            .unwrap()
            .get(path)
            .cloned()
            .ok_or(ApiError::NotFound)?;
        let name = path.rsplit('/').next().unwrap_or(path).to_owned();
        Ok(byte_stream(single_entry_tar(&name, &content, 0o644)))
    }

    async fn copy_to(&self, dir: &str, archive: Bytes) -> Result<(), ApiError> {
        self.state
            .uploads
            .lock()
            .unwrap()
            .push((dir.to_owned(), archive.to_vec()));
        Ok(())
    }
}

/// Build a `ContainerFs` over mock state with the given snapshot entries.
///
/// A `refresh_interval` of zero makes every readdir refetch the change list.
pub fn make_fs(
    state: Arc<MockState>,
    entries: Vec<SnapshotEntry>,
    refresh_interval: Duration,
) -> ContainerFs<MockContainerApi> {
    let api = Arc::new(MockContainerApi::new(state));
    ContainerFs::new(
        api,
        Snapshot::from_entries(entries),
        (1000, 1000),
        refresh_interval,
    )
}

/// A regular-file snapshot entry.
pub fn reg(path: &str, perm: u32) -> SnapshotEntry {
    SnapshotEntry {
        path: path.to_owned(),
        mode: FileMode::new(perm),
    }
}

/// A symlink snapshot entry.
pub fn symlink(path: &str) -> SnapshotEntry {
    SnapshotEntry {
        path: path.to_owned(),
        mode: FileMode::new(0o777).with_symlink(),
    }
}
