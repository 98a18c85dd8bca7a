//! Static index of the container export.

use std::collections::{BTreeMap, HashMap};

use docker_api::models::FileMode;

use crate::archive::SnapshotEntry;
use crate::path;

/// The kind of a direct child inferred from the snapshot.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SnapshotChild {
    /// Synthesized from the leading segment of a deeper entry's path.
    Directory,
    /// A file or symlink recorded verbatim in the export.
    Entry(FileMode),
}

/// Immutable path → mode index built once from the export at mount time.
///
/// Only regular files and symlinks are indexed; a directory exists iff some
/// entry has it as a path prefix.
#[derive(Debug, Default)]
pub struct Snapshot {
    files: HashMap<String, FileMode>,
}

impl Snapshot {
    /// Build the index from parsed export entries.
    #[must_use]
    pub fn from_entries(entries: impl IntoIterator<Item = SnapshotEntry>) -> Self {
        Self {
            files: entries.into_iter().map(|e| (e.path, e.mode)).collect(),
        }
    }

    /// Exact-match mode lookup.
    #[must_use]
    pub fn mode_of(&self, file_path: &str) -> Option<FileMode> {
        self.files.get(&path::clean(file_path)).copied()
    }

    /// Number of indexed entries.
    #[must_use]
    pub fn len(&self) -> usize {
        self.files.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// The direct children of `dir`, deduplicated and sorted by name.
    ///
    /// A direct entry is reported with its recorded mode; any deeper entry
    /// contributes its leading segment as a synthesized directory.
    #[must_use]
    pub fn children_of(&self, dir: &str) -> Vec<(String, SnapshotChild)> {
        let dir = path::clean(dir);
        let prefix = if dir == "/" { dir } else { format!("{dir}/") };

        let mut children: BTreeMap<String, SnapshotChild> = BTreeMap::new();
        for (entry_path, &mode) in &self.files {
            let Some(rest) = entry_path.strip_prefix(&prefix) else {
                continue;
            };
            if rest.is_empty() {
                continue;
            }
            match rest.split_once('/') {
                Some((segment, _)) => {
                    children.insert(segment.to_owned(), SnapshotChild::Directory);
                }
                None => {
                    children.insert(rest.to_owned(), SnapshotChild::Entry(mode));
                }
            }
        }
        children.into_iter().collect()
    }
}
