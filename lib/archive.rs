//! Tar codec: reading the container export and building single-entry
//! upload archives.

use std::io::Read;
use std::time::{SystemTime, UNIX_EPOCH};

use docker_api::models::FileMode;
use tar::{Builder, EntryType, Header};
use tracing::{debug, warn};

use crate::path;

/// One indexable entry of the container export.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotEntry {
    /// Cleaned absolute path.
    pub path: String,
    /// File mode; symlinks carry the symlink type bit.
    pub mode: FileMode,
}

/// Walk a tar stream and collect every regular file and symlink.
///
/// Directory entries are skipped (directories are inferred from deeper
/// paths); entries of any other type are logged and dropped. A malformed
/// entry terminates the walk silently with the entries accumulated so far.
pub fn read_entries<R: Read>(reader: R) -> Vec<SnapshotEntry> {
    let mut archive = tar::Archive::new(reader);
    let mut result = Vec::new();

    let entries = match archive.entries() {
        Ok(entries) => entries,
        Err(e) => {
            warn!(error = %e, "unreadable archive, using no entries");
            return result;
        }
    };

    for entry in entries {
        let entry = match entry {
            Ok(entry) => entry,
            Err(e) => {
                warn!(error = %e, "malformed entry, stopping archive walk");
                break;
            }
        };
        let header = entry.header();
        let entry_path = match entry.path() {
            Ok(p) => path::clean(&p.to_string_lossy()),
            Err(e) => {
                warn!(error = %e, "malformed entry path, stopping archive walk");
                break;
            }
        };
        let mode = FileMode::new(header.mode().unwrap_or(0));

        match header.entry_type() {
            EntryType::Regular | EntryType::Continuous => result.push(SnapshotEntry {
                path: entry_path,
                mode,
            }),
            EntryType::Symlink => result.push(SnapshotEntry {
                path: entry_path,
                mode: mode.with_symlink(),
            }),
            EntryType::Directory => {}
            other => {
                debug!(entry_type = ?other, path = %entry_path, "skipping unsupported entry type");
            }
        }
    }

    result
}

/// Wrap `data` as a tar archive holding a single regular file.
///
/// The entry is named `basename(path)`, sized to `data`, carries the
/// permission bits of `mode`, and is stamped with the current wall-clock
/// time. The caller uploads the result for extraction at `dirname(path)`.
pub fn single_file_archive(
    file_path: &str,
    data: &[u8],
    mode: FileMode,
) -> std::io::Result<Vec<u8>> {
    let mut header = Header::new_gnu();
    header.set_entry_type(EntryType::Regular);
    header.set_size(data.len() as u64);
    header.set_mode(mode.perm());
    header.set_mtime(
        SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .map_or(0, |d| d.as_secs()),
    );

    let mut builder = Builder::new(Vec::new());
    builder.append_data(&mut header, path::file_name(file_path), data)?;
    builder.into_inner()
}
