//! Stable inode numbers keyed on cleaned paths.

use std::collections::HashMap;
use std::sync::{Mutex, PoisonError};

use crate::path;

/// The inode number reserved for the filesystem root.
pub const ROOT_INO: u64 = 1;

struct TableState {
    by_path: HashMap<String, u64>,
    next: u64,
}

/// Injective path → inode mapping, stable for the lifetime of a mount.
///
/// First-seen paths get the next unused number starting at 2. Numbers are
/// never reused. Safe to call from any request handler.
pub struct InodeTable {
    inner: Mutex<TableState>,
}

impl InodeTable {
    #[must_use]
    pub fn new() -> Self {
        let mut by_path = HashMap::new();
        by_path.insert(String::from("/"), ROOT_INO);
        Self {
            inner: Mutex::new(TableState {
                by_path,
                next: ROOT_INO + 1,
            }),
        }
    }

    /// The inode number for `file_path`, allocating one on first sight.
    pub fn inode_for(&self, file_path: &str) -> u64 {
        let cleaned = path::clean(file_path);
        let mut state = self.inner.lock().unwrap_or_else(PoisonError::into_inner);
        if let Some(&ino) = state.by_path.get(&cleaned) {
            return ino;
        }
        let ino = state.next;
        state.next += 1;
        state.by_path.insert(cleaned, ino);
        ino
    }

    /// Number of allocated inodes, including the root.
    pub fn len(&self) -> usize {
        self.inner
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .by_path
            .len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }
}

impl Default for InodeTable {
    fn default() -> Self {
        Self::new()
    }
}
