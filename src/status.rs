//! On-disk bookkeeping of mounted containers.
//!
//! `$HOME/.dockerfs.status.json` maps container id to the absolute mount
//! path. The binary updates it on mount and unmount; the filesystem core
//! never reads it.

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use thiserror::Error;

#[derive(Debug, Error)]
pub enum StatusError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("status file is not valid JSON: {0}")]
    Decode(#[from] serde_json::Error),
}

/// Read the status map; a missing file is an empty map.
pub fn read(status_path: &Path) -> Result<BTreeMap<String, PathBuf>, StatusError> {
    let data = match std::fs::read(status_path) {
        Ok(data) => data,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(BTreeMap::new()),
        Err(e) => return Err(e.into()),
    };
    Ok(serde_json::from_slice(&data)?)
}

fn write(status_path: &Path, status: &BTreeMap<String, PathBuf>) -> Result<(), StatusError> {
    let data = serde_json::to_vec(status)?;
    std::fs::write(status_path, data)?;
    Ok(())
}

/// Record that `id` is mounted at `mount_point`.
pub fn record_mount(status_path: &Path, id: &str, mount_point: &Path) -> Result<(), StatusError> {
    let mut status = read(status_path)?;
    status.insert(id.to_owned(), mount_point.to_path_buf());
    write(status_path, &status)
}

/// Drop the entry for `id`, if any.
pub fn clear_mount(status_path: &Path, id: &str) -> Result<(), StatusError> {
    let mut status = read(status_path)?;
    if status.remove(id).is_some() {
        write(status_path, &status)?;
    }
    Ok(())
}
