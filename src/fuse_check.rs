//! FUSE availability checks.

use thiserror::Error;

#[derive(Debug, Error)]
pub enum FuseCheckError {
    #[cfg(target_os = "linux")]
    #[error(
        "/dev/fuse is not available. Install the fuse package (and load the fuse kernel \
         module) before mounting."
    )]
    NoFuseDevice,

    #[cfg(target_os = "macos")]
    #[error(
        "No FUSE implementation found. Install macFUSE from https://macfuse.github.io before \
         mounting."
    )]
    NoMacFuse,
}

/// Verify that the host can serve a FUSE mount at all, before any container
/// traffic happens.
#[cfg(target_os = "linux")]
pub fn ensure_fuse() -> Result<(), FuseCheckError> {
    if std::path::Path::new("/dev/fuse").exists() {
        Ok(())
    } else {
        Err(FuseCheckError::NoFuseDevice)
    }
}

#[cfg(target_os = "macos")]
pub fn ensure_fuse() -> Result<(), FuseCheckError> {
    const FS_BUNDLES: [&str; 2] = [
        "/Library/Filesystems/macfuse.fs",
        "/Library/Filesystems/osxfuse.fs",
    ];
    if FS_BUNDLES.iter().any(|p| std::path::Path::new(p).is_dir()) {
        Ok(())
    } else {
        Err(FuseCheckError::NoMacFuse)
    }
}
