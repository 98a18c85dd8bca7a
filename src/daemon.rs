//! The daemon: fetch the container export, build the filesystem, serve FUSE
//! until a shutdown signal arrives.

use std::sync::Arc;

use futures::TryStreamExt as _;
use tokio::io::AsyncWriteExt as _;
use tokio::select;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use docker_api::DockerClient;
use docker_api::backends::UnixSocketClient;
use docker_api::error::ApiError;
use dockerfs::api::{ContainerApi, DockerContainerApi};
use dockerfs::archive;
use dockerfs::fs::container::ContainerFs;
use dockerfs::snapshot::Snapshot;

use crate::app_config::Config;
use crate::status;

#[derive(Debug, thiserror::Error)]
pub enum DaemonError {
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("container api error: {0}")]
    Api(#[from] ApiError),

    #[error("status file error: {0}")]
    Status(#[from] status::StatusError),
}

mod managed_fuse {
    //! fuser will not attempt a forced unmount when the `BackgroundSession`
    //! is dropped, only a regular one. A hung or crashed daemon would leave
    //! the container filesystem mounted and every access under it blocking,
    //! so the mount is detached by force on the way out.
    use std::path::{Path, PathBuf};
    use std::time::Duration;

    use nix::errno::Errno;

    use dockerfs::api::ContainerApi;
    use dockerfs::fs::container::ContainerFs;
    use dockerfs::fs::fuser::FuserAdapter;
    use fuser::BackgroundSession;

    use super::{Config, debug, error};

    pub struct FuseCoreScope {
        _session: BackgroundSession,
    }

    impl FuseCoreScope {
        pub fn spawn<A: ContainerApi>(
            fs: ContainerFs<A>,
            config: &Config,
            handle: tokio::runtime::Handle,
        ) -> Result<Self, std::io::Error> {
            let fuse_adapter = FuserAdapter::new(fs, handle);
            let mount_opts = [
                fuser::MountOption::FSName(String::from("dockerfs")),
                fuser::MountOption::RW,
                fuser::MountOption::AutoUnmount,
                fuser::MountOption::DefaultPermissions,
            ];

            Ok(Self {
                _session: fuser::spawn_mount2(fuse_adapter, &config.mount_point, &mount_opts)?,
            })
        }
    }

    fn force_unmount(mount_point: &Path) -> Result<(), Errno> {
        #[cfg(target_os = "linux")]
        return nix::mount::umount2(mount_point, nix::mount::MntFlags::MNT_DETACH);

        #[cfg(target_os = "macos")]
        return nix::mount::unmount(mount_point, nix::mount::MntFlags::MNT_FORCE);
    }

    pub struct ManagedFuse {
        container_id: String,
        mount_point: PathBuf,
    }

    impl ManagedFuse {
        pub fn new(config: &Config) -> Self {
            Self {
                container_id: config.container_id.clone(),
                mount_point: config.mount_point.clone(),
            }
        }
    }

    impl Drop for ManagedFuse {
        fn drop(&mut self) {
            // The kernel can keep the mount busy for a moment after the
            // session thread exits; retry briefly before giving up.
            const UNMOUNT_RETRIES: u32 = 5;
            const UNMOUNT_RETRY_DELAY: Duration = Duration::from_millis(50);

            for attempt in 1..=UNMOUNT_RETRIES {
                match force_unmount(&self.mount_point) {
                    Ok(()) => {
                        debug!(
                            container = %self.container_id,
                            mount_point = %self.mount_point.display(),
                            attempt,
                            "container filesystem unmounted"
                        );
                        return;
                    }
                    Err(Errno::EINVAL | Errno::ENOENT) => {
                        debug!(
                            container = %self.container_id,
                            mount_point = %self.mount_point.display(),
                            "mount already gone"
                        );
                        return;
                    }
                    Err(Errno::EBUSY) if attempt < UNMOUNT_RETRIES => {
                        std::thread::sleep(UNMOUNT_RETRY_DELAY);
                    }
                    Err(e) => {
                        error!(
                            container = %self.container_id,
                            mount_point = %self.mount_point.display(),
                            error = %e,
                            "could not unmount container filesystem; run umount manually"
                        );
                        return;
                    }
                }
            }
        }
    }
}

/// Ensure the mount point is an empty directory, creating it if needed.
///
/// Mounting over a non-empty directory would shadow whatever is already
/// there, so that is refused rather than silently hiding files.
async fn prepare_mount_point(config: &Config) -> Result<(), std::io::Error> {
    let mount_point = &config.mount_point;
    match tokio::fs::metadata(mount_point).await {
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
            tokio::fs::create_dir_all(mount_point).await?;
            info!(
                container = %config.container_id,
                path = %mount_point.display(),
                "created mount point"
            );
            Ok(())
        }
        Err(e) => Err(e),
        Ok(meta) if !meta.is_dir() => Err(std::io::Error::new(
            std::io::ErrorKind::NotADirectory,
            format!("mount point {} is not a directory", mount_point.display()),
        )),
        Ok(_) => {
            let mut entries = tokio::fs::read_dir(mount_point).await?;
            if entries.next_entry().await?.is_some() {
                return Err(std::io::Error::new(
                    std::io::ErrorKind::DirectoryNotEmpty,
                    format!(
                        "refusing to mount container {} over non-empty directory {}",
                        config.container_id,
                        mount_point.display()
                    ),
                ));
            }
            Ok(())
        }
    }
}

/// Stream the container export into the cache file and index it.
///
/// The cache file is created mode `0640` inside a `0750` cache directory
/// and overwritten on every mount.
async fn fetch_snapshot<A: ContainerApi>(api: &A, config: &Config) -> Result<Snapshot, DaemonError> {
    use std::os::unix::fs::DirBuilderExt as _;

    let mut dir_builder = std::fs::DirBuilder::new();
    dir_builder.recursive(true).mode(0o750);
    dir_builder.create(&config.cache_dir)?;

    let cache_file = config.cache_file();
    info!(path = %cache_file.display(), "Fetching container export...");

    let mut stream = api.export().await?;
    let mut file = tokio::fs::OpenOptions::new()
        .write(true)
        .create(true)
        .truncate(true)
        .mode(0o640)
        .open(&cache_file)
        .await?;
    while let Some(chunk) = stream.try_next().await.map_err(ApiError::from)? {
        file.write_all(&chunk).await?;
    }
    file.flush().await?;
    drop(file);

    info!("Indexing container export...");
    let entries = tokio::task::spawn_blocking(move || {
        let file = std::fs::File::open(&cache_file)?;
        Ok::<_, std::io::Error>(archive::read_entries(std::io::BufReader::new(file)))
    })
    .await
    .map_err(|e| std::io::Error::other(format!("snapshot indexing task failed: {e}")))??;

    let snapshot = Snapshot::from_entries(entries);
    info!(entries = snapshot.len(), "Snapshot index built.");
    Ok(snapshot)
}

/// Block until the daemon is told to stop.
///
/// Returns the name of the signal that fired, for the shutdown log line.
async fn wait_for_shutdown() -> Result<&'static str, std::io::Error> {
    use tokio::signal::unix::{SignalKind, signal};
    let mut sigterm = signal(SignalKind::terminate())?;
    let mut sighup = signal(SignalKind::hangup())?;
    let fired = select! {
        _ = tokio::signal::ctrl_c() => "SIGINT",
        _ = sigterm.recv() => "SIGTERM",
        _ = sighup.recv() => "SIGHUP",
    };
    Ok(fired)
}

/// Main entry point for the daemon.
pub async fn run(config: Config, handle: tokio::runtime::Handle) -> Result<(), DaemonError> {
    status::record_mount(
        &config.status_path,
        &config.container_id,
        &config.mount_point,
    )?;

    prepare_mount_point(&config).await?;

    let cancel = CancellationToken::new();
    let client = DockerClient::new(UnixSocketClient::new(&config.docker_socket))
        .with_cancellation(cancel.clone());
    let api = Arc::new(DockerContainerApi::new(client, &config.container_id));

    let snapshot = fetch_snapshot(api.as_ref(), &config).await?;

    let fs = ContainerFs::new(
        Arc::clone(&api),
        snapshot,
        (config.uid, config.gid),
        config.refresh_interval,
    );

    info!("Mounting filesystem at {}.", config.mount_point.display());
    let fuse = managed_fuse::ManagedFuse::new(&config);
    {
        let _session = managed_fuse::FuseCoreScope::spawn(fs, &config, handle.clone())?;
        info!("dockerfs is running. Press Ctrl+C to stop.");

        let signal = wait_for_shutdown().await?;
        info!(signal, container = %config.container_id, "shutting down");

        // Abort in-flight API requests so kernel handlers drain promptly.
        cancel.cancel();
    }
    drop(fuse);

    status::clear_mount(&config.status_path, &config.container_id)?;
    info!("Unmounted cleanly.");
    Ok(())
}

/// Build the runtime and run the daemon to completion.
pub fn spawn(config: Config) -> Result<(), DaemonError> {
    let runtime = tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()?;
    let handle = runtime.handle().clone();
    runtime.block_on(run(config, handle))
}
