//! Runtime configuration assembled from CLI flags and the environment.

use std::path::PathBuf;
use std::time::Duration;

fn current_uid() -> u32 {
    nix::unistd::Uid::current().as_raw()
}

fn current_gid() -> u32 {
    nix::unistd::Gid::current().as_raw()
}

fn home_dir() -> PathBuf {
    dirs::home_dir().unwrap_or_else(|| PathBuf::from("/tmp"))
}

/// Everything the daemon needs to serve one mount.
#[derive(Debug, Clone)]
pub struct Config {
    /// Container id or name.
    pub container_id: String,

    /// Absolute directory the filesystem is mounted on.
    pub mount_point: PathBuf,

    /// The container runtime's control socket.
    pub docker_socket: PathBuf,

    /// Staleness bound for directory listings.
    pub refresh_interval: Duration,

    /// Directory holding the exported snapshot tars.
    pub cache_dir: PathBuf,

    /// Bookkeeping file mapping container id to mount path.
    pub status_path: PathBuf,

    /// PID file used when daemonizing.
    pub pid_file: PathBuf,

    /// Log file used when daemonizing.
    pub log_file: PathBuf,

    /// The user every node of the mounted filesystem is owned by.
    pub uid: u32,

    /// The group every node of the mounted filesystem is owned by.
    pub gid: u32,
}

impl Config {
    /// Assemble the configuration for a mount invocation.
    ///
    /// A relative mount point is resolved against the current directory so
    /// the status file always records an absolute path.
    pub fn for_mount(
        container_id: String,
        mount_point: PathBuf,
        docker_socket: PathBuf,
        refresh_interval_secs: u64,
    ) -> Self {
        let home = home_dir();
        let cache_dir = home.join(".cache/dockerfs");
        let mount_point = std::path::absolute(&mount_point).unwrap_or(mount_point);

        Self {
            pid_file: cache_dir.join(format!("dockerfs_{}.pid", sanitize_id(&container_id))),
            log_file: cache_dir.join(format!("dockerfs_{}.log", sanitize_id(&container_id))),
            container_id,
            mount_point,
            docker_socket,
            refresh_interval: Duration::from_secs(refresh_interval_secs),
            cache_dir,
            status_path: home.join(".dockerfs.status.json"),
            uid: current_uid(),
            gid: current_gid(),
        }
    }

    /// Validate the correctness of the configuration.
    ///
    /// Returns:
    /// - `Ok(())` if the configuration is valid.
    /// - `Err(Vec<String>)` containing a list of validation error messages.
    pub fn validate(&self) -> Result<(), Vec<String>> {
        let mut errors = Vec::new();

        if self.container_id.is_empty() {
            errors.push("Container id must not be empty.".to_owned());
        }
        if self.mount_point.as_os_str().is_empty() {
            errors.push("Mount point must not be empty.".to_owned());
        }
        if self.refresh_interval.is_zero() {
            errors.push("Refresh interval must be at least one second.".to_owned());
        }

        if errors.is_empty() { Ok(()) } else { Err(errors) }
    }

    /// Where this container's exported snapshot is cached.
    pub fn cache_file(&self) -> PathBuf {
        self.cache_dir
            .join(format!("content_{}.tar", sanitize_id(&self.container_id)))
    }
}

/// Container ids may be user-supplied names; keep only characters that are
/// safe in a file name.
fn sanitize_id(id: &str) -> String {
    id.chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || matches!(c, '-' | '_' | '.') {
                c
            } else {
                '_'
            }
        })
        .collect()
}
