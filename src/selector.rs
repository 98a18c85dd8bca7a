//! Interactive container picker.
//!
//! Lists the runtime's containers, marks the ones this tool already has
//! mounted, and either spawns a background mount or unmounts on selection.

use std::fmt;
use std::path::{Path, PathBuf};

use docker_api::DockerClient;
use docker_api::backends::UnixSocketClient;
use docker_api::error::ApiError;
use docker_api::models::ContainerSummary;
use inquire::{Confirm, Select, Text};
use tracing::{info, warn};

use crate::status;

#[derive(Debug, thiserror::Error)]
pub enum SelectorError {
    #[error("cannot list containers: {0}")]
    Api(#[from] ApiError),

    #[error("prompt error: {0}")]
    Prompt(inquire::InquireError),

    #[error("status file error: {0}")]
    Status(#[from] status::StatusError),

    #[error("failed to build async runtime: {0}")]
    Runtime(std::io::Error),

    #[error("cannot detect executable path: {0}")]
    NoExecutable(std::io::Error),

    #[error("mount command failed: {0}")]
    MountCommand(std::io::Error),
}

struct Choice {
    summary: ContainerSummary,
    mounted_at: Option<PathBuf>,
}

impl fmt::Display for Choice {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let id = self.summary.id.get(..12).unwrap_or(&self.summary.id);
        write!(
            f,
            "{id}  {} ({})",
            self.summary.display_name(),
            self.summary.state
        )?;
        if let Some(mount_point) = &self.mounted_at {
            write!(f, "  [mounted at {}]", mount_point.display())?;
        }
        Ok(())
    }
}

/// Run the selection loop until the user cancels.
pub fn run(docker_socket: &Path) -> Result<(), SelectorError> {
    let runtime = tokio::runtime::Builder::new_current_thread()
        .enable_all()
        .build()
        .map_err(SelectorError::Runtime)?;
    let client = DockerClient::new(UnixSocketClient::new(docker_socket));

    let status_path = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("/tmp"))
        .join(".dockerfs.status.json");

    loop {
        let containers = runtime.block_on(client.containers().list())?;
        let mounts = status::read(&status_path)?;

        let choices: Vec<Choice> = containers
            .into_iter()
            .map(|summary| Choice {
                mounted_at: mounts.get(&summary.id).cloned(),
                summary,
            })
            .collect();
        if choices.is_empty() {
            info!("No containers found.");
            return Ok(());
        }

        let choice = match Select::new("Container:", choices).prompt() {
            Ok(choice) => choice,
            Err(
                inquire::InquireError::OperationCanceled
                | inquire::InquireError::OperationInterrupted,
            ) => return Ok(()),
            Err(e) => return Err(SelectorError::Prompt(e)),
        };

        match choice.mounted_at {
            Some(mount_point) => unmount(&status_path, &choice.summary.id, &mount_point)?,
            None => mount(docker_socket, &choice.summary)?,
        }
    }
}

fn mount(docker_socket: &Path, summary: &ContainerSummary) -> Result<(), SelectorError> {
    let default_path = format!("./mount-{}", summary.display_name());
    let mount_point = match Text::new("Choose path to mount the container:")
        .with_default(&default_path)
        .prompt()
    {
        Ok(path) => path,
        Err(
            inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted,
        ) => return Ok(()),
        Err(e) => return Err(SelectorError::Prompt(e)),
    };

    let executable = std::env::current_exe().map_err(SelectorError::NoExecutable)?;
    let status = std::process::Command::new(executable)
        .arg("mount")
        .arg("--id")
        .arg(&summary.id)
        .arg("--mount-point")
        .arg(&mount_point)
        .arg("--docker-socket")
        .arg(docker_socket)
        .arg("--daemonize")
        .status()
        .map_err(SelectorError::MountCommand)?;
    if status.success() {
        info!(id = %summary.id, %mount_point, "Mount started.");
    } else {
        warn!(id = %summary.id, %status, "Mount command reported failure.");
    }
    Ok(())
}

fn unmount(status_path: &Path, id: &str, mount_point: &Path) -> Result<(), SelectorError> {
    let confirmed = match Confirm::new(&format!("Unmount {}?", mount_point.display()))
        .with_default(false)
        .prompt()
    {
        Ok(confirmed) => confirmed,
        Err(
            inquire::InquireError::OperationCanceled | inquire::InquireError::OperationInterrupted,
        ) => return Ok(()),
        Err(e) => return Err(SelectorError::Prompt(e)),
    };
    if !confirmed {
        return Ok(());
    }

    // The daemon owning the session notices the unmount and exits; the
    // command may fail if it already went away.
    if let Err(e) = std::process::Command::new("umount").arg(mount_point).status() {
        warn!(error = %e, "umount command failed");
    }
    status::clear_mount(status_path, id)?;
    info!(id, "Unmounted.");
    Ok(())
}
