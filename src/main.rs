//! Mount a running container's filesystem locally, without entering it.
use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing::error;

mod app_config;
mod daemon;
mod fuse_check;
mod selector;
mod status;
mod trc;

use crate::app_config::Config;
use crate::trc::{Trc, TrcHandle};

const DEFAULT_DOCKER_SOCKET: &str = "/var/run/docker.sock";

#[derive(Parser)]
#[command(
    version,
    about = "Mount a running container's filesystem over FUSE.",
    after_help = "Limitations: files *modified* (not added or removed) inside the container \
                  after mount keep their original directory listing; their content is still \
                  read live. Write buffers that are never flushed are discarded on close."
)]
struct Args {
    #[command(subcommand)]
    command: Option<Command>,
}

#[derive(Subcommand)]
enum Command {
    /// Mount a container filesystem and serve it until interrupted.
    Mount {
        /// Container id or name.
        #[arg(short, long)]
        id: String,

        /// Directory to mount the container filesystem on.
        #[arg(short, long)]
        mount_point: PathBuf,

        /// Run the filesystem server in the background.
        #[arg(short, long)]
        daemonize: bool,

        /// Path to the container runtime's control socket.
        #[arg(long, default_value = DEFAULT_DOCKER_SOCKET)]
        docker_socket: PathBuf,

        /// Seconds between refreshes of the container change list.
        #[arg(long, default_value_t = 30)]
        refresh_interval: u64,
    },

    /// Interactively pick containers to mount or unmount.
    Select {
        /// Path to the container runtime's control socket.
        #[arg(long, default_value = DEFAULT_DOCKER_SOCKET)]
        docker_socket: PathBuf,
    },
}

/// Initialize tracing. Exits the process on failure.
#[expect(
    clippy::exit,
    reason = "top-level helper that intentionally terminates the process"
)]
fn init_tracing() -> TrcHandle {
    Trc::default().init().unwrap_or_else(|e| {
        eprintln!(
            "Failed to initialize logging. Without logging, we can't provide any useful error \
             messages, so we have to exit: {e}"
        );
        std::process::exit(1);
    })
}

/// Main entry point for the application.
#[expect(
    clippy::exit,
    reason = "main maps runtime failures to process exit codes"
)]
fn main() {
    let args = Args::parse();

    let command = args.command.unwrap_or(Command::Select {
        docker_socket: PathBuf::from(DEFAULT_DOCKER_SOCKET),
    });

    match command {
        Command::Mount {
            id,
            mount_point,
            daemonize,
            docker_socket,
            refresh_interval,
        } => {
            // Load config first — errors use eprintln since tracing isn't
            // initialized yet.
            let config = Config::for_mount(id, mount_point, docker_socket, refresh_interval);
            if let Err(error_messages) = config.validate() {
                eprintln!("Configuration is invalid.");
                for msg in &error_messages {
                    eprintln!(" - {msg}");
                }
                std::process::exit(1);
            }

            if let Err(e) = fuse_check::ensure_fuse() {
                eprintln!("{e}");
                std::process::exit(1);
            }

            if daemonize {
                run_daemonized(config);
            } else {
                let _trc_handle = init_tracing();
                if let Err(e) = daemon::spawn(config) {
                    error!("Daemon failed: {e}");
                    std::process::exit(1);
                }
            }
        }
        Command::Select { docker_socket } => {
            let _trc_handle = init_tracing();
            if let Err(e) = selector::run(&docker_socket) {
                error!("Selector failed: {e}");
                std::process::exit(1);
            }
        }
    }
}

/// Run the daemon in the background. Tracing is initialized *after* the fork
/// so the subscriber's worker state lives in the child process.
#[expect(
    clippy::exit,
    reason = "top-level helper that intentionally terminates the process"
)]
fn run_daemonized(config: Config) {
    // Pre-fork: no tracing yet. Use eprintln! for error reporting.
    {
        use std::os::unix::fs::DirBuilderExt as _;
        let mut dir_builder = std::fs::DirBuilder::new();
        dir_builder.recursive(true).mode(0o750);
        if let Err(e) = dir_builder.create(&config.cache_dir) {
            eprintln!(
                "Failed to create cache directory {}: {e}",
                config.cache_dir.display()
            );
            std::process::exit(1);
        }
    }

    let log_file = match std::fs::File::create(&config.log_file) {
        Ok(f) => f,
        Err(e) => {
            eprintln!("Failed to open log file {}: {e}", config.log_file.display());
            std::process::exit(1);
        }
    };
    let log_clone = match log_file.try_clone() {
        Ok(clone) => clone,
        Err(e) => {
            eprintln!("Failed to clone log file handle: {e}");
            std::process::exit(1);
        }
    };

    let daemonize = daemonize::Daemonize::new()
        .pid_file(&config.pid_file)
        .working_directory(std::env::temp_dir())
        .stdout(log_file)
        .stderr(log_clone);

    match daemonize.start() {
        Ok(()) => {
            let trc_handle = init_tracing();
            trc_handle.reconfigure_for_daemon();

            if let Err(e) = daemon::spawn(config) {
                error!("Daemon failed: {e}");
                std::process::exit(1);
            }
        }
        Err(e) => {
            eprintln!("Failed to spawn the daemon: {e}");
            std::process::exit(1);
        }
    }
}
