//! Rust client for the container-control API spoken over a unix socket.

pub mod backends;
mod client;
mod containers;
pub mod error;
pub mod http_client;
pub mod models;

pub use client::DockerClient;
pub use containers::{ContainerHandle, ContainersResource};
