//! The container-control operations the filesystem core depends on.

use async_trait::async_trait;
use bytes::Bytes;

use docker_api::DockerClient;
use docker_api::error::ApiError;
use docker_api::http_client::{ByteStream, HttpClient};
use docker_api::models::{Change, PathStat};

/// The five container-control operations the core is built on.
///
/// [`DockerContainerApi`] is the production implementation; tests substitute
/// their own.
#[async_trait]
pub trait ContainerApi: Send + Sync + 'static {
    /// Stream a tar archive of the container's entire root filesystem.
    async fn export(&self) -> Result<ByteStream, ApiError>;

    /// Live attributes of a path inside the container.
    async fn stat_path(&self, path: &str) -> Result<PathStat, ApiError>;

    /// The paths changed since the container started.
    async fn changes(&self) -> Result<Vec<Change>, ApiError>;

    /// Stream a tar archive containing `path` and its content.
    async fn copy_from(&self, path: &str) -> Result<ByteStream, ApiError>;

    /// Upload a tar archive to be extracted at `dir` inside the container.
    async fn copy_to(&self, dir: &str, archive: Bytes) -> Result<(), ApiError>;
}

/// [`ContainerApi`] bound to one container id on a [`DockerClient`].
pub struct DockerContainerApi<C: HttpClient> {
    client: DockerClient<C>,
    id: String,
}

impl<C: HttpClient> DockerContainerApi<C> {
    /// Scope `client` to the container `id`.
    pub fn new(client: DockerClient<C>, id: impl Into<String>) -> Self {
        Self {
            client,
            id: id.into(),
        }
    }
}

#[async_trait]
impl<C: HttpClient + 'static> ContainerApi for DockerContainerApi<C> {
    async fn export(&self) -> Result<ByteStream, ApiError> {
        self.client.container(&self.id).export().await
    }

    async fn stat_path(&self, path: &str) -> Result<PathStat, ApiError> {
        self.client.container(&self.id).stat_path(path).await
    }

    async fn changes(&self) -> Result<Vec<Change>, ApiError> {
        self.client.container(&self.id).changes().await
    }

    async fn copy_from(&self, path: &str) -> Result<ByteStream, ApiError> {
        self.client.container(&self.id).copy_from(path).await
    }

    async fn copy_to(&self, dir: &str, archive: Bytes) -> Result<(), ApiError> {
        self.client.container(&self.id).copy_to(dir, archive).await
    }
}
