//! Container resources: the listing plus the archive-oriented operations
//! the filesystem is built on.

use base64::Engine as _;
use bytes::Bytes;
use http::header::CONTENT_TYPE;
use http::{HeaderValue, Method, StatusCode};

use crate::client::DockerClient;
use crate::error::ApiError;
use crate::http_client::{ByteStream, HttpClient, HttpRequest};
use crate::models::{Change, ContainerSummary, PathStat};

/// Name of the response header carrying the base64-encoded JSON stat payload.
const PATH_STAT_HEADER: &str = "X-Docker-Container-Path-Stat";

/// Operations on the container collection.
pub struct ContainersResource<'c, C: HttpClient> {
    client: &'c DockerClient<C>,
}

impl<'c, C: HttpClient> ContainersResource<'c, C> {
    pub(crate) fn new(client: &'c DockerClient<C>) -> Self {
        Self { client }
    }

    /// List the containers known to the runtime.
    pub async fn list(&self) -> Result<Vec<ContainerSummary>, ApiError> {
        let response = self
            .client
            .send(HttpRequest::new(Method::GET, "/containers/json"))
            .await?;
        if response.status != StatusCode::OK {
            return Err(ApiError::Protocol(format!(
                "container listing returned {}",
                response.status
            )));
        }
        serde_json::from_slice(&response.body)
            .map_err(|e| ApiError::Protocol(format!("undecodable container listing: {e}")))
    }
}

/// Operations scoped to one container.
pub struct ContainerHandle<'c, C: HttpClient> {
    client: &'c DockerClient<C>,
    id: String,
}

impl<'c, C: HttpClient> ContainerHandle<'c, C> {
    pub(crate) fn new(client: &'c DockerClient<C>, id: String) -> Self {
        Self { client, id }
    }

    /// Stream a tar archive of the container's entire root filesystem.
    pub async fn export(&self) -> Result<ByteStream, ApiError> {
        let target = format!("/containers/{}/export", self.id);
        let response = self
            .client
            .stream(HttpRequest::new(Method::GET, target))
            .await?;
        match response.status {
            StatusCode::OK => Ok(response.body),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            status => Err(ApiError::Protocol(format!("export returned {status}"))),
        }
    }

    /// Live attributes of `path` inside the container, without its content.
    pub async fn stat_path(&self, path: &str) -> Result<PathStat, ApiError> {
        let target = format!("/containers/{}/archive?path={path}", self.id);
        let response = self
            .client
            .send(HttpRequest::new(Method::HEAD, target))
            .await?;
        match response.status {
            StatusCode::OK => {}
            StatusCode::NOT_FOUND => return Err(ApiError::NotFound),
            status => {
                return Err(ApiError::Protocol(format!(
                    "stat of {path:?} returned {status}"
                )));
            }
        }

        let header = response
            .headers
            .get(PATH_STAT_HEADER)
            .ok_or_else(|| ApiError::Protocol(format!("{PATH_STAT_HEADER} header missing")))?;
        let raw = base64::engine::general_purpose::STANDARD
            .decode(header.as_bytes())
            .map_err(|e| ApiError::Protocol(format!("{PATH_STAT_HEADER} is not base64: {e}")))?;
        serde_json::from_slice(&raw)
            .map_err(|e| ApiError::Protocol(format!("undecodable path stat: {e}")))
    }

    /// The paths changed since the container started.
    pub async fn changes(&self) -> Result<Vec<Change>, ApiError> {
        let target = format!("/containers/{}/changes", self.id);
        let response = self
            .client
            .send(HttpRequest::new(Method::GET, target))
            .await?;
        if response.status != StatusCode::OK {
            return Err(ApiError::Protocol(format!(
                "change listing returned {}",
                response.status
            )));
        }
        // The runtime reports `null` rather than `[]` when nothing changed.
        let changes: Option<Vec<Change>> = serde_json::from_slice(&response.body)
            .map_err(|e| ApiError::Protocol(format!("undecodable change listing: {e}")))?;
        Ok(changes.unwrap_or_default())
    }

    /// Stream a tar archive containing `path` and its content.
    pub async fn copy_from(&self, path: &str) -> Result<ByteStream, ApiError> {
        let target = format!("/containers/{}/archive?path={path}", self.id);
        let response = self
            .client
            .stream(HttpRequest::new(Method::GET, target))
            .await?;
        match response.status {
            StatusCode::OK => Ok(response.body),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            status => Err(ApiError::Protocol(format!(
                "copy from {path:?} returned {status}"
            ))),
        }
    }

    /// Upload a tar archive to be extracted at `dir` inside the container.
    pub async fn copy_to(&self, dir: &str, archive: Bytes) -> Result<(), ApiError> {
        let target = format!("/containers/{}/archive?path={dir}", self.id);
        let request = HttpRequest::new(Method::PUT, target)
            .with_header(CONTENT_TYPE, HeaderValue::from_static("application/x-tar"))
            .with_body(archive);
        let response = self.client.send(request).await?;
        match response.status {
            StatusCode::OK => Ok(()),
            StatusCode::NOT_FOUND => Err(ApiError::NotFound),
            status => Err(ApiError::Protocol(format!(
                "copy to {dir:?} returned {status}"
            ))),
        }
    }
}
