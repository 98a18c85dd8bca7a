//! The top-level client value.

use tokio_util::sync::CancellationToken;

use crate::containers::{ContainerHandle, ContainersResource};
use crate::error::HttpClientError;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse, StreamingResponse};

/// Client for the container-control API.
///
/// Construction-only: it holds a transport backend and a cancellation token,
/// no per-request state. Timeouts and retries are the caller's concern.
#[derive(Debug, Clone)]
pub struct DockerClient<C: HttpClient> {
    backend: C,
    cancel: CancellationToken,
}

impl<C: HttpClient> DockerClient<C> {
    /// Create a client over `backend`.
    pub fn new(backend: C) -> Self {
        Self {
            backend,
            cancel: CancellationToken::new(),
        }
    }

    /// Tie every request to `token`.
    ///
    /// Canceling the token aborts in-flight requests promptly; they resolve
    /// to [`ApiError::Canceled`](crate::error::ApiError::Canceled).
    #[must_use]
    pub fn with_cancellation(mut self, token: CancellationToken) -> Self {
        self.cancel = token;
        self
    }

    pub(crate) async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(HttpClientError::Canceled),
            result = self.backend.send(request) => result,
        }
    }

    pub(crate) async fn stream(
        &self,
        request: HttpRequest,
    ) -> Result<StreamingResponse, HttpClientError> {
        tokio::select! {
            () = self.cancel.cancelled() => Err(HttpClientError::Canceled),
            result = self.backend.stream(request) => result,
        }
    }

    /// Operations on the container collection.
    pub fn containers(&self) -> ContainersResource<'_, C> {
        ContainersResource::new(self)
    }

    /// Operations scoped to a single container.
    pub fn container(&self, id: &str) -> ContainerHandle<'_, C> {
        ContainerHandle::new(self, id.to_owned())
    }
}
