//! HTTP/1.1 over a unix-domain socket, built on hyper.
//!
//! Each request opens a fresh connection. The container runtime's daemon
//! accepts that cheaply on a local socket, and it keeps this backend free of
//! connection-pool state, which matches the construction-only contract of
//! the client.

use std::path::PathBuf;

use futures::TryStreamExt as _;
use http::header::HOST;
use http_body_util::{BodyExt as _, BodyStream, Full};
use hyper_util::rt::TokioIo;
use tokio::net::UnixStream;
use tracing::debug;

use crate::error::HttpClientError;
use crate::http_client::{HttpClient, HttpRequest, HttpResponse, StreamingResponse};

/// An [`HttpClient`] implementation speaking HTTP/1.1 over a unix socket.
#[derive(Debug, Clone)]
pub struct UnixSocketClient {
    socket_path: PathBuf,
}

impl UnixSocketClient {
    /// Create a client for the socket at `socket_path`.
    pub fn new(socket_path: impl Into<PathBuf>) -> Self {
        Self {
            socket_path: socket_path.into(),
        }
    }

    async fn dispatch(
        &self,
        request: HttpRequest,
    ) -> Result<http::Response<hyper::body::Incoming>, HttpClientError> {
        let stream = UnixStream::connect(&self.socket_path).await.map_err(|e| {
            HttpClientError::Connection(format!("{}: {e}", self.socket_path.display()))
        })?;

        let (mut sender, conn) = hyper::client::conn::http1::handshake(TokioIo::new(stream))
            .await
            .map_err(|e| HttpClientError::Connection(e.to_string()))?;

        // The connection task drives socket I/O until the response body is
        // fully consumed or dropped.
        tokio::spawn(async move {
            if let Err(e) = conn.await {
                debug!(error = %e, "connection task finished with error");
            }
        });

        let mut builder = http::Request::builder()
            .method(request.method)
            .uri(request.target.as_str())
            .header(HOST, "localhost");
        for (name, value) in &request.headers {
            builder = builder.header(name, value);
        }
        let req = builder
            .body(Full::new(request.body.unwrap_or_default()))
            .map_err(|e| HttpClientError::Other(Box::new(e)))?;

        sender.send_request(req).await.map_err(|e| {
            if e.is_canceled() {
                HttpClientError::Canceled
            } else {
                HttpClientError::Connection(e.to_string())
            }
        })
    }
}

impl HttpClient for UnixSocketClient {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, HttpClientError> {
        let response = self.dispatch(request).await?;
        let (parts, body) = response.into_parts();
        let body = body
            .collect()
            .await
            .map_err(|e| HttpClientError::Connection(e.to_string()))?
            .to_bytes();
        Ok(HttpResponse {
            status: parts.status,
            headers: parts.headers,
            body,
        })
    }

    async fn stream(&self, request: HttpRequest) -> Result<StreamingResponse, HttpClientError> {
        let response = self.dispatch(request).await?;
        let (parts, body) = response.into_parts();
        let frames = futures::TryStreamExt::map_err(BodyStream::new(body), |e| {
            HttpClientError::Connection(e.to_string())
        })
        .try_filter_map(|frame| async move { Ok(frame.into_data().ok()) });
        Ok(StreamingResponse {
            status: parts.status,
            headers: parts.headers,
            body: Box::pin(frames),
        })
    }
}
