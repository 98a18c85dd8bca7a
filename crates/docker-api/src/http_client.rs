//! HTTP client abstraction for pluggable backends.

use bytes::Bytes;
use futures::stream::BoxStream;
use http::{HeaderMap, HeaderName, HeaderValue, Method, StatusCode};
use std::future::Future;

use crate::error::HttpClientError;

/// An HTTP request to be sent by an [`HttpClient`] implementation.
///
/// `target` is the origin-form path and query (e.g.
/// `/containers/{id}/changes`); the backend supplies the transport and the
/// authority it applies to.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    /// The HTTP method.
    pub method: Method,
    /// Origin-form path and query.
    pub target: String,
    /// Request headers.
    pub headers: HeaderMap,
    /// Optional request body.
    pub body: Option<Bytes>,
}

impl HttpRequest {
    /// Create a bodiless request.
    pub fn new(method: Method, target: impl Into<String>) -> Self {
        Self {
            method,
            target: target.into(),
            headers: HeaderMap::new(),
            body: None,
        }
    }

    /// Attach a header.
    #[must_use]
    pub fn with_header(mut self, name: HeaderName, value: HeaderValue) -> Self {
        self.headers.insert(name, value);
        self
    }

    /// Attach a body.
    #[must_use]
    pub fn with_body(mut self, body: Bytes) -> Self {
        self.body = Some(body);
        self
    }
}

/// A fully buffered HTTP response.
#[derive(Debug)]
pub struct HttpResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// Response body bytes.
    pub body: Bytes,
}

/// A streaming response body: a fallible stream of data frames.
pub type ByteStream = BoxStream<'static, Result<Bytes, HttpClientError>>;

/// An HTTP response whose body is consumed incrementally.
///
/// Used for the archive endpoints, whose bodies are tar streams that can be
/// arbitrarily large.
pub struct StreamingResponse {
    /// The HTTP status code.
    pub status: StatusCode,
    /// Response headers.
    pub headers: HeaderMap,
    /// The body frames.
    pub body: ByteStream,
}

/// Trait for pluggable HTTP client backends.
///
/// Uses Rust edition 2024's native `impl Future` in traits (RPITIT) —
/// no `async-trait` macro required.
pub trait HttpClient: Send + Sync {
    /// Send a request and buffer the whole response body.
    fn send(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<HttpResponse, HttpClientError>> + Send;

    /// Send a request and hand back the response body as a stream.
    fn stream(
        &self,
        request: HttpRequest,
    ) -> impl Future<Output = Result<StreamingResponse, HttpClientError>> + Send;
}
