//! Minimal HTTP transport abstraction.
//!
//! Providers speak JSON-over-POST exclusively, so the surface here is small:
//! a request/response pair, a streaming-body variant for SSE, and the
//! [`HttpTransport`] trait that decouples providers from the concrete HTTP
//! client. Tests inject in-memory transports through the same trait.

use std::collections::HashMap;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use futures_core::Stream;
use serde::Serialize;

use crate::error::LlmError;

/// JSON POST request dispatched to a provider endpoint.
#[derive(Debug, Clone)]
pub struct HttpRequest {
    pub url: String,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
    /// Transport-level timeout; the client layer also enforces its own
    /// deadline around the whole call.
    pub timeout: Option<Duration>,
}

impl HttpRequest {
    /// Builds a POST request carrying a serialized JSON body.
    pub fn post_json(url: impl Into<String>, body: Vec<u8>) -> Self {
        Self {
            url: url.into(),
            headers: HashMap::from([("Content-Type".to_string(), "application/json".to_string())]),
            body,
            timeout: None,
        }
    }

    /// Replaces the request headers after construction.
    pub fn with_headers(mut self, headers: HashMap<String, String>) -> Self {
        self.headers = headers;
        self
    }
}

/// Fully buffered HTTP response.
#[derive(Debug, Clone)]
pub struct HttpResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: Vec<u8>,
}

impl HttpResponse {
    /// Decodes the body as UTF-8.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Internal`] when the body is not valid UTF-8.
    pub fn into_string(self) -> Result<String, LlmError> {
        String::from_utf8(self.body)
            .map_err(|err| LlmError::internal(format!("response body is not UTF-8: {err}")))
    }
}

/// HTTP response whose body arrives incrementally.
pub struct HttpStreamResponse {
    pub status: u16,
    pub headers: HashMap<String, String>,
    pub body: HttpBodyStream,
}

/// Byte stream yielded by [`HttpTransport::send_stream`].
pub type HttpBodyStream = Pin<Box<dyn Stream<Item = Result<Vec<u8>, LlmError>> + Send>>;

/// Transport seam between providers and the concrete HTTP client.
#[async_trait]
pub trait HttpTransport: Send + Sync {
    /// Sends a request and resolves once the full response is buffered.
    ///
    /// # Errors
    ///
    /// Implementations map network failures to [`LlmError::Internal`].
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LlmError>;

    /// Sends a request and returns the response body as a byte stream.
    ///
    /// # Errors
    ///
    /// Implementations map network failures to [`LlmError::Internal`].
    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LlmError>;
}

/// Thread-safe handle to a transport implementation.
pub type DynHttpTransport = Arc<dyn HttpTransport>;

/// Serializes `body` to JSON, attaches headers, and issues a buffered POST.
///
/// # Errors
///
/// Returns [`LlmError::Validation`] when serialization fails, otherwise
/// forwards the transport's error.
pub async fn post_json_with_headers<T: Serialize>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
) -> Result<HttpResponse, LlmError> {
    let payload = serde_json::to_vec(body).map_err(|err| LlmError::Validation {
        message: format!("failed to serialize request: {err}"),
    })?;
    let request = HttpRequest::post_json(url, payload).with_headers(headers);
    transport.send(request).await
}

/// Streaming counterpart of [`post_json_with_headers`].
///
/// # Errors
///
/// Returns [`LlmError::Validation`] when serialization fails, otherwise
/// forwards the transport's error.
pub async fn post_json_stream_with_headers<T: Serialize>(
    transport: &dyn HttpTransport,
    url: impl Into<String>,
    headers: HashMap<String, String>,
    body: &T,
) -> Result<HttpStreamResponse, LlmError> {
    let payload = serde_json::to_vec(body).map_err(|err| LlmError::Validation {
        message: format!("failed to serialize request: {err}"),
    })?;
    let request = HttpRequest::post_json(url, payload).with_headers(headers);
    transport.send_stream(request).await
}

pub mod reqwest;
