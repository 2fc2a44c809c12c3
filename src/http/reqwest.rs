//! reqwest-backed default transport.

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use futures_util::StreamExt;
use reqwest::Client;

use crate::error::LlmError;

use super::{
    DynHttpTransport, HttpBodyStream, HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport,
};

/// Default [`HttpTransport`] built on [`reqwest::Client`].
pub struct ReqwestTransport {
    client: Client,
}

impl ReqwestTransport {
    /// Wraps a caller-configured client.
    pub fn new(client: Client) -> Self {
        Self { client }
    }

    /// Builds a transport with default client settings.
    ///
    /// # Errors
    ///
    /// Returns [`LlmError::Internal`] when the TLS backend fails to initialize.
    pub fn default_client() -> Result<Self, LlmError> {
        Client::builder()
            .build()
            .map(Self::new)
            .map_err(|err| LlmError::internal(format!("failed to create reqwest client: {err}")))
    }

    fn build_request(&self, request: HttpRequest) -> Result<reqwest::RequestBuilder, LlmError> {
        let mut builder = self.client.post(&request.url);

        if let Some(timeout) = request.timeout {
            builder = builder.timeout(timeout);
        }

        for (name, value) in request.headers {
            let header_name = reqwest::header::HeaderName::from_bytes(name.as_bytes())
                .map_err(|err| LlmError::internal(format!("invalid header name: {err}")))?;
            let header_value = reqwest::header::HeaderValue::from_str(&value).map_err(|err| {
                LlmError::internal(format!("invalid header value for {header_name}: {err}"))
            })?;
            builder = builder.header(header_name, header_value);
        }

        Ok(builder.body(request.body))
    }

    fn headers_to_map(headers: &reqwest::header::HeaderMap) -> HashMap<String, String> {
        headers
            .iter()
            .map(|(name, value)| {
                (
                    name.as_str().to_string(),
                    value.to_str().unwrap_or_default().to_string(),
                )
            })
            .collect()
    }
}

#[async_trait]
impl HttpTransport for ReqwestTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LlmError> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(|err| LlmError::internal(format!("network error: {err}")))?;

        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let body = response
            .bytes()
            .await
            .map_err(|err| LlmError::internal(format!("network error: {err}")))?
            .to_vec();

        Ok(HttpResponse {
            status,
            headers,
            body,
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LlmError> {
        let response = self
            .build_request(request)?
            .send()
            .await
            .map_err(|err| LlmError::internal(format!("network error: {err}")))?;

        let status = response.status().as_u16();
        let headers = Self::headers_to_map(response.headers());
        let stream = response.bytes_stream().map(|chunk| {
            chunk
                .map(|bytes| bytes.to_vec())
                .map_err(|err| LlmError::internal(format!("network error: {err}")))
        });
        let body: HttpBodyStream = Box::pin(stream);

        Ok(HttpStreamResponse {
            status,
            headers,
            body,
        })
    }
}

/// Convenience constructor for a shared default transport.
///
/// # Errors
///
/// Returns [`LlmError::Internal`] when the underlying client cannot be built.
pub fn default_dyn_transport() -> Result<DynHttpTransport, LlmError> {
    Ok(Arc::new(ReqwestTransport::default_client()?))
}
