//! Messages API provider.

use std::collections::HashMap;

use async_trait::async_trait;

use crate::deadline::CallContext;
use crate::error::LlmError;
use crate::http::{DynHttpTransport, post_json_stream_with_headers, post_json_with_headers};
use crate::provider::{CompletionStream, Provider};
use crate::types::{CompletionRequest, CompletionResponse};

use super::error::parse_messages_error;
use super::request::build_messages_body;
use super::response::map_response;
use super::stream::{collect_stream_text, create_stream};
use super::types::MessagesResponse;

const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";
const DEFAULT_VERSION: &str = "2023-06-01";

/// Provider for the Messages API and compatible gateways.
pub struct AnthropicProvider {
    transport: DynHttpTransport,
    base_url: String,
    api_key: String,
    version: String,
}

impl AnthropicProvider {
    pub fn new(transport: DynHttpTransport, api_key: impl Into<String>) -> Self {
        Self {
            transport,
            base_url: DEFAULT_BASE_URL.to_string(),
            api_key: api_key.into(),
            version: DEFAULT_VERSION.to_string(),
        }
    }

    /// Points the provider at a compatible gateway.
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into();
        self
    }

    /// Overrides the `anthropic-version` header.
    pub fn with_version(mut self, version: impl Into<String>) -> Self {
        self.version = version.into();
        self
    }

    /// Gateways configure base URLs with or without the `/v1` suffix;
    /// accept both.
    fn endpoint(&self) -> String {
        let base = self.base_url.trim_end_matches('/');
        if base.ends_with("/v1") {
            format!("{base}/messages")
        } else {
            format!("{base}/v1/messages")
        }
    }

    fn build_headers(&self) -> HashMap<String, String> {
        HashMap::from([
            ("Content-Type".to_string(), "application/json".to_string()),
            ("x-api-key".to_string(), self.api_key.clone()),
            ("anthropic-version".to_string(), self.version.clone()),
        ])
    }
}

#[async_trait]
impl Provider for AnthropicProvider {
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = build_messages_body(request, false)?;
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "dispatching completion"
        );

        let response =
            post_json_with_headers(&*self.transport, self.endpoint(), self.build_headers(), &body)
                .await?;
        if !(200..300).contains(&response.status) {
            let status = response.status;
            return Err(parse_messages_error(status, &response.into_string()?));
        }

        let parsed: MessagesResponse = serde_json::from_slice(&response.body)
            .map_err(|err| LlmError::internal(format!("failed to parse response: {err}")))?;
        let mapped = map_response(parsed)?;
        tracing::debug!(
            finish_reason = ?mapped.finish_reason,
            total_tokens = mapped.usage.total_tokens,
            "completion finished"
        );
        Ok(mapped)
    }

    async fn stream(
        &self,
        request: &CompletionRequest,
        ctx: CallContext,
    ) -> Result<CompletionStream, LlmError> {
        let body = build_messages_body(request, true)?;
        tracing::debug!(
            model = %request.model,
            messages = request.messages.len(),
            "opening completion stream"
        );

        let response = post_json_stream_with_headers(
            &*self.transport,
            self.endpoint(),
            self.build_headers(),
            &body,
        )
        .await?;
        if !(200..300).contains(&response.status) {
            let status = response.status;
            let text = collect_stream_text(response.body).await?;
            return Err(parse_messages_error(status, &text));
        }

        Ok(create_stream(response.body, &ctx))
    }

    fn name(&self) -> &'static str {
        "anthropic"
    }
}
