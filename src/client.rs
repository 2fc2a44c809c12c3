//! High-level client: layers retry and per-call deadlines over a provider.
//!
//! Non-streaming calls are retried as whole units: each attempt gets a
//! fresh [`CallContext`], so a retry never inherits a half-spent deadline.
//! Streaming calls are never retried: once chunks may have been observed,
//! replaying the operation would duplicate output, so failures surface to
//! the caller who restarts from scratch.

use std::time::Duration;

use tokio_util::sync::CancellationToken;

use crate::deadline::{self, CallContext, DEFAULT_TIMEOUT_MS};
use crate::error::LlmError;
use crate::provider::{CompletionStream, DynProvider};
use crate::retry::{RetryConfig, with_retry};
use crate::types::{CompletionRequest, CompletionResponse};

/// Provider-agnostic entry point for completion calls.
pub struct LlmClient {
    provider: DynProvider,
    retry: RetryConfig,
    timeout: Duration,
}

impl LlmClient {
    /// Wraps a provider with the default deadline and retry policy.
    pub fn new(provider: DynProvider) -> Self {
        Self {
            provider,
            retry: RetryConfig::default(),
            timeout: Duration::from_millis(DEFAULT_TIMEOUT_MS),
        }
    }

    /// Overrides the per-call deadline.
    pub fn with_timeout(mut self, timeout: Duration) -> Self {
        self.timeout = timeout;
        self
    }

    /// Overrides the retry policy.
    pub fn with_retry_config(mut self, retry: RetryConfig) -> Self {
        self.retry = retry;
        self
    }

    /// Identifier of the wrapped provider.
    pub fn provider_name(&self) -> &'static str {
        self.provider.name()
    }

    /// Runs a completion under the default cancellation token.
    ///
    /// # Errors
    ///
    /// Returns the provider's error once retries are exhausted, or
    /// immediately for non-retryable failures.
    pub async fn complete(
        &self,
        request: &CompletionRequest,
    ) -> Result<CompletionResponse, LlmError> {
        self.complete_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Runs a completion that the caller can abort through `cancel`.
    ///
    /// # Errors
    ///
    /// Cancellation surfaces as [`LlmError::Timeout`].
    pub async fn complete_with_cancel(
        &self,
        request: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<CompletionResponse, LlmError> {
        tracing::debug!(
            provider = self.provider.name(),
            model = %request.model,
            messages = request.messages.len(),
            "starting completion"
        );
        let response = with_retry(
            || {
                let ctx = CallContext::with_cancel(self.timeout, cancel.clone());
                async move { deadline::enforce(&ctx, self.provider.complete(request)).await }
            },
            &self.retry,
        )
        .await?;
        tracing::debug!(
            provider = self.provider.name(),
            finish_reason = ?response.finish_reason,
            total_tokens = response.usage.total_tokens,
            "completion succeeded"
        );
        Ok(response)
    }

    /// Opens a completion stream under the default cancellation token.
    ///
    /// # Errors
    ///
    /// Connection failures surface directly; streams are not retried.
    pub async fn stream(&self, request: &CompletionRequest) -> Result<CompletionStream, LlmError> {
        self.stream_with_cancel(request, CancellationToken::new())
            .await
    }

    /// Opens a completion stream that the caller can abort through `cancel`.
    ///
    /// The deadline covers the whole stream, iteration included, not just
    /// connection establishment.
    ///
    /// # Errors
    ///
    /// Connection failures surface directly; streams are not retried.
    pub async fn stream_with_cancel(
        &self,
        request: &CompletionRequest,
        cancel: CancellationToken,
    ) -> Result<CompletionStream, LlmError> {
        tracing::debug!(
            provider = self.provider.name(),
            model = %request.model,
            "opening stream"
        );
        let ctx = CallContext::with_cancel(self.timeout, cancel);
        deadline::enforce(&ctx, self.provider.stream(request, ctx.clone())).await
    }
}
