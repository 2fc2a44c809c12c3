use std::pin::Pin;
use std::sync::Arc;

use async_trait::async_trait;

use crate::deadline::CallContext;
use crate::error::LlmError;
use crate::types::{CompletionRequest, CompletionResponse, StreamChunk};

pub mod anthropic;

/// Lazy, finite, non-restartable sequence of stream chunks.
///
/// Exactly one yielded chunk carries `done = true`; consumers stop pulling
/// after it. A failed stream cannot be resumed; callers restart from
/// scratch.
pub type CompletionStream =
    Pin<Box<dyn futures_core::Stream<Item = Result<StreamChunk, LlmError>> + Send>>;

/// Vendor adapter: maps neutral requests onto one concrete wire format.
///
/// Implementations are pure transport/normalization; resilience (retry,
/// deadline) is layered on by [`crate::client::LlmClient`].
#[async_trait]
pub trait Provider: Send + Sync {
    /// Dispatches a request and waits for the full response.
    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError>;

    /// Dispatches a request and returns the reconstructed chunk stream.
    ///
    /// The [`CallContext`] bounds the whole stream: its deadline and token
    /// also cover iteration, not just connection establishment.
    async fn stream(
        &self,
        request: &CompletionRequest,
        ctx: CallContext,
    ) -> Result<CompletionStream, LlmError>;

    /// Stable provider identifier used in logs.
    fn name(&self) -> &'static str;
}

/// Thread-safe provider handle.
pub type DynProvider = Arc<dyn Provider>;
