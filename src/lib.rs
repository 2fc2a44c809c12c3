//! Provider-neutral LLM client core.
//!
//! The crate separates three concerns:
//!
//! - a neutral data model for chat completion requests and responses
//!   ([`types`]), including tool calling and extended reasoning;
//! - resilience primitives: message-classified retry with exponential
//!   backoff ([`retry`]) and per-call deadlines with cooperative
//!   cancellation ([`deadline`]);
//! - vendor adapters behind the [`Provider`] trait, currently the
//!   Anthropic Messages API with full SSE stream reconstruction.
//!
//! [`LlmClient`] ties them together: it retries whole non-streaming calls
//! under fresh deadlines and opens streams whose deadline covers iteration,
//! not just connection establishment.
//!
//! ```no_run
//! use std::sync::Arc;
//!
//! use valet_llm::client::LlmClient;
//! use valet_llm::http::reqwest::ReqwestTransport;
//! use valet_llm::provider::anthropic::AnthropicProvider;
//! use valet_llm::types::{CompletionRequest, Message, Role};
//!
//! # async fn run() -> Result<(), valet_llm::error::LlmError> {
//! let transport = Arc::new(ReqwestTransport::default_client()?);
//! let provider = Arc::new(AnthropicProvider::new(transport, "sk-..."));
//! let client = LlmClient::new(provider);
//!
//! let request = CompletionRequest::new(
//!     "claude-sonnet-4",
//!     vec![Message::text(Role::User, "Summarize RFC 2119 in one line.")],
//! );
//! let response = client.complete(&request).await?;
//! println!("{}", response.content);
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod deadline;
pub mod error;
pub mod http;
pub mod provider;
pub mod retry;
pub mod sanitize;
pub mod types;

pub use client::LlmClient;
pub use config::ClientConfig;
pub use deadline::CallContext;
pub use error::LlmError;
pub use provider::{CompletionStream, DynProvider, Provider};
pub use retry::RetryConfig;
pub use types::{
    CompletionRequest, CompletionResponse, FinishReason, Message, MessageContent, Role,
    StreamChunk, ThinkingBlock, ThinkingConfig, ToolCall, ToolChoice, ToolDefinition, ToolResult,
    Usage,
};
