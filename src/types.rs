//! Provider-neutral request, response, and streaming data model.
//!
//! These types normalize vendor payloads so the rest of the crate can stay
//! agnostic of individual wire formats. All of them are immutable value
//! objects constructed per call; none persist beyond the call or stream that
//! produced them.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Conversation role understood by every provider.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// Message content: either plain text or an ordered list of typed parts.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    /// Plain UTF-8 text.
    Text(String),
    /// Ordered multimodal parts.
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Concatenates every text part, joining with newlines.
    pub fn text(&self) -> String {
        match self {
            Self::Text(text) => text.clone(),
            Self::Parts(parts) => {
                let mut buffer = String::new();
                for part in parts {
                    if let ContentPart::Text { text } = part {
                        if !buffer.is_empty() {
                            buffer.push('\n');
                        }
                        buffer.push_str(text);
                    }
                }
                buffer
            }
        }
    }
}

/// One typed unit inside a multimodal message.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    /// Text fragment.
    Text { text: String },
    /// Image reference or inline payload.
    Image { source: ImageSource },
}

/// Source for an image part.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ImageSource {
    /// Public URL accessible by the provider.
    Url { url: String },
    /// Base64-encoded inline payload with its MIME type.
    Base64 { data: String, media_type: String },
}

/// Normalized chat message.
///
/// Assistant messages may carry `tool_calls` and prior `thinking_blocks` from
/// an earlier turn; tool messages carry `tool_results`. Optional collections
/// are `None` when empty, never empty vectors; downstream code branches on
/// presence.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
    /// Tool invocations issued by a prior assistant turn.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    /// Reasoning blocks from a prior assistant turn, replayed verbatim.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_blocks: Option<Vec<ThinkingBlock>>,
    /// Results carried by a tool-role message.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_results: Option<Vec<ToolResult>>,
}

impl Message {
    /// Builds a plain-text message for the given role.
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
            tool_calls: None,
            thinking_blocks: None,
            tool_results: None,
        }
    }
}

/// Tool invocation emitted by the model.
///
/// `arguments` stays a JSON-encoded string rather than a parsed object so the
/// type remains transport-agnostic; callers decode it when they execute the
/// tool.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    pub arguments: String,
}

/// Result returned by one tool execution, correlated by call id.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolResult {
    pub id: String,
    pub content: String,
    #[serde(default)]
    pub is_error: bool,
}

/// Extended-reasoning segment produced by the provider.
///
/// The signature and the redacted payload are cryptographic continuity
/// material: they are never interpreted, only stored and replayed verbatim
/// when the assistant turn goes back out on a later round-trip.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ThinkingBlock {
    /// Visible reasoning text plus its verification signature.
    Visible { text: String, signature: String },
    /// Opaque payload the provider chose not to reveal.
    Redacted { data: String },
}

/// Declarative definition of a tool available to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolDefinition {
    /// Internal name; may use dotted namespacing such as `plugin.search_web`.
    pub name: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub description: Option<String>,
    /// JSON Schema describing the input payload.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub input_schema: Option<Value>,
}

/// Policy controlling whether and which tool must be invoked.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ToolChoice {
    /// Provider decides when to call tools.
    Auto,
    /// Tools are disabled for the request.
    None,
    /// Provider must invoke at least one tool.
    Required,
    /// Force a specific tool by internal name.
    Named { name: String },
}

/// Extended-reasoning configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "mode", rename_all = "snake_case")]
pub enum ThinkingConfig {
    /// Provider manages the reasoning budget.
    Adaptive,
    /// Fixed token budget for reasoning chains.
    Manual { budget_tokens: u32 },
}

/// Provider-neutral completion request.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_tokens: Option<u32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub top_p: Option<f32>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stop: Option<Vec<String>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tools: Option<Vec<ToolDefinition>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_choice: Option<ToolChoice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<ThinkingConfig>,
}

impl CompletionRequest {
    /// Builds a minimal request carrying only a model and messages.
    pub fn new(model: impl Into<String>, messages: Vec<Message>) -> Self {
        Self {
            model: model.into(),
            messages,
            max_tokens: None,
            temperature: None,
            top_p: None,
            stop: None,
            tools: None,
            tool_choice: None,
            thinking: None,
        }
    }
}

/// Why generation stopped.
///
/// This is a closed set: unrecognized vendor values normalize to `Stop`,
/// never to an error.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ToolCalls,
    ContentFilter,
    Error,
}

/// Token usage counters reported by the provider.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    /// Prompt tokens served from the provider's prompt cache, when reported.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cached_tokens: Option<u64>,
}

/// Aggregated completion response.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    /// Concatenated visible text output.
    pub content: String,
    /// `None` when the model issued no tool calls.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    pub finish_reason: FinishReason,
    pub usage: Usage,
    /// Concatenated visible reasoning text, when present.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking: Option<String>,
    /// Ordered reasoning blocks preserved verbatim for replay.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_blocks: Option<Vec<ThinkingBlock>>,
}

/// Incremental unit yielded by a streaming call.
///
/// Exactly one chunk per stream carries `done = true`; consumers stop reading
/// after it and may release the transport.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct StreamChunk {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub text: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tool_calls: Option<Vec<ToolCall>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<Usage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub finish_reason: Option<FinishReason>,
    #[serde(default)]
    pub done: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<ChunkMetadata>,
}

impl StreamChunk {
    /// A plain text delta.
    pub fn text(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            ..Self::default()
        }
    }

    /// A reasoning text delta, tagged so a UI can stream it live.
    pub fn thinking(text: impl Into<String>) -> Self {
        Self {
            text: Some(text.into()),
            metadata: Some(ChunkMetadata {
                kind: Some(ChunkKind::Thinking),
                thinking_blocks: None,
            }),
            ..Self::default()
        }
    }
}

/// Extra information attached to a [`StreamChunk`].
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChunkMetadata {
    /// Tags a reasoning delta as `thinking`.
    #[serde(rename = "type", skip_serializing_if = "Option::is_none")]
    pub kind: Option<ChunkKind>,
    /// Finalized reasoning blocks, present only on the terminal chunk.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub thinking_blocks: Option<Vec<ThinkingBlock>>,
}

/// Kind marker for tagged stream chunks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ChunkKind {
    Thinking,
}
