//! Wire structs for the Messages API, streaming and non-streaming.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Non-streaming response payload.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct MessagesResponse {
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) model: Option<String>,
    /// Ordered content blocks.
    #[serde(default)]
    pub(crate) content: Vec<WireContentBlock>,
    #[serde(default)]
    pub(crate) stop_reason: Option<String>,
    #[serde(default)]
    pub(crate) usage: Option<WireUsage>,
}

/// One content block: text, tool invocation, or reasoning segment.
///
/// A single struct with optional fields rather than an enum, because
/// compatibility layers add fields freely and the block kind alone decides
/// which ones matter.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub(crate) struct WireContentBlock {
    #[serde(rename = "type")]
    pub(crate) kind: String,
    #[serde(default)]
    pub(crate) text: Option<String>,
    #[serde(default)]
    pub(crate) id: Option<String>,
    #[serde(default)]
    pub(crate) name: Option<String>,
    #[serde(default)]
    pub(crate) input: Option<Value>,
    /// Visible reasoning text.
    #[serde(default)]
    pub(crate) thinking: Option<String>,
    /// Continuity signature; replayed verbatim, never interpreted.
    #[serde(default)]
    pub(crate) signature: Option<String>,
    /// Opaque payload of a redacted reasoning block.
    #[serde(default)]
    pub(crate) data: Option<String>,
}

/// Usage counters as reported on the wire.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize)]
pub(crate) struct WireUsage {
    #[serde(default)]
    pub(crate) input_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) output_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) cache_read_input_tokens: Option<u64>,
    #[serde(default)]
    pub(crate) cache_creation_input_tokens: Option<u64>,
}

/// Streaming event union.
///
/// Closed tagged type dispatched exhaustively; frames carrying a tag this
/// enum does not know land in `Unknown` and are logged and skipped rather
/// than aborting the stream.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WireStreamEvent {
    MessageStart {
        message: WireMessageStart,
    },
    ContentBlockStart {
        index: u64,
        content_block: WireContentBlock,
    },
    ContentBlockDelta {
        index: u64,
        delta: WireBlockDelta,
    },
    ContentBlockStop {
        index: u64,
    },
    MessageDelta {
        delta: WireMessageDelta,
        #[serde(default)]
        usage: Option<WireUsage>,
    },
    MessageStop,
    Ping,
    #[serde(other)]
    Unknown,
}

/// Envelope of the `message_start` event.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireMessageStart {
    #[serde(default)]
    pub(crate) usage: Option<WireUsage>,
}

/// Delta payload inside a `content_block_delta` event.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub(crate) enum WireBlockDelta {
    TextDelta { text: String },
    /// Raw JSON fragment of tool arguments; not independently valid JSON.
    InputJsonDelta { partial_json: String },
    ThinkingDelta { thinking: String },
    SignatureDelta { signature: String },
    #[serde(other)]
    Unknown,
}

/// Body of a `message_delta` event.
#[derive(Debug, Clone, Deserialize)]
pub(crate) struct WireMessageDelta {
    #[serde(default)]
    pub(crate) stop_reason: Option<String>,
}
