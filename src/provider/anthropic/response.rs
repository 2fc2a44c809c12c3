//! Normalizes a non-streaming Messages response.
//!
//! A single walk over the content-block array produces the same shapes the
//! streaming path produces, so callers cannot tell the two origins apart.

use crate::error::LlmError;
use crate::sanitize::desanitize_tool_name;
use crate::types::{CompletionResponse, FinishReason, ThinkingBlock, ToolCall, Usage};

use super::types::{MessagesResponse, WireUsage};

pub(crate) fn map_response(resp: MessagesResponse) -> Result<CompletionResponse, LlmError> {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    let mut thinking = String::new();
    let mut thinking_blocks = Vec::new();

    for block in &resp.content {
        match block.kind.as_str() {
            "text" => {
                if let Some(text) = &block.text {
                    content.push_str(text);
                }
            }
            "tool_use" => {
                let input = block.input.clone().unwrap_or_else(|| serde_json::json!({}));
                tool_calls.push(ToolCall {
                    id: block.id.clone().unwrap_or_default(),
                    name: desanitize_tool_name(block.name.as_deref().unwrap_or_default()),
                    arguments: serde_json::to_string(&input)
                        .unwrap_or_else(|_| "{}".to_string()),
                });
            }
            "thinking" => {
                let text = block.thinking.clone().unwrap_or_default();
                thinking.push_str(&text);
                thinking_blocks.push(ThinkingBlock::Visible {
                    text,
                    signature: block.signature.clone().unwrap_or_default(),
                });
            }
            "redacted_thinking" => {
                thinking_blocks.push(ThinkingBlock::Redacted {
                    data: block.data.clone().unwrap_or_default(),
                });
            }
            other => {
                tracing::debug!(kind = other, "skipping unrecognized content block");
            }
        }
    }

    Ok(CompletionResponse {
        content,
        tool_calls: if tool_calls.is_empty() {
            None
        } else {
            Some(tool_calls)
        },
        finish_reason: map_stop_reason(resp.stop_reason.as_deref()),
        usage: resp.usage.as_ref().map(map_usage).unwrap_or_default(),
        thinking: if thinking.is_empty() {
            None
        } else {
            Some(thinking)
        },
        thinking_blocks: if thinking_blocks.is_empty() {
            None
        } else {
            Some(thinking_blocks)
        },
    })
}

/// Fixed stop-reason table. Unrecognized vendor values normalize to `Stop`;
/// this path never errors.
pub(crate) fn map_stop_reason(reason: Option<&str>) -> FinishReason {
    match reason {
        Some("end_turn") | Some("stop_sequence") => FinishReason::Stop,
        Some("max_tokens") => FinishReason::Length,
        Some("tool_use") => FinishReason::ToolCalls,
        Some("refusal") => FinishReason::ContentFilter,
        _ => FinishReason::Stop,
    }
}

pub(crate) fn map_usage(usage: &WireUsage) -> Usage {
    let prompt = usage.input_tokens.unwrap_or(0);
    let completion = usage.output_tokens.unwrap_or(0);
    Usage {
        prompt_tokens: prompt,
        completion_tokens: completion,
        total_tokens: prompt + completion,
        cached_tokens: usage.cache_read_input_tokens,
    }
}
