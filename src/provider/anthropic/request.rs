//! Maps a neutral [`CompletionRequest`] onto the Messages API wire body.

use serde_json::{Map, Value, json};

use crate::error::LlmError;
use crate::sanitize::sanitize_tool_name;
use crate::types::{
    CompletionRequest, ContentPart, ImageSource, Message, MessageContent, Role, ThinkingBlock,
    ThinkingConfig, ToolChoice,
};

/// The wire requires `max_tokens`; used when the caller leaves it unset.
pub(crate) const DEFAULT_MAX_TOKENS: u32 = 4096;

/// Ordered markers separating the static system-prompt prefix from the
/// per-call dynamic suffix. First match wins; the static prefix is annotated
/// cache-eligible so the provider reuses it across calls.
pub(crate) const DYNAMIC_SECTION_MARKERS: &[&str] =
    &["# Current Session", "## Dynamic Context", "Current time:"];

pub(crate) fn build_messages_body(
    request: &CompletionRequest,
    stream: bool,
) -> Result<Value, LlmError> {
    if request.model.trim().is_empty() {
        return Err(LlmError::validation("model is required"));
    }

    let mut body = Map::new();
    body.insert("model".to_string(), Value::String(request.model.clone()));
    body.insert(
        "max_tokens".to_string(),
        Value::from(request.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS)),
    );

    // System messages fold into the top-level `system` block list; everything
    // else becomes the conversation.
    let mut system_texts = Vec::new();
    let mut messages = Vec::new();
    for message in &request.messages {
        match message.role {
            Role::System => {
                let text = message.content.text();
                if !text.is_empty() {
                    system_texts.push(text);
                }
            }
            _ => messages.push(convert_message(message)?),
        }
    }

    if messages.is_empty() {
        return Err(LlmError::validation(
            "request requires at least one non-system message",
        ));
    }
    body.insert("messages".to_string(), Value::Array(messages));

    if !system_texts.is_empty() {
        let system = system_texts.join("\n\n");
        body.insert(
            "system".to_string(),
            Value::Array(split_system_blocks(&system)),
        );
    }

    let thinking_enabled = request.thinking.is_some();

    // The vendor contract forbids combining temperature with thinking.
    if let Some(temperature) = request.temperature {
        if !thinking_enabled {
            body.insert("temperature".to_string(), Value::from(temperature));
        }
    }
    if let Some(top_p) = request.top_p {
        body.insert("top_p".to_string(), Value::from(top_p));
    }
    if let Some(stop) = &request.stop {
        if !stop.is_empty() {
            body.insert("stop_sequences".to_string(), json!(stop));
        }
    }

    if let Some(thinking) = &request.thinking {
        body.insert("thinking".to_string(), convert_thinking(thinking));
    }

    if let Some(tools) = &request.tools {
        if !tools.is_empty() {
            let converted = tools
                .iter()
                .map(|tool| {
                    json!({
                        "name": sanitize_tool_name(&tool.name),
                        "description": tool.description,
                        "input_schema": tool.input_schema.clone().unwrap_or_else(|| json!({"type": "object"})),
                    })
                })
                .collect();
            body.insert("tools".to_string(), Value::Array(converted));
        }
    }

    if let Some(choice) = &request.tool_choice {
        if let Some(value) = convert_tool_choice(choice, thinking_enabled) {
            body.insert("tool_choice".to_string(), value);
        }
    }

    body.insert("stream".to_string(), Value::Bool(stream));

    Ok(Value::Object(body))
}

/// Splits the folded system text into cache-annotated blocks.
///
/// The prefix before the first marker is stable across calls and carries a
/// `cache_control` annotation; the suffix from the marker on changes per call
/// and stays uncached. Without a marker the whole prompt is cache-eligible.
/// Pure string transform: no trimming, no re-encoding.
pub(crate) fn split_system_blocks(system: &str) -> Vec<Value> {
    let split_at = DYNAMIC_SECTION_MARKERS
        .iter()
        .find_map(|marker| system.find(marker));

    match split_at {
        Some(0) => vec![json!({ "type": "text", "text": system })],
        Some(pos) => vec![
            json!({
                "type": "text",
                "text": &system[..pos],
                "cache_control": { "type": "ephemeral" },
            }),
            json!({ "type": "text", "text": &system[pos..] }),
        ],
        None => vec![json!({
            "type": "text",
            "text": system,
            "cache_control": { "type": "ephemeral" },
        })],
    }
}

fn convert_message(message: &Message) -> Result<Value, LlmError> {
    let mut blocks = Vec::new();

    match message.role {
        Role::Assistant => {
            // Reasoning blocks replay first and byte-verbatim: the provider
            // verifies their continuity signatures on the next turn.
            if let Some(thinking_blocks) = &message.thinking_blocks {
                for block in thinking_blocks {
                    blocks.push(convert_thinking_block(block));
                }
            }
            push_content_blocks(&message.content, &mut blocks)?;
            if let Some(calls) = &message.tool_calls {
                for call in calls {
                    let input: Value = serde_json::from_str(&call.arguments).map_err(|err| {
                        LlmError::validation(format!(
                            "tool call {} carries invalid JSON arguments: {err}",
                            call.name
                        ))
                    })?;
                    blocks.push(json!({
                        "type": "tool_use",
                        "id": call.id,
                        "name": sanitize_tool_name(&call.name),
                        "input": input,
                    }));
                }
            }
        }
        Role::Tool => {
            // Tool results ride on a user-role turn.
            let results = message.tool_results.as_deref().unwrap_or_default();
            if results.is_empty() {
                return Err(LlmError::validation(
                    "tool message requires at least one tool result",
                ));
            }
            for result in results {
                blocks.push(json!({
                    "type": "tool_result",
                    "tool_use_id": result.id,
                    "content": result.content,
                    "is_error": result.is_error,
                }));
            }
        }
        _ => push_content_blocks(&message.content, &mut blocks)?,
    }

    if blocks.is_empty() {
        return Err(LlmError::validation(
            "message must contain at least one content block",
        ));
    }

    let role = match message.role {
        Role::Assistant => "assistant",
        _ => "user",
    };
    Ok(json!({ "role": role, "content": blocks }))
}

fn push_content_blocks(content: &MessageContent, blocks: &mut Vec<Value>) -> Result<(), LlmError> {
    match content {
        MessageContent::Text(text) => {
            if !text.is_empty() {
                blocks.push(json!({ "type": "text", "text": text }));
            }
        }
        MessageContent::Parts(parts) => {
            for part in parts {
                blocks.push(convert_content_part(part)?);
            }
        }
    }
    Ok(())
}

fn convert_content_part(part: &ContentPart) -> Result<Value, LlmError> {
    match part {
        ContentPart::Text { text } => Ok(json!({ "type": "text", "text": text })),
        ContentPart::Image { source } => match source {
            ImageSource::Url { url } => Ok(json!({
                "type": "image",
                "source": { "type": "url", "url": url },
            })),
            ImageSource::Base64 { data, media_type } => Ok(json!({
                "type": "image",
                "source": {
                    "type": "base64",
                    "media_type": media_type,
                    "data": data,
                },
            })),
        },
    }
}

fn convert_thinking_block(block: &ThinkingBlock) -> Value {
    match block {
        ThinkingBlock::Visible { text, signature } => json!({
            "type": "thinking",
            "thinking": text,
            "signature": signature,
        }),
        ThinkingBlock::Redacted { data } => json!({
            "type": "redacted_thinking",
            "data": data,
        }),
    }
}

fn convert_thinking(config: &ThinkingConfig) -> Value {
    match config {
        ThinkingConfig::Adaptive => json!({ "type": "adaptive" }),
        ThinkingConfig::Manual { budget_tokens } => json!({
            "type": "enabled",
            "budget_tokens": budget_tokens,
        }),
    }
}

/// Translates the tool-choice policy.
///
/// `None` omits the field entirely. A forced or named choice downgrades to
/// `auto` while thinking is enabled, since the vendor rejects the
/// combination.
fn convert_tool_choice(choice: &ToolChoice, thinking_enabled: bool) -> Option<Value> {
    match choice {
        ToolChoice::None => None,
        ToolChoice::Auto => Some(json!({ "type": "auto" })),
        ToolChoice::Required if thinking_enabled => Some(json!({ "type": "auto" })),
        ToolChoice::Required => Some(json!({ "type": "any" })),
        ToolChoice::Named { .. } if thinking_enabled => Some(json!({ "type": "auto" })),
        ToolChoice::Named { name } => Some(json!({
            "type": "tool",
            "name": sanitize_tool_name(name),
        })),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::types::{ToolCall, ToolDefinition, ToolResult};

    fn minimal_request() -> CompletionRequest {
        CompletionRequest::new(
            "claude-sonnet-4",
            vec![Message::text(Role::User, "Hello there")],
        )
    }

    #[test]
    fn builds_basic_text_body() {
        let body = build_messages_body(&minimal_request(), false).expect("build");

        assert_eq!(body["model"], json!("claude-sonnet-4"));
        assert_eq!(body["max_tokens"], json!(DEFAULT_MAX_TOKENS));
        assert_eq!(body["stream"], json!(false));
        let messages = body["messages"].as_array().expect("messages");
        assert_eq!(messages.len(), 1);
        assert_eq!(messages[0]["role"], json!("user"));
        assert_eq!(
            messages[0]["content"][0],
            json!({ "type": "text", "text": "Hello there" })
        );
        assert!(body.get("system").is_none());
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn empty_model_is_rejected() {
        let mut request = minimal_request();
        request.model = "  ".to_string();
        let err = build_messages_body(&request, false).expect_err("should fail");
        assert!(matches!(err, LlmError::Validation { .. }));
    }

    #[test]
    fn system_prompt_splits_at_dynamic_marker() {
        let mut request = minimal_request();
        request.messages.insert(
            0,
            Message::text(
                Role::System,
                "You are a careful assistant.\n\n# Current Session\nUser timezone: UTC+2",
            ),
        );

        let body = build_messages_body(&request, false).expect("build");
        let system = body["system"].as_array().expect("system blocks");
        assert_eq!(system.len(), 2);
        assert_eq!(
            system[0]["cache_control"],
            json!({ "type": "ephemeral" }),
            "static prefix must be cache-eligible"
        );
        assert_eq!(
            system[0]["text"],
            json!("You are a careful assistant.\n\n")
        );
        assert_eq!(
            system[1]["text"],
            json!("# Current Session\nUser timezone: UTC+2")
        );
        assert!(system[1].get("cache_control").is_none());
    }

    #[test]
    fn system_prompt_without_marker_is_one_cached_block() {
        let mut request = minimal_request();
        request
            .messages
            .insert(0, Message::text(Role::System, "Be terse."));

        let body = build_messages_body(&request, false).expect("build");
        let system = body["system"].as_array().expect("system blocks");
        assert_eq!(system.len(), 1);
        assert_eq!(system[0]["cache_control"], json!({ "type": "ephemeral" }));
    }

    #[test]
    fn thinking_omits_temperature_and_downgrades_named_choice() {
        let mut request = minimal_request();
        request.temperature = Some(0.7);
        request.thinking = Some(ThinkingConfig::Manual {
            budget_tokens: 2048,
        });
        request.tools = Some(vec![ToolDefinition {
            name: "lookup".to_string(),
            description: Some("Look things up".to_string()),
            input_schema: Some(json!({ "type": "object" })),
        }]);
        request.tool_choice = Some(ToolChoice::Named {
            name: "lookup".to_string(),
        });

        let body = build_messages_body(&request, false).expect("build");
        assert!(body.get("temperature").is_none());
        assert_eq!(body["tool_choice"], json!({ "type": "auto" }));
        assert_eq!(
            body["thinking"],
            json!({ "type": "enabled", "budget_tokens": 2048 })
        );
    }

    #[test]
    fn tool_choice_none_omits_the_field() {
        let mut request = minimal_request();
        request.tool_choice = Some(ToolChoice::None);
        let body = build_messages_body(&request, false).expect("build");
        assert!(body.get("tool_choice").is_none());
    }

    #[test]
    fn tool_names_are_sanitized_on_the_way_out() {
        let mut request = minimal_request();
        request.tools = Some(vec![ToolDefinition {
            name: "plugin.search_web".to_string(),
            description: None,
            input_schema: None,
        }]);
        request.tool_choice = Some(ToolChoice::Named {
            name: "plugin.search_web".to_string(),
        });

        let body = build_messages_body(&request, false).expect("build");
        assert_eq!(body["tools"][0]["name"], json!("plugin-search_web"));
        assert_eq!(
            body["tool_choice"],
            json!({ "type": "tool", "name": "plugin-search_web" })
        );
    }

    #[test]
    fn assistant_turn_replays_thinking_blocks_verbatim() {
        let mut request = minimal_request();
        request.messages.push(Message {
            role: Role::Assistant,
            content: MessageContent::Text("Let me check.".to_string()),
            tool_calls: Some(vec![ToolCall {
                id: "toolu_1".to_string(),
                name: "plugin.search_web".to_string(),
                arguments: r#"{"query":"weather"}"#.to_string(),
            }]),
            thinking_blocks: Some(vec![
                ThinkingBlock::Visible {
                    text: "The user wants weather data.".to_string(),
                    signature: "sig-v1-abc".to_string(),
                },
                ThinkingBlock::Redacted {
                    data: "b64-opaque==".to_string(),
                },
            ]),
            tool_results: None,
        });
        request.messages.push(Message {
            role: Role::Tool,
            content: MessageContent::Text(String::new()),
            tool_calls: None,
            thinking_blocks: None,
            tool_results: Some(vec![ToolResult {
                id: "toolu_1".to_string(),
                content: "22C, sunny".to_string(),
                is_error: false,
            }]),
        });

        let body = build_messages_body(&request, false).expect("build");
        let assistant = &body["messages"][1];
        assert_eq!(assistant["role"], json!("assistant"));
        assert_eq!(
            assistant["content"][0],
            json!({
                "type": "thinking",
                "thinking": "The user wants weather data.",
                "signature": "sig-v1-abc",
            })
        );
        assert_eq!(
            assistant["content"][1],
            json!({ "type": "redacted_thinking", "data": "b64-opaque==" })
        );
        assert_eq!(assistant["content"][3]["type"], json!("tool_use"));
        assert_eq!(assistant["content"][3]["name"], json!("plugin-search_web"));
        assert_eq!(
            assistant["content"][3]["input"],
            json!({ "query": "weather" })
        );

        let tool_turn = &body["messages"][2];
        assert_eq!(tool_turn["role"], json!("user"));
        assert_eq!(
            tool_turn["content"][0],
            json!({
                "type": "tool_result",
                "tool_use_id": "toolu_1",
                "content": "22C, sunny",
                "is_error": false,
            })
        );
    }

    #[test]
    fn marker_at_start_yields_single_uncached_block() {
        let blocks = split_system_blocks("# Current Session\neverything is dynamic");
        assert_eq!(blocks.len(), 1);
        assert!(blocks[0].get("cache_control").is_none());
    }
}
