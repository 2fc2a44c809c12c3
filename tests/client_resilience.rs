//! End-to-end tests through the public surface: a scripted transport stands
//! in for the network so retry behavior, wire bodies, and stream
//! reconstruction can be checked without touching a real endpoint.

use std::collections::{HashMap, VecDeque};
use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use futures_util::{StreamExt, stream};
use serde_json::{Value, json};
use tokio_util::sync::CancellationToken;

use valet_llm::client::LlmClient;
use valet_llm::error::LlmError;
use valet_llm::http::{HttpRequest, HttpResponse, HttpStreamResponse, HttpTransport};
use valet_llm::provider::anthropic::AnthropicProvider;
use valet_llm::retry::RetryConfig;
use valet_llm::types::{
    CompletionRequest, FinishReason, Message, MessageContent, Role, StreamChunk, ThinkingBlock,
};

/// Replays a scripted sequence of buffered responses and records every
/// request body it sees.
struct ScriptedTransport {
    responses: Mutex<VecDeque<(u16, Value)>>,
    requests: Mutex<Vec<Value>>,
    stream_status: u16,
    stream_frames: Mutex<Vec<Vec<u8>>>,
}

impl ScriptedTransport {
    fn buffered(responses: Vec<(u16, Value)>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(responses.into()),
            requests: Mutex::new(Vec::new()),
            stream_status: 200,
            stream_frames: Mutex::new(Vec::new()),
        })
    }

    fn streaming(status: u16, frames: Vec<Vec<u8>>) -> Arc<Self> {
        Arc::new(Self {
            responses: Mutex::new(VecDeque::new()),
            requests: Mutex::new(Vec::new()),
            stream_status: status,
            stream_frames: Mutex::new(frames),
        })
    }

    fn recorded_requests(&self) -> Vec<Value> {
        self.requests.lock().expect("lock").clone()
    }
}

#[async_trait]
impl HttpTransport for ScriptedTransport {
    async fn send(&self, request: HttpRequest) -> Result<HttpResponse, LlmError> {
        let body: Value = serde_json::from_slice(&request.body).expect("request body is JSON");
        self.requests.lock().expect("lock").push(body);
        let (status, payload) = self
            .responses
            .lock()
            .expect("lock")
            .pop_front()
            .expect("script exhausted");
        Ok(HttpResponse {
            status,
            headers: HashMap::new(),
            body: serde_json::to_vec(&payload).expect("serialize"),
        })
    }

    async fn send_stream(&self, request: HttpRequest) -> Result<HttpStreamResponse, LlmError> {
        let body: Value = serde_json::from_slice(&request.body).expect("request body is JSON");
        self.requests.lock().expect("lock").push(body);
        let frames: Vec<Vec<u8>> = self.stream_frames.lock().expect("lock").clone();
        Ok(HttpStreamResponse {
            status: self.stream_status,
            headers: HashMap::new(),
            body: Box::pin(stream::iter(frames.into_iter().map(Ok))),
        })
    }
}

fn init_logging() {
    let _ = tracing_subscriber::fmt()
        .with_env_filter(tracing_subscriber::EnvFilter::from_default_env())
        .with_test_writer()
        .try_init();
}

fn frame(event: Value) -> Vec<u8> {
    format!("data: {event}\n\n").into_bytes()
}

fn client_over(transport: Arc<ScriptedTransport>) -> LlmClient {
    let provider = Arc::new(AnthropicProvider::new(transport, "sk-test"));
    LlmClient::new(provider).with_retry_config(RetryConfig {
        max_retries: 3,
        initial_delay_ms: 1,
        max_delay_ms: 5,
        add_jitter: false,
        ..RetryConfig::default()
    })
}

fn success_payload(text: &str) -> Value {
    json!({
        "id": "msg_1",
        "model": "claude-sonnet-4",
        "content": [{ "type": "text", "text": text }],
        "stop_reason": "end_turn",
        "usage": { "input_tokens": 12, "output_tokens": 4 },
    })
}

fn error_payload(kind: &str, message: &str) -> Value {
    json!({ "error": { "type": kind, "message": message } })
}

fn request() -> CompletionRequest {
    CompletionRequest::new(
        "claude-sonnet-4",
        vec![Message::text(Role::User, "What's the weather?")],
    )
}

#[tokio::test(start_paused = true)]
async fn overload_responses_are_retried_until_success() {
    init_logging();
    let transport = ScriptedTransport::buffered(vec![
        (529, error_payload("overloaded_error", "Overloaded")),
        (503, error_payload("api_error", "service unavailable")),
        (200, success_payload("Sunny, 22C.")),
    ]);
    let client = client_over(transport.clone());

    let response = client.complete(&request()).await.expect("should succeed");
    assert_eq!(response.content, "Sunny, 22C.");
    assert_eq!(response.finish_reason, FinishReason::Stop);
    assert_eq!(response.usage.total_tokens, 16);
    assert_eq!(transport.recorded_requests().len(), 3);
}

#[tokio::test]
async fn auth_failure_is_not_retried_and_stays_typed() {
    let transport = ScriptedTransport::buffered(vec![(
        401,
        error_payload("authentication_error", "invalid x-api-key"),
    )]);
    let client = client_over(transport.clone());

    let err = client.complete(&request()).await.expect_err("should fail");
    assert!(matches!(err, LlmError::Validation { .. }));
    assert!(err.message().contains("authentication_error"));
    assert_eq!(transport.recorded_requests().len(), 1, "no retry");
}

#[tokio::test(start_paused = true)]
async fn exhausted_retries_wrap_the_last_error() {
    let transport = ScriptedTransport::buffered(vec![
        (429, error_payload("rate_limit_error", "slow down")),
        (429, error_payload("rate_limit_error", "slow down")),
        (429, error_payload("rate_limit_error", "slow down")),
        (429, error_payload("rate_limit_error", "slow down")),
    ]);
    let client = client_over(transport.clone());

    let err = client.complete(&request()).await.expect_err("should fail");
    assert!(err.message().contains("after 3 retries"));
    assert!(err.message().contains("status 429"));
    assert_eq!(transport.recorded_requests().len(), 4);
}

/// Transport whose requests never complete; only cancellation or the
/// deadline can resolve a call running over it.
struct StuckTransport;

#[async_trait]
impl HttpTransport for StuckTransport {
    async fn send(&self, _request: HttpRequest) -> Result<HttpResponse, LlmError> {
        std::future::pending().await
    }

    async fn send_stream(&self, _request: HttpRequest) -> Result<HttpStreamResponse, LlmError> {
        std::future::pending().await
    }
}

#[tokio::test]
async fn cancelled_call_is_reported_as_cancellation() {
    let provider = Arc::new(AnthropicProvider::new(Arc::new(StuckTransport), "sk-test"));
    let client = LlmClient::new(provider).with_retry_config(RetryConfig {
        max_retries: 1,
        initial_delay_ms: 1,
        max_delay_ms: 1,
        add_jitter: false,
        ..RetryConfig::default()
    });
    let cancel = CancellationToken::new();
    cancel.cancel();

    // Cancellation classifies as transient, so exhaustion wraps the message.
    let err = client
        .complete_with_cancel(&request(), cancel)
        .await
        .expect_err("should fail");
    assert!(err.message().contains("cancelled by caller"));
}

#[tokio::test]
async fn streamed_tool_calls_reassemble_across_interleaved_fragments() {
    init_logging();
    let frames = vec![
        frame(json!({ "type": "message_start",
                      "message": { "usage": { "input_tokens": 30 } } })),
        frame(json!({ "type": "content_block_start", "index": 0,
                      "content_block": { "type": "text" } })),
        frame(json!({ "type": "content_block_start", "index": 1,
                      "content_block": { "type": "tool_use", "id": "toolu_1",
                                         "name": "weather-lookup_city" } })),
        frame(json!({ "type": "content_block_delta", "index": 0,
                      "delta": { "type": "text_delta", "text": "Checking " } })),
        frame(json!({ "type": "content_block_delta", "index": 1,
                      "delta": { "type": "input_json_delta", "partial_json": "{\"city\":" } })),
        frame(json!({ "type": "content_block_delta", "index": 0,
                      "delta": { "type": "text_delta", "text": "now." } })),
        frame(json!({ "type": "content_block_delta", "index": 1,
                      "delta": { "type": "input_json_delta", "partial_json": "\"Oslo\"}" } })),
        frame(json!({ "type": "content_block_stop", "index": 1 })),
        frame(json!({ "type": "content_block_stop", "index": 0 })),
        frame(json!({ "type": "message_delta", "delta": { "stop_reason": "tool_use" },
                      "usage": { "output_tokens": 11 } })),
        frame(json!({ "type": "message_stop" })),
    ];
    let transport = ScriptedTransport::streaming(200, frames);
    let client = client_over(transport.clone());

    let mut chunks: Vec<StreamChunk> = Vec::new();
    let mut stream = client.stream(&request()).await.expect("stream");
    while let Some(item) = stream.next().await {
        chunks.push(item.expect("chunk"));
    }

    let text: String = chunks.iter().filter_map(|c| c.text.clone()).collect();
    assert_eq!(text, "Checking now.");
    assert_eq!(
        chunks.iter().find_map(|c| c.finish_reason),
        Some(FinishReason::ToolCalls)
    );

    let terminal: Vec<&StreamChunk> = chunks.iter().filter(|c| c.done).collect();
    assert_eq!(terminal.len(), 1);
    let calls = terminal[0].tool_calls.as_ref().expect("tool calls");
    assert_eq!(calls[0].name, "weather.lookup_city", "name desanitized");
    assert_eq!(
        serde_json::from_str::<Value>(&calls[0].arguments).expect("json"),
        json!({ "city": "Oslo" })
    );

    let sent = transport.recorded_requests();
    assert_eq!(sent[0]["stream"], json!(true));
}

#[tokio::test]
async fn streaming_error_status_is_parsed_before_any_chunk() {
    let body = serde_json::to_vec(&error_payload("invalid_request_error", "bad model")).unwrap();
    let transport = ScriptedTransport::streaming(404, vec![body]);
    let client = client_over(transport);

    let err = match client.stream(&request()).await {
        Ok(_) => panic!("stream should not open"),
        Err(err) => err,
    };
    assert!(matches!(err, LlmError::Validation { .. }));
    assert!(err.message().contains("bad model"));
}

#[tokio::test]
async fn thinking_blocks_survive_a_full_round_trip() {
    // First call returns reasoning blocks; the second call replays them in
    // the conversation history. The wire body must carry them byte-verbatim.
    let payload = json!({
        "id": "msg_1",
        "model": "claude-sonnet-4",
        "content": [
            { "type": "thinking", "thinking": "Need the forecast first.",
              "signature": "sig-v1-continuity" },
            { "type": "redacted_thinking", "data": "opaque-bytes==" },
            { "type": "text", "text": "One moment." },
        ],
        "stop_reason": "end_turn",
        "usage": { "input_tokens": 8, "output_tokens": 20 },
    });
    let transport = ScriptedTransport::buffered(vec![
        (200, payload),
        (200, success_payload("Sunny, 22C.")),
    ]);
    let client = client_over(transport.clone());

    let first = client.complete(&request()).await.expect("first call");
    let blocks = first.thinking_blocks.clone().expect("thinking blocks");
    assert_eq!(
        blocks[0],
        ThinkingBlock::Visible {
            text: "Need the forecast first.".to_string(),
            signature: "sig-v1-continuity".to_string(),
        }
    );

    let mut followup = request();
    followup.messages.push(Message {
        role: Role::Assistant,
        content: MessageContent::Text(first.content),
        tool_calls: None,
        thinking_blocks: Some(blocks),
        tool_results: None,
    });
    followup
        .messages
        .push(Message::text(Role::User, "And tomorrow?"));
    client.complete(&followup).await.expect("second call");

    let sent = transport.recorded_requests();
    let assistant = &sent[1]["messages"][1]["content"];
    assert_eq!(
        assistant[0],
        json!({
            "type": "thinking",
            "thinking": "Need the forecast first.",
            "signature": "sig-v1-continuity",
        })
    );
    assert_eq!(
        assistant[1],
        json!({ "type": "redacted_thinking", "data": "opaque-bytes==" })
    );
}
