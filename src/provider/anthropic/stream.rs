//! Streaming state machine: reconstructs the SSE event sequence into an
//! ordered stream of normalized chunks.
//!
//! Tool-argument fragments, text runs, and reasoning segments interleave by
//! content-block index, so in-progress tool calls are demultiplexed through a
//! sparse index-keyed map and only assembled at `message_stop`, when their
//! accumulated argument text is finally complete JSON. Reasoning text is
//! forwarded live as tagged chunks while its signature accumulates silently;
//! finalized blocks are preserved verbatim and in order for replay on the
//! next turn.
//!
//! Both ends are pull-based: network reads happen in whatever buffers the
//! transport hands over, decoded bytes are split on newlines with the partial
//! remainder carried across reads, and a slow consumer throttles the parser
//! naturally.

use std::collections::{HashMap, VecDeque};
use std::pin::Pin;
use std::task::{Context, Poll};

use futures_core::Stream;
use futures_util::StreamExt;
use tokio::time::Sleep;
use tokio_util::sync::WaitForCancellationFutureOwned;

use crate::deadline::CallContext;
use crate::error::LlmError;
use crate::http::HttpBodyStream;
use crate::provider::CompletionStream;
use crate::sanitize::desanitize_tool_name;
use crate::types::{ChunkMetadata, StreamChunk, ThinkingBlock, ToolCall, Usage};

use super::response::map_stop_reason;
use super::types::{WireBlockDelta, WireStreamEvent};

pub(crate) fn create_stream(body: HttpBodyStream, ctx: &CallContext) -> CompletionStream {
    Box::pin(MessagesSseStream::new(body, ctx))
}

/// Buffers a failed streaming response's body so the error payload can be
/// parsed like a non-streaming error.
pub(crate) async fn collect_stream_text(mut body: HttpBodyStream) -> Result<String, LlmError> {
    let mut bytes = Vec::new();
    while let Some(chunk) = body.next().await {
        bytes.extend_from_slice(&chunk?);
    }
    String::from_utf8(bytes)
        .map_err(|err| LlmError::internal(format!("failed to decode stream error body: {err}")))
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum BlockKind {
    Text,
    ToolUse,
    Thinking,
}

/// In-progress tool call keyed by its stream block index.
#[derive(Debug, Default)]
struct ToolCallAccumulator {
    id: String,
    name: String,
    args: String,
}

/// The single current reasoning block; reset when a new one starts.
#[derive(Debug, Default)]
struct ReasoningAccumulator {
    text: String,
    signature: String,
}

struct MessagesSseStream {
    /// `None` once released; every exit path drops the reader.
    body: Option<HttpBodyStream>,
    buffer: Vec<u8>,
    data_lines: Vec<Vec<u8>>,
    pending: VecDeque<Result<StreamChunk, LlmError>>,
    /// The terminal chunk or terminal error has been queued; stop reading.
    terminal_queued: bool,
    /// Sparse, not dense: a missing index means "block never started",
    /// distinct from "started but empty".
    tool_blocks: HashMap<u64, ToolCallAccumulator>,
    block_kinds: HashMap<u64, BlockKind>,
    reasoning: ReasoningAccumulator,
    /// Finalized reasoning blocks, verbatim and in arrival order.
    thinking_blocks: Vec<ThinkingBlock>,
    prompt_tokens: u64,
    cached_tokens: Option<u64>,
    deadline: Pin<Box<Sleep>>,
    cancelled: Pin<Box<WaitForCancellationFutureOwned>>,
}

impl MessagesSseStream {
    fn new(body: HttpBodyStream, ctx: &CallContext) -> Self {
        Self {
            body: Some(body),
            buffer: Vec::new(),
            data_lines: Vec::new(),
            pending: VecDeque::new(),
            terminal_queued: false,
            tool_blocks: HashMap::new(),
            block_kinds: HashMap::new(),
            reasoning: ReasoningAccumulator::default(),
            thinking_blocks: Vec::new(),
            prompt_tokens: 0,
            cached_tokens: None,
            deadline: Box::pin(tokio::time::sleep_until(ctx.deadline())),
            cancelled: Box::pin(ctx.cancel.clone().cancelled_owned()),
        }
    }

    fn handle_line(&mut self, line: Vec<u8>) {
        if line.starts_with(b"data:") {
            let mut data = line[5..].to_vec();
            if data.first() == Some(&b' ') {
                data.remove(0);
            }
            self.data_lines.push(data);
        }
    }

    /// Assembles the buffered `data:` lines into one frame and dispatches it.
    /// Frames that fail to decode are skipped: keep-alive comments and
    /// truncated payloads must not abort the remaining stream.
    fn flush_event(&mut self) {
        if self.data_lines.is_empty() {
            return;
        }
        let mut joined = Vec::new();
        for (idx, mut segment) in self.data_lines.drain(..).enumerate() {
            if idx > 0 {
                joined.push(b'\n');
            }
            joined.append(&mut segment);
        }
        if joined.is_empty() {
            return;
        }
        let Ok(data) = String::from_utf8(joined) else {
            tracing::debug!("skipping stream frame with invalid UTF-8");
            return;
        };
        match serde_json::from_str::<WireStreamEvent>(&data) {
            Ok(event) => self.handle_event(event),
            Err(err) => tracing::debug!(error = %err, "skipping malformed stream frame"),
        }
    }

    fn handle_event(&mut self, event: WireStreamEvent) {
        match event {
            WireStreamEvent::MessageStart { message } => {
                if let Some(usage) = message.usage {
                    self.prompt_tokens = usage.input_tokens.unwrap_or(0);
                    self.cached_tokens = usage.cache_read_input_tokens;
                }
            }
            WireStreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block.kind.as_str() {
                "tool_use" => {
                    self.block_kinds.insert(index, BlockKind::ToolUse);
                    self.tool_blocks.insert(
                        index,
                        ToolCallAccumulator {
                            id: content_block.id.unwrap_or_default(),
                            name: desanitize_tool_name(
                                content_block.name.as_deref().unwrap_or_default(),
                            ),
                            args: String::new(),
                        },
                    );
                }
                "thinking" => {
                    self.block_kinds.insert(index, BlockKind::Thinking);
                    self.reasoning = ReasoningAccumulator::default();
                }
                // Redacted blocks arrive whole and go straight to the
                // finalized list.
                "redacted_thinking" => {
                    self.thinking_blocks.push(ThinkingBlock::Redacted {
                        data: content_block.data.unwrap_or_default(),
                    });
                }
                "text" => {
                    self.block_kinds.insert(index, BlockKind::Text);
                }
                other => {
                    tracing::debug!(kind = other, index, "skipping unrecognized content block");
                }
            },
            WireStreamEvent::ContentBlockDelta { index, delta } => match delta {
                WireBlockDelta::TextDelta { text } => {
                    self.pending.push_back(Ok(StreamChunk::text(text)));
                }
                WireBlockDelta::ThinkingDelta { thinking } => {
                    self.reasoning.text.push_str(&thinking);
                    self.pending.push_back(Ok(StreamChunk::thinking(thinking)));
                }
                // Verification token, not content: buffered, never forwarded.
                WireBlockDelta::SignatureDelta { signature } => {
                    self.reasoning.signature.push_str(&signature);
                }
                WireBlockDelta::InputJsonDelta { partial_json } => {
                    // Fragments are not valid JSON on their own; parse only
                    // once the message closes.
                    if let Some(acc) = self.tool_blocks.get_mut(&index) {
                        acc.args.push_str(&partial_json);
                    } else {
                        tracing::debug!(index, "dropping argument fragment for unknown block");
                    }
                }
                WireBlockDelta::Unknown => {
                    tracing::debug!(index, "skipping unrecognized delta kind");
                }
            },
            WireStreamEvent::ContentBlockStop { index } => {
                if self.block_kinds.remove(&index) == Some(BlockKind::Thinking)
                    && !self.reasoning.text.is_empty()
                {
                    let finished = std::mem::take(&mut self.reasoning);
                    self.thinking_blocks.push(ThinkingBlock::Visible {
                        text: finished.text,
                        signature: finished.signature,
                    });
                }
            }
            WireStreamEvent::MessageDelta { delta, usage } => {
                let mut chunk = StreamChunk::default();
                if let Some(usage) = usage {
                    // Output tokens are cumulative on the wire; combined with
                    // the captured prompt count the totals never decrease.
                    let completion = usage.output_tokens.unwrap_or(0);
                    chunk.usage = Some(Usage {
                        prompt_tokens: self.prompt_tokens,
                        completion_tokens: completion,
                        total_tokens: self.prompt_tokens + completion,
                        cached_tokens: self.cached_tokens,
                    });
                }
                if let Some(reason) = delta.stop_reason.as_deref() {
                    chunk.finish_reason = Some(map_stop_reason(Some(reason)));
                }
                if chunk.usage.is_some() || chunk.finish_reason.is_some() {
                    self.pending.push_back(Ok(chunk));
                }
            }
            WireStreamEvent::MessageStop => {
                let chunk = self.terminal_chunk();
                self.pending.push_back(Ok(chunk));
                self.terminal_queued = true;
            }
            WireStreamEvent::Ping | WireStreamEvent::Unknown => {}
        }
    }

    /// Builds the single `done = true` chunk from the finalized state.
    fn terminal_chunk(&mut self) -> StreamChunk {
        let mut indexes: Vec<u64> = self.tool_blocks.keys().copied().collect();
        indexes.sort_unstable();

        let mut calls = Vec::new();
        for index in indexes {
            let Some(acc) = self.tool_blocks.remove(&index) else {
                continue;
            };
            // Only now is the accumulated argument text guaranteed complete.
            // A fragment sequence that still fails to parse yields empty
            // arguments rather than an error.
            let arguments = match serde_json::from_str::<serde_json::Value>(&acc.args) {
                Ok(_) => acc.args,
                Err(_) => "{}".to_string(),
            };
            calls.push(ToolCall {
                id: acc.id,
                name: acc.name,
                arguments,
            });
        }

        let thinking_blocks = std::mem::take(&mut self.thinking_blocks);
        StreamChunk {
            tool_calls: if calls.is_empty() { None } else { Some(calls) },
            done: true,
            metadata: if thinking_blocks.is_empty() {
                None
            } else {
                Some(ChunkMetadata {
                    kind: None,
                    thinking_blocks: Some(thinking_blocks),
                })
            },
            ..StreamChunk::default()
        }
    }

    fn drain_line(buffer: &mut Vec<u8>) -> Option<Vec<u8>> {
        buffer.iter().position(|b| *b == b'\n').map(|pos| {
            let mut line: Vec<u8> = buffer.drain(..=pos).collect();
            if line.last() == Some(&b'\n') {
                line.pop();
            }
            if line.last() == Some(&b'\r') {
                line.pop();
            }
            line
        })
    }
}

impl Stream for MessagesSseStream {
    type Item = Result<StreamChunk, LlmError>;

    fn poll_next(self: Pin<&mut Self>, cx: &mut Context<'_>) -> Poll<Option<Self::Item>> {
        let this = self.get_mut();

        loop {
            if let Some(item) = this.pending.pop_front() {
                if this.terminal_queued && this.pending.is_empty() {
                    this.body = None;
                }
                return Poll::Ready(Some(item));
            }
            if this.terminal_queued {
                this.body = None;
                return Poll::Ready(None);
            }

            if this.deadline.as_mut().poll(cx).is_ready() {
                this.terminal_queued = true;
                this.body = None;
                return Poll::Ready(Some(Err(LlmError::timeout(
                    "stream exceeded call deadline",
                ))));
            }
            if this.cancelled.as_mut().poll(cx).is_ready() {
                this.terminal_queued = true;
                this.body = None;
                return Poll::Ready(Some(Err(LlmError::timeout("stream cancelled by caller"))));
            }

            let Some(body) = this.body.as_mut() else {
                this.terminal_queued = true;
                return Poll::Ready(None);
            };

            match body.as_mut().poll_next(cx) {
                Poll::Ready(Some(Ok(bytes))) => {
                    this.buffer.extend_from_slice(&bytes);
                    while let Some(line) = Self::drain_line(&mut this.buffer) {
                        if line.is_empty() {
                            this.flush_event();
                        } else {
                            this.handle_line(line);
                        }
                    }
                }
                Poll::Ready(Some(Err(err))) => {
                    this.terminal_queued = true;
                    this.body = None;
                    return Poll::Ready(Some(Err(err)));
                }
                Poll::Ready(None) => {
                    if !this.buffer.is_empty() {
                        let line: Vec<u8> = this.buffer.drain(..).collect();
                        this.handle_line(line);
                    }
                    this.flush_event();
                    this.body = None;
                    // Queued behind any flushed chunks so the stream still
                    // ends with exactly one terminal item.
                    if !this.terminal_queued {
                        this.terminal_queued = true;
                        this.pending.push_back(Err(LlmError::internal(
                            "stream closed before message_stop",
                        )));
                    }
                }
                Poll::Pending => return Poll::Pending,
            }
        }
    }
}
