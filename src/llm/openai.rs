//! `OpenAI`-compatible streaming chat adapter, speaking the
//! `text/event-stream` (SSE) protocol used by `/v1/chat/completions`.
//!
//! Tool-call arguments arrive as incremental string fragments keyed by
//! index; this adapter buffers fragments per index and only emits a
//! [`RunEvent::ToolCall`] once a `finish_reason` closes the turn.

use super::{ChatMessage, CompletionRequest, LlmProvider, RunEvent, RunStatus};
use crate::{Error, Result};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::collections::BTreeMap;

/// `OpenAI` API client.
pub struct OpenAiProvider {
    endpoint: String,
    api_key: String,
    client: reqwest::Client,
}

impl OpenAiProvider {
    pub const DEFAULT_ENDPOINT: &'static str = "https://api.openai.com/v1";

    #[must_use]
    pub fn new() -> Self {
        let endpoint = std::env::var("OPENAI_BASE_URL").unwrap_or_else(|_| Self::DEFAULT_ENDPOINT.to_string());
        let api_key = std::env::var("OPENAI_API_KEY").unwrap_or_default();
        Self { endpoint, api_key, client: reqwest::Client::new() }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }

    #[must_use]
    pub fn with_api_key(mut self, api_key: impl Into<String>) -> Self {
        self.api_key = api_key.into();
        self
    }
}

impl Default for OpenAiProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[derive(Serialize)]
struct ChatRequest<'a> {
    model: &'a str,
    messages: Vec<WireMessage<'a>>,
    stream: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    tools: &'a [Value],
}

#[derive(Serialize)]
struct WireMessage<'a> {
    role: &'a str,
    content: &'a str,
}

#[derive(Deserialize, Default)]
struct StreamChunk {
    #[serde(default)]
    choices: Vec<Choice>,
}

#[derive(Deserialize, Default)]
struct Choice {
    #[serde(default)]
    delta: Delta,
    #[serde(default)]
    finish_reason: Option<String>,
}

#[derive(Deserialize, Default)]
struct Delta {
    #[serde(default)]
    content: Option<String>,
    #[serde(default)]
    tool_calls: Vec<DeltaToolCall>,
}

#[derive(Deserialize, Default)]
struct DeltaToolCall {
    index: usize,
    #[serde(default)]
    function: DeltaFunction,
}

#[derive(Deserialize, Default)]
struct DeltaFunction {
    #[serde(default)]
    name: Option<String>,
    #[serde(default)]
    arguments: Option<String>,
}

#[async_trait::async_trait]
impl LlmProvider for OpenAiProvider {
    fn name(&self) -> &'static str {
        "openai"
    }

    async fn stream_chat(&self, request: CompletionRequest) -> Result<BoxStream<'static, Result<RunEvent>>> {
        let mut wire_messages = vec![WireMessage { role: "system", content: &request.system }];
        wire_messages.extend(request.messages.iter().map(|m| WireMessage { role: role_str(m), content: &m.content }));

        let body = ChatRequest { model: &request.model, messages: wire_messages, stream: true, tools: &request.tools };

        let resp = self
            .client
            .post(format!("{}/chat/completions", self.endpoint))
            .bearer_auth(&self.api_key)
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transient(format!("openai request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::External { status: Some(status.as_u16()), body: text });
        }

        Ok(Box::pin(sse_event_stream(resp.bytes_stream())))
    }
}

fn role_str(m: &ChatMessage) -> &'static str {
    match m.role {
        super::Role::System => "system",
        super::Role::User => "user",
        super::Role::Assistant => "assistant",
        super::Role::Tool => "tool",
    }
}

struct SseState<S> {
    stream: S,
    buf: String,
    tool_calls: BTreeMap<usize, (Option<String>, String)>,
    pending: Vec<RunEvent>,
    done: bool,
}

fn sse_event_stream<S>(byte_stream: S) -> BoxStream<'static, Result<RunEvent>>
where
    S: futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send + Unpin + 'static,
{
    let initial =
        SseState { stream: byte_stream, buf: String::new(), tool_calls: BTreeMap::new(), pending: Vec::new(), done: false };

    Box::pin(futures::stream::unfold(initial, move |mut state| async move {
        loop {
            if let Some(event) = state.pending.pop() {
                return Some((Ok(event), state));
            }
            if state.done {
                return None;
            }
            if let Some(pos) = state.buf.find("\n\n") {
                let block = state.buf[..pos].to_string();
                state.buf.drain(..pos + 2);
                let payload = extract_sse_payload(&block);
                if payload.is_empty() {
                    continue;
                }
                if payload == "[DONE]" {
                    state.pending.push(RunEvent::StatusChange(RunStatus::Completed));
                    state.done = true;
                    continue;
                }
                let events = apply_openai_chunk(&payload, &mut state.tool_calls);
                state.pending.extend(events);
                continue;
            }
            match state.stream.next().await {
                Some(Ok(chunk)) => state.buf.push_str(&String::from_utf8_lossy(&chunk)),
                Some(Err(e)) => {
                    state.done = true;
                    return Some((Err(Error::Transient(format!("stream read failed: {e}"))), state));
                }
                None => {
                    state.done = true;
                    if state.buf.trim().is_empty() {
                        return None;
                    }
                }
            }
        }
    }))
}

fn extract_sse_payload(block: &str) -> String {
    block
        .lines()
        .filter_map(|l| l.strip_prefix("data:"))
        .map(str::trim)
        .collect::<Vec<_>>()
        .join("\n")
}

fn apply_openai_chunk(payload: &str, tool_calls: &mut BTreeMap<usize, (Option<String>, String)>) -> Vec<RunEvent> {
    let Ok(chunk) = serde_json::from_str::<StreamChunk>(payload) else {
        return Vec::new();
    };
    let mut events = Vec::new();
    for choice in chunk.choices {
        if let Some(content) = choice.delta.content {
            if !content.is_empty() {
                events.push(RunEvent::ContentDelta(content));
            }
        }
        for tc in choice.delta.tool_calls {
            let entry = tool_calls.entry(tc.index).or_insert((None, String::new()));
            if let Some(name) = tc.function.name {
                entry.0 = Some(name);
            }
            if let Some(args) = tc.function.arguments {
                entry.1.push_str(&args);
            }
        }
        if let Some(reason) = choice.finish_reason {
            if reason == "tool_calls" {
                for (_, (name, args)) in std::mem::take(tool_calls) {
                    let Some(name) = name else { continue };
                    let parsed = serde_json::from_str(&args).unwrap_or(Value::Null);
                    events.push(RunEvent::ToolCall { name, args: parsed, status: "complete".to_string() });
                }
            }
        }
    }
    events
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn accumulates_content_delta() {
        let mut tool_calls = BTreeMap::new();
        let payload = r#"{"choices":[{"delta":{"content":"Hi"},"finish_reason":null}]}"#;
        let events = apply_openai_chunk(payload, &mut tool_calls);
        assert!(matches!(&events[0], RunEvent::ContentDelta(s) if s == "Hi"));
    }

    #[test]
    fn assembles_fragmented_tool_call_arguments() {
        let mut tool_calls = BTreeMap::new();
        let chunk1 = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"name":"remember","arguments":"{\"te"}}]},"finish_reason":null}]}"#;
        let chunk2 = r#"{"choices":[{"delta":{"tool_calls":[{"index":0,"function":{"arguments":"xt\":\"hi\"}"}}]},"finish_reason":"tool_calls"}]}"#;
        apply_openai_chunk(chunk1, &mut tool_calls);
        let events = apply_openai_chunk(chunk2, &mut tool_calls);
        assert!(matches!(&events[0], RunEvent::ToolCall { name, args, .. }
            if name == "remember" && args["text"] == "hi"));
        assert!(tool_calls.is_empty());
    }

    #[test]
    fn extracts_payload_from_sse_block() {
        assert_eq!(extract_sse_payload("data: {\"a\":1}"), "{\"a\":1}");
    }
}
