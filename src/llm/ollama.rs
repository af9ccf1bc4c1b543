//! Ollama (local) streaming chat adapter, speaking `/api/chat`'s
//! newline-delimited JSON protocol.

use super::{ChatMessage, CompletionRequest, LlmProvider, RunEvent, RunStatus};
use crate::{Error, Result};
use futures::stream::BoxStream;
use futures::StreamExt;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Ollama local LLM client.
pub struct OllamaProvider {
    endpoint: String,
    client: reqwest::Client,
}

impl OllamaProvider {
    pub const DEFAULT_ENDPOINT: &'static str = "http://localhost:11434";

    #[must_use]
    pub fn new() -> Self {
        let endpoint = std::env::var("OLLAMA_HOST").unwrap_or_else(|_| Self::DEFAULT_ENDPOINT.to_string());
        Self { endpoint, client: reqwest::Client::new() }
    }

    #[must_use]
    pub fn with_endpoint(mut self, endpoint: impl Into<String>) -> Self {
        self.endpoint = endpoint.into();
        self
    }
}

impl Default for OllamaProvider {
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

#[derive(Deserialize)]
struct ChatChunk {
    #[serde(default)]
    message: Option<ChunkMessage>,
    #[serde(default)]
    done: bool,
}

#[derive(Deserialize)]
struct ChunkMessage {
    #[serde(default)]
    content: String,
    #[serde(default)]
    tool_calls: Vec<ChunkToolCall>,
}

#[derive(Deserialize)]
struct ChunkToolCall {
    function: ChunkToolFunction,
}

#[derive(Deserialize)]
struct ChunkToolFunction {
    name: String,
    #[serde(default)]
    arguments: Value,
}

#[async_trait::async_trait]
impl LlmProvider for OllamaProvider {
    fn name(&self) -> &'static str {
        "ollama"
    }

    async fn stream_chat(&self, request: CompletionRequest) -> Result<BoxStream<'static, Result<RunEvent>>> {
        let mut wire_messages = vec![WireMessage { role: "system", content: &request.system }];
        wire_messages.extend(request.messages.iter().map(|m| WireMessage { role: role_str(m), content: &m.content }));

        let body = ChatRequest { model: &request.model, messages: wire_messages, stream: true, tools: &request.tools };

        let resp = self
            .client
            .post(format!("{}/api/chat", self.endpoint))
            .json(&body)
            .send()
            .await
            .map_err(|e| Error::Transient(format!("ollama request failed: {e}")))?;

        if !resp.status().is_success() {
            let status = resp.status();
            let text = resp.text().await.unwrap_or_default();
            return Err(Error::External { status: Some(status.as_u16()), body: text });
        }

        Ok(Box::pin(ndjson_event_stream(resp.bytes_stream(), parse_ollama_line)))
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

/// Streams lines of newline-delimited JSON from `byte_stream`, applying
/// `parse_line` to each complete line, emitting one [`RunEvent`] per
/// parsed item.
fn ndjson_event_stream<S, F>(byte_stream: S, parse_line: F) -> BoxStream<'static, Result<RunEvent>>
where
    S: futures::Stream<Item = reqwest::Result<bytes::Bytes>> + Send + Unpin + 'static,
    F: Fn(&str) -> Vec<RunEvent> + Send + Sync + 'static,
{
    let lines = futures::stream::unfold((byte_stream, String::new(), false), move |(mut stream, mut buf, done)| {
        async move {
            if done {
                return None;
            }
            loop {
                if let Some(pos) = buf.find('\n') {
                    let line = buf[..pos].to_string();
                    buf.drain(..=pos);
                    if line.trim().is_empty() {
                        continue;
                    }
                    return Some((line, (stream, buf, false)));
                }
                match stream.next().await {
                    Some(Ok(chunk)) => buf.push_str(&String::from_utf8_lossy(&chunk)),
                    Some(Err(e)) => return Some((format!("__error__{e}"), (stream, String::new(), true))),
                    None => {
                        if buf.trim().is_empty() {
                            return None;
                        }
                        let line = std::mem::take(&mut buf);
                        return Some((line, (stream, buf, true)));
                    }
                }
            }
        }
    });

    Box::pin(lines.flat_map(move |line| {
        if let Some(err) = line.strip_prefix("__error__") {
            return futures::stream::iter(vec![Err(Error::Transient(format!("stream read failed: {err}")))]);
        }
        futures::stream::iter(parse_line(&line).into_iter().map(Ok).collect::<Vec<_>>())
    }))
}

fn parse_ollama_line(line: &str) -> Vec<RunEvent> {
    let Ok(chunk) = serde_json::from_str::<ChatChunk>(line) else {
        return Vec::new();
    };
    let mut events = Vec::new();
    if let Some(message) = chunk.message {
        if !message.content.is_empty() {
            events.push(RunEvent::ContentDelta(message.content.clone()));
        }
        for tool_call in message.tool_calls {
            events.push(RunEvent::ToolCall {
                name: tool_call.function.name,
                args: tool_call.function.arguments,
                status: "complete".to_string(),
            });
        }
        if chunk.done {
            if !message.content.is_empty() {
                events.push(RunEvent::Completed(message.content));
            }
            events.push(RunEvent::StatusChange(RunStatus::Completed));
        }
    } else if chunk.done {
        events.push(RunEvent::StatusChange(RunStatus::Completed));
    }
    events
}
