//! LLM provider adapters.
//!
//! Each provider turns a [`CompletionRequest`] into a lazy stream of
//! [`RunEvent`]s read off the wire as the model generates them — the
//! streaming agent loop in [`crate::agent`] never materializes a full
//! response before acting on it.

mod lmstudio;
mod ollama;
mod openai;

pub use lmstudio::LmStudioProvider;
pub use ollama::OllamaProvider;
pub use openai::OpenAiProvider;

use crate::Result;
use futures::stream::BoxStream;
use serde::{Deserialize, Serialize};
use serde_json::Value;

/// A turn in the conversation sent to the model.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: Role,
    pub content: String,
}

/// Speaker of a [`ChatMessage`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

/// A single request to the model: system instructions, recent history,
/// the tool schemas it may call, and whether to stream.
#[derive(Debug, Clone)]
pub struct CompletionRequest {
    pub system: String,
    pub messages: Vec<ChatMessage>,
    pub tools: Vec<Value>,
    pub model: String,
}

/// Lifecycle state carried by a [`RunEvent::StatusChange`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunStatus {
    Running,
    Completed,
    Failed,
}

/// One chunk of a streamed model response. Order of emission is
/// significant; [`crate::agent`] processes events strictly in the order
/// the stream yields them.
#[derive(Debug, Clone)]
pub enum RunEvent {
    /// Incremental assistant text.
    ContentDelta(String),
    /// A requested tool call: name, JSON arguments, and the provider's
    /// status string for it (e.g. `"pending"`, `"complete"`).
    ToolCall { name: String, args: Value, status: String },
    /// A lifecycle transition.
    StatusChange(RunStatus),
    /// The stream's final, authoritative content (sent once, at the end,
    /// by providers that emit an explicit completion chunk).
    Completed(String),
}

/// Adapts one backend's wire protocol to the provider-agnostic event
/// stream the agent loop consumes.
#[async_trait::async_trait]
pub trait LlmProvider: Send + Sync {
    /// Provider identifier, e.g. `"ollama"`.
    fn name(&self) -> &'static str;

    /// Streams a completion for `request`. The returned stream is lazy:
    /// bytes are read off the wire only as the stream is polled, so a
    /// cancelled consumer drops the underlying HTTP response without
    /// reading it to completion.
    async fn stream_chat(&self, request: CompletionRequest) -> Result<BoxStream<'static, Result<RunEvent>>>;
}

/// Builds the provider adapter selected by the Config Registry's active
/// [`crate::config::Provider`]. Each provider reads its own endpoint
/// override from the environment at construction time.
#[must_use]
pub fn build_provider(provider: crate::config::Provider) -> std::sync::Arc<dyn LlmProvider> {
    match provider {
        crate::config::Provider::Ollama => std::sync::Arc::new(OllamaProvider::new()),
        crate::config::Provider::LmStudio => std::sync::Arc::new(LmStudioProvider::new()),
        crate::config::Provider::OpenAi => std::sync::Arc::new(OpenAiProvider::new()),
    }
}

/// Scans `text` for markdown image links (`![alt](https?://...)`) and
/// returns the URLs, in order of first appearance, not already present
/// in `seen`.
#[must_use]
pub fn scrape_new_image_urls(text: &str, seen: &[String]) -> Vec<String> {
    static PATTERN: once_cell::sync::Lazy<regex::Regex> =
        once_cell::sync::Lazy::new(|| regex::Regex::new(r"!\[[^\]]*\]\((https?://[^\s)]+)\)").unwrap());
    PATTERN
        .captures_iter(text)
        .filter_map(|c| c.get(1).map(|m| m.as_str().to_string()))
        .filter(|url| !seen.contains(url))
        .collect()
}
