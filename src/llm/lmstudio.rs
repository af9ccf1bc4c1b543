//! LM Studio (local) adapter. LM Studio exposes an `OpenAI`-compatible
//! `/v1/chat/completions` endpoint with no authentication, so this is a
//! thin wrapper around [`OpenAiProvider`] pointed at a local port.

use super::{CompletionRequest, LlmProvider, OpenAiProvider, RunEvent};
use crate::Result;
use futures::stream::BoxStream;

/// LM Studio local LLM client.
pub struct LmStudioProvider {
    inner: OpenAiProvider,
}

impl LmStudioProvider {
    pub const DEFAULT_ENDPOINT: &'static str = "http://localhost:1234/v1";

    #[must_use]
    pub fn new() -> Self {
        let endpoint = std::env::var("LMSTUDIO_ENDPOINT").unwrap_or_else(|_| Self::DEFAULT_ENDPOINT.to_string());
        Self { inner: OpenAiProvider::new().with_endpoint(endpoint).with_api_key("lm-studio") }
    }

    #[must_use]
    pub fn with_endpoint(endpoint: impl Into<String>) -> Self {
        Self { inner: OpenAiProvider::new().with_endpoint(endpoint).with_api_key("lm-studio") }
    }
}

impl Default for LmStudioProvider {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait::async_trait]
impl LlmProvider for LmStudioProvider {
    fn name(&self) -> &'static str {
        "lmstudio"
    }

    async fn stream_chat(&self, request: CompletionRequest) -> Result<BoxStream<'static, Result<RunEvent>>> {
        self.inner.stream_chat(request).await
    }
}
