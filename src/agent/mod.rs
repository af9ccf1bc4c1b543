//! The streaming, tool-calling ReAct loop at the heart of the runtime.
//!
//! [`AgentRuntime::run`] drives one LLM adapter ([`crate::llm`]) and one
//! [`ToolRegistry`] through repeated stream-then-invoke rounds until the
//! model stops requesting tools, the tool-call budget is exhausted, or
//! the caller cancels.

use crate::config::{AgentMode, InstructionLevel, Provider};
use crate::llm::{ChatMessage, CompletionRequest, LlmProvider, RunEvent, RunStatus, Role, scrape_new_image_urls};
use crate::tools::ToolRegistry;
use crate::{Error, Result};
use futures::StreamExt;
use serde_json::Value;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Default cap on total tool invocations across one [`AgentRuntime::run`] call.
pub const DEFAULT_TOOL_CALL_BUDGET: usize = 16;

/// One tool call the model requested and the registry (attempted to have)
/// executed, deduplicated by `(name, args, status)` within a round.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordedToolCall {
    pub name: String,
    pub args: Value,
    pub status: String,
}

/// Outcome of a completed or interrupted [`AgentRuntime::run`] call.
#[derive(Debug, Clone)]
pub struct AgentResult {
    pub final_content: String,
    pub tool_calls: Vec<RecordedToolCall>,
    pub images: Vec<String>,
    pub status: RunStatus,
    pub chunk_count: usize,
}

/// Read-only snapshot of a runtime's configuration, performing no I/O.
#[derive(Debug, Clone)]
pub struct AgentInfo {
    pub model: String,
    pub provider: Provider,
    pub agent_mode: AgentMode,
    pub memory_enabled: bool,
    pub tool_count: usize,
    pub instruction_level: InstructionLevel,
}

/// Fixed configuration for an [`AgentRuntime`].
pub struct AgentConfig {
    pub model: String,
    pub provider: Provider,
    pub agent_mode: AgentMode,
    pub instruction_level: InstructionLevel,
    pub memory_enabled: bool,
    pub tool_call_budget: usize,
}

impl AgentConfig {
    #[must_use]
    pub fn new(model: impl Into<String>, provider: Provider) -> Self {
        Self {
            model: model.into(),
            provider,
            agent_mode: AgentMode::Single,
            instruction_level: InstructionLevel::Concise,
            memory_enabled: true,
            tool_call_budget: DEFAULT_TOOL_CALL_BUDGET,
        }
    }
}

/// Drives the ReAct loop: request → stream → (tool calls)? → repeat.
pub struct AgentRuntime {
    llm: Arc<dyn LlmProvider>,
    tools: Arc<ToolRegistry>,
    config: AgentConfig,
}

impl AgentRuntime {
    #[must_use]
    pub fn new(llm: Arc<dyn LlmProvider>, tools: Arc<ToolRegistry>, config: AgentConfig) -> Self {
        Self { llm, tools, config }
    }

    /// Read-only introspection snapshot; performs no I/O.
    #[must_use]
    pub fn agent_info(&self) -> AgentInfo {
        AgentInfo {
            model: self.config.model.clone(),
            provider: self.config.provider,
            agent_mode: self.config.agent_mode,
            memory_enabled: self.config.memory_enabled,
            tool_count: self.tools.list_tools().len(),
            instruction_level: self.config.instruction_level,
        }
    }

    /// Runs one query to completion. `history` is prior conversation
    /// turns (oldest first); `query` is appended as the latest user
    /// turn. Cancelling `cancel` aborts the in-flight stream, any
    /// pending tool invocation, and the loop itself — partial content
    /// accumulated so far is still returned, tagged `status: Failed`.
    pub async fn run(
        &self,
        system: &str,
        history: &[ChatMessage],
        query: &str,
        cancel: CancellationToken,
    ) -> Result<AgentResult> {
        let mut messages: Vec<ChatMessage> = history.to_vec();
        messages.push(ChatMessage { role: Role::User, content: query.to_string() });

        let mut final_content = String::new();
        let mut tool_calls: Vec<RecordedToolCall> = Vec::new();
        let mut images: Vec<String> = Vec::new();
        let mut status = RunStatus::Running;
        let mut chunk_count = 0usize;
        let mut budget_used = 0usize;

        loop {
            if cancel.is_cancelled() {
                return Ok(AgentResult { final_content, tool_calls, images, status: RunStatus::Failed, chunk_count });
            }

            let request = CompletionRequest {
                system: system.to_string(),
                messages: messages.clone(),
                tools: self.tools.render_for_llm(),
                model: self.config.model.clone(),
            };

            let stream = self.llm.stream_chat(request).await?;
            tokio::pin!(stream);

            let mut accumulated = String::new();
            let mut round_tool_calls: Vec<RecordedToolCall> = Vec::new();
            let mut cancelled_mid_stream = false;

            loop {
                tokio::select! {
                    biased;
                    () = cancel.cancelled() => {
                        cancelled_mid_stream = true;
                        break;
                    }
                    next = stream.next() => match next {
                        Some(Ok(event)) => {
                            chunk_count += 1;
                            match event {
                                RunEvent::ContentDelta(text) => {
                                    for url in scrape_new_image_urls(&text, &images) {
                                        images.push(url);
                                    }
                                    accumulated.push_str(&text);
                                }
                                RunEvent::ToolCall { name, args, status: call_status } => {
                                    let call = RecordedToolCall { name, args, status: call_status };
                                    if !round_tool_calls.contains(&call) {
                                        round_tool_calls.push(call);
                                    }
                                }
                                RunEvent::StatusChange(RunStatus::Completed) => {
                                    status = RunStatus::Completed;
                                }
                                RunEvent::StatusChange(other) => {
                                    status = other;
                                }
                                RunEvent::Completed(content) => {
                                    accumulated = content;
                                    status = RunStatus::Completed;
                                }
                            }
                        }
                        Some(Err(e)) => {
                            tracing::warn!(error = %e, "agent stream error");
                            status = RunStatus::Failed;
                            break;
                        }
                        None => break,
                    }
                }
            }

            if cancelled_mid_stream {
                final_content = if accumulated.is_empty() { final_content } else { accumulated };
                return Ok(AgentResult { final_content, tool_calls, images, status: RunStatus::Failed, chunk_count });
            }

            final_content = accumulated.clone();
            if status == RunStatus::Running {
                status = RunStatus::Completed;
            }

            if round_tool_calls.is_empty() {
                break;
            }

            messages.push(ChatMessage { role: Role::Assistant, content: accumulated });

            for call in &round_tool_calls {
                if budget_used >= self.config.tool_call_budget {
                    final_content.push_str("\n\n[tool-call budget exceeded; stopping with current result]");
                    return Ok(AgentResult { final_content, tool_calls, images, status: RunStatus::Failed, chunk_count });
                }
                budget_used += 1;

                let outcome = self.tools.invoke(&call.name, call.args.clone(), cancel.clone()).await;
                let content = match outcome {
                    Ok(result) => result.into_content_string(),
                    Err(Error::NotFound(msg)) => format!("Error: {msg}"),
                    Err(e) => format!("Error: {e}"),
                };
                messages.push(ChatMessage { role: Role::Tool, content });
            }

            for call in round_tool_calls {
                if !tool_calls.contains(&call) {
                    tool_calls.push(call);
                }
            }
        }

        Ok(AgentResult { final_content, tool_calls, images, status, chunk_count })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tools::{Tool, ToolKind, ToolResult};
    use async_trait::async_trait;
    use futures::stream::BoxStream;

    struct ScriptedProvider {
        rounds: std::sync::Mutex<Vec<Vec<RunEvent>>>,
    }

    #[async_trait]
    impl LlmProvider for ScriptedProvider {
        fn name(&self) -> &'static str {
            "scripted"
        }
        async fn stream_chat(&self, _request: CompletionRequest) -> Result<BoxStream<'static, Result<RunEvent>>> {
            let mut rounds = self.rounds.lock().unwrap();
            let round = if rounds.is_empty() { Vec::new() } else { rounds.remove(0) };
            Ok(Box::pin(futures::stream::iter(round.into_iter().map(Ok))))
        }
    }

    struct NoopTool;
    #[async_trait]
    impl Tool for NoopTool {
        fn name(&self) -> &str {
            "noop"
        }
        fn description(&self) -> &str {
            "does nothing"
        }
        fn input_schema(&self) -> Value {
            Value::Null
        }
        fn kind(&self) -> ToolKind {
            ToolKind::BuiltIn
        }
        async fn execute(&self, _args: Value) -> ToolResult {
            ToolResult::text("done")
        }
    }

    fn registry() -> Arc<ToolRegistry> {
        let mut r = ToolRegistry::new();
        r.register(NoopTool).unwrap();
        Arc::new(r)
    }

    #[tokio::test]
    async fn stops_when_no_tool_calls_are_emitted() {
        let provider = Arc::new(ScriptedProvider {
            rounds: std::sync::Mutex::new(vec![vec![
                RunEvent::ContentDelta("hello".to_string()),
                RunEvent::StatusChange(RunStatus::Completed),
            ]]),
        });
        let runtime = AgentRuntime::new(provider, registry(), AgentConfig::new("test-model", Provider::Ollama));
        let result = runtime.run("be helpful", &[], "hi", CancellationToken::new()).await.unwrap();
        assert_eq!(result.final_content, "hello");
        assert!(result.tool_calls.is_empty());
        assert_eq!(result.status, RunStatus::Completed);
    }

    #[tokio::test]
    async fn invokes_tool_then_completes_on_second_round() {
        let provider = Arc::new(ScriptedProvider {
            rounds: std::sync::Mutex::new(vec![
                vec![RunEvent::ToolCall { name: "noop".to_string(), args: Value::Null, status: "complete".to_string() }],
                vec![RunEvent::ContentDelta("ok".to_string()), RunEvent::StatusChange(RunStatus::Completed)],
            ]),
        });
        let runtime = AgentRuntime::new(provider, registry(), AgentConfig::new("test-model", Provider::Ollama));
        let result = runtime.run("be helpful", &[], "hi", CancellationToken::new()).await.unwrap();
        assert_eq!(result.tool_calls.len(), 1);
        assert_eq!(result.final_content, "ok");
    }

    #[tokio::test]
    async fn dedups_identical_tool_calls_within_a_round() {
        let call = RunEvent::ToolCall { name: "noop".to_string(), args: Value::Null, status: "complete".to_string() };
        let provider = Arc::new(ScriptedProvider {
            rounds: std::sync::Mutex::new(vec![
                vec![call.clone(), call],
                vec![RunEvent::StatusChange(RunStatus::Completed)],
            ]),
        });
        let runtime = AgentRuntime::new(provider, registry(), AgentConfig::new("test-model", Provider::Ollama));
        let result = runtime.run("be helpful", &[], "hi", CancellationToken::new()).await.unwrap();
        assert_eq!(result.tool_calls.len(), 1);
    }

    #[tokio::test]
    async fn exhausting_budget_stops_the_loop() {
        let call = RunEvent::ToolCall { name: "noop".to_string(), args: Value::Null, status: "complete".to_string() };
        let mut rounds: Vec<Vec<RunEvent>> = (0..20).map(|i| {
            vec![RunEvent::ToolCall { name: "noop".to_string(), args: serde_json::json!({"i": i}), status: "complete".to_string() }]
        }).collect();
        rounds.push(vec![RunEvent::StatusChange(RunStatus::Completed)]);
        let _ = &call;
        let provider = Arc::new(ScriptedProvider { rounds: std::sync::Mutex::new(rounds) });
        let mut config = AgentConfig::new("test-model", Provider::Ollama);
        config.tool_call_budget = 3;
        let runtime = AgentRuntime::new(provider, registry(), config);
        let result = runtime.run("be helpful", &[], "hi", CancellationToken::new()).await.unwrap();
        assert_eq!(result.status, RunStatus::Failed);
        assert!(result.final_content.contains("budget exceeded"));
    }

    #[test]
    fn agent_info_reports_configured_values() {
        let provider: Arc<dyn LlmProvider> = Arc::new(ScriptedProvider { rounds: std::sync::Mutex::new(Vec::new()) });
        let runtime = AgentRuntime::new(provider, registry(), AgentConfig::new("llama3.2", Provider::Ollama));
        let info = runtime.agent_info();
        assert_eq!(info.model, "llama3.2");
        assert_eq!(info.tool_count, 1);
    }
}
