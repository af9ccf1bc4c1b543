//! Tool descriptors and dispatch for the agent loop.
//!
//! Subprocess tools are described at registration time but never kept
//! running: each invocation spawns a fresh child process over stdio and
//! tears it down on completion, so no tool holds state across calls.

mod builtin;
mod subprocess;

pub use builtin::{KnowledgeTool, MemoryTool};
pub use subprocess::SubprocessTool;

use crate::{Error, Result};
use serde_json::Value;
use std::collections::HashMap;
use std::sync::Arc;
use tokio_util::sync::CancellationToken;

/// Which of the five tool categories a [`Tool`] belongs to. Matches the
/// `kind` field of a tool descriptor one to one.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ToolKind {
    BuiltIn,
    Subprocess,
    Memory,
    Knowledge,
    Mcp,
}

/// Outcome of a tool invocation.
#[derive(Debug, Clone)]
pub enum ToolResult {
    Text(String),
    Json(Value),
    Error(String),
}

impl ToolResult {
    #[must_use]
    pub fn text(s: impl Into<String>) -> Self {
        Self::Text(s.into())
    }

    #[must_use]
    pub fn error(s: impl Into<String>) -> Self {
        Self::Error(s.into())
    }

    #[must_use]
    pub fn is_error(&self) -> bool {
        matches!(self, Self::Error(_))
    }

    #[must_use]
    pub fn into_content_string(self) -> String {
        match self {
            Self::Text(s) => s,
            Self::Json(v) => serde_json::to_string_pretty(&v).unwrap_or_default(),
            Self::Error(e) => format!("Error: {e}"),
        }
    }
}

/// A single invocable capability the agent loop can call. Implementors
/// describe themselves (name, description, JSON schema, kind) and run
/// synchronously-from-the-caller's-perspective [`Tool::execute`]; the
/// default [`Tool::execute_cancellable`] races that against a
/// [`CancellationToken`] so a long-running tool can be interrupted
/// without the trait needing to know how.
#[async_trait::async_trait]
pub trait Tool: Send + Sync {
    /// Unique name; registration under a duplicate name is rejected.
    fn name(&self) -> &str;
    /// Human-readable description surfaced to the LLM adapter.
    fn description(&self) -> &str;
    /// JSON Schema for the tool's input arguments.
    fn input_schema(&self) -> Value;
    /// Which category this tool falls under.
    fn kind(&self) -> ToolKind;

    /// Runs the tool against `args`.
    async fn execute(&self, args: Value) -> ToolResult;

    /// Runs the tool, abandoning it in favor of `ToolResult::text("[cancelled]")`
    /// if `cancel` fires first. Tools that own a child process (see
    /// [`SubprocessTool`]) override this to kill the child on cancellation.
    async fn execute_cancellable(&self, args: Value, cancel: CancellationToken) -> ToolResult {
        tokio::select! {
            result = self.execute(args) => result,
            () = cancel.cancelled() => ToolResult::text("[cancelled]"),
        }
    }
}

/// Read-only summary of a registered tool, for introspection and for
/// building the LLM-facing tool list.
#[derive(Debug, Clone)]
pub struct ToolDescriptor {
    pub name: String,
    pub description: String,
    pub input_schema: Value,
    pub kind: ToolKind,
}

/// Holds every tool available to the agent loop for one run, keyed by
/// unique name.
#[derive(Default)]
pub struct ToolRegistry {
    tools: HashMap<String, Arc<dyn Tool>>,
}

impl ToolRegistry {
    #[must_use]
    pub fn new() -> Self {
        Self { tools: HashMap::new() }
    }

    /// Registers `tool`. Fails with [`Error::Duplicate`] if a tool with
    /// the same name is already registered.
    pub fn register(&mut self, tool: impl Tool + 'static) -> Result<()> {
        let name = tool.name().to_string();
        if self.tools.contains_key(&name) {
            return Err(Error::Duplicate { existing_id: name });
        }
        self.tools.insert(name, Arc::new(tool));
        Ok(())
    }

    #[must_use]
    pub fn get(&self, name: &str) -> Option<Arc<dyn Tool>> {
        self.tools.get(name).cloned()
    }

    /// Lists every registered tool's descriptor.
    #[must_use]
    pub fn list_tools(&self) -> Vec<ToolDescriptor> {
        self.tools
            .values()
            .map(|t| ToolDescriptor {
                name: t.name().to_string(),
                description: t.description().to_string(),
                input_schema: t.input_schema(),
                kind: t.kind(),
            })
            .collect()
    }

    /// Renders every tool's `{name, description, input_schema}` as the
    /// shape an LLM tool-use adapter expects.
    #[must_use]
    pub fn render_for_llm(&self) -> Vec<Value> {
        self.tools
            .values()
            .map(|t| {
                serde_json::json!({
                    "name": t.name(),
                    "description": t.description(),
                    "input_schema": t.input_schema(),
                })
            })
            .collect()
    }

    /// Invokes `name` with `args`, racing a cancellation signal. Fails
    /// with [`Error::NotFound`] for an unknown tool name.
    pub async fn invoke(&self, name: &str, args: Value, cancel: CancellationToken) -> Result<ToolResult> {
        let tool = self.get(name).ok_or_else(|| Error::NotFound(format!("tool not registered: {name}")))?;
        Ok(tool.execute_cancellable(args, cancel).await)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct EchoTool;

    #[async_trait::async_trait]
    impl Tool for EchoTool {
        fn name(&self) -> &str {
            "echo"
        }
        fn description(&self) -> &str {
            "echoes its input"
        }
        fn input_schema(&self) -> Value {
            serde_json::json!({"type": "object"})
        }
        fn kind(&self) -> ToolKind {
            ToolKind::BuiltIn
        }
        async fn execute(&self, args: Value) -> ToolResult {
            ToolResult::Json(args)
        }
    }

    #[tokio::test]
    async fn invoke_unknown_tool_is_not_found() {
        let registry = ToolRegistry::new();
        let err = registry.invoke("missing", Value::Null, CancellationToken::new()).await.unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[tokio::test]
    async fn register_rejects_duplicate_names() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        let err = registry.register(EchoTool).unwrap_err();
        assert!(matches!(err, Error::Duplicate { .. }));
    }

    #[tokio::test]
    async fn invoke_runs_the_registered_tool() {
        let mut registry = ToolRegistry::new();
        registry.register(EchoTool).unwrap();
        let result = registry
            .invoke("echo", serde_json::json!({"x": 1}), CancellationToken::new())
            .await
            .unwrap();
        assert!(matches!(result, ToolResult::Json(_)));
    }

    #[tokio::test]
    async fn cancellation_short_circuits_a_tool_that_never_resolves() {
        struct Hangs;
        #[async_trait::async_trait]
        impl Tool for Hangs {
            fn name(&self) -> &str {
                "hangs"
            }
            fn description(&self) -> &str {
                "never returns"
            }
            fn input_schema(&self) -> Value {
                Value::Null
            }
            fn kind(&self) -> ToolKind {
                ToolKind::BuiltIn
            }
            async fn execute(&self, _args: Value) -> ToolResult {
                std::future::pending::<()>().await;
                unreachable!()
            }
        }
        let mut registry = ToolRegistry::new();
        registry.register(Hangs).unwrap();
        let cancel = CancellationToken::new();
        cancel.cancel();
        let result = registry.invoke("hangs", Value::Null, cancel).await.unwrap();
        assert!(matches!(result, ToolResult::Text(s) if s == "[cancelled]"));
    }
}
