//! The two tools every agent mode gets for free: writing to the
//! coordinated memory store and querying the knowledge base.

use super::{Tool, ToolKind, ToolResult};
use crate::coordinator::MemoryCoordinator;
use crate::knowledge::{KnowledgeCoordinator, QueryMode};
use serde_json::Value;
use std::sync::Arc;

/// Wraps [`MemoryCoordinator::store_user_memory`] as an invocable tool.
pub struct MemoryTool {
    coordinator: Arc<MemoryCoordinator>,
    user_id: String,
}

impl MemoryTool {
    #[must_use]
    pub fn new(coordinator: Arc<MemoryCoordinator>, user_id: impl Into<String>) -> Self {
        Self { coordinator, user_id: user_id.into() }
    }
}

#[async_trait::async_trait]
impl Tool for MemoryTool {
    fn name(&self) -> &str {
        "remember"
    }

    fn description(&self) -> &str {
        "Stores a durable fact about the user for later recall."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "text": {"type": "string", "description": "the fact to remember"},
                "topics": {"type": "array", "items": {"type": "string"}, "description": "optional topic tags"},
            },
            "required": ["text"],
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Memory
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(text) = args.get("text").and_then(Value::as_str) else {
            return ToolResult::error("missing required parameter: text");
        };
        let topics = args.get("topics").and_then(Value::as_array).map(|arr| {
            arr.iter().filter_map(|v| v.as_str().map(str::to_string)).collect::<Vec<_>>()
        });
        match self.coordinator.store_user_memory(&self.user_id, text, topics).await {
            Ok((outcome, leg)) if outcome.accepted => {
                ToolResult::text(format!("remembered (id={}, graph_ok={:?})", outcome.id, leg.graph_ok))
            }
            Ok((outcome, _)) => ToolResult::text(format!("already known (existing id={})", outcome.id)),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

/// Wraps [`KnowledgeCoordinator::query`] as an invocable tool.
pub struct KnowledgeTool {
    coordinator: Arc<KnowledgeCoordinator>,
    user_id: String,
}

impl KnowledgeTool {
    #[must_use]
    pub fn new(coordinator: Arc<KnowledgeCoordinator>, user_id: impl Into<String>) -> Self {
        Self { coordinator, user_id: user_id.into() }
    }
}

#[async_trait::async_trait]
impl Tool for KnowledgeTool {
    fn name(&self) -> &str {
        "recall"
    }

    fn description(&self) -> &str {
        "Answers a factual question from the user's stored knowledge."
    }

    fn input_schema(&self) -> Value {
        serde_json::json!({
            "type": "object",
            "properties": {
                "query": {"type": "string"},
                "mode": {"type": "string", "enum": ["local", "global", "hybrid", "mix", "auto"]},
            },
            "required": ["query"],
        })
    }

    fn kind(&self) -> ToolKind {
        ToolKind::Knowledge
    }

    async fn execute(&self, args: Value) -> ToolResult {
        let Some(query) = args.get("query").and_then(Value::as_str) else {
            return ToolResult::error("missing required parameter: query");
        };
        let mode = args
            .get("mode")
            .and_then(Value::as_str)
            .map(QueryMode::parse)
            .transpose()
            .unwrap_or(Some(QueryMode::Auto))
            .unwrap_or(QueryMode::Auto);
        match self.coordinator.query(&self.user_id, query, mode, 5).await {
            Ok(text) if text.trim().is_empty() => ToolResult::text("no relevant knowledge found"),
            Ok(text) => ToolResult::text(text),
            Err(e) => ToolResult::error(e.to_string()),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::graph::GraphClient;
    use crate::memory::SqliteMemoryStore;

    #[tokio::test]
    async fn memory_tool_stores_a_fact() {
        let store = Arc::new(SqliteMemoryStore::in_memory().unwrap());
        let coordinator = Arc::new(MemoryCoordinator::new(store, GraphClient::new("http://127.0.0.1:1")));
        let tool = MemoryTool::new(coordinator, "alice");
        let result = tool.execute(serde_json::json!({"text": "I live in Paris."})).await;
        assert!(matches!(result, ToolResult::Text(s) if s.contains("remembered")));
    }

    #[tokio::test]
    async fn memory_tool_requires_text() {
        let store = Arc::new(SqliteMemoryStore::in_memory().unwrap());
        let coordinator = Arc::new(MemoryCoordinator::new(store, GraphClient::new("http://127.0.0.1:1")));
        let tool = MemoryTool::new(coordinator, "alice");
        let result = tool.execute(serde_json::json!({})).await;
        assert!(result.is_error());
    }

    #[tokio::test]
    async fn knowledge_tool_answers_from_local_store() {
        let store = Arc::new(SqliteMemoryStore::in_memory().unwrap());
        store.add_memory("alice", "my favorite color is blue", &[]).unwrap();
        let knowledge =
            Arc::new(KnowledgeCoordinator::new(store, GraphClient::new("http://127.0.0.1:1")));
        let tool = KnowledgeTool::new(knowledge, "alice");
        let result = tool
            .execute(serde_json::json!({"query": "what is my favorite color?", "mode": "local"}))
            .await;
        assert!(matches!(result, ToolResult::Text(s) if s.contains("blue")));
    }
}
