//! Dual-write/dual-read coordination between the local semantic store
//! ([`crate::memory`]) and the remote knowledge graph
//! ([`crate::graph`]).
//!
//! [`MemoryCoordinator`] is the sole authority for user-memory writes and
//! coordinated deletes: local writes are synchronous and authoritative,
//! graph writes are best-effort and eventually consistent. A graph
//! failure never rolls back a successful local write — the merged result
//! reports per-leg status instead.

mod restate;

pub use restate::restate;

use crate::graph::GraphClient;
use crate::memory::{AddMemoryOutcome, MemoryStore};
use crate::{Error, Result};
use std::collections::HashMap;
use std::sync::{Arc, Mutex};
use uuid::Uuid;

/// Per-leg outcome of a coordinated write or delete.
#[derive(Debug, Clone, Default)]
pub struct LegResult {
    /// Whether the local semantic store leg succeeded.
    pub local_ok: bool,
    /// Whether the graph leg succeeded (`None` if it was never attempted,
    /// e.g. because the local write was rejected as a duplicate).
    pub graph_ok: Option<bool>,
    /// Human-readable detail, primarily for the graph leg.
    pub detail: String,
}

/// Coordinates writes and deletes across the semantic store and the
/// knowledge graph for one user.
pub struct MemoryCoordinator {
    store: Arc<dyn MemoryStore>,
    graph: GraphClient,
    /// Maps a local memory id to the graph document id it was ingested
    /// under, so a later delete targets the document that actually
    /// exists rather than reusing the memory id as a guess.
    graph_ids: Mutex<HashMap<String, String>>,
}

impl MemoryCoordinator {
    /// Builds a coordinator over the given store and graph client.
    #[must_use]
    pub fn new(store: Arc<dyn MemoryStore>, graph: GraphClient) -> Self {
        Self { store, graph, graph_ids: Mutex::new(HashMap::new()) }
    }

    /// Stores a user memory: validates, auto-classifies topics if none
    /// were given, writes to the local store (which performs the dedup
    /// check), and — only if accepted — restates the text and ingests it
    /// into the graph.
    pub async fn store_user_memory(
        &self,
        user_id: &str,
        text: &str,
        topics: Option<Vec<String>>,
    ) -> Result<(AddMemoryOutcome, LegResult)> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("memory text must not be empty".into()));
        }
        let topics = topics.unwrap_or_else(|| classify_topics(trimmed));

        let outcome = self.store.add_memory(user_id, trimmed, &topics)?;
        if !outcome.accepted {
            return Ok((
                outcome,
                LegResult {
                    local_ok: true,
                    graph_ok: None,
                    detail: "duplicate: graph write skipped".to_string(),
                },
            ));
        }

        let restated = restate(trimmed, user_id);
        let document_id = Uuid::now_v7().to_string();
        let leg = match self.graph.ingest_text(&restated, &document_id).await {
            Ok(()) => {
                self.graph_ids
                    .lock()
                    .unwrap_or_else(|e| e.into_inner())
                    .insert(outcome.id.clone(), document_id);
                LegResult {
                    local_ok: true,
                    graph_ok: Some(true),
                    detail: "ingested".to_string(),
                }
            }
            Err(e) => {
                tracing::warn!(user_id, error = %e, "graph ingest failed; local write kept");
                LegResult {
                    local_ok: true,
                    graph_ok: Some(false),
                    detail: e.to_string(),
                }
            }
        };
        Ok((outcome, leg))
    }

    /// Deletes a memory locally and best-effort mirrors the delete to
    /// the graph. The graph leg deletes by the document id recorded at
    /// ingest time (see [`Self::store_user_memory`]); if no correlation
    /// was ever recorded (e.g. the memory predates this coordinator
    /// instance), it falls back to the memory id itself.
    pub async fn delete_memory(&self, id: &str, user_id: &str) -> Result<LegResult> {
        let deleted = self.store.delete_memory(id, user_id)?;
        if !deleted {
            return Err(Error::NotFound(format!("memory {id} not found for user {user_id}")));
        }
        let document_id = self
            .graph_ids
            .lock()
            .unwrap_or_else(|e| e.into_inner())
            .remove(id)
            .unwrap_or_else(|| id.to_string());
        match self.graph.delete_documents(&[document_id], false).await {
            Ok(outcome) => Ok(LegResult {
                local_ok: true,
                graph_ok: Some(outcome.accepted),
                detail: outcome.message,
            }),
            Err(e) => Ok(LegResult {
                local_ok: true,
                graph_ok: Some(false),
                detail: e.to_string(),
            }),
        }
    }

    /// Deletes every memory for `user_id` tagged with any of `topics`.
    pub async fn delete_by_topic(&self, user_id: &str, topics: &[String]) -> Result<Vec<LegResult>> {
        let matching = self.store.get_memories_by_topic(user_id, topics)?;
        let mut results = Vec::with_capacity(matching.len());
        for record in matching {
            results.push(self.delete_memory(&record.id, user_id).await?);
        }
        Ok(results)
    }

    /// Uploads a synthetic Markdown stub declaring an entity, so graph
    /// queries have a node to anchor on.
    pub async fn seed_entity_in_graph(&self, name: &str, entity_type: &str) -> Result<()> {
        let text = format!("# {name}\n\nType: {entity_type}");
        let document_id = Uuid::now_v7().to_string();
        self.graph.ingest_text(&text, &document_id).await
    }

    /// Checks whether `name` appears in a local-mode graph query's
    /// retrieved context (case-insensitive substring match).
    pub async fn check_entity_exists(&self, name: &str) -> Result<bool> {
        let response = self.graph.query(name, "local", 5).await?;
        Ok(response.to_lowercase().contains(&name.to_lowercase()))
    }
}

/// Derives a small set of topic tokens from free text by keyword
/// heuristics, used when [`MemoryCoordinator::store_user_memory`] is
/// called without explicit topics. Has no effect on the stored text.
fn classify_topics(text: &str) -> Vec<String> {
    const KEYWORDS: &[(&str, &str)] = &[
        ("work", "work"),
        ("job", "work"),
        ("career", "work"),
        ("family", "family"),
        ("wife", "family"),
        ("husband", "family"),
        ("son", "family"),
        ("daughter", "family"),
        ("hobby", "hobbies"),
        ("hike", "hobbies"),
        ("hiking", "hobbies"),
        ("music", "hobbies"),
        ("cook", "hobbies"),
        ("live", "location"),
        ("city", "location"),
        ("address", "location"),
        ("like", "preferences"),
        ("love", "preferences"),
        ("favorite", "preferences"),
        ("prefer", "preferences"),
    ];
    let lower = text.to_lowercase();
    let mut topics: Vec<String> = KEYWORDS
        .iter()
        .filter(|(kw, _)| lower.contains(kw))
        .map(|(_, topic)| (*topic).to_string())
        .collect();
    topics.dedup();
    topics
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SqliteMemoryStore;

    fn coordinator() -> MemoryCoordinator {
        let store = Arc::new(SqliteMemoryStore::in_memory().unwrap());
        MemoryCoordinator::new(store, GraphClient::new("http://127.0.0.1:1"))
    }

    #[tokio::test]
    async fn store_user_memory_rejects_empty_text() {
        let coordinator = coordinator();
        assert!(coordinator.store_user_memory("alice", "  ", None).await.is_err());
    }

    #[tokio::test]
    async fn duplicate_store_skips_graph_leg() {
        let coordinator = coordinator();
        let (first, leg1) = coordinator
            .store_user_memory("alice", "I live in Paris.", None)
            .await
            .unwrap();
        assert!(first.accepted);
        assert_eq!(leg1.graph_ok, Some(false)); // graph endpoint unreachable in test

        let (second, leg2) = coordinator
            .store_user_memory("alice", "I live in Paris", None)
            .await
            .unwrap();
        assert!(!second.accepted);
        assert_eq!(second.id, first.id);
        assert_eq!(leg2.graph_ok, None);
    }

    #[test]
    fn classify_topics_finds_keywords() {
        let topics = classify_topics("I love hiking with my family");
        assert!(topics.contains(&"hobbies".to_string()));
        assert!(topics.contains(&"family".to_string()));
    }
}
