//! Unified knowledge-base query façade over the local semantic knowledge
//! base and the remote graph knowledge service, with mode auto-routing.

use crate::graph::GraphClient;
use crate::memory::MemoryStore;
use crate::{Error, Result};
use once_cell::sync::Lazy;
use regex::Regex;
use std::sync::Arc;

/// Retrieval mode for [`KnowledgeCoordinator::query`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum QueryMode {
    /// Local semantic knowledge base only.
    Local,
    /// Remote graph service, `global` mode.
    Global,
    /// Union of local and remote `hybrid` mode.
    Hybrid,
    /// Remote graph service, `mix` mode.
    Mix,
    /// Classify the query and pick one of the above.
    Auto,
}

impl QueryMode {
    /// Parses a mode name.
    pub fn parse(s: &str) -> Result<Self> {
        match s.to_lowercase().as_str() {
            "local" => Ok(Self::Local),
            "global" => Ok(Self::Global),
            "hybrid" => Ok(Self::Hybrid),
            "mix" => Ok(Self::Mix),
            "auto" => Ok(Self::Auto),
            other => Err(Error::InvalidInput(format!("invalid knowledge query mode: {other}"))),
        }
    }
}

static RELATIONSHIP_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(relationship|connection|between|how|why)\b").unwrap());
static FACTUAL_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(what|when|where|who|define)\b").unwrap());
static CREATIVE_WORDS: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(write|generate|compose|poem|story|imagine)\b").unwrap());

/// Presents a single query surface over the local knowledge base and the
/// remote graph knowledge service.
pub struct KnowledgeCoordinator {
    local: Arc<dyn MemoryStore>,
    graph: GraphClient,
}

impl KnowledgeCoordinator {
    /// Builds a coordinator over the given local store (used as the
    /// local knowledge base) and graph client.
    #[must_use]
    pub fn new(local: Arc<dyn MemoryStore>, graph: GraphClient) -> Self {
        Self { local, graph }
    }

    /// Queries the knowledge base under `mode`, auto-routing when
    /// `mode` is [`QueryMode::Auto`]. Rejects requests that look
    /// creative ("write a poem", "generate a story") unless they also
    /// contain a factual interrogative, preventing the knowledge surface
    /// from being abused as a generator.
    pub async fn query(&self, user_id: &str, q: &str, mode: QueryMode, limit: usize) -> Result<String> {
        if CREATIVE_WORDS.is_match(q) && !FACTUAL_WORDS.is_match(q) {
            return Err(Error::InvalidInput(
                "this looks like a creative-generation request, not a knowledge query".into(),
            ));
        }

        let resolved = match mode {
            QueryMode::Auto => Self::classify(q),
            other => other,
        };

        match resolved {
            QueryMode::Local => self.query_local(user_id, q, limit),
            QueryMode::Global => self.graph.query(q, "global", limit as u32).await,
            QueryMode::Hybrid => {
                let local = self.query_local(user_id, q, limit)?;
                let remote = self.graph.query(q, "hybrid", limit as u32).await.unwrap_or_default();
                Ok(format!("{local}\n\n{remote}").trim().to_string())
            }
            QueryMode::Mix => self.graph.query(q, "mix", limit as u32).await,
            QueryMode::Auto => unreachable!("resolved above"),
        }
    }

    fn classify(q: &str) -> QueryMode {
        if RELATIONSHIP_WORDS.is_match(q) {
            QueryMode::Global
        } else if FACTUAL_WORDS.is_match(q) {
            QueryMode::Local
        } else {
            QueryMode::Hybrid
        }
    }

    fn query_local(&self, user_id: &str, q: &str, limit: usize) -> Result<String> {
        let results = self.local.search_memories(user_id, q, limit, 0.3, true, 0.1)?;
        Ok(results
            .into_iter()
            .map(|(record, _)| record.text)
            .collect::<Vec<_>>()
            .join("\n"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn classifies_relationship_words_as_global() {
        assert_eq!(KnowledgeCoordinator::classify("how are Alice and Bob connected?"), QueryMode::Global);
    }

    #[test]
    fn classifies_factual_words_as_local() {
        assert_eq!(KnowledgeCoordinator::classify("what is my favorite color?"), QueryMode::Local);
    }

    #[test]
    fn falls_back_to_hybrid() {
        assert_eq!(KnowledgeCoordinator::classify("tell me about my week"), QueryMode::Hybrid);
    }

    #[tokio::test]
    async fn rejects_pure_creative_requests() {
        let store = Arc::new(crate::memory::SqliteMemoryStore::in_memory().unwrap());
        let coordinator = KnowledgeCoordinator::new(store, GraphClient::new("http://127.0.0.1:1"));
        let err = coordinator
            .query("alice", "write me a poem about the ocean", QueryMode::Auto, 5)
            .await
            .unwrap_err();
        assert!(matches!(err, Error::InvalidInput(_)));
    }

    #[tokio::test]
    async fn allows_creative_words_paired_with_factual_words() {
        let store = Arc::new(crate::memory::SqliteMemoryStore::in_memory().unwrap());
        store.add_memory("alice", "I love writing stories about dragons", &[]).unwrap();
        let coordinator = KnowledgeCoordinator::new(store, GraphClient::new("http://127.0.0.1:1"));
        let result = coordinator
            .query("alice", "what stories do I like to write?", QueryMode::Local, 5)
            .await;
        assert!(result.is_ok());
    }
}
