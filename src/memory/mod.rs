//! The local semantic memory store (one durable, vector-less but
//! similarity-ranked key/value store per user).
//!
//! A [`MemoryStore`] is the sole owner of memory record persistence;
//! every other component (the [`crate::coordinator`] above it, the CLI)
//! reaches memory only through this trait. The default implementation,
//! [`sqlite::SqliteMemoryStore`], keeps one SQLite file per user.

pub mod similarity;
mod sqlite;

pub use sqlite::SqliteMemoryStore;

use crate::Result;
use serde::Serialize;

/// The default similarity threshold above which [`MemoryStore::add_memory`]
/// rejects a write as a duplicate.
pub const DEDUP_THRESHOLD: f64 = 0.8;

/// The default similarity threshold [`MemoryStore::search_memories`] uses
/// when the caller does not supply one.
pub const DEFAULT_SEARCH_THRESHOLD: f64 = 0.7;

/// A stored memory record. Text is kept verbatim (first person
/// preserved); only the [`crate::coordinator`] layer restates it before
/// it ever reaches the graph store.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct MemoryRecord {
    /// Opaque id, unique within a user's scope.
    pub id: String,
    /// Owning user.
    pub user_id: String,
    /// Verbatim memory text.
    pub text: String,
    /// Topic tags, in insertion order.
    pub topics: Vec<String>,
    /// Unix timestamp of creation.
    pub created_at: u64,
    /// Unix timestamp of the last update.
    pub updated_at: u64,
}

/// Result of [`MemoryStore::add_memory`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AddMemoryOutcome {
    /// Whether a new record was created.
    pub accepted: bool,
    /// Human-readable explanation (e.g. which existing record this
    /// collided with, when rejected).
    pub message: String,
    /// The id of the new record when accepted, or of the existing
    /// near-duplicate when rejected.
    pub id: String,
}

/// Aggregate statistics for one user's memory scope.
#[derive(Debug, Clone, Default, Serialize)]
pub struct MemoryStats {
    /// Total live (non-deleted) records.
    pub total_memories: usize,
    /// Records created in the last 24 hours.
    pub recent_24h: usize,
    /// The most frequently occurring topic, if any.
    pub most_common_topic: Option<String>,
}

/// The local semantic memory store contract. Implementations must uphold
/// the dedup invariant in [`MemoryStore::add_memory`] and durability of
/// every successful write before it returns.
pub trait MemoryStore: Send + Sync {
    /// Inserts `text` for `user_id`, rejecting it as a duplicate if an
    /// existing record for the same user scores at or above
    /// [`DEDUP_THRESHOLD`] against it.
    fn add_memory(&self, user_id: &str, text: &str, topics: &[String]) -> Result<AddMemoryOutcome>;

    /// Ranked similarity + optional topic-boosted search.
    fn search_memories(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
        threshold: f64,
        search_topics: bool,
        topic_boost: f64,
    ) -> Result<Vec<(MemoryRecord, f64)>>;

    /// All live records for a user.
    fn get_all_memories(&self, user_id: &str) -> Result<Vec<MemoryRecord>>;

    /// Records whose topic set intersects `topics` (empty `topics`
    /// returns everything, matching an unrestricted filter).
    fn get_memories_by_topic(&self, user_id: &str, topics: &[String]) -> Result<Vec<MemoryRecord>>;

    /// The `limit` most recently created records, most recent first.
    fn get_recent_memories(&self, user_id: &str, limit: usize) -> Result<Vec<MemoryRecord>>;

    /// Partially updates a record. `None` fields are left unchanged.
    /// Fails with [`crate::Error::NotFound`] if `id` is not owned by
    /// `user_id`.
    fn update_memory(
        &self,
        id: &str,
        user_id: &str,
        text: Option<&str>,
        topics: Option<&[String]>,
    ) -> Result<()>;

    /// Deletes a record. Idempotent: deleting an already-deleted (or
    /// never-existing) id returns `Ok(false)`, not an error.
    fn delete_memory(&self, id: &str, user_id: &str) -> Result<bool>;

    /// Deletes every record for `user_id` and compacts storage so a
    /// fresh read observes zero rows.
    fn clear_memories(&self, user_id: &str) -> Result<()>;

    /// Aggregate statistics for `user_id`.
    fn get_memory_stats(&self, user_id: &str) -> Result<MemoryStats>;
}
