//! `SQLite`-backed [`MemoryStore`] implementation.

use super::similarity::{SimilarityScorer, TokenOverlapScorer};
use super::{AddMemoryOutcome, MemoryRecord, MemoryStats, MemoryStore, DEDUP_THRESHOLD};
use crate::{current_timestamp, Error, Result};
use rusqlite::{params, Connection, OptionalExtension};
use std::path::{Path, PathBuf};
use std::sync::Mutex;
use uuid::Uuid;

/// `SQLite`-based [`MemoryStore`].
///
/// Uses a `Mutex<Connection>` for thread-safe access, the same concurrency
/// model the persistence backend this module is grounded on uses: WAL
/// mode plus a `busy_timeout` pragma let readers proceed without waiting
/// on the single writer.
pub struct SqliteMemoryStore {
    conn: Mutex<Connection>,
    scorer: Box<dyn SimilarityScorer>,
    db_path: Option<PathBuf>,
}

impl SqliteMemoryStore {
    /// Opens (creating if necessary) the database at `db_path`.
    pub fn open(db_path: impl AsRef<Path>) -> Result<Self> {
        let db_path = db_path.as_ref();
        if let Some(parent) = db_path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| {
                Error::Fatal(format!("cannot create memory store directory: {e}"))
            })?;
        }
        let conn = Connection::open(db_path).map_err(|e| {
            Error::Fatal(format!("cannot open memory store at {}: {e}", db_path.display()))
        })?;
        let store = Self {
            conn: Mutex::new(conn),
            scorer: Box::new(TokenOverlapScorer),
            db_path: Some(db_path.to_path_buf()),
        };
        store.initialize()?;
        Ok(store)
    }

    /// An in-memory store, useful for tests.
    pub fn in_memory() -> Result<Self> {
        let conn = Connection::open_in_memory()
            .map_err(|e| Error::Fatal(format!("cannot open in-memory store: {e}")))?;
        let store = Self {
            conn: Mutex::new(conn),
            scorer: Box::new(TokenOverlapScorer),
            db_path: None,
        };
        store.initialize()?;
        Ok(store)
    }

    /// Path to the backing file, if any.
    #[must_use]
    pub const fn db_path(&self) -> Option<&PathBuf> {
        self.db_path.as_ref()
    }

    fn initialize(&self) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute_batch(
            "PRAGMA journal_mode=WAL;
             PRAGMA busy_timeout=5000;
             PRAGMA synchronous=NORMAL;",
        )
        .map_err(op_failed("configure_connection"))?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS memories (
                id TEXT PRIMARY KEY,
                user_id TEXT NOT NULL,
                text TEXT NOT NULL,
                topics TEXT NOT NULL DEFAULT '',
                created_at INTEGER NOT NULL,
                updated_at INTEGER NOT NULL
            )",
            [],
        )
        .map_err(op_failed("create_memories_table"))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_memories_user ON memories(user_id)",
            [],
        )
        .map_err(op_failed("create_user_index"))?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_memories_user_created ON memories(user_id, created_at)",
            [],
        )
        .map_err(op_failed("create_user_created_index"))?;
        Ok(())
    }

    fn row_to_record(id: String, user_id: String, text: String, topics: String, created_at: i64, updated_at: i64) -> MemoryRecord {
        MemoryRecord {
            id,
            user_id,
            text,
            topics: split_topics(&topics),
            created_at: created_at.max(0) as u64,
            updated_at: updated_at.max(0) as u64,
        }
    }
}

fn op_failed(operation: &'static str) -> impl Fn(rusqlite::Error) -> Error {
    move |e| Error::Fatal(format!("{operation} failed: {e}"))
}

fn join_topics(topics: &[String]) -> String {
    topics.join("\u{1f}")
}

fn split_topics(joined: &str) -> Vec<String> {
    if joined.is_empty() {
        Vec::new()
    } else {
        joined.split('\u{1f}').map(str::to_string).collect()
    }
}

impl MemoryStore for SqliteMemoryStore {
    fn add_memory(&self, user_id: &str, text: &str, topics: &[String]) -> Result<AddMemoryOutcome> {
        let trimmed = text.trim();
        if trimmed.is_empty() {
            return Err(Error::InvalidInput("memory text must not be empty".into()));
        }

        // Dedup check happens before acquiring the write lock for the
        // insert itself, but both steps run while holding the same
        // connection lock so a concurrent add_memory for this user
        // cannot interleave between the check and the insert.
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let existing: Vec<(String, String)> = {
            let mut stmt = conn
                .prepare("SELECT id, text FROM memories WHERE user_id = ?1")
                .map_err(op_failed("prepare_dedup_scan"))?;
            let rows = stmt
                .query_map(params![user_id], |row| {
                    Ok((row.get::<_, String>(0)?, row.get::<_, String>(1)?))
                })
                .map_err(op_failed("scan_existing_memories"))?;
            rows.collect::<std::result::Result<Vec<_>, _>>()
                .map_err(op_failed("collect_existing_memories"))?
        };

        for (existing_id, existing_text) in &existing {
            if self.scorer.score(trimmed, existing_text) >= DEDUP_THRESHOLD {
                return Ok(AddMemoryOutcome {
                    accepted: false,
                    message: format!("duplicate of existing memory {existing_id}"),
                    id: existing_id.clone(),
                });
            }
        }

        let id = Uuid::now_v7().to_string();
        let now = current_timestamp().try_into().unwrap_or(i64::MAX);
        conn.execute(
            "INSERT INTO memories (id, user_id, text, topics, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?5)",
            params![id, user_id, trimmed, join_topics(topics), now],
        )
        .map_err(op_failed("insert_memory"))?;

        Ok(AddMemoryOutcome {
            accepted: true,
            message: "stored".to_string(),
            id,
        })
    }

    fn search_memories(
        &self,
        user_id: &str,
        query: &str,
        limit: usize,
        threshold: f64,
        search_topics: bool,
        topic_boost: f64,
    ) -> Result<Vec<(MemoryRecord, f64)>> {
        let all = self.get_all_memories(user_id)?;
        let query_lower = query.to_lowercase();
        let mut scored: Vec<(MemoryRecord, f64)> = all
            .into_iter()
            .filter_map(|record| {
                let mut score = self.scorer.score(query, &record.text);
                if search_topics
                    && record
                        .topics
                        .iter()
                        .any(|t| t.to_lowercase().contains(&query_lower))
                {
                    score += topic_boost;
                }
                if score >= threshold {
                    Some((record, score))
                } else {
                    None
                }
            })
            .collect();
        scored.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap_or(std::cmp::Ordering::Equal));
        scored.truncate(limit);
        Ok(scored)
    }

    fn get_all_memories(&self, user_id: &str) -> Result<Vec<MemoryRecord>> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let mut stmt = conn
            .prepare(
                "SELECT id, user_id, text, topics, created_at, updated_at
                 FROM memories WHERE user_id = ?1 ORDER BY created_at DESC",
            )
            .map_err(op_failed("prepare_get_all"))?;
        let rows = stmt
            .query_map(params![user_id], |row| {
                Ok(Self::row_to_record(
                    row.get(0)?,
                    row.get(1)?,
                    row.get(2)?,
                    row.get(3)?,
                    row.get(4)?,
                    row.get(5)?,
                ))
            })
            .map_err(op_failed("query_get_all"))?;
        rows.collect::<std::result::Result<Vec<_>, _>>()
            .map_err(op_failed("collect_get_all"))
    }

    fn get_memories_by_topic(&self, user_id: &str, topics: &[String]) -> Result<Vec<MemoryRecord>> {
        if topics.is_empty() {
            return self.get_all_memories(user_id);
        }
        let all = self.get_all_memories(user_id)?;
        Ok(all
            .into_iter()
            .filter(|r| topics.iter().any(|t| r.topics.contains(t)))
            .collect())
    }

    fn get_recent_memories(&self, user_id: &str, limit: usize) -> Result<Vec<MemoryRecord>> {
        let mut all = self.get_all_memories(user_id)?;
        all.truncate(limit);
        Ok(all)
    }

    fn update_memory(
        &self,
        id: &str,
        user_id: &str,
        text: Option<&str>,
        topics: Option<&[String]>,
    ) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let current: Option<(String, String)> = conn
            .query_row(
                "SELECT text, topics FROM memories WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
                |row| Ok((row.get(0)?, row.get(1)?)),
            )
            .optional()
            .map_err(op_failed("lookup_for_update"))?;
        let Some((current_text, current_topics)) = current else {
            return Err(Error::NotFound(format!("memory {id} not found for user {user_id}")));
        };

        let new_text = text.unwrap_or(&current_text);
        let new_topics = topics.map(join_topics).unwrap_or(current_topics);
        let now = current_timestamp().try_into().unwrap_or(i64::MAX);

        conn.execute(
            "UPDATE memories SET text = ?1, topics = ?2, updated_at = ?3 WHERE id = ?4 AND user_id = ?5",
            params![new_text, new_topics, now, id, user_id],
        )
        .map_err(op_failed("update_memory"))?;
        Ok(())
    }

    fn delete_memory(&self, id: &str, user_id: &str) -> Result<bool> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        let affected = conn
            .execute(
                "DELETE FROM memories WHERE id = ?1 AND user_id = ?2",
                params![id, user_id],
            )
            .map_err(op_failed("delete_memory"))?;
        Ok(affected > 0)
    }

    fn clear_memories(&self, user_id: &str) -> Result<()> {
        let conn = self.conn.lock().unwrap_or_else(|e| e.into_inner());
        conn.execute("DELETE FROM memories WHERE user_id = ?1", params![user_id])
            .map_err(op_failed("clear_memories"))?;
        conn.execute_batch("VACUUM;").map_err(op_failed("vacuum_after_clear"))?;
        let remaining: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM memories WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )
            .map_err(op_failed("verify_clear"))?;
        if remaining != 0 {
            return Err(Error::Consistency(format!(
                "clear_memories did not reach zero rows for user {user_id}: {remaining} remain"
            )));
        }
        Ok(())
    }

    fn get_memory_stats(&self, user_id: &str) -> Result<MemoryStats> {
        let all = self.get_all_memories(user_id)?;
        let now = current_timestamp();
        let recent_24h = all
            .iter()
            .filter(|r| now.saturating_sub(r.created_at) <= 24 * 3600)
            .count();
        let mut counts: std::collections::HashMap<&str, usize> = std::collections::HashMap::new();
        for record in &all {
            for topic in &record.topics {
                *counts.entry(topic.as_str()).or_insert(0) += 1;
            }
        }
        let most_common_topic = counts
            .into_iter()
            .max_by_key(|(_, count)| *count)
            .map(|(topic, _)| topic.to_string());
        Ok(MemoryStats {
            total_memories: all.len(),
            recent_24h,
            most_common_topic,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn store() -> SqliteMemoryStore {
        SqliteMemoryStore::in_memory().unwrap()
    }

    #[test]
    fn add_memory_rejects_empty_text() {
        let store = store();
        assert!(store.add_memory("alice", "   ", &[]).is_err());
    }

    #[test]
    fn add_memory_twice_is_idempotent_via_duplicate() {
        let store = store();
        let first = store.add_memory("alice", "I live in Paris.", &[]).unwrap();
        assert!(first.accepted);
        let second = store.add_memory("alice", "I live in Paris", &[]).unwrap();
        assert!(!second.accepted);
        assert_eq!(second.id, first.id);
        assert_eq!(store.get_memory_stats("alice").unwrap().total_memories, 1);
    }

    #[test]
    fn delete_memory_is_idempotent() {
        let store = store();
        let added = store.add_memory("alice", "I love Python", &[]).unwrap();
        assert!(store.delete_memory(&added.id, "alice").unwrap());
        assert!(!store.delete_memory(&added.id, "alice").unwrap());
    }

    #[test]
    fn clear_memories_reaches_zero() {
        let store = store();
        store.add_memory("alice", "fact one", &[]).unwrap();
        store.add_memory("alice", "fact two, unrelated to one", &[]).unwrap();
        store.clear_memories("alice").unwrap();
        assert_eq!(store.get_memory_stats("alice").unwrap().total_memories, 0);
    }

    #[test]
    fn search_memories_ranks_by_score_descending() {
        let store = store();
        store.add_memory("alice", "I love hiking in the mountains", &[]).unwrap();
        store.add_memory("alice", "I love hiking and camping in the mountains", &[]).unwrap();
        let results = store
            .search_memories("alice", "hiking in the mountains", 10, 0.1, false, 0.0)
            .unwrap();
        assert!(results.len() >= 1);
        for pair in results.windows(2) {
            assert!(pair[0].1 >= pair[1].1);
        }
    }

    #[test]
    fn update_memory_fails_for_unknown_id() {
        let store = store();
        let err = store.update_memory("missing", "alice", Some("x"), None).unwrap_err();
        assert!(matches!(err, Error::NotFound(_)));
    }

    #[test]
    fn memories_are_scoped_per_user() {
        let store = store();
        store.add_memory("alice", "alice's fact", &[]).unwrap();
        store.add_memory("bob", "bob's fact", &[]).unwrap();
        assert_eq!(store.get_all_memories("alice").unwrap().len(), 1);
        assert_eq!(store.get_all_memories("bob").unwrap().len(), 1);
    }
}
