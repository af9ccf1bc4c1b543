//! Coordinated, stepwise clearing across the semantic store, the graph
//! service, the on-disk memory inputs directory, knowledge-graph
//! artifacts, and the graph server's cache.
//!
//! Each step is independent and individually gated by
//! [`ClearingOptions`]; [`MemoryClearingService::clear_all`] aggregates
//! them under a strict success rule: overall success requires at least
//! one attempted step to succeed and none to fail.

use crate::graph::GraphClient;
use crate::memory::MemoryStore;
use std::path::PathBuf;
use std::sync::Arc;

/// Outcome of one clearing step.
#[derive(Debug, Clone, Default)]
pub struct ClearingResult {
    pub success: bool,
    pub message: String,
    pub items_cleared: usize,
    pub errors: Vec<String>,
}

impl ClearingResult {
    fn ok(message: impl Into<String>, items_cleared: usize) -> Self {
        Self { success: true, message: message.into(), items_cleared, errors: Vec::new() }
    }

    fn failed(message: impl Into<String>, errors: Vec<String>) -> Self {
        let message = message.into();
        Self { success: false, message, items_cleared: 0, errors }
    }
}

/// Controls which steps [`MemoryClearingService::clear_all`] attempts.
#[derive(Debug, Clone)]
pub struct ClearingOptions {
    pub dry_run: bool,
    pub semantic_only: bool,
    pub lightrag_only: bool,
    pub include_memory_inputs: bool,
    pub include_knowledge_graph: bool,
    pub include_cache: bool,
    pub verbose: bool,
}

impl Default for ClearingOptions {
    fn default() -> Self {
        Self {
            dry_run: false,
            semantic_only: false,
            lightrag_only: false,
            include_memory_inputs: true,
            include_knowledge_graph: true,
            include_cache: true,
            verbose: false,
        }
    }
}

/// Per-step results plus the aggregate outcome of [`MemoryClearingService::clear_all`].
#[derive(Debug, Clone, Default)]
pub struct ClearAllOutcome {
    pub semantic_memory: Option<ClearingResult>,
    pub lightrag_memory: Option<ClearingResult>,
    pub memory_inputs: Option<ClearingResult>,
    pub knowledge_graph: Option<ClearingResult>,
    pub server_cache: Option<ClearingResult>,
    pub overall_success: bool,
    pub summary: String,
}

/// Coordinates clearing across the local store, the graph service, and
/// the filesystem for one user.
pub struct MemoryClearingService {
    user_id: String,
    store: Arc<dyn MemoryStore>,
    graph: GraphClient,
    memory_inputs_dir: PathBuf,
    graph_storage_dirs: Vec<PathBuf>,
}

impl MemoryClearingService {
    #[must_use]
    pub fn new(
        user_id: impl Into<String>,
        store: Arc<dyn MemoryStore>,
        graph: GraphClient,
        memory_inputs_dir: impl Into<PathBuf>,
        graph_storage_dirs: Vec<PathBuf>,
    ) -> Self {
        Self { user_id: user_id.into(), store, graph, memory_inputs_dir: memory_inputs_dir.into(), graph_storage_dirs }
    }

    /// Step 1: clear semantic memories via the local store and assert
    /// the post-clear count is zero.
    pub fn clear_semantic_memories(&self, dry_run: bool) -> ClearingResult {
        let pre_count = match self.store.get_memory_stats(&self.user_id) {
            Ok(stats) => stats.total_memories,
            Err(e) => return ClearingResult::failed(format!("failed to read memory stats: {e}"), vec![e.to_string()]),
        };

        if dry_run {
            return ClearingResult::ok(format!("DRY RUN: would clear {pre_count} semantic memories"), pre_count);
        }

        if let Err(e) = self.store.clear_memories(&self.user_id) {
            return ClearingResult::failed(format!("failed to clear semantic memories: {e}"), vec![e.to_string()]);
        }

        match self.store.get_memory_stats(&self.user_id) {
            Ok(stats) if stats.total_memories == 0 => {
                ClearingResult::ok(format!("cleared {pre_count} semantic memories (verified)"), pre_count)
            }
            Ok(stats) => ClearingResult::failed(
                format!("clearing incomplete: {} memories still remain after clearing {pre_count}", stats.total_memories),
                vec!["post-clear count was non-zero".to_string()],
            ),
            Err(e) => ClearingResult::failed(format!("failed to verify clear: {e}"), vec![e.to_string()]),
        }
    }

    /// Step 2: delete every graph document, with `delete_source=true`.
    pub async fn clear_graph_documents(&self, dry_run: bool) -> ClearingResult {
        let docs = match self.graph.list_documents().await {
            Ok(docs) => docs,
            Err(e) => return ClearingResult::failed(format!("failed to list graph documents: {e}"), vec![e.to_string()]),
        };

        if docs.is_empty() {
            return ClearingResult::ok("no graph documents found to clear", 0);
        }

        if dry_run {
            return ClearingResult::ok(format!("DRY RUN: would delete {} graph documents", docs.len()), docs.len());
        }

        let ids: Vec<String> = docs.into_iter().map(|d| d.id).collect();
        let count = ids.len();
        match self.graph.delete_documents(&ids, true).await {
            Ok(outcome) if outcome.accepted => ClearingResult::ok(format!("deleted {count} graph documents"), count),
            Ok(outcome) => {
                ClearingResult::failed(format!("graph deletion not accepted: {}", outcome.status), vec![outcome.status])
            }
            Err(e) => ClearingResult::failed(format!("failed to delete graph documents: {e}"), vec![e.to_string()]),
        }
    }

    /// Step 3: recursively clear the memory inputs directory (the
    /// directory itself is left in place).
    pub fn clear_memory_inputs_directory(&self, dry_run: bool) -> ClearingResult {
        if !self.memory_inputs_dir.exists() {
            return ClearingResult::ok(
                format!("memory inputs directory does not exist: {}", self.memory_inputs_dir.display()),
                0,
            );
        }

        let entries = match std::fs::read_dir(&self.memory_inputs_dir) {
            Ok(entries) => entries,
            Err(e) => return ClearingResult::failed(format!("failed to read memory inputs directory: {e}"), vec![e.to_string()]),
        };

        let mut files = Vec::new();
        let mut dirs = Vec::new();
        for entry in entries.flatten() {
            let path = entry.path();
            if path.is_dir() {
                dirs.push(path);
            } else {
                files.push(path);
            }
        }

        if dry_run {
            let message = format!(
                "DRY RUN: Would delete {} files and {} directories from {}",
                files.len(),
                dirs.len(),
                self.memory_inputs_dir.display()
            );
            return ClearingResult::ok(message, files.len() + dirs.len());
        }

        let mut deleted = 0usize;
        let mut errors = Vec::new();
        for file in files {
            match std::fs::remove_file(&file) {
                Ok(()) => deleted += 1,
                Err(e) => errors.push(format!("failed to delete file {}: {e}", file.display())),
            }
        }
        for dir in dirs {
            match std::fs::remove_dir_all(&dir) {
                Ok(()) => deleted += 1,
                Err(e) => errors.push(format!("failed to delete directory {}: {e}", dir.display())),
            }
        }

        let success = errors.is_empty();
        let mut message = format!("cleared {deleted} items from memory inputs directory: {}", self.memory_inputs_dir.display());
        if !errors.is_empty() {
            message.push_str(&format!(" (with {} errors)", errors.len()));
        }
        ClearingResult { success, message, items_cleared: deleted, errors }
    }

    /// Step 4: delete on-disk `*.graphml` artifacts from known storage
    /// directories.
    pub fn clear_knowledge_graph_files(&self, dry_run: bool) -> ClearingResult {
        if self.graph_storage_dirs.is_empty() {
            return ClearingResult::failed("memory storage directories not configured", vec!["no storage dirs".to_string()]);
        }

        let found: Vec<PathBuf> = self
            .graph_storage_dirs
            .iter()
            .map(|dir| dir.join("graph_chunk_entity_relation.graphml"))
            .filter(|p: &PathBuf| p.exists())
            .collect();

        if found.is_empty() {
            return ClearingResult::ok("no knowledge graph files found to delete", 0);
        }

        if dry_run {
            return ClearingResult::ok(format!("DRY RUN: would delete {} knowledge graph files", found.len()), found.len());
        }

        let mut deleted = 0usize;
        let mut errors = Vec::new();
        for path in found {
            match std::fs::remove_file(&path) {
                Ok(()) => deleted += 1,
                Err(e) => errors.push(format!("failed to delete knowledge graph file {}: {e}", path.display())),
            }
        }

        let success = errors.is_empty();
        let mut message = format!("deleted {deleted} knowledge graph files");
        if !errors.is_empty() {
            message.push_str(&format!(" (with {} errors)", errors.len()));
        }
        ClearingResult { success, message, items_cleared: deleted, errors }
    }

    /// Step 5: clear the graph server's cache.
    pub async fn clear_server_cache(&self, dry_run: bool) -> ClearingResult {
        if dry_run {
            return ClearingResult::ok("DRY RUN: would clear graph server cache", 1);
        }

        match self.graph.clear_cache().await {
            Ok(()) => ClearingResult::ok("graph server cache cleared successfully", 1),
            Err(e) => ClearingResult::failed(format!("failed to clear graph server cache: {e}"), vec![e.to_string()]),
        }
    }

    /// Runs every step gated by `options`, aggregating results under
    /// the strict success rule: at least one attempted step succeeded
    /// and none failed.
    pub async fn clear_all(&self, options: &ClearingOptions) -> ClearAllOutcome {
        let mut outcome = ClearAllOutcome::default();
        let mut successes = 0usize;
        let mut failures = 0usize;

        if !options.lightrag_only {
            let result = self.clear_semantic_memories(options.dry_run);
            if result.success { successes += 1 } else { failures += 1 }
            outcome.semantic_memory = Some(result);
        }

        if !options.semantic_only {
            let result = self.clear_graph_documents(options.dry_run).await;
            if result.success { successes += 1 } else { failures += 1 }
            outcome.lightrag_memory = Some(result);
        }

        if !options.semantic_only && options.include_memory_inputs {
            let result = self.clear_memory_inputs_directory(options.dry_run);
            if result.success { successes += 1 } else { failures += 1 }
            outcome.memory_inputs = Some(result);
        }

        if !options.semantic_only && options.include_knowledge_graph {
            let result = self.clear_knowledge_graph_files(options.dry_run);
            if result.success { successes += 1 } else { failures += 1 }
            outcome.knowledge_graph = Some(result);
        }

        if !options.semantic_only && options.include_cache {
            let result = self.clear_server_cache(options.dry_run).await;
            if result.success { successes += 1 } else { failures += 1 }
            outcome.server_cache = Some(result);
        }

        outcome.overall_success = failures == 0 && successes > 0;
        outcome.summary = if options.dry_run {
            format!("DRY RUN: {successes} operations would succeed, {failures} would fail")
        } else {
            format!("{successes} operations succeeded, {failures} failed")
        };

        outcome
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::memory::SqliteMemoryStore;
    use tempfile::tempdir;

    fn service(dir: &std::path::Path) -> MemoryClearingService {
        let store: Arc<dyn MemoryStore> = Arc::new(SqliteMemoryStore::in_memory().unwrap());
        let graph = GraphClient::new("http://localhost:9999");
        MemoryClearingService::new("alice", store, graph, dir.join("memory_inputs"), vec![dir.join("storage")])
    }

    #[test]
    fn clearing_empty_semantic_store_is_not_a_failure() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        let result = svc.clear_semantic_memories(false);
        assert!(result.success);
        assert_eq!(result.items_cleared, 0);
    }

    #[test]
    fn clearing_semantic_memories_removes_records() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        svc.store.add_memory("alice", "likes tea", &[]).unwrap();
        let result = svc.clear_semantic_memories(false);
        assert!(result.success);
        assert_eq!(result.items_cleared, 1);
        assert_eq!(svc.store.get_memory_stats("alice").unwrap().total_memories, 0);
    }

    #[test]
    fn missing_memory_inputs_directory_is_not_a_failure() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        let result = svc.clear_memory_inputs_directory(false);
        assert!(result.success);
        assert_eq!(result.items_cleared, 0);
    }

    #[test]
    fn dry_run_clear_memory_inputs_leaves_files_untouched() {
        let dir = tempdir().unwrap();
        let inputs = dir.path().join("memory_inputs");
        std::fs::create_dir_all(&inputs).unwrap();
        std::fs::write(inputs.join("doc.txt"), b"hello").unwrap();
        let svc = service(dir.path());
        let result = svc.clear_memory_inputs_directory(true);
        assert!(result.success);
        assert_eq!(result.items_cleared, 1);
        assert!(result.message.starts_with("DRY RUN: Would delete 1 files and 0 directories"));
        assert!(inputs.join("doc.txt").exists());
    }

    #[test]
    fn clear_memory_inputs_removes_files_and_dirs() {
        let dir = tempdir().unwrap();
        let inputs = dir.path().join("memory_inputs");
        std::fs::create_dir_all(inputs.join("subdir")).unwrap();
        std::fs::write(inputs.join("doc.txt"), b"hello").unwrap();
        let svc = service(dir.path());
        let result = svc.clear_memory_inputs_directory(false);
        assert!(result.success);
        assert_eq!(result.items_cleared, 2);
        assert!(inputs.exists());
        assert_eq!(std::fs::read_dir(&inputs).unwrap().count(), 0);
    }

    #[test]
    fn missing_knowledge_graph_files_is_not_a_failure() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        let result = svc.clear_knowledge_graph_files(false);
        assert!(result.success);
        assert_eq!(result.items_cleared, 0);
    }

    #[test]
    fn clear_knowledge_graph_files_deletes_graphml_artifacts() {
        let dir = tempdir().unwrap();
        let storage = dir.path().join("storage");
        std::fs::create_dir_all(&storage).unwrap();
        std::fs::write(storage.join("graph_chunk_entity_relation.graphml"), b"<graphml/>").unwrap();
        let svc = service(dir.path());
        let result = svc.clear_knowledge_graph_files(false);
        assert!(result.success);
        assert_eq!(result.items_cleared, 1);
        assert!(!storage.join("graph_chunk_entity_relation.graphml").exists());
    }

    #[tokio::test]
    async fn clear_all_dry_run_reports_would_succeed_summary() {
        let dir = tempdir().unwrap();
        let svc = service(dir.path());
        let options = ClearingOptions { dry_run: true, semantic_only: true, ..Default::default() };
        let outcome = svc.clear_all(&options).await;
        assert!(outcome.semantic_memory.is_some());
        assert!(outcome.lightrag_memory.is_none());
        assert!(outcome.summary.starts_with("DRY RUN:"));
    }
}
