//! The active user identity and its derived storage paths.
//!
//! Mirrors the original `user_id_mgr` module: the active user id lives in
//! a small file (`env.userid`) under `PERSAG_HOME`, re-read on every
//! access rather than cached, so an external edit (or another process
//! switching users) takes effect immediately. Every other per-user path
//! in the system is a pure function of `(persag_root, storage_backend,
//! user_id)` — never cached past a user switch.

use crate::{Error, Result};
use std::collections::HashMap;
use std::path::{Path, PathBuf};

/// Fallback user id used when the persisted file cannot be read at all.
pub const DEFAULT_USER: &str = "default_user";

/// The eight paths derived from a user id, matching the original
/// `get_user_storage_paths` dict key-for-key.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct UserStoragePaths {
    /// `<root>/<backend>/<user>/data` — user-scoped application data.
    pub user_data_dir: PathBuf,
    /// `<root>/<backend>/<user>/data` — alias kept for original parity.
    pub data_dir: PathBuf,
    /// `<root>/<backend>/<user>/agno_storage` — agent session storage.
    pub agno_storage_dir: PathBuf,
    /// `<root>/<backend>/<user>/knowledge` — local knowledge base inputs.
    pub agno_knowledge_dir: PathBuf,
    /// `<root>/<backend>/<user>/rag_storage` — graph (knowledge) artifacts.
    pub lightrag_storage_dir: PathBuf,
    /// `<root>/<backend>/<user>/inputs` — graph (knowledge) source files.
    pub lightrag_inputs_dir: PathBuf,
    /// `<root>/<backend>/<user>/memory_rag_storage` — graph (memory) artifacts.
    pub lightrag_memory_storage_dir: PathBuf,
    /// `<root>/<backend>/<user>/memory_inputs` — graph (memory) source files.
    pub lightrag_memory_inputs_dir: PathBuf,
}

impl UserStoragePaths {
    /// Returns the eight paths as a string-keyed map, matching the shape
    /// `refresh_user_dependent_settings` returns in the original.
    #[must_use]
    pub fn as_map(&self) -> HashMap<String, String> {
        let mut m = HashMap::new();
        m.insert(
            "USER_DATA_DIR".to_string(),
            self.user_data_dir.to_string_lossy().to_string(),
        );
        m.insert(
            "DATA_DIR".to_string(),
            self.data_dir.to_string_lossy().to_string(),
        );
        m.insert(
            "AGNO_STORAGE_DIR".to_string(),
            self.agno_storage_dir.to_string_lossy().to_string(),
        );
        m.insert(
            "AGNO_KNOWLEDGE_DIR".to_string(),
            self.agno_knowledge_dir.to_string_lossy().to_string(),
        );
        m.insert(
            "LIGHTRAG_STORAGE_DIR".to_string(),
            self.lightrag_storage_dir.to_string_lossy().to_string(),
        );
        m.insert(
            "LIGHTRAG_INPUTS_DIR".to_string(),
            self.lightrag_inputs_dir.to_string_lossy().to_string(),
        );
        m.insert(
            "LIGHTRAG_MEMORY_STORAGE_DIR".to_string(),
            self.lightrag_memory_storage_dir
                .to_string_lossy()
                .to_string(),
        );
        m.insert(
            "LIGHTRAG_MEMORY_INPUTS_DIR".to_string(),
            self.lightrag_memory_inputs_dir
                .to_string_lossy()
                .to_string(),
        );
        m
    }

    /// The semantic memory store's database file for this user.
    #[must_use]
    pub fn memory_db_path(&self) -> PathBuf {
        self.user_data_dir.join("agent_memory.db")
    }
}

/// Derives the per-user storage paths. Pure function of its three
/// arguments — callers must re-derive after every user switch rather than
/// caching the result.
#[must_use]
pub fn derive_storage_paths(
    persag_root: &str,
    storage_backend: &str,
    user_id: &str,
) -> UserStoragePaths {
    let base = Path::new(persag_root).join(storage_backend).join(user_id);
    UserStoragePaths {
        user_data_dir: base.join("data"),
        data_dir: base.join("data"),
        agno_storage_dir: base.join("agno_storage"),
        agno_knowledge_dir: base.join("knowledge"),
        lightrag_storage_dir: base.join("rag_storage"),
        lightrag_inputs_dir: base.join("inputs"),
        lightrag_memory_storage_dir: base.join("memory_rag_storage"),
        lightrag_memory_inputs_dir: base.join("memory_inputs"),
    }
}

/// Reads and writes the persisted active user id under `PERSAG_HOME`.
pub struct UserIdentityStore {
    home: PathBuf,
}

impl UserIdentityStore {
    /// Creates a store rooted at `persag_home`, creating the directory
    /// (and best-effort seeding default service templates into it) if it
    /// does not already exist.
    pub fn new(persag_home: impl Into<PathBuf>) -> Result<Self> {
        let home = persag_home.into();
        let first_run = !home.exists();
        std::fs::create_dir_all(&home).map_err(|e| {
            Error::Fatal(format!("cannot create PERSAG_HOME {}: {e}", home.display()))
        })?;
        let store = Self { home };
        if first_run {
            store.seed_templates_best_effort();
        }
        Ok(store)
    }

    fn userid_file(&self) -> PathBuf {
        self.home.join("env.userid")
    }

    /// Best-effort copy of default service config directories
    /// (`lightrag_server/`, `lightrag_memory_server/`) from the current
    /// working directory into `PERSAG_HOME`, skipping any destination
    /// that already exists. Failures are logged, never fatal — the
    /// userid bookkeeping below does not depend on this succeeding.
    fn seed_templates_best_effort(&self) {
        for name in ["lightrag_server", "lightrag_memory_server"] {
            let src = PathBuf::from(name);
            let dst = self.home.join(name);
            if dst.exists() || !src.exists() {
                continue;
            }
            if let Err(e) = copy_dir_recursive(&src, &dst) {
                tracing::warn!(template = name, error = %e, "failed to seed default service template");
            }
        }
    }

    /// Reads the currently persisted user id. Always re-reads the file;
    /// never memoized. Falls back to [`DEFAULT_USER`] (and rewrites the
    /// file with that fallback) if the file is missing or unparsable.
    pub fn get_user_id(&self) -> String {
        match std::fs::read_to_string(self.userid_file()) {
            Ok(contents) => parse_userid_line(&contents).unwrap_or_else(|| {
                let fallback = DEFAULT_USER.to_string();
                let _ = self.write_user_id(&fallback);
                fallback
            }),
            Err(_) => {
                let fallback = DEFAULT_USER.to_string();
                let _ = self.write_user_id(&fallback);
                fallback
            }
        }
    }

    /// Persists `user_id` as the active user, atomically replacing the
    /// file contents.
    pub fn set_user_id(&self, user_id: &str) -> Result<()> {
        if user_id.trim().is_empty() {
            return Err(Error::InvalidInput("user id must not be empty".into()));
        }
        self.write_user_id(user_id)
    }

    fn write_user_id(&self, user_id: &str) -> Result<()> {
        let tmp = self.home.join("env.userid.tmp");
        std::fs::write(&tmp, format!("USER_ID=\"{user_id}\"\n")).map_err(|e| {
            Error::Fatal(format!("cannot write userid file: {e}"))
        })?;
        std::fs::rename(&tmp, self.userid_file())
            .map_err(|e| Error::Fatal(format!("cannot replace userid file: {e}")))
    }
}

fn parse_userid_line(contents: &str) -> Option<String> {
    for line in contents.lines() {
        let line = line.trim();
        if let Some(rest) = line.strip_prefix("USER_ID=") {
            let value = rest.trim().trim_matches('"').trim_matches('\'');
            if !value.is_empty() {
                return Some(value.to_string());
            }
        }
    }
    None
}

fn copy_dir_recursive(src: &Path, dst: &Path) -> std::io::Result<()> {
    std::fs::create_dir_all(dst)?;
    for entry in std::fs::read_dir(src)? {
        let entry = entry?;
        let dest_path = dst.join(entry.file_name());
        if entry.file_type()?.is_dir() {
            copy_dir_recursive(&entry.path(), &dest_path)?;
        } else {
            std::fs::copy(entry.path(), dest_path)?;
        }
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn derive_storage_paths_contains_user_segment() {
        let paths = derive_storage_paths("/root/data", "agno", "alice");
        for p in [
            &paths.user_data_dir,
            &paths.agno_storage_dir,
            &paths.lightrag_storage_dir,
            &paths.lightrag_memory_inputs_dir,
        ] {
            assert!(p.to_string_lossy().contains("alice"));
        }
    }

    #[test]
    fn get_user_id_falls_back_and_persists_default_when_missing() {
        let dir = TempDir::new().unwrap();
        let store = UserIdentityStore::new(dir.path().join("persag_home")).unwrap();
        assert_eq!(store.get_user_id(), DEFAULT_USER);
        // second read reflects the persisted fallback, not an in-memory cache
        assert_eq!(store.get_user_id(), DEFAULT_USER);
    }

    #[test]
    fn set_user_id_is_visible_to_a_fresh_read() {
        let dir = TempDir::new().unwrap();
        let store = UserIdentityStore::new(dir.path().join("persag_home")).unwrap();
        store.set_user_id("bob").unwrap();
        assert_eq!(store.get_user_id(), "bob");
    }

    #[test]
    fn set_user_id_rejects_empty() {
        let dir = TempDir::new().unwrap();
        let store = UserIdentityStore::new(dir.path().join("persag_home")).unwrap();
        assert!(store.set_user_id("").is_err());
    }

    #[test]
    fn external_edit_to_userid_file_takes_effect_immediately() {
        let dir = TempDir::new().unwrap();
        let home = dir.path().join("persag_home");
        let store = UserIdentityStore::new(&home).unwrap();
        store.set_user_id("alice").unwrap();
        std::fs::write(home.join("env.userid"), "USER_ID=\"carol\"\n").unwrap();
        assert_eq!(store.get_user_id(), "carol");
    }
}
