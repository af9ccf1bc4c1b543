//! Keeps the active user id in sync with the `USER_ID=` line of each
//! managed Docker service's env file, restarting containers as needed.
//!
//! Every mutating step is preceded by a backup and is safe to run
//! repeatedly: already-consistent services short-circuit unless a
//! restart is forced.

use chrono::Local;
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use tokio::process::Command;

/// Severity tag for one line of a [`DockerController`] operation log,
/// mirroring `docker/user_sync.py`'s `Colors` enum without committing to
/// any particular terminal presentation.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DockerLogTag {
    Ok,
    Warn,
    Err,
    DryRun,
}

/// One line of a [`DockerController`] operation log.
#[derive(Debug, Clone)]
pub struct LogLine {
    pub tag: DockerLogTag,
    pub message: String,
}

fn line(tag: DockerLogTag, message: impl Into<String>) -> LogLine {
    LogLine { tag, message: message.into() }
}

/// Configuration for one Docker-composed service whose env file carries
/// a `USER_ID=` line.
#[derive(Debug, Clone)]
pub struct ManagedService {
    pub name: String,
    pub dir: PathBuf,
    pub env_file: String,
    pub container_name: String,
    pub compose_file: String,
}

impl ManagedService {
    fn env_file_path(&self) -> PathBuf {
        self.dir.join(&self.env_file)
    }
}

/// Per-service snapshot produced by [`DockerController::check_consistency`].
#[derive(Debug, Clone)]
pub struct ConsistencyEntry {
    pub docker_user_id: Option<String>,
    pub consistent: bool,
    pub running: bool,
}

/// Result of [`DockerController::sync_user_ids`] or
/// [`DockerController::ensure_consistency`].
#[derive(Debug, Clone)]
pub struct SyncOutcome {
    pub all_successful: bool,
    pub updated: Vec<String>,
    pub skipped: Vec<String>,
    pub log: Vec<LogLine>,
}

/// Synchronizes `USER_ID` across a fixed set of Docker-composed services.
pub struct DockerController {
    services: Vec<ManagedService>,
    backup_dir: PathBuf,
    dry_run: bool,
}

impl DockerController {
    /// Builds a controller over the default two-service layout
    /// (`lightrag_server`, `lightrag_memory_server`) rooted at `base_dir`.
    #[must_use]
    pub fn new(base_dir: &Path, dry_run: bool) -> Self {
        let services = vec![
            ManagedService {
                name: "lightrag_server".to_string(),
                dir: base_dir.join("lightrag_server"),
                env_file: "env.server".to_string(),
                container_name: "lightrag_pagent".to_string(),
                compose_file: "docker-compose.yml".to_string(),
            },
            ManagedService {
                name: "lightrag_memory_server".to_string(),
                dir: base_dir.join("lightrag_memory_server"),
                env_file: "env.memory_server".to_string(),
                container_name: "lightrag_memory".to_string(),
                compose_file: "docker-compose.yml".to_string(),
            },
        ];
        Self { services, backup_dir: base_dir.join("backups").join("docker_env_backups"), dry_run }
    }

    /// Builds a controller over an explicit service list, for tests or
    /// non-default deployments.
    #[must_use]
    pub fn with_services(services: Vec<ManagedService>, backup_dir: PathBuf, dry_run: bool) -> Self {
        Self { services, backup_dir, dry_run }
    }

    /// Reads each service's env file and queries `docker ps` for its
    /// container. Performs no mutation.
    pub async fn check_consistency(&self, active_user_id: &str) -> HashMap<String, ConsistencyEntry> {
        let mut results = HashMap::with_capacity(self.services.len());
        for service in &self.services {
            let docker_user_id = get_env_file_user_id(&service.env_file_path());
            let running = is_container_running(&service.container_name).await;
            let consistent = docker_user_id.as_deref() == Some(active_user_id);
            results.insert(service.name.clone(), ConsistencyEntry { docker_user_id, consistent, running });
        }
        results
    }

    /// Synchronizes every inconsistent service (or, if `force_restart`,
    /// every service) to `active_user_id`: backup, stop, rewrite, start.
    pub async fn sync_user_ids(&self, active_user_id: &str, force_restart: bool) -> SyncOutcome {
        let mut log = Vec::new();
        let before = self.check_consistency(active_user_id).await;

        let needs_update: Vec<&str> =
            before.iter().filter(|(_, e)| !e.consistent).map(|(name, _)| name.as_str()).collect();

        if needs_update.is_empty() && !force_restart {
            log.push(line(DockerLogTag::Ok, "all USER_IDs already consistent"));
            return SyncOutcome { all_successful: true, updated: Vec::new(), skipped: Vec::new(), log };
        }

        let to_process: Vec<&ManagedService> = if force_restart {
            self.services.iter().collect()
        } else {
            self.services.iter().filter(|s| needs_update.contains(&s.name.as_str())).collect()
        };

        let mut all_successful = true;
        let mut updated = Vec::new();
        let mut skipped = Vec::new();

        for service in to_process {
            let entry = &before[&service.name];
            let needs_user_id_update = !entry.consistent;

            if needs_user_id_update {
                match backup_env_file(&service.env_file_path(), &service.name, &self.backup_dir, self.dry_run) {
                    Some(path) => {
                        let tag = if self.dry_run { DockerLogTag::DryRun } else { DockerLogTag::Ok };
                        log.push(line(tag, format!("{}: backed up env file to {}", service.name, path.display())));
                    }
                    None => {
                        log.push(line(DockerLogTag::Err, format!("{}: backup failed, skipping", service.name)));
                        all_successful = false;
                        skipped.push(service.name.clone());
                        continue;
                    }
                }
            }

            if entry.running || force_restart {
                if self.dry_run {
                    log.push(line(DockerLogTag::DryRun, format!("{}: would stop container", service.name)));
                } else if !stop_service(service).await {
                    log.push(line(DockerLogTag::Err, format!("{}: failed to stop container, skipping", service.name)));
                    all_successful = false;
                    skipped.push(service.name.clone());
                    continue;
                } else {
                    log.push(line(DockerLogTag::Ok, format!("{}: stopped container", service.name)));
                }
            }

            if needs_user_id_update {
                if self.dry_run {
                    log.push(line(
                        DockerLogTag::DryRun,
                        format!("{}: would update USER_ID to '{active_user_id}'", service.name),
                    ));
                } else if !update_env_file_user_id(&service.env_file_path(), active_user_id) {
                    log.push(line(DockerLogTag::Err, format!("{}: failed to update env file", service.name)));
                    all_successful = false;
                    skipped.push(service.name.clone());
                    continue;
                } else {
                    log.push(line(DockerLogTag::Ok, format!("{}: updated USER_ID to '{active_user_id}'", service.name)));
                }
            } else {
                log.push(line(DockerLogTag::Ok, format!("{}: USER_ID already consistent", service.name)));
            }

            if entry.running || force_restart {
                if self.dry_run {
                    log.push(line(DockerLogTag::DryRun, format!("{}: would start container", service.name)));
                } else if !start_service(service).await {
                    log.push(line(DockerLogTag::Err, format!("{}: failed to start container", service.name)));
                    all_successful = false;
                    skipped.push(service.name.clone());
                    continue;
                } else {
                    log.push(line(DockerLogTag::Ok, format!("{}: started container", service.name)));
                }
            }

            updated.push(service.name.clone());
        }

        if !self.dry_run {
            let after = self.check_consistency(active_user_id).await;
            if !after.values().all(|e| e.consistent) {
                log.push(line(DockerLogTag::Warn, "some inconsistencies remain after sync"));
                all_successful = false;
            } else {
                log.push(line(DockerLogTag::Ok, "USER_ID synchronization complete"));
            }
        }

        SyncOutcome { all_successful, updated, skipped, log }
    }

    /// Checks consistency and, if `auto_fix` is set and any service is
    /// inconsistent, runs [`Self::sync_user_ids`] and re-checks.
    pub async fn ensure_consistency(&self, active_user_id: &str, auto_fix: bool, force_restart: bool) -> SyncOutcome {
        let before = self.check_consistency(active_user_id).await;
        if before.values().all(|e| e.consistent) && !force_restart {
            return SyncOutcome {
                all_successful: true,
                updated: Vec::new(),
                skipped: Vec::new(),
                log: vec![line(DockerLogTag::Ok, "already consistent")],
            };
        }
        if !auto_fix {
            return SyncOutcome {
                all_successful: false,
                updated: Vec::new(),
                skipped: before.keys().cloned().collect(),
                log: vec![line(DockerLogTag::Warn, "inconsistent and auto_fix disabled")],
            };
        }
        self.sync_user_ids(active_user_id, force_restart).await
    }
}

fn get_env_file_user_id(env_file_path: &Path) -> Option<String> {
    let content = std::fs::read_to_string(env_file_path).ok()?;
    for raw in content.lines() {
        let trimmed = raw.trim();
        if let Some(value) = trimmed.strip_prefix("USER_ID=") {
            if !trimmed.starts_with('#') {
                return Some(value.trim().to_string());
            }
        }
    }
    None
}

fn update_env_file_user_id(env_file_path: &Path, new_user_id: &str) -> bool {
    let Ok(content) = std::fs::read_to_string(env_file_path) else {
        return false;
    };
    let mut lines: Vec<String> = content.lines().map(str::to_string).collect();
    let mut updated = false;
    for existing in &mut lines {
        let trimmed = existing.trim();
        if trimmed.starts_with("USER_ID=") && !trimmed.starts_with('#') {
            *existing = format!("USER_ID={new_user_id}");
            updated = true;
            break;
        }
    }
    if !updated {
        lines.push(String::new());
        lines.push("# User configuration".to_string());
        lines.push(format!("USER_ID={new_user_id}"));
    }
    std::fs::write(env_file_path, lines.join("\n") + "\n").is_ok()
}

fn backup_env_file(env_file_path: &Path, server_name: &str, backup_dir: &Path, dry_run: bool) -> Option<PathBuf> {
    if !env_file_path.exists() {
        return None;
    }
    let file_name = env_file_path.file_name()?.to_string_lossy();
    let timestamp = Local::now().format("%Y%m%d_%H%M%S");
    let backup_path = backup_dir.join(format!("{server_name}_{file_name}_{timestamp}.backup"));
    if dry_run {
        return Some(backup_path);
    }
    std::fs::create_dir_all(backup_dir).ok()?;
    std::fs::copy(env_file_path, &backup_path).ok()?;
    Some(backup_path)
}

async fn is_container_running(container_name: &str) -> bool {
    let output = Command::new("docker")
        .args(["ps", "--filter", &format!("name={container_name}"), "--format", "{{.Names}}"])
        .output()
        .await;
    match output {
        Ok(out) if out.status.success() => {
            String::from_utf8_lossy(&out.stdout).lines().any(|l| l == container_name)
        }
        _ => false,
    }
}

async fn stop_service(service: &ManagedService) -> bool {
    Command::new("docker-compose")
        .args(["-f", &service.compose_file, "down"])
        .current_dir(&service.dir)
        .output()
        .await
        .is_ok_and(|out| out.status.success())
}

async fn start_service(service: &ManagedService) -> bool {
    Command::new("docker-compose")
        .args(["-f", &service.compose_file, "up", "-d"])
        .current_dir(&service.dir)
        .output()
        .await
        .is_ok_and(|out| out.status.success())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn service(dir: &Path) -> ManagedService {
        ManagedService {
            name: "svc".to_string(),
            dir: dir.to_path_buf(),
            env_file: "env.server".to_string(),
            container_name: "nonexistent_container_xyz".to_string(),
            compose_file: "docker-compose.yml".to_string(),
        }
    }

    #[test]
    fn reads_user_id_from_env_file() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.server");
        std::fs::write(&path, "FOO=bar\nUSER_ID=alice\nBAZ=qux\n").unwrap();
        assert_eq!(get_env_file_user_id(&path), Some("alice".to_string()));
    }

    #[test]
    fn ignores_commented_user_id_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.server");
        std::fs::write(&path, "# USER_ID=old\nUSER_ID=alice\n").unwrap();
        assert_eq!(get_env_file_user_id(&path), Some("alice".to_string()));
    }

    #[test]
    fn appends_user_id_when_missing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.server");
        std::fs::write(&path, "FOO=bar\n").unwrap();
        assert!(update_env_file_user_id(&path, "alice"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("USER_ID=alice"));
    }

    #[test]
    fn rewrites_existing_user_id_line() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.server");
        std::fs::write(&path, "USER_ID=bob\nOTHER=1\n").unwrap();
        assert!(update_env_file_user_id(&path, "alice"));
        let content = std::fs::read_to_string(&path).unwrap();
        assert!(content.contains("USER_ID=alice"));
        assert!(!content.contains("USER_ID=bob"));
    }

    #[test]
    fn backup_creates_timestamped_copy() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.server");
        std::fs::write(&path, "USER_ID=alice\n").unwrap();
        let backup_dir = dir.path().join("backups");
        let backup = backup_env_file(&path, "svc", &backup_dir, false).unwrap();
        assert!(backup.exists());
        assert!(backup.file_name().unwrap().to_string_lossy().starts_with("svc_env.server_"));
    }

    #[test]
    fn dry_run_backup_does_not_write() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.server");
        std::fs::write(&path, "USER_ID=alice\n").unwrap();
        let backup_dir = dir.path().join("backups");
        let backup = backup_env_file(&path, "svc", &backup_dir, true).unwrap();
        assert!(!backup.exists());
    }

    #[tokio::test]
    async fn check_consistency_reports_mismatch() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("env.server"), "USER_ID=bob\n").unwrap();
        let controller = DockerController::with_services(vec![service(dir.path())], dir.path().join("backups"), true);
        let results = controller.check_consistency("alice").await;
        let entry = &results["svc"];
        assert!(!entry.consistent);
        assert!(!entry.running);
    }

    #[tokio::test]
    async fn sync_is_noop_when_already_consistent() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::write(dir.path().join("env.server"), "USER_ID=alice\n").unwrap();
        let controller = DockerController::with_services(vec![service(dir.path())], dir.path().join("backups"), true);
        let outcome = controller.sync_user_ids("alice", false).await;
        assert!(outcome.all_successful);
        assert!(outcome.updated.is_empty());
    }

    #[tokio::test]
    async fn dry_run_sync_updates_without_writing() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("env.server");
        std::fs::write(&path, "USER_ID=bob\n").unwrap();
        let controller = DockerController::with_services(vec![service(dir.path())], dir.path().join("backups"), true);
        let outcome = controller.sync_user_ids("alice", false).await;
        assert!(outcome.all_successful);
        assert_eq!(outcome.updated, vec!["svc".to_string()]);
        let content = std::fs::read_to_string(&path).unwrap();
        assert_eq!(content, "USER_ID=bob\n"); // dry run never writes
        assert!(outcome.log.iter().any(|l| matches!(l.tag, DockerLogTag::DryRun)));
    }
}
