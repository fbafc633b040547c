//! Checkpoint / Rollback Manager (C4): captures working-tree snapshots;
//! restores atomically; persists a checkpoint index.

use crate::error::{Result, SgeError};
use crate::providers::WorkingTreeProvider;
use crate::types::{Checkpoint, RollbackResult};
use chrono::{Duration as ChronoDuration, Utc};
use sha2::{Digest, Sha256};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::Mutex;

/// Content fingerprint over the checkpointed file list and commit ref, used
/// as a tamper-evidence check on the persisted index rather than as a
/// content-addressed store.
fn content_digest(commit_ref: &str, files: &[String]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(commit_ref.as_bytes());
    for file in files {
        hasher.update(b"\0");
        hasher.update(file.as_bytes());
    }
    format!("{:x}", hasher.finalize())
}

/// In-memory index backed by `<repo>/.sge/checkpoints.json`.
pub struct CheckpointManager {
    provider: Box<dyn WorkingTreeProvider>,
    index_path: PathBuf,
    checkpoints: Mutex<HashMap<String, Checkpoint>>,
}

impl CheckpointManager {
    pub fn new(provider: Box<dyn WorkingTreeProvider>, repo: &Path) -> Result<Self> {
        let index_path = repo.join(".sge").join("checkpoints.json");
        let checkpoints = load_index(&index_path)?;
        Ok(Self {
            provider,
            index_path,
            checkpoints: Mutex::new(checkpoints),
        })
    }

    /// 1. query commit ref, 2. query branch, 3. allocate id, 4. insert +
    /// flush. Create is atomic: a flush failure means no checkpoint is
    /// returned.
    pub fn create_checkpoint(
        &self,
        repository: &str,
        description: &str,
        files: Vec<String>,
        metadata: HashMap<String, serde_json::Value>,
    ) -> Result<Checkpoint> {
        let commit_ref = self.provider.current_commit()?;
        let branch_name = self.provider.current_branch()?;
        let id = uuid::Uuid::new_v4().to_string();
        let digest = content_digest(&commit_ref, &files);

        let mut metadata = metadata;
        metadata.insert("content_digest".to_string(), serde_json::Value::String(digest));

        let checkpoint = Checkpoint {
            id,
            repository: repository.to_string(),
            branch_name,
            commit_ref,
            created_at: Utc::now(),
            description: description.to_string(),
            files,
            metadata,
        };

        let mut checkpoints = self.checkpoints.lock().expect("checkpoint index lock poisoned");
        checkpoints.insert(checkpoint.id.clone(), checkpoint.clone());
        flush_index(&self.index_path, &checkpoints)?;

        Ok(checkpoint)
    }

    /// Restores the working tree to the checkpoint's commit reference.
    /// Stashing first tolerates a clean tree; any failure leaves the tree
    /// untouched.
    pub fn rollback(&self, id: &str) -> Result<RollbackResult> {
        let checkpoint = {
            let checkpoints = self.checkpoints.lock().expect("checkpoint index lock poisoned");
            checkpoints.get(id).cloned()
        };

        let Some(checkpoint) = checkpoint else {
            return Err(SgeError::Checkpoint(format!("checkpoint '{id}' not found")));
        };

        let stash_label = format!("sge-rollback-{id}");
        if let Err(e) = self.provider.stash(&stash_label) {
            return Ok(RollbackResult {
                success: false,
                checkpoint: Some(checkpoint),
                restored_files: vec![],
                error: Some(format!("stash failed: {e}")),
            });
        }

        if let Err(e) = self.provider.hard_reset(&checkpoint.commit_ref) {
            return Ok(RollbackResult {
                success: false,
                checkpoint: Some(checkpoint),
                restored_files: vec![],
                error: Some(format!("hard reset failed: {e}")),
            });
        }

        Ok(RollbackResult {
            success: true,
            restored_files: checkpoint.files.clone(),
            checkpoint: Some(checkpoint),
            error: None,
        })
    }

    /// Equivalent to creating a synthetic checkpoint `n` commits behind
    /// HEAD, then resetting.
    pub fn rollback_commits(&self, repository: &str, n: u32) -> Result<RollbackResult> {
        let head = self.provider.current_commit()?;
        let target_ref = format!("{head}~{n}");
        let synthetic = Checkpoint {
            id: uuid::Uuid::new_v4().to_string(),
            repository: repository.to_string(),
            branch_name: self.provider.current_branch().unwrap_or_default(),
            commit_ref: target_ref,
            created_at: Utc::now(),
            description: format!("synthetic checkpoint {n} commits behind HEAD"),
            files: vec![],
            metadata: HashMap::new(),
        };

        if let Err(e) = self.provider.hard_reset(&synthetic.commit_ref) {
            return Ok(RollbackResult {
                success: false,
                checkpoint: Some(synthetic),
                restored_files: vec![],
                error: Some(e.to_string()),
            });
        }

        Ok(RollbackResult {
            success: true,
            restored_files: vec![],
            checkpoint: Some(synthetic),
            error: None,
        })
    }

    /// Selects the most recent checkpoint for `repository` and rolls back
    /// to it; falls back to `rollback_commits(repository, 1)` if none
    /// exists.
    pub fn auto_rollback(&self, repository: &str, _reason: &str) -> Result<RollbackResult> {
        let most_recent = {
            let checkpoints = self.checkpoints.lock().expect("checkpoint index lock poisoned");
            checkpoints
                .values()
                .filter(|c| c.repository == repository)
                .max_by_key(|c| c.created_at)
                .cloned()
        };

        match most_recent {
            Some(checkpoint) => self.rollback(&checkpoint.id),
            None => self.rollback_commits(repository, 1),
        }
    }

    /// Creates a branch at the current HEAD with a sanitized, timestamped
    /// name — no whitespace, shell metacharacters, or path separators.
    pub fn create_safety_branch(&self, base_label: &str) -> Result<String> {
        let sanitized: String = base_label
            .chars()
            .map(|c| if c.is_alphanumeric() || c == '-' || c == '_' { c } else { '-' })
            .collect();
        let name = format!("sge-safety/{}-{}", sanitized, Utc::now().format("%Y%m%dT%H%M%SZ"));
        let head = self.provider.current_commit()?;
        self.provider.create_branch(&name, &head)?;
        Ok(name)
    }

    /// Removes checkpoints older than `days`; always re-flushes, even when
    /// nothing is removed, so the index stays the single source of truth.
    pub fn cleanup(&self, days: i64) -> Result<usize> {
        let cutoff = Utc::now() - ChronoDuration::days(days);
        let mut checkpoints = self.checkpoints.lock().expect("checkpoint index lock poisoned");
        let before = checkpoints.len();
        checkpoints.retain(|_, c| c.created_at >= cutoff);
        let removed = before - checkpoints.len();
        flush_index(&self.index_path, &checkpoints)?;
        Ok(removed)
    }

    /// Removes a single checkpoint by id; requires a flush like any other
    /// index mutation.
    pub fn delete(&self, id: &str) -> Result<bool> {
        let mut checkpoints = self.checkpoints.lock().expect("checkpoint index lock poisoned");
        let removed = checkpoints.remove(id).is_some();
        if removed {
            flush_index(&self.index_path, &checkpoints)?;
        }
        Ok(removed)
    }

    pub fn list(&self) -> Vec<Checkpoint> {
        let checkpoints = self.checkpoints.lock().expect("checkpoint index lock poisoned");
        let mut list: Vec<Checkpoint> = checkpoints.values().cloned().collect();
        list.sort_by_key(|c| c.created_at);
        list
    }

    pub fn get(&self, id: &str) -> Option<Checkpoint> {
        self.checkpoints.lock().expect("checkpoint index lock poisoned").get(id).cloned()
    }
}

fn load_index(path: &Path) -> Result<HashMap<String, Checkpoint>> {
    if !path.exists() {
        return Ok(HashMap::new());
    }
    let content = std::fs::read_to_string(path)?;
    let list: Vec<Checkpoint> = serde_json::from_str(&content)?;
    Ok(list.into_iter().map(|c| (c.id.clone(), c)).collect())
}

/// Atomic write-to-temp-then-rename so the index is never observed
/// partially written.
fn flush_index(path: &Path, checkpoints: &HashMap<String, Checkpoint>) -> Result<()> {
    if let Some(parent) = path.parent() {
        std::fs::create_dir_all(parent)?;
    }
    let mut list: Vec<&Checkpoint> = checkpoints.values().collect();
    list.sort_by_key(|c| &c.id);
    let json = serde_json::to_string_pretty(&list)?;

    let tmp_path = path.with_extension("json.tmp");
    std::fs::write(&tmp_path, json)?;
    std::fs::rename(&tmp_path, path)?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex as StdMutex;

    struct FakeProvider {
        commit: StdMutex<String>,
        branch: String,
        stash_available: bool,
    }

    impl WorkingTreeProvider for FakeProvider {
        fn current_branch(&self) -> Result<String> {
            Ok(self.branch.clone())
        }
        fn current_commit(&self) -> Result<String> {
            Ok(self.commit.lock().unwrap().clone())
        }
        fn create_branch(&self, _name: &str, _from_ref: &str) -> Result<()> {
            Ok(())
        }
        fn hard_reset(&self, to_ref: &str) -> Result<()> {
            *self.commit.lock().unwrap() = to_ref.to_string();
            Ok(())
        }
        fn changed_files(&self, _from: &str, _to: &str) -> Result<Vec<String>> {
            Ok(vec![])
        }
        fn stash(&self, _label: &str) -> Result<bool> {
            Ok(self.stash_available)
        }
        fn prune_worktrees(&self) -> Result<()> {
            Ok(())
        }
    }

    fn manager_with_commit(dir: &Path, commit: &str) -> CheckpointManager {
        let provider = FakeProvider {
            commit: StdMutex::new(commit.to_string()),
            branch: "main".to_string(),
            stash_available: false,
        };
        CheckpointManager::new(Box::new(provider), dir).unwrap()
    }

    #[test]
    fn checkpoint_reachability_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager_with_commit(dir.path(), "X");
        let checkpoint = mgr.create_checkpoint("repo", "before change", vec!["a.rs".to_string()], HashMap::new()).unwrap();

        // simulate a change
        mgr.provider.hard_reset("Y").unwrap();

        let result = mgr.rollback(&checkpoint.id).unwrap();
        assert!(result.success);
        assert_eq!(mgr.provider.current_commit().unwrap(), "X");
        assert_eq!(result.restored_files, vec!["a.rs".to_string()]);
    }

    #[test]
    fn create_checkpoint_records_content_digest() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager_with_commit(dir.path(), "X");
        let checkpoint = mgr.create_checkpoint("repo", "before change", vec!["a.rs".to_string()], HashMap::new()).unwrap();
        assert!(checkpoint.metadata.contains_key("content_digest"));
    }

    #[test]
    fn rollback_of_unknown_id_fails() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager_with_commit(dir.path(), "X");
        assert!(mgr.rollback("does-not-exist").is_err());
    }

    #[test]
    fn cleanup_is_idempotent() {
        let dir = tempfile::tempdir().unwrap();
        let mgr = manager_with_commit(dir.path(), "X");

        let mut checkpoints = mgr.checkpoints.lock().unwrap();
        for (label, days_ago) in [("c1", 45), ("c2", 20), ("c3", 5)] {
            let created_at = Utc::now() - ChronoDuration::days(days_ago);
            checkpoints.insert(
                label.to_string(),
                Checkpoint {
                    id: label.to_string(),
                    repository: "repo".to_string(),
                    branch_name: "main".to_string(),
                    commit_ref: "X".to_string(),
                    created_at,
                    description: String::new(),
                    files: vec![],
                    metadata: HashMap::new(),
                },
            );
        }
        drop(checkpoints);

        let removed_first = mgr.cleanup(30).unwrap();
        assert_eq!(removed_first, 1);
        assert_eq!(mgr.list().len(), 2);

        let removed_second = mgr.cleanup(30).unwrap();
        assert_eq!(removed_second, 0);
    }
}
