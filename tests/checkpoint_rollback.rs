//! Integration coverage for the Checkpoint/Rollback Manager against its
//! public API, using an in-memory `WorkingTreeProvider` fake (seed scenarios
//! around checkpoint create/rollback/auto-rollback, §8).

use sge::checkpoint::CheckpointManager;
use sge::error::Result;
use sge::providers::WorkingTreeProvider;
use std::collections::HashMap;
use std::sync::Mutex;

struct InMemoryGit {
    commit: Mutex<String>,
    branch: String,
}

impl WorkingTreeProvider for InMemoryGit {
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

    fn changed_files(&self, _from_ref: &str, _to_ref: &str) -> Result<Vec<String>> {
        Ok(vec![])
    }

    fn stash(&self, _label: &str) -> Result<bool> {
        Ok(false)
    }

    fn prune_worktrees(&self) -> Result<()> {
        Ok(())
    }
}

fn manager(dir: &std::path::Path, commit: &str) -> CheckpointManager {
    let provider = InMemoryGit { commit: Mutex::new(commit.to_string()), branch: "main".to_string() };
    CheckpointManager::new(Box::new(provider), dir).unwrap()
}

#[test]
fn checkpoint_survives_a_process_restart_via_the_persisted_index() {
    let dir = tempfile::tempdir().unwrap();
    let checkpoint = {
        let mgr = manager(dir.path(), "commit-1");
        mgr.create_checkpoint("repo", "before risky edit", vec!["src/a.ts".to_string()], HashMap::new()).unwrap()
    };

    // A fresh manager, as if the process had restarted, must still see the
    // checkpoint because it was flushed to `.sge/checkpoints.json`.
    let reloaded = manager(dir.path(), "commit-2");
    let found = reloaded.get(&checkpoint.id).expect("checkpoint persisted across restarts");
    assert_eq!(found.commit_ref, "commit-1");
}

#[test]
fn auto_rollback_falls_back_to_one_commit_behind_head_with_no_checkpoints() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path(), "HEAD");

    let result = mgr.auto_rollback("repo", "post-execution block").unwrap();
    assert!(result.success);
    assert_eq!(result.checkpoint.unwrap().commit_ref, "HEAD~1");
}

#[test]
fn auto_rollback_prefers_the_most_recent_checkpoint_for_the_repository() {
    let dir = tempfile::tempdir().unwrap();
    let mgr = manager(dir.path(), "commit-1");
    let older = mgr.create_checkpoint("repo", "first", vec![], HashMap::new()).unwrap();
    let newer = mgr.create_checkpoint("repo", "second", vec![], HashMap::new()).unwrap();

    let result = mgr.auto_rollback("repo", "block").unwrap();
    assert!(result.success);
    let restored = result.checkpoint.unwrap();
    assert_eq!(restored.id, newer.id);
    assert_ne!(restored.id, older.id);
}
