//! Core data model: Change Set, Context, Checkpoint records.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::PathBuf;

/// A single proposed file edit produced by the external executor.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Change {
    pub path: String,
    pub new_content: String,
    pub explanation: String,
}

/// An ordered, immutable collection of proposed file edits.
///
/// Immutability is structural: once built, a `ChangeSet` is only ever read
/// (cloned), never mutated in place — scanners and the registry receive
/// shared references.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ChangeSet {
    changes: Vec<Change>,
}

impl ChangeSet {
    pub fn new(changes: Vec<Change>) -> Self {
        Self { changes }
    }

    pub fn changes(&self) -> &[Change] {
        &self.changes
    }

    pub fn is_empty(&self) -> bool {
        self.changes.is_empty()
    }

    /// Whether any change touches a dependency manifest or lock file.
    pub fn touches_dependency_manifests(&self) -> bool {
        self.changes.iter().any(|c| is_dependency_manifest(&c.path))
    }
}

fn is_dependency_manifest(path: &str) -> bool {
    const MANIFESTS: &[&str] = &[
        "package.json",
        "package-lock.json",
        "yarn.lock",
        "pnpm-lock.yaml",
        "Cargo.toml",
        "Cargo.lock",
        "requirements.txt",
        "Pipfile",
        "Pipfile.lock",
        "poetry.lock",
        "go.mod",
        "go.sum",
    ];
    let file_name = path.rsplit('/').next().unwrap_or(path);
    MANIFESTS.contains(&file_name)
}

/// Task + read-only repository view passed to every scanner.
///
/// `change_set` is only populated in `Phase::PostExecution`; pre-phase
/// scanners must not observe it (see `Context::change_set`, which enforces
/// that via the phase the Context was built for).
#[derive(Debug, Clone)]
pub struct Context {
    pub task: String,
    pub repository: PathBuf,
    pub read_only_file_contents: HashMap<String, String>,
    change_set: Option<ChangeSet>,
    pub metadata: HashMap<String, serde_json::Value>,
}

impl Context {
    /// Build a pre-execution context: no Change Set visible yet.
    pub fn pre_execution(
        task: impl Into<String>,
        repository: PathBuf,
        read_only_file_contents: HashMap<String, String>,
    ) -> Self {
        Self {
            task: task.into(),
            repository,
            read_only_file_contents,
            change_set: None,
            metadata: HashMap::new(),
        }
    }

    /// Attach a Change Set, producing a post-execution context.
    pub fn with_change_set(mut self, change_set: ChangeSet) -> Self {
        self.change_set = Some(change_set);
        self
    }

    /// Merge one metadata entry, e.g. the checkpoint id a post-phase scanner
    /// needs to look up the pre-execution snapshot.
    pub fn with_metadata_entry(mut self, key: impl Into<String>, value: serde_json::Value) -> Self {
        self.metadata.insert(key.into(), value);
        self
    }

    pub fn change_set(&self) -> Option<&ChangeSet> {
        self.change_set.as_ref()
    }

    pub fn original_content(&self, path: &str) -> Option<&str> {
        self.read_only_file_contents.get(path).map(String::as_str)
    }
}

/// A snapshot reference to a working-tree commit plus associated metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Checkpoint {
    pub id: String,
    pub repository: String,
    pub branch_name: String,
    pub commit_ref: String,
    pub created_at: DateTime<Utc>,
    pub description: String,
    pub files: Vec<String>,
    #[serde(default)]
    pub metadata: HashMap<String, serde_json::Value>,
}

/// Outcome of a rollback attempt.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RollbackResult {
    pub success: bool,
    pub checkpoint: Option<Checkpoint>,
    pub restored_files: Vec<String>,
    #[serde(default)]
    pub error: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn detects_dependency_manifests() {
        let cs = ChangeSet::new(vec![Change {
            path: "src/ui.tsx".to_string(),
            new_content: String::new(),
            explanation: String::new(),
        }]);
        assert!(!cs.touches_dependency_manifests());

        let cs = ChangeSet::new(vec![Change {
            path: "Cargo.toml".to_string(),
            new_content: String::new(),
            explanation: String::new(),
        }]);
        assert!(cs.touches_dependency_manifests());
    }

    #[test]
    fn pre_execution_context_has_no_change_set() {
        let ctx = Context::pre_execution("ticket-1", PathBuf::from("/repo"), HashMap::new());
        assert!(ctx.change_set().is_none());
    }
}
