//! Working-Tree Provider backed by `git2` (vendored libgit2).
//!
//! Every operation takes structured arguments only — there is no shell
//! string construction here, so injection via a crafted branch name or
//! label is structurally impossible.

use super::WorkingTreeProvider;
use git2::{BranchType, Repository, ResetType, Signature};
use std::path::{Path, PathBuf};

pub struct Git2WorkingTreeProvider {
    repo_path: PathBuf,
}

impl Git2WorkingTreeProvider {
    pub fn open(repo_path: &Path) -> crate::error::Result<Self> {
        // Validate eagerly so construction failures surface before use.
        Repository::open(repo_path)?;
        Ok(Self {
            repo_path: repo_path.to_path_buf(),
        })
    }

    fn repo(&self) -> crate::error::Result<Repository> {
        Ok(Repository::open(&self.repo_path)?)
    }
}

impl WorkingTreeProvider for Git2WorkingTreeProvider {
    fn current_branch(&self) -> crate::error::Result<String> {
        let repo = self.repo()?;
        let head = repo.head()?;
        Ok(head.shorthand().unwrap_or("HEAD").to_string())
    }

    fn current_commit(&self) -> crate::error::Result<String> {
        let repo = self.repo()?;
        let head = repo.head()?;
        let oid = head.target().ok_or_else(|| {
            crate::error::SgeError::Provider {
                provider: "working_tree",
                message: "HEAD has no direct target".to_string(),
            }
        })?;
        Ok(oid.to_string())
    }

    fn create_branch(&self, name: &str, from_ref: &str) -> crate::error::Result<()> {
        let repo = self.repo()?;
        let oid = git2::Oid::from_str(from_ref)?;
        let commit = repo.find_commit(oid)?;
        repo.branch(name, &commit, false)?;
        Ok(())
    }

    fn hard_reset(&self, to_ref: &str) -> crate::error::Result<()> {
        let repo = self.repo()?;
        let oid = git2::Oid::from_str(to_ref)?;
        let object = repo.find_object(oid, None)?;
        repo.reset(&object, ResetType::Hard, None)?;
        Ok(())
    }

    fn changed_files(&self, from_ref: &str, to_ref: &str) -> crate::error::Result<Vec<String>> {
        let repo = self.repo()?;
        let from_tree = repo.find_commit(git2::Oid::from_str(from_ref)?)?.tree()?;
        let to_tree = repo.find_commit(git2::Oid::from_str(to_ref)?)?.tree()?;
        let diff = repo.diff_tree_to_tree(Some(&from_tree), Some(&to_tree), None)?;
        let mut files = Vec::new();
        diff.foreach(
            &mut |delta, _| {
                if let Some(path) = delta.new_file().path() {
                    files.push(path.to_string_lossy().into_owned());
                }
                true
            },
            None,
            None,
            None,
        )?;
        Ok(files)
    }

    fn stash(&self, label: &str) -> crate::error::Result<bool> {
        let mut repo = self.repo()?;
        let sig = Signature::now("sge", "sge@localhost")?;
        match repo.stash_save(&sig, label, Some(git2::StashFlags::INCLUDE_UNTRACKED)) {
            Ok(_) => Ok(true),
            // "nothing to stash" is not an error.
            Err(e) if e.code() == git2::ErrorCode::NotFound => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn prune_worktrees(&self) -> crate::error::Result<()> {
        let repo = self.repo()?;
        for name in repo.worktrees()?.iter().flatten() {
            if let Ok(wt) = repo.find_worktree(name) {
                if wt.is_prunable(None).unwrap_or(false) {
                    let _ = wt.prune(None);
                }
            }
        }
        Ok(())
    }
}

#[allow(dead_code)]
fn branch_exists(repo: &Repository, name: &str) -> bool {
    repo.find_branch(name, BranchType::Local).is_ok()
}
