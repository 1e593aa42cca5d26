//! Git worktree service.
//!
//! One orchestrator works one branch in one worktree; this service hides
//! the underlying VCS behind `ensure_worktree` and a few branch-state
//! queries.

use anyhow::{Context, Result};
use git2::{BranchType, Repository, WorktreeAddOptions};
use std::path::Path;

pub struct WorktreeService {
    repo: Repository,
}

impl WorktreeService {
    /// Open the repository containing `dir` (searches upward).
    pub fn discover(dir: &Path) -> Result<Self> {
        let repo = Repository::discover(dir).context("Failed to find a git repository")?;
        Ok(Self { repo })
    }

    pub fn branch_exists(&self, branch: &str) -> bool {
        self.repo.find_branch(branch, BranchType::Local).is_ok()
    }

    /// Branch checked out in the main repository.
    pub fn current_branch(&self) -> Result<String> {
        let head = self.repo.head().context("Failed to read HEAD")?;
        Ok(head.shorthand().unwrap_or("HEAD").to_string())
    }

    /// Make sure a worktree for `branch` exists at `path`, creating the
    /// branch from HEAD when missing. Idempotent: an existing worktree with
    /// the right branch is left alone.
    pub fn ensure_worktree(&self, path: &Path, branch: &str) -> Result<()> {
        if path.join(".git").exists() {
            let existing = worktree_branch(path)?;
            anyhow::ensure!(
                existing == branch,
                "worktree at {} is on branch {existing:?}, expected {branch:?}",
                path.display()
            );
            return Ok(());
        }

        if !self.branch_exists(branch) {
            let head = self
                .repo
                .head()
                .and_then(|h| h.peel_to_commit())
                .context("Failed to resolve HEAD for branch creation")?;
            self.repo
                .branch(branch, &head, false)
                .with_context(|| format!("Failed to create branch {branch}"))?;
            tracing::info!(branch, "created branch");
        }

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).context("Failed to create worktree parent")?;
        }

        let reference = self
            .repo
            .find_reference(&format!("refs/heads/{branch}"))
            .with_context(|| format!("Failed to find branch reference for {branch}"))?;
        let mut opts = WorktreeAddOptions::new();
        opts.reference(Some(&reference));

        // Worktree names cannot contain path separators.
        let name = branch.replace('/', "-");
        self.repo
            .worktree(&name, path, Some(&opts))
            .with_context(|| format!("Failed to add worktree at {}", path.display()))?;
        tracing::info!(branch, path = %path.display(), "created worktree");
        Ok(())
    }

    /// Whether the working tree at `path` has no uncommitted changes.
    pub fn is_clean(&self, path: &Path) -> Result<bool> {
        let repo = Repository::open(path).context("Failed to open worktree")?;
        let mut opts = git2::StatusOptions::new();
        opts.include_untracked(true);
        let statuses = repo
            .statuses(Some(&mut opts))
            .context("Failed to read worktree status")?;
        Ok(statuses.is_empty())
    }
}

/// Branch checked out in the worktree at `path`.
pub fn worktree_branch(path: &Path) -> Result<String> {
    let repo = Repository::open(path).context("Failed to open worktree")?;
    let head = repo.head().context("Failed to read worktree HEAD")?;
    Ok(head.shorthand().unwrap_or("HEAD").to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use git2::Signature;
    use tempfile::tempdir;

    fn init_repo(dir: &Path) -> Repository {
        let repo = Repository::init(dir).unwrap();
        {
            let mut index = repo.index().unwrap();
            std::fs::write(dir.join("README.md"), "# test").unwrap();
            index.add_path(Path::new("README.md")).unwrap();
            index.write().unwrap();
            let tree_id = index.write_tree().unwrap();
            let tree = repo.find_tree(tree_id).unwrap();
            let sig = Signature::now("sow", "sow@localhost").unwrap();
            repo.commit(Some("HEAD"), &sig, &sig, "initial", &tree, &[])
                .unwrap();
        }
        repo
    }

    #[test]
    fn ensure_worktree_creates_branch_and_tree() {
        let repo_dir = tempdir().unwrap();
        init_repo(repo_dir.path());
        let service = WorktreeService::discover(repo_dir.path()).unwrap();

        let wt_root = tempdir().unwrap();
        let wt_path = wt_root.path().join("feat-auth");
        service.ensure_worktree(&wt_path, "feat/auth").unwrap();

        assert!(wt_path.join(".git").exists());
        assert_eq!(worktree_branch(&wt_path).unwrap(), "feat/auth");
        assert!(service.branch_exists("feat/auth"));
    }

    #[test]
    fn ensure_worktree_is_idempotent() {
        let repo_dir = tempdir().unwrap();
        init_repo(repo_dir.path());
        let service = WorktreeService::discover(repo_dir.path()).unwrap();

        let wt_root = tempdir().unwrap();
        let wt_path = wt_root.path().join("feat-auth");
        service.ensure_worktree(&wt_path, "feat/auth").unwrap();
        service.ensure_worktree(&wt_path, "feat/auth").unwrap();
    }

    #[test]
    fn ensure_worktree_rejects_branch_mismatch() {
        let repo_dir = tempdir().unwrap();
        init_repo(repo_dir.path());
        let service = WorktreeService::discover(repo_dir.path()).unwrap();

        let wt_root = tempdir().unwrap();
        let wt_path = wt_root.path().join("feat-auth");
        service.ensure_worktree(&wt_path, "feat/auth").unwrap();
        let err = service.ensure_worktree(&wt_path, "feat/other").unwrap_err();
        assert!(err.to_string().contains("expected"));
    }

    #[test]
    fn clean_and_dirty_worktrees() {
        let repo_dir = tempdir().unwrap();
        init_repo(repo_dir.path());
        let service = WorktreeService::discover(repo_dir.path()).unwrap();

        let wt_root = tempdir().unwrap();
        let wt_path = wt_root.path().join("feat-auth");
        service.ensure_worktree(&wt_path, "feat/auth").unwrap();
        assert!(service.is_clean(&wt_path).unwrap());

        std::fs::write(wt_path.join("new.rs"), "fn main() {}").unwrap();
        assert!(!service.is_clean(&wt_path).unwrap());
    }

    #[test]
    fn current_branch_of_main_repo() {
        let repo_dir = tempdir().unwrap();
        init_repo(repo_dir.path());
        let service = WorktreeService::discover(repo_dir.path()).unwrap();
        let branch = service.current_branch().unwrap();
        assert!(branch == "master" || branch == "main");
    }
}
