//! Worktree operations on a bare repository.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::info;

use super::Git;
use crate::{GitOp, Result};

/// Branch recorded for a detached checkout.
pub const DETACHED: &str = "(detached)";

/// One record of `git worktree list --porcelain`.
///
/// `branch` is empty for the bare repository's own entry and
/// [`DETACHED`] for a detached HEAD.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct WorktreeInfo {
    pub path: PathBuf,
    pub branch: String,
    pub commit: String,
}

impl WorktreeInfo {
    /// Whether this is the bare repository placeholder rather than a checkout.
    pub fn is_placeholder(&self) -> bool {
        self.branch.is_empty()
    }
}

impl Git {
    /// Check out an existing branch at `path` and make it track `origin/<branch>`.
    pub fn create_worktree(&self, bare: &Path, branch: &str, path: &Path) -> Result<()> {
        info!(branch, path = %path.display(), "creating worktree");
        let spec = self
            .command(bare)
            .args(["worktree", "add"])
            .path_arg(path)
            .arg(branch);
        self.run_ok(
            &spec,
            GitOp::CreateWorktree,
            &format!("branch '{}' at {}", branch, path.display()),
        )?;
        self.set_upstream(path, branch)
    }

    /// Create `branch` from `start_point` and check it out at `path`.
    pub fn create_worktree_new_branch(
        &self,
        bare: &Path,
        branch: &str,
        path: &Path,
        start_point: &str,
    ) -> Result<()> {
        info!(branch, start_point, path = %path.display(), "creating worktree with new branch");
        let spec = self
            .command(bare)
            .args(["worktree", "add", "-b", branch])
            .path_arg(path)
            .arg(start_point);
        self.run_ok(
            &spec,
            GitOp::CreateWorktree,
            &format!("new branch '{}' at {}", branch, path.display()),
        )?;
        Ok(())
    }

    /// Configure `branch.<b>.remote` and `branch.<b>.merge` inside a worktree.
    fn set_upstream(&self, worktree: &Path, branch: &str) -> Result<()> {
        let remote_key = format!("branch.{}.remote", branch);
        let merge_key = format!("branch.{}.merge", branch);
        let merge_ref = format!("refs/heads/{}", branch);
        let settings = [
            (remote_key.as_str(), "origin"),
            (merge_key.as_str(), merge_ref.as_str()),
        ];
        for (key, value) in settings {
            let spec = self.command(worktree).args(["config", key, value]);
            self.run_ok(
                &spec,
                GitOp::CreateWorktree,
                &format!("setting {} for '{}'", key, branch),
            )?;
        }
        Ok(())
    }

    /// Every worktree of the repository, bare placeholder included.
    pub fn list_worktrees(&self, bare: &Path) -> Result<Vec<WorktreeInfo>> {
        let spec = self.command(bare).args(["worktree", "list", "--porcelain"]);
        let out = self.run_ok(
            &spec,
            GitOp::ListWorktrees,
            &format!("listing worktrees of {}", bare.display()),
        )?;
        Ok(parse_worktree_list(&out))
    }

    /// Remove a worktree. Without `force` git refuses dirty checkouts.
    pub fn remove_worktree(&self, bare: &Path, path: &Path, force: bool) -> Result<()> {
        info!(path = %path.display(), force, "removing worktree");
        let mut spec = self.command(bare).args(["worktree", "remove"]);
        if force {
            spec = spec.arg("--force");
        }
        let spec = spec.path_arg(path);
        self.run_ok(
            &spec,
            GitOp::RemoveWorktree,
            &format!("removing {}", path.display()),
        )?;
        Ok(())
    }

    /// Drop administrative records of worktrees whose directories are gone.
    pub fn prune_worktrees(&self, bare: &Path) -> Result<()> {
        let spec = self.command(bare).args(["worktree", "prune"]);
        self.run_ok(
            &spec,
            GitOp::PruneWorktrees,
            &format!("pruning {}", bare.display()),
        )?;
        Ok(())
    }
}

/// Parse `git worktree list --porcelain` output.
///
/// Records are separated by blank lines. Tolerates CRLF line endings,
/// trailing whitespace and a missing final blank line.
pub fn parse_worktree_list(output: &str) -> Vec<WorktreeInfo> {
    let mut worktrees = Vec::new();
    let mut current: Option<WorktreeInfo> = None;

    for line in output.lines() {
        let line = line.trim_end();
        if line.is_empty() {
            worktrees.extend(current.take());
            continue;
        }

        let (key, value) = match line.split_once(' ') {
            Some((k, v)) => (k, v),
            None => (line, ""),
        };

        match key {
            "worktree" => {
                worktrees.extend(current.take());
                current = Some(WorktreeInfo {
                    path: PathBuf::from(value),
                    ..Default::default()
                });
            }
            "HEAD" => {
                if let Some(wt) = current.as_mut() {
                    wt.commit = value.to_string();
                }
            }
            "branch" => {
                if let Some(wt) = current.as_mut() {
                    wt.branch = value
                        .strip_prefix("refs/heads/")
                        .unwrap_or(value)
                        .to_string();
                }
            }
            "detached" => {
                if let Some(wt) = current.as_mut() {
                    wt.branch = DETACHED.to_string();
                }
            }
            _ => {}
        }
    }

    worktrees.extend(current);
    worktrees
}
