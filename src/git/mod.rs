//! Adapter over the `git` binary.
//!
//! The adapter owns no state: every call shells out to `git -C <repo>` and
//! interprets the exit status and output. Failures carry the [`GitOp`] that
//! failed so callers can tell a clone failure from a worktree failure.

pub mod branch;
pub mod worktree;

use std::path::Path;
use std::time::Duration;

use serde::Serialize;
use tracing::{debug, info};

use crate::process::{self, CommandOutput, CommandSpec};
use crate::{Error, GitOp, Result};

pub use branch::BranchStream;
pub use worktree::{DETACHED, WorktreeInfo, parse_worktree_list};

/// Refspec that gives worktrees of a bare clone remote-tracking branches.
pub const ORIGIN_FETCH_REFSPEC: &str = "+refs/heads/*:refs/remotes/origin/*";

/// Branches tried, in order, when HEAD does not name a default branch.
const DEFAULT_BRANCH_CANDIDATES: &[&str] = &["main", "master", "develop"];

/// Handle for running git commands with an optional timeout.
#[derive(Debug, Clone, Default)]
pub struct Git {
    timeout: Option<Duration>,
}

impl Git {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }

    /// `git -C <repo>` with interactive prompts disabled.
    pub(crate) fn command(&self, repo: &Path) -> CommandSpec {
        CommandSpec::new("git")
            .arg("-C")
            .path_arg(repo)
            .env("GIT_TERMINAL_PROMPT", "0")
    }

    pub(crate) fn run(&self, spec: &CommandSpec) -> Result<CommandOutput> {
        process::run(spec, self.timeout)
    }

    /// Run and map a non-zero exit to [`Error::Git`] with `context`.
    pub(crate) fn run_ok(&self, spec: &CommandSpec, op: GitOp, context: &str) -> Result<String> {
        let out = self.run(spec)?;
        if out.success() {
            Ok(out.stdout)
        } else {
            Err(Error::git(
                op,
                format!("{}: {}", context, out.describe_failure()),
            ))
        }
    }

    /// Clone `url` as a bare repository at `dest`.
    ///
    /// Fails without touching anything if `dest` already exists. After the
    /// clone the origin fetch refspec is configured and fetched so that
    /// worktrees get remote-tracking branches.
    pub fn clone_bare(&self, url: &str, dest: &Path) -> Result<()> {
        if dest.exists() {
            return Err(Error::git(
                GitOp::Clone,
                format!("destination already exists: {}", dest.display()),
            ));
        }
        if let Some(parent) = dest.parent() {
            std::fs::create_dir_all(parent)?;
        }

        info!(url, dest = %dest.display(), "cloning bare repository");
        let spec = CommandSpec::new("git")
            .args(["clone", "--bare", url])
            .path_arg(dest)
            .env("GIT_TERMINAL_PROMPT", "0");
        self.run_ok(&spec, GitOp::Clone, &format!("cloning {}", url))?;

        let spec = self
            .command(dest)
            .args(["config", "remote.origin.fetch", ORIGIN_FETCH_REFSPEC]);
        self.run_ok(&spec, GitOp::Clone, "configuring origin fetch refspec")?;

        self.fetch(dest)
            .map_err(|e| Error::git(GitOp::Clone, format!("initial fetch: {}", e)))
    }

    /// `git fetch origin --prune`.
    pub fn fetch(&self, repo: &Path) -> Result<()> {
        debug!(repo = %repo.display(), "fetching origin");
        let spec = self.command(repo).args(["fetch", "origin", "--prune"]);
        self.run_ok(
            &spec,
            GitOp::Fetch,
            &format!("fetching {}", repo.display()),
        )?;
        Ok(())
    }

    /// URL of the `origin` remote.
    pub fn remote_url(&self, repo: &Path) -> Result<String> {
        let spec = self.command(repo).args(["remote", "get-url", "origin"]);
        let out = self.run_ok(&spec, GitOp::Query, "reading origin URL")?;
        Ok(out.trim().to_string())
    }

    /// Default branch of a bare repository.
    ///
    /// Uses what HEAD points at, then `origin/HEAD`, then the first of
    /// `main`, `master`, `develop` that exists.
    pub fn default_branch(&self, repo: &Path) -> Result<String> {
        for reference in ["HEAD", "refs/remotes/origin/HEAD"] {
            let spec = self
                .command(repo)
                .args(["symbolic-ref", "--quiet", "--short", reference]);
            let out = self.run(&spec)?;
            if out.success() {
                let name = out.stdout.trim();
                let name = name.strip_prefix("origin/").unwrap_or(name);
                if !name.is_empty() && self.ref_exists(repo, &format!("refs/heads/{}", name))? {
                    return Ok(name.to_string());
                }
            }
        }

        for candidate in DEFAULT_BRANCH_CANDIDATES {
            if self.ref_exists(repo, &format!("refs/heads/{}", candidate))?
                || self.ref_exists(repo, &format!("refs/remotes/origin/{}", candidate))?
            {
                return Ok(candidate.to_string());
            }
        }

        Err(Error::NotFound(format!(
            "cannot determine default branch of {}",
            repo.display()
        )))
    }

    /// Whether a fully qualified ref exists. Exit status 1 means absent.
    pub fn ref_exists(&self, repo: &Path, reference: &str) -> Result<bool> {
        let spec = self
            .command(repo)
            .args(["show-ref", "--verify", "--quiet", reference]);
        let out = self.run(&spec)?;
        match out.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(Error::git(
                GitOp::BranchLookup,
                format!("checking {}: {}", reference, out.describe_failure()),
            )),
        }
    }

    /// Counts of changed and untracked files in a worktree.
    pub fn status_summary(&self, worktree: &Path) -> Result<StatusSummary> {
        let spec = self.command(worktree).args(["status", "--porcelain"]);
        let out = self.run_ok(
            &spec,
            GitOp::Query,
            &format!("reading status of {}", worktree.display()),
        )?;
        Ok(StatusSummary::parse(&out))
    }

    pub fn is_dirty(&self, worktree: &Path) -> Result<bool> {
        Ok(!self.status_summary(worktree)?.is_clean())
    }

    /// `git status --short`, one entry per changed or untracked file.
    pub fn short_status(&self, worktree: &Path) -> Result<Vec<String>> {
        let spec = self.command(worktree).args(["status", "--short"]);
        let out = self.run_ok(
            &spec,
            GitOp::Query,
            &format!("reading status of {}", worktree.display()),
        )?;
        Ok(out
            .lines()
            .filter(|l| !l.trim().is_empty())
            .map(|l| l.trim_end().to_string())
            .collect())
    }

    /// The commit `rev` points at, `None` when it does not resolve (an
    /// unknown branch, or a repository without commits).
    pub fn last_commit(&self, repo: &Path, rev: &str) -> Result<Option<CommitSummary>> {
        let spec = self
            .command(repo)
            .args(["log", "-1", "--format=%h%x00%s%x00%ar", rev, "--"]);
        let out = self.run(&spec)?;
        if !out.success() {
            debug!(rev, detail = %out.describe_failure(), "no commit for revision");
            return Ok(None);
        }
        Ok(CommitSummary::parse(&out.stdout))
    }
}

/// One commit as shown by `info`: abbreviated hash, subject and age.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct CommitSummary {
    pub hash: String,
    pub subject: String,
    pub age: String,
}

impl CommitSummary {
    /// Parse `%h%x00%s%x00%ar` output.
    fn parse(output: &str) -> Option<Self> {
        let mut fields = output.trim_end_matches(['\n', '\r']).splitn(3, '\0');
        let hash = fields.next().filter(|h| !h.is_empty())?;
        Some(Self {
            hash: hash.to_string(),
            subject: fields.next().unwrap_or_default().to_string(),
            age: fields.next().unwrap_or_default().to_string(),
        })
    }
}

impl std::fmt::Display for CommitSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{} {} ({})", self.hash, self.subject, self.age)
    }
}

/// Summary of `git status --porcelain`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
pub struct StatusSummary {
    pub changed: usize,
    pub untracked: usize,
}

impl StatusSummary {
    pub fn parse(porcelain: &str) -> Self {
        let mut summary = Self::default();
        for line in porcelain.lines().filter(|l| !l.trim().is_empty()) {
            if line.starts_with("??") {
                summary.untracked += 1;
            } else {
                summary.changed += 1;
            }
        }
        summary
    }

    pub fn is_clean(&self) -> bool {
        self.changed == 0 && self.untracked == 0
    }
}
