//! Worktree commands: list, delete, clean and branch listing.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{info, warn};

use super::{Context, ItemFailure, Output, json};
use crate::discovery::{self, Project};
use crate::git::{BranchStream, DETACHED};
use crate::{Error, ErrorKind, Result};

// === List ===

#[derive(Debug, Clone, Serialize)]
pub struct WorktreeEntry {
    pub project: String,
    pub branch: String,
    pub path: PathBuf,
    pub session: String,
    /// `None` when the backend cannot list sessions
    pub session_exists: Option<bool>,
    /// Whether this process runs inside the session
    pub active: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct ListResult {
    pub worktrees: Vec<WorktreeEntry>,
    pub sessions_known: bool,
}

impl Output for ListResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.worktrees.is_empty() {
            return "No worktrees.".to_string();
        }
        let width = self
            .worktrees
            .iter()
            .map(|w| w.session.len())
            .max()
            .unwrap_or(0);
        self.worktrees
            .iter()
            .map(|w| {
                let marker = if w.active { "*" } else { " " };
                let state = match w.session_exists {
                    Some(true) => "running",
                    Some(false) => "-",
                    None => "?",
                };
                format!(
                    "{} {:width$}  {:7}  {}",
                    marker,
                    w.session,
                    state,
                    w.path.display(),
                    width = width
                )
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

impl ListResult {
    /// Session names in listing order.
    pub fn session_names(&self) -> impl Iterator<Item = &str> {
        self.worktrees.iter().map(|w| w.session.as_str())
    }
}

#[derive(Debug, Clone, Default)]
pub struct ListOptions {
    /// Only this project
    pub project: Option<String>,
    /// Only the project containing the working directory
    pub current_project: bool,
    /// Only worktrees whose session is running
    pub running: bool,
}

/// Worktrees of one project, or of every project, with their sessions.
///
/// Filtering on running sessions needs a backend that can list them.
pub fn list(ctx: &Context, options: &ListOptions, cwd: &Path) -> Result<ListResult> {
    let projects = match options.project {
        Some(ref name) => vec![discovery::resolve_project(&ctx.workspace, name)?],
        None if options.current_project => {
            vec![discovery::project_for_path(&ctx.workspace, cwd)?]
        }
        None => discovery::discover_projects_sorted(&ctx.workspace)?,
    };
    let sessions = if options.running {
        Some(running_sessions(ctx)?)
    } else {
        ctx.known_sessions()?
    };
    let current = ctx.current_session()?;

    let mut worktrees = Vec::new();
    for project in &projects {
        let found = match discovery::actual_worktrees(&ctx.git, project) {
            Ok(found) => found,
            Err(e) => {
                warn!(project = %project.name, error = %e, "skipping project");
                continue;
            }
        };
        for worktree in found {
            let session = project.session_name(&worktree.branch);
            let session_exists = sessions.as_ref().map(|s| s.contains(&session));
            if options.running && session_exists != Some(true) {
                continue;
            }
            worktrees.push(WorktreeEntry {
                project: project.name.clone(),
                session_exists,
                active: current.as_deref() == Some(session.as_str()),
                session,
                branch: worktree.branch,
                path: worktree.path,
            });
        }
    }

    Ok(ListResult {
        worktrees,
        sessions_known: sessions.is_some(),
    })
}

// === Delete ===

#[derive(Debug, Clone, Serialize)]
pub struct DeleteWorktreeResult {
    pub project: String,
    pub branch: String,
    pub path: PathBuf,
    pub session: String,
    pub session_deleted: bool,
}

impl Output for DeleteWorktreeResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut out = format!("Removed worktree {}", self.path.display());
        if self.session_deleted {
            out.push_str(&format!("\nKilled session {}", self.session));
        }
        out
    }
}

/// Remove the worktree for `branch` and, unless `keep_session`, its
/// session.
///
/// The worktree goes first so that a refused removal (uncommitted changes
/// without `force`) leaves the session running. The branch itself and the
/// project's stored metadata are kept.
pub fn delete_worktree(
    ctx: &mut Context,
    project: Option<&str>,
    cwd: &Path,
    branch: &str,
    force: bool,
    keep_session: bool,
) -> Result<DeleteWorktreeResult> {
    let project = ctx.target_project(project, cwd)?;
    let worktree = discovery::get_worktree(&ctx.git, &project, branch)?;
    ctx.git
        .remove_worktree(&project.bare_path, &worktree.path, force)?;

    let session = project.session_name(branch);
    let session_deleted = if keep_session {
        false
    } else {
        match ctx.session_exists(&session) {
            Ok(true) => {
                ctx.backend.delete(&session)?;
                true
            }
            Ok(false) => false,
            Err(e) if e.kind() == ErrorKind::BackendUnavailable => false,
            Err(e) => return Err(e),
        }
    };

    if let Err(e) = ctx.git.prune_worktrees(&project.bare_path) {
        warn!(project = %project.name, error = %e, "prune failed");
    }

    info!(project = %project.name, branch, "worktree deleted");
    Ok(DeleteWorktreeResult {
        project: project.name,
        branch: branch.to_string(),
        path: worktree.path,
        session,
        session_deleted,
    })
}

// === Clean ===

/// Which worktrees `clean` removes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "kebab-case")]
pub enum CleanMode {
    /// Worktrees without a session
    Orphaned,
    /// Worktrees whose branch is gone from origin
    RemoteDeleted,
}

#[derive(Debug, Clone)]
pub struct CleanOptions {
    pub mode: CleanMode,
    pub project: Option<String>,
    pub dry_run: bool,
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanedWorktree {
    pub branch: String,
    pub path: PathBuf,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub reason: Option<String>,
}

impl CleanedWorktree {
    fn new(branch: &str, path: &Path) -> Self {
        Self {
            branch: branch.to_string(),
            path: path.to_path_buf(),
            reason: None,
        }
    }

    fn skipped(branch: &str, path: &Path, reason: impl Into<String>) -> Self {
        Self {
            reason: Some(reason.into()),
            ..Self::new(branch, path)
        }
    }
}

#[derive(Debug, Clone, Serialize)]
pub struct CleanResult {
    pub project: String,
    pub mode: CleanMode,
    pub dry_run: bool,
    pub removed: Vec<CleanedWorktree>,
    pub skipped: Vec<CleanedWorktree>,
    pub failures: Vec<ItemFailure>,
}

impl Output for CleanResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let verb = if self.dry_run { "Would remove" } else { "Removed" };
        let mut lines = Vec::new();
        for w in &self.removed {
            lines.push(format!("{} {} ({})", verb, w.branch, w.path.display()));
        }
        for w in &self.skipped {
            lines.push(format!(
                "Skipped {}: {}",
                w.branch,
                w.reason.as_deref().unwrap_or("")
            ));
        }
        for f in &self.failures {
            lines.push(format!("Failed {}: {}", f.name, f.error));
        }
        if lines.is_empty() {
            lines.push(format!("Nothing to clean in {}", self.project));
        }
        lines.join("\n")
    }
}

/// Remove worktrees of a project that match `options.mode`.
///
/// The default branch's worktree and worktrees with uncommitted changes are
/// never removed. Removal is not forced.
pub fn clean(ctx: &mut Context, options: &CleanOptions, cwd: &Path) -> Result<CleanResult> {
    let project = ctx.target_project(options.project.as_deref(), cwd)?;
    let sessions = match options.mode {
        CleanMode::Orphaned => Some(running_sessions(ctx)?),
        CleanMode::RemoteDeleted => None,
    };
    let default_branch = ctx.git.default_branch(&project.bare_path).ok();

    let mut result = CleanResult {
        project: project.name.clone(),
        mode: options.mode,
        dry_run: options.dry_run,
        removed: Vec::new(),
        skipped: Vec::new(),
        failures: Vec::new(),
    };

    for worktree in discovery::actual_worktrees(&ctx.git, &project)? {
        let branch = worktree.branch.as_str();
        let candidate = match sessions {
            Some(ref sessions) => !sessions.contains(&project.session_name(branch)),
            None => is_remote_deleted(ctx, &project, branch)?,
        };
        if !candidate {
            continue;
        }
        if default_branch.as_deref() == Some(branch) {
            result.skipped.push(CleanedWorktree::skipped(
                branch,
                &worktree.path,
                "default branch",
            ));
            continue;
        }
        match ctx.git.is_dirty(&worktree.path) {
            Ok(false) => {}
            Ok(true) => {
                result.skipped.push(CleanedWorktree::skipped(
                    branch,
                    &worktree.path,
                    "uncommitted changes",
                ));
                continue;
            }
            Err(e) => {
                result.failures.push(ItemFailure::new(branch, e));
                continue;
            }
        }

        if !options.dry_run {
            if let Err(e) = ctx
                .git
                .remove_worktree(&project.bare_path, &worktree.path, false)
            {
                result.failures.push(ItemFailure::new(branch, e));
                continue;
            }
        }
        result
            .removed
            .push(CleanedWorktree::new(branch, &worktree.path));
    }

    if !options.dry_run && !result.removed.is_empty() {
        if let Err(e) = ctx.git.prune_worktrees(&project.bare_path) {
            warn!(project = %project.name, error = %e, "prune failed");
        }
    }
    Ok(result)
}

/// Session names, refusing backends that cannot enumerate them: without a
/// list every worktree would look orphaned.
fn running_sessions(ctx: &Context) -> Result<Vec<String>> {
    if !ctx.backend.is_running()? {
        return Err(Error::BackendUnavailable(format!(
            "{} is not available to list sessions",
            ctx.backend.name()
        )));
    }
    ctx.known_sessions()?.ok_or_else(|| {
        Error::Unsupported(format!(
            "the {} backend cannot list sessions",
            ctx.backend.name()
        ))
    })
}

fn is_remote_deleted(ctx: &Context, project: &Project, branch: &str) -> Result<bool> {
    // branches never pushed have no upstream and are not "deleted"
    if branch == DETACHED || !ctx.git.has_upstream(&project.bare_path, branch)? {
        return Ok(false);
    }
    let exists = ctx.git.ref_exists(
        &project.bare_path,
        &format!("refs/remotes/origin/{}", branch),
    )?;
    Ok(!exists)
}

// === Branches ===

#[derive(Debug, Clone, Serialize)]
pub struct BranchesResult {
    pub project: String,
    pub branches: Vec<String>,
}

impl Output for BranchesResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        self.branches.join("\n")
    }
}

/// Start streaming the branches of a project: local first, then those only
/// on origin.
pub fn branches(
    ctx: &Context,
    project: Option<&str>,
    cwd: &Path,
) -> Result<(Project, BranchStream)> {
    let project = ctx.target_project(project, cwd)?;
    let stream = ctx.git.stream_branches(&project.bare_path);
    Ok((project, stream))
}

/// Drain a branch stream, stopping at the first error.
pub fn collect_branches(project: &Project, stream: BranchStream) -> Result<BranchesResult> {
    let branches = stream.collect::<Result<Vec<_>>>()?;
    Ok(BranchesResult {
        project: project.name.clone(),
        branches,
    })
}
