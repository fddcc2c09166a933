//! Project-level commands: clone, fetch, list and delete.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{info, warn};

use super::{Context, ItemFailure, Output, json};
use crate::discovery::{self, Project};
use crate::workspace::naming;
use crate::{Error, ErrorKind, Result};

// === Clone ===

#[derive(Debug, Clone, Default)]
pub struct CloneOptions {
    /// Project name to use instead of the one derived from the URL
    pub name: Option<String>,
}

#[derive(Debug, Clone, Serialize)]
pub struct CloneResult {
    pub project: String,
    pub url: String,
    pub bare_path: PathBuf,
    pub default_branch: String,
    pub worktree_path: PathBuf,
}

impl Output for CloneResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!(
            "Cloned {} into {}\nCreated worktree for '{}' at {}",
            self.url,
            self.bare_path.display(),
            self.default_branch,
            self.worktree_path.display()
        )
    }
}

/// A project name given by hand must look like a derived one.
fn validate_project_name(name: &str) -> Result<String> {
    let name = name.trim().trim_end_matches('/');
    let parts: Vec<&str> = name.split('/').collect();
    let valid = !name.starts_with('/')
        && parts.len() >= 2
        && parts
            .iter()
            .all(|p| !p.is_empty() && *p != "." && *p != "..");
    if !valid {
        return Err(Error::InvalidInput(format!(
            "project name '{}' must look like host/org/repo",
            name
        )));
    }
    Ok(name.to_string())
}

/// Clone `url` as a bare repository and check out its default branch.
///
/// Fails with `AlreadyExists` before running git if the project's bare
/// repository is already present. When a later step fails, the bare
/// repository, the project directory and the registration are removed
/// again so that the clone can be retried.
pub fn clone(ctx: &mut Context, url: &str, options: &CloneOptions) -> Result<CloneResult> {
    let name = match options.name {
        Some(ref name) => validate_project_name(name)?,
        None => validate_project_name(&naming::project_name(url)?)?,
    };

    let bare_path = ctx.workspace.bare_repo_path(&name);
    if bare_path.exists() {
        return Err(Error::AlreadyExists(format!(
            "project '{}' at {}",
            name,
            bare_path.display()
        )));
    }

    ctx.workspace.ensure()?;
    let project_dir = ctx.workspace.project_dir(&name);
    let had_project_dir = project_dir.exists();
    match clone_into(ctx, url, &name, &bare_path) {
        Ok((default_branch, worktree_path)) => {
            info!(project = %name, branch = %default_branch, "project cloned");
            Ok(CloneResult {
                project: name,
                url: url.to_string(),
                bare_path,
                default_branch,
                worktree_path,
            })
        }
        Err(e) => {
            warn!(project = %name, error = %e, "clone failed, rolling back");
            let created = (!had_project_dir).then_some(project_dir.as_path());
            rollback_clone(ctx, &name, &bare_path, created);
            Err(e)
        }
    }
}

fn clone_into(
    ctx: &mut Context,
    url: &str,
    name: &str,
    bare_path: &Path,
) -> Result<(String, PathBuf)> {
    ctx.git.clone_bare(url, bare_path)?;
    ctx.storage
        .register_project(name, Some(url), Some(&ctx.workspace.project_dir(name)))?;
    ctx.storage.update_project_fetch_time(name)?;

    let default_branch = ctx.git.default_branch(bare_path)?;
    ctx.workspace.ensure_project_dir(name)?;
    let worktree_path = ctx.workspace.worktree_path(name, &default_branch);
    ctx.git
        .create_worktree(bare_path, &default_branch, &worktree_path)?;
    Ok((default_branch, worktree_path))
}

/// Undo a partial clone. Failures are logged; the clone error is what the
/// caller reports.
fn rollback_clone(
    ctx: &mut Context,
    name: &str,
    bare_path: &Path,
    created_project_dir: Option<&Path>,
) {
    for dir in std::iter::once(bare_path).chain(created_project_dir) {
        if dir.exists() {
            if let Err(e) = fs::remove_dir_all(dir) {
                warn!(path = %dir.display(), error = %e, "could not remove partial clone");
            }
        }
    }
    if let Err(e) = ctx.storage.delete_project(name) {
        warn!(project = name, error = %e, "could not remove project registration");
    }
}

// === Fetch ===

#[derive(Debug, Clone, Serialize)]
pub struct FetchResult {
    pub project: String,
    pub fetched_at: DateTime<Utc>,
}

impl Output for FetchResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Fetched {}", self.project)
    }
}

/// Fetch one project and record the time.
pub fn fetch(ctx: &mut Context, project: Option<&str>, cwd: &Path) -> Result<FetchResult> {
    let project = ctx.target_project(project, cwd)?;
    ctx.git.fetch(&project.bare_path)?;
    let fetched_at = ctx.storage.update_project_fetch_time(&project.name)?;
    Ok(FetchResult {
        project: project.name,
        fetched_at,
    })
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct FetchAllResult {
    pub succeeded: Vec<String>,
    pub failed: Vec<ItemFailure>,
}

impl FetchAllResult {
    pub fn success_count(&self) -> usize {
        self.succeeded.len()
    }

    pub fn failure_count(&self) -> usize {
        self.failed.len()
    }
}

impl Output for FetchAllResult {
    fn to_json(&self) -> String {
        #[derive(Serialize)]
        struct Counts<'a> {
            succeeded: usize,
            failed: usize,
            projects: &'a [String],
            failures: &'a [ItemFailure],
        }
        json(&Counts {
            succeeded: self.success_count(),
            failed: self.failure_count(),
            projects: &self.succeeded,
            failures: &self.failed,
        })
    }

    fn to_human(&self) -> String {
        let mut lines = vec![format!(
            "Fetched {} project(s), {} failed",
            self.success_count(),
            self.failure_count()
        )];
        for failure in &self.failed {
            lines.push(format!("  {}: {}", failure.name, failure.error));
        }
        lines.join("\n")
    }
}

/// Fetch every project, continuing past failures.
pub fn fetch_all(ctx: &mut Context) -> Result<FetchAllResult> {
    let mut result = FetchAllResult::default();
    for project in discovery::discover_projects_sorted(&ctx.workspace)? {
        let outcome = ctx
            .git
            .fetch(&project.bare_path)
            .and_then(|()| ctx.storage.update_project_fetch_time(&project.name));
        match outcome {
            Ok(_) => result.succeeded.push(project.name),
            Err(e) => {
                warn!(project = %project.name, error = %e, "fetch failed");
                result.failed.push(ItemFailure::new(project.name, e));
            }
        }
    }
    Ok(result)
}

// === List ===

#[derive(Debug, Clone, Serialize)]
pub struct ProjectEntry {
    #[serde(flatten)]
    pub project: Project,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub remote_url: Option<String>,
    /// Checkouts, not counting the bare repository; `None` if git failed
    pub worktree_count: Option<usize>,
}

#[derive(Debug, Clone, Serialize)]
pub struct ProjectListResult {
    pub projects: Vec<ProjectEntry>,
}

impl Output for ProjectListResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        if self.projects.is_empty() {
            return "No projects.".to_string();
        }
        self.projects
            .iter()
            .map(|entry| {
                let worktrees = entry
                    .worktree_count
                    .map(|n| format!("{} worktree(s)", n))
                    .unwrap_or_else(|| "worktrees unknown".to_string());
                let fetched = entry
                    .project
                    .last_fetched_at
                    .map(|t| format!("fetched {}", t.format("%Y-%m-%d %H:%M")))
                    .unwrap_or_else(|| "never fetched".to_string());
                format!("{}  ({}, {})", entry.project.name, worktrees, fetched)
            })
            .collect::<Vec<_>>()
            .join("\n")
    }
}

/// Projects on disk joined with their stored metadata.
pub fn list_projects(ctx: &Context) -> Result<ProjectListResult> {
    let mut projects = Vec::new();
    for mut project in discovery::discover_projects_sorted(&ctx.workspace)? {
        let record = ctx.storage.get_project(&project.name)?;
        project.last_fetched_at = record.as_ref().and_then(|r| r.last_fetched_at);
        let worktree_count = match discovery::actual_worktrees(&ctx.git, &project) {
            Ok(worktrees) => Some(worktrees.len()),
            Err(e) => {
                warn!(project = %project.name, error = %e, "cannot list worktrees");
                None
            }
        };
        projects.push(ProjectEntry {
            remote_url: record.and_then(|r| r.remote_url),
            project,
            worktree_count,
        });
    }
    Ok(ProjectListResult { projects })
}

// === Delete ===

#[derive(Debug, Clone, Serialize)]
pub struct DeleteProjectResult {
    pub project: String,
    pub removed_worktrees: Vec<String>,
    pub deleted_sessions: Vec<String>,
    pub failures: Vec<ItemFailure>,
    /// Whether the bare repository and metadata were removed
    pub removed: bool,
}

impl Output for DeleteProjectResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        for branch in &self.removed_worktrees {
            lines.push(format!("Removed worktree '{}'", branch));
        }
        for session in &self.deleted_sessions {
            lines.push(format!("Killed session {}", session));
        }
        for failure in &self.failures {
            lines.push(format!("Failed {}: {}", failure.name, failure.error));
        }
        if self.removed {
            lines.push(format!("Deleted project {}", self.project));
        } else {
            lines.push(format!(
                "Project {} kept because some items could not be removed",
                self.project
            ));
        }
        lines.join("\n")
    }
}

/// Remove every worktree and session of a project, then the project itself.
///
/// The bare repository and stored metadata are only removed when every
/// worktree and session went away.
pub fn delete_project(
    ctx: &mut Context,
    project: Option<&str>,
    cwd: &Path,
    force: bool,
) -> Result<DeleteProjectResult> {
    let project = ctx.target_project(project, cwd)?;
    let mut result = DeleteProjectResult {
        project: project.name.clone(),
        removed_worktrees: Vec::new(),
        deleted_sessions: Vec::new(),
        failures: Vec::new(),
        removed: false,
    };

    for worktree in discovery::actual_worktrees(&ctx.git, &project)? {
        match ctx
            .git
            .remove_worktree(&project.bare_path, &worktree.path, force)
        {
            Ok(()) => result.removed_worktrees.push(worktree.branch.clone()),
            Err(e) => {
                result.failures.push(ItemFailure::new(&worktree.branch, e));
                continue;
            }
        }

        let session = project.session_name(&worktree.branch);
        match ctx.session_exists(&session) {
            Ok(false) => {}
            Ok(true) => match ctx.backend.delete(&session) {
                Ok(()) => result.deleted_sessions.push(session),
                Err(e) => result.failures.push(ItemFailure::new(session, e)),
            },
            Err(e) if e.kind() == ErrorKind::BackendUnavailable => {}
            Err(e) => result.failures.push(ItemFailure::new(session, e)),
        }
    }

    if !result.failures.is_empty() {
        warn!(project = %project.name, failures = result.failures.len(), "project kept");
        return Ok(result);
    }

    fs::remove_dir_all(&project.bare_path)?;
    if project.local_path.exists() {
        fs::remove_dir_all(&project.local_path)?;
    }
    ctx.storage.delete_project(&project.name)?;
    result.removed = true;
    info!(project = %project.name, "project deleted");
    Ok(result)
}
