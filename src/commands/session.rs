//! Switching between sessions.

use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::{debug, info};

use super::{Activation, Context, Output, json};
use crate::discovery::{self, Project};
use crate::storage::HistoryEntry;
use crate::workspace::naming;
use crate::{Error, ErrorKind, Result};

#[derive(Debug, Clone, Default)]
pub struct SwitchOptions {
    pub branch: String,
    /// Create the branch from the default branch
    pub create: bool,
    /// Project name; defaults to the project containing the working directory
    pub project: Option<String>,
}

impl SwitchOptions {
    pub fn new(branch: impl Into<String>) -> Self {
        Self {
            branch: branch.into(),
            ..Default::default()
        }
    }

    pub fn create(mut self, create: bool) -> Self {
        self.create = create;
        self
    }

    pub fn project(mut self, project: Option<String>) -> Self {
        self.project = project;
        self
    }
}

/// Make sure a worktree for `branch` exists, returning its path and
/// whether it was created.
fn ensure_worktree(
    ctx: &Context,
    project: &Project,
    branch: &str,
    create: bool,
) -> Result<(PathBuf, bool)> {
    match discovery::get_worktree(&ctx.git, project, branch) {
        Ok(worktree) => {
            if create {
                return Err(Error::AlreadyExists(format!(
                    "branch '{}' in project '{}'",
                    branch, project.name
                )));
            }
            return Ok((worktree.path, false));
        }
        Err(e) if e.kind() == ErrorKind::NotFound => {}
        Err(e) => return Err(e),
    }

    let path = ctx.workspace.worktree_path(&project.name, branch);
    if path.exists() {
        return Err(Error::AlreadyExists(format!(
            "{} is occupied by another checkout",
            path.display()
        )));
    }

    let bare = &project.bare_path;
    let (local, _) = ctx.git.does_branch_exist(bare, branch)?;
    let remote = ctx
        .git
        .ref_exists(bare, &format!("refs/remotes/origin/{}", branch))?;

    ctx.workspace.ensure_project_dir(&project.name)?;
    if create {
        if local || remote {
            return Err(Error::AlreadyExists(format!(
                "branch '{}' in project '{}' (omit -b to check it out)",
                branch, project.name
            )));
        }
        let start = ctx.git.default_branch(bare)?;
        ctx.git.create_worktree_new_branch(bare, branch, &path, &start)?;
    } else {
        if !local && !remote {
            return Err(Error::NotFound(format!(
                "branch '{}' in project '{}' (use -b to create it)",
                branch, project.name
            )));
        }
        ctx.git.create_worktree(bare, branch, &path)?;
    }
    Ok((path, true))
}

/// Create the session if it is missing, typing the startup command into
/// new sessions. Returns whether it was created.
fn ensure_session(ctx: &Context, session: &str, path: &Path) -> Result<bool> {
    if ctx.session_exists(session)? {
        return Ok(false);
    }
    ctx.backend.create(session, path)?;
    ctx.run_startup_command(session, path);
    Ok(true)
}

/// Attach to a ready session and record it in the history.
fn activate(
    ctx: &mut Context,
    project: &Project,
    branch: &str,
    path: PathBuf,
    created_worktree: bool,
) -> Result<Activation> {
    let session = project.session_name(branch);
    let created_session = ensure_session(ctx, &session, &path)?;
    let attach = ctx.backend.attach(&session)?;

    let entry = HistoryEntry::new(&session, &project.name, branch);
    if !ctx.storage.push_history(&entry)? {
        debug!(session = %session, "history top unchanged");
    }

    info!(session = %session, backend = %ctx.backend.name(), "session activated");
    Ok(Activation {
        session,
        project: project.name.clone(),
        branch: branch.to_string(),
        path,
        created_worktree,
        created_session,
        attach,
    })
}

/// Switch to the session for `branch`, creating the worktree and session as
/// needed.
///
/// Without `create` the branch must exist locally or on origin; with it the
/// branch must not exist anywhere and is started from the default branch.
pub fn switch(ctx: &mut Context, options: &SwitchOptions, cwd: &Path) -> Result<Activation> {
    let branch = options.branch.trim();
    if naming::sanitize_branch(branch).is_empty() {
        return Err(Error::InvalidInput(format!(
            "invalid branch name '{}'",
            options.branch
        )));
    }

    let project = ctx.target_project(options.project.as_deref(), cwd)?;
    let (path, created_worktree) = ensure_worktree(ctx, &project, branch, options.create)?;
    activate(ctx, &project, branch, path, created_worktree)
}

/// Go back to the previous session in the history.
///
/// The previous session is pushed again, so repeated pops toggle between
/// the last two sessions. It is recreated if it was killed in the
/// meantime; its worktree must still exist.
pub fn pop(ctx: &mut Context) -> Result<Activation> {
    let current = ctx.current_session()?;
    let entry = ctx
        .storage
        .previous_session(current.as_deref())?
        .ok_or_else(|| Error::NotFound("no previous session in history".to_string()))?;

    let project = discovery::get_project(&ctx.workspace, &entry.project_name)?;
    let worktree = discovery::get_worktree(&ctx.git, &project, &entry.branch)?;
    activate(ctx, &project, &entry.branch, worktree.path, false)
}

#[derive(Debug, Clone, Serialize)]
pub struct KillSessionResult {
    pub session: String,
}

impl Output for KillSessionResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        format!("Killed session {}", self.session)
    }
}

/// Kill a session. Its worktree is left alone.
pub fn kill_session(ctx: &Context, name: &str) -> Result<KillSessionResult> {
    ctx.backend.delete(name)?;
    info!(session = name, "session killed");
    Ok(KillSessionResult {
        session: name.to_string(),
    })
}
