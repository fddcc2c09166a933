use std::path::PathBuf;

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::debug;

use super::{Context, Output, json};
use crate::discovery::{self, Project, Worktree};
use crate::git::CommitSummary;
use crate::workspace::naming;
use crate::Result;

/// Details of one session and the worktree behind it.
#[derive(Debug, Clone, Serialize)]
pub struct InfoResult {
    pub session: String,
    pub project: String,
    pub branch: String,
    /// `None` when the branch has no worktree yet
    pub path: Option<PathBuf>,
    pub session_running: bool,
    /// `git status --short` of the worktree
    pub changes: Vec<String>,
    pub last_commit: Option<CommitSummary>,
    pub last_used: Option<DateTime<Utc>>,
}

impl Output for InfoResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = vec![
            format!("Session:     {}", self.session),
            format!("Project:     {}", self.project),
            format!("Branch:      {}", self.branch),
        ];
        match self.path {
            Some(ref path) => lines.push(format!("Path:        {}", path.display())),
            None => lines.push("Path:        (no worktree)".to_string()),
        }
        lines.push(format!(
            "Status:      {}",
            if self.session_running { "running" } else { "stopped" }
        ));
        if self.path.is_some() {
            if self.changes.is_empty() {
                lines.push("Git status:  clean".to_string());
            } else {
                lines.push("Git status:".to_string());
                lines.extend(self.changes.iter().map(|c| format!("  {}", c)));
            }
        }
        if let Some(ref commit) = self.last_commit {
            lines.push(format!("Last commit: {}", commit));
        }
        if let Some(used) = self.last_used {
            lines.push(format!("Last used:   {}", used.format("%Y-%m-%d %H:%M")));
        }
        if self.path.is_none() {
            lines.push(String::new());
            lines.push(format!(
                "Run `sesh switch {} -p {}` to create the worktree.",
                self.branch, self.project
            ));
        }
        lines.join("\n")
    }
}

/// Describe a session by name.
///
/// The name is matched against existing worktrees first. Otherwise it is
/// split into repository and branch, and the branch is looked up in the
/// project's bare repository.
pub fn session_info(ctx: &Context, session: &str) -> Result<InfoResult> {
    if let Some((project, worktree)) =
        discovery::match_session_to_worktree(&ctx.git, &ctx.workspace, session)?
    {
        return describe(ctx, project, worktree.branch.clone(), Some(worktree));
    }
    let (repo, branch) = naming::parse_session_name(session)?;
    let project = discovery::resolve_project(&ctx.workspace, &repo)?;
    debug!(session, project = %project.name, branch, "session has no worktree");
    describe(ctx, project, branch, None)
}

/// Describe the session a branch of a project has, or would have.
pub fn branch_info(ctx: &Context, project: &str, branch: &str) -> Result<InfoResult> {
    let project = discovery::resolve_project(&ctx.workspace, project)?;
    let worktree = discovery::actual_worktrees(&ctx.git, &project)?
        .into_iter()
        .find(|w| w.branch == branch);
    describe(ctx, project, branch.to_string(), worktree)
}

fn describe(
    ctx: &Context,
    project: Project,
    branch: String,
    worktree: Option<Worktree>,
) -> Result<InfoResult> {
    let session = project.session_name(&branch);
    let session_running = ctx.session_exists(&session)?;
    let last_used = ctx.storage.last_accessed(&session)?;

    let (path, changes, last_commit) = match worktree {
        Some(worktree) => {
            let changes = match ctx.git.short_status(&worktree.path) {
                Ok(changes) => changes,
                Err(e) => {
                    debug!(path = %worktree.path.display(), error = %e, "no git status");
                    Vec::new()
                }
            };
            let commit = ctx.git.last_commit(&worktree.path, "HEAD")?;
            (Some(worktree.path), changes, commit)
        }
        None => {
            let commit = match ctx
                .git
                .last_commit(&project.bare_path, &format!("refs/remotes/origin/{}", branch))?
            {
                Some(commit) => Some(commit),
                None => ctx
                    .git
                    .last_commit(&project.bare_path, &format!("refs/heads/{}", branch))?,
            };
            (None, Vec::new(), commit)
        }
    };

    Ok(InfoResult {
        session,
        project: project.name,
        branch,
        path,
        session_running,
        changes,
        last_commit,
        last_used,
    })
}
