use std::path::{Path, PathBuf};

use serde::Serialize;
use tracing::debug;

use super::{Context, Output, json};
use crate::config::{self, ResolvedConfig};
use crate::discovery::{self, Project, Worktree};
use crate::git::StatusSummary;
use crate::Result;

#[derive(Debug, Clone, Serialize)]
pub struct BackendStatus {
    pub name: String,
    /// The configured kind, e.g. "Tmux" or "VS Code (open)"
    pub configured: String,
    pub running: bool,
    pub inside_session: bool,
    pub current_session: Option<String>,
    /// `None` when the backend cannot list sessions
    pub sessions: Option<Vec<String>>,
}

/// The worktree containing the working directory, or the one behind the
/// current session when the working directory is elsewhere.
#[derive(Debug, Clone, Serialize)]
pub struct CurrentWorktree {
    pub project: String,
    pub remote_url: Option<String>,
    pub branch: String,
    pub path: PathBuf,
    pub session: String,
    pub session_running: bool,
    pub git_status: Option<StatusSummary>,
}

#[derive(Debug, Clone, Serialize)]
pub struct StatusResult {
    pub backend: BackendStatus,
    pub workspace: PathBuf,
    pub database: Option<PathBuf>,
    pub project_count: usize,
    pub current: Option<CurrentWorktree>,
    pub config: ResolvedConfig,
}

impl Output for StatusResult {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let b = &self.backend;
        let mut lines = vec![
            format!(
                "Backend:   {} ({}), configured as {}",
                b.name,
                if b.running { "available" } else { "not available" },
                b.configured
            ),
            format!(
                "Session:   {}",
                b.current_session.as_deref().unwrap_or("(not in a session)")
            ),
            format!(
                "Workspace: {} ({} project(s))",
                self.workspace.display(),
                self.project_count
            ),
        ];
        if let Some(ref db) = self.database {
            lines.push(format!("Database:  {}", db.display()));
        }

        if let Some(ref current) = self.current {
            lines.push(format!("Project:   {}", current.project));
            if let Some(ref url) = current.remote_url {
                lines.push(format!("Remote:    {}", url));
            }
            lines.push(format!("Branch:    {}", current.branch));
            lines.push(format!("Worktree:  {}", current.path.display()));
            lines.push(format!(
                "Session:   {} ({})",
                current.session,
                if current.session_running { "running" } else { "not running" }
            ));
            if let Some(status) = current.git_status {
                if status.is_clean() {
                    lines.push("Status:    clean".to_string());
                } else {
                    lines.push(format!(
                        "Status:    {} changed, {} untracked",
                        status.changed, status.untracked
                    ));
                }
            }
        }

        if let Some(ref sessions) = b.sessions {
            let others: Vec<&str> = sessions
                .iter()
                .map(String::as_str)
                .filter(|s| Some(*s) != b.current_session.as_deref())
                .collect();
            if !others.is_empty() {
                lines.push(format!("Other sessions: {}", others.join(", ")));
            }
        }

        lines.push(String::new());
        lines.push("Config:".to_string());
        lines.push(format!(
            "  workspace-dir   = {} ({})",
            self.config.workspace_dir.value.display(),
            self.config.workspace_dir.source
        ));
        lines.push(format!(
            "  session-backend = {} ({})",
            self.config.session_backend.value, self.config.session_backend.source
        ));
        if let Some(ref command) = self.config.startup_command {
            lines.push(format!(
                "  startup-command = {} ({})",
                command.value, command.source
            ));
        }
        lines.push(format!(
            "  command-timeout = {}s ({})",
            self.config.command_timeout.value, self.config.command_timeout.source
        ));
        lines.join("\n")
    }
}

fn describe_worktree(
    ctx: &Context,
    project: Project,
    worktree: Worktree,
) -> Result<CurrentWorktree> {
    let remote_url = ctx.git.remote_url(&project.bare_path).ok();
    let session = project.session_name(&worktree.branch);
    let session_running = ctx.session_exists(&session)?;
    let git_status = ctx.git.status_summary(&worktree.path).ok();
    Ok(CurrentWorktree {
        project: project.name,
        remote_url,
        branch: worktree.branch,
        path: worktree.path,
        session,
        session_running,
        git_status,
    })
}

fn worktree_at(ctx: &Context, cwd: &Path) -> Result<Option<(Project, Worktree)>> {
    let Ok(project) = discovery::project_for_path(&ctx.workspace, cwd) else {
        return Ok(None);
    };
    let found = discovery::actual_worktrees(&ctx.git, &project)?
        .into_iter()
        .find(|w| cwd.starts_with(&w.path));
    if found.is_none() {
        debug!(cwd = %cwd.display(), "inside a project but not a worktree");
    }
    Ok(found.map(|w| (project, w)))
}

fn worktree_of_session(ctx: &Context, session: &str) -> Option<(Project, Worktree)> {
    match discovery::match_session_to_worktree(&ctx.git, &ctx.workspace, session) {
        Ok(found) => found,
        Err(e) => {
            debug!(session, error = %e, "session does not belong to a worktree");
            None
        }
    }
}

/// Summarize the backend, the workspace and the worktree at `cwd`.
///
/// The reported config includes the `.sesh.kdl` of the current worktree.
pub fn status(ctx: &Context, config: &ResolvedConfig, cwd: &Path) -> Result<StatusResult> {
    let current_session = ctx.current_session()?;
    let backend = BackendStatus {
        name: ctx.backend.name(),
        configured: config.session_backend().describe(),
        running: ctx.backend.is_running().unwrap_or(false),
        inside_session: ctx.backend.is_inside_session(),
        current_session: current_session.clone(),
        sessions: ctx.known_sessions().ok().flatten(),
    };

    let found = match worktree_at(ctx, cwd)? {
        Some(found) => Some(found),
        None => current_session
            .as_deref()
            .and_then(|session| worktree_of_session(ctx, session)),
    };

    let mut config = config.clone();
    let current = match found {
        Some((project, worktree)) => {
            config = config.with_project(&config::load_project_config(&worktree.path)?);
            Some(describe_worktree(ctx, project, worktree)?)
        }
        None => None,
    };

    Ok(StatusResult {
        backend,
        workspace: ctx.workspace.root().to_path_buf(),
        database: ctx.storage.path().map(Path::to_path_buf),
        project_count: discovery::discover_projects(&ctx.workspace)?.len(),
        current,
        config,
    })
}
