//! Command implementations for the sesh CLI.
//!
//! Commands combine discovery, the git adapter, the session backend and the
//! metadata store. They are organized by what they act on:
//! - `project` - clone, fetch, list and delete whole projects
//! - `session` - switch, pop and kill sessions
//! - `worktree` - list, delete and clean worktrees, stream branches
//! - `status` - summary of the current environment
//! - `info` - details of one session
//!
//! Every command returns a value implementing [`Output`]. Commands that end
//! by attaching to a session return an [`Activation`] instead of attaching
//! themselves: attaching may replace the process, so all bookkeeping is
//! finished before [`Activation::enter`] runs.

mod info;
mod project;
mod session;
mod status;
mod worktree;

use std::path::{Path, PathBuf};
use std::sync::Arc;

use serde::Serialize;
use tracing::{debug, warn};

use crate::config::ResolvedConfig;
use crate::discovery::{self, Project};
use crate::git::Git;
use crate::process::{self, SystemRunner};
use crate::session::{Attach, SessionBackend, SessionEnv, create_backend};
use crate::storage::Storage;
use crate::workspace::Workspace;
use crate::{ErrorKind, Result};

pub use info::{InfoResult, branch_info, session_info};
pub use project::{
    CloneOptions, CloneResult, DeleteProjectResult, FetchAllResult, FetchResult, ProjectEntry,
    ProjectListResult, clone, delete_project, fetch, fetch_all, list_projects,
};
pub use session::{KillSessionResult, SwitchOptions, kill_session, pop, switch};
pub use status::{StatusResult, status};
pub use worktree::{
    BranchesResult, CleanMode, CleanOptions, CleanResult, CleanedWorktree, DeleteWorktreeResult,
    ListOptions, ListResult, WorktreeEntry, branches, clean, collect_branches, delete_worktree,
    list,
};

/// Command results that can be serialized to JSON or formatted for humans.
pub trait Output {
    /// Serialize to JSON string.
    fn to_json(&self) -> String;

    /// Format for human-readable output.
    fn to_human(&self) -> String;
}

fn json<T: Serialize>(value: &T) -> String {
    serde_json::to_string(value).unwrap_or_else(|e| format!(r#"{{"error": "{}"}}"#, e))
}

/// Everything a command needs for one invocation.
pub struct Context {
    pub workspace: Workspace,
    pub git: Git,
    pub backend: Box<dyn SessionBackend>,
    pub storage: Storage,
    /// Global startup command; a project's `.sesh.kdl` may replace it
    pub startup_command: Option<String>,
}

impl Context {
    pub fn new(
        workspace: Workspace,
        git: Git,
        backend: Box<dyn SessionBackend>,
        storage: Storage,
    ) -> Self {
        Self {
            workspace,
            git,
            backend,
            storage,
            startup_command: None,
        }
    }

    pub fn with_startup_command(mut self, command: Option<String>) -> Self {
        self.startup_command = command;
        self
    }

    /// Build the production context from resolved configuration.
    pub fn from_config(config: &ResolvedConfig, config_dir: &Path) -> Result<Self> {
        let timeout = config.command_timeout();
        let runner = Arc::new(SystemRunner::new(timeout));
        let backend = create_backend(config.session_backend(), runner, SessionEnv::from_process());
        let storage = Storage::open_in(config_dir)?;
        Ok(Self::new(
            Workspace::new(config.workspace_dir()),
            Git::new(timeout),
            backend,
            storage,
        )
        .with_startup_command(config.startup_command().map(str::to_string)))
    }

    /// Project named on the command line, or the one containing `cwd`.
    pub fn target_project(&self, name: Option<&str>, cwd: &Path) -> Result<Project> {
        match name {
            Some(name) => discovery::resolve_project(&self.workspace, name),
            None => discovery::project_for_path(&self.workspace, cwd),
        }
    }

    /// Sessions known to the backend, or `None` when it cannot list them.
    pub(crate) fn known_sessions(&self) -> Result<Option<Vec<String>>> {
        match self.backend.list() {
            Ok(sessions) => Ok(Some(sessions)),
            Err(e) if e.kind() == ErrorKind::UnsupportedOperation => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Whether a session exists; backends that cannot tell report `false`.
    pub(crate) fn session_exists(&self, name: &str) -> Result<bool> {
        match self.backend.exists(name) {
            Ok(exists) => Ok(exists),
            Err(e) if e.kind() == ErrorKind::UnsupportedOperation => Ok(false),
            Err(e) => Err(e),
        }
    }

    /// Current session name; backends that cannot tell report `None`.
    pub(crate) fn current_session(&self) -> Result<Option<String>> {
        match self.backend.current_session_name() {
            Ok(name) => Ok(name),
            Err(e) if e.kind() == ErrorKind::UnsupportedOperation => Ok(None),
            Err(e) => Err(e),
        }
    }

    /// Type the startup command into a freshly created session.
    pub(crate) fn run_startup_command(&self, session: &str, worktree: &Path) {
        let project_command = match crate::config::load_project_config(worktree) {
            Ok(config) => config.startup_command,
            Err(e) => {
                warn!(error = %e, "ignoring unreadable project config");
                None
            }
        };
        let Some(command) = project_command.or_else(|| self.startup_command.clone()) else {
            return;
        };
        match self.backend.run_in_session(session, &command) {
            Ok(()) => debug!(session, command = %command, "startup command sent"),
            Err(e) if e.kind() == ErrorKind::UnsupportedOperation => {
                debug!(backend = %self.backend.name(), "backend cannot run startup commands");
            }
            Err(e) => warn!(session, command = %command, error = %e, "startup command not sent"),
        }
    }
}

/// Per-item failure of a bulk operation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ItemFailure {
    pub name: String,
    pub error: String,
}

impl ItemFailure {
    pub fn new(name: impl Into<String>, error: impl ToString) -> Self {
        Self {
            name: name.into(),
            error: error.to_string(),
        }
    }
}

/// A session ready to be entered.
#[derive(Debug, Clone, Serialize)]
pub struct Activation {
    pub session: String,
    pub project: String,
    pub branch: String,
    pub path: PathBuf,
    pub created_worktree: bool,
    pub created_session: bool,
    #[serde(skip)]
    pub attach: Attach,
}

impl Activation {
    /// Whether entering replaces the current process.
    pub fn replaces_process(&self) -> bool {
        matches!(self.attach, Attach::Exec(_))
    }

    /// Finish attaching. With a process replacement this only returns on
    /// failure.
    pub fn enter(self) -> Result<()> {
        match self.attach {
            Attach::Switched | Attach::Opened => Ok(()),
            Attach::Exec(spec) => Err(process::exec(&spec)),
        }
    }
}

impl Output for Activation {
    fn to_json(&self) -> String {
        json(self)
    }

    fn to_human(&self) -> String {
        let mut lines = Vec::new();
        if self.created_worktree {
            lines.push(format!(
                "Created worktree for '{}' at {}",
                self.branch,
                self.path.display()
            ));
        }
        if self.created_session {
            lines.push(format!("Created session {}", self.session));
        }
        lines.push(format!("Switched to {} ({})", self.session, self.path.display()));
        lines.join("\n")
    }
}
