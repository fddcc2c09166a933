//! CLI argument definitions for sesh.

use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::session::BackendKind;

/// Sesh - git worktrees bound to terminal sessions.
///
/// Clone with `sesh clone <url>`, then `sesh switch <branch>` from inside a
/// project to open (and create, with `-b`) the worktree and its session.
#[derive(Parser, Debug)]
#[command(name = "sesh")]
#[command(
    author,
    version = crate::cli::VERSION,
    about = "Manage git worktrees and the terminal sessions bound to them",
    long_about = None
)]
pub struct Cli {
    /// Output in human-readable format instead of JSON
    #[arg(short = 'H', long = "human", global = true)]
    pub human_readable: bool,

    /// Log debug output to stderr
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Workspace root, overriding SESH_WORKSPACE and config.kdl
    #[arg(long, global = true)]
    pub workspace: Option<PathBuf>,

    /// Session backend: auto, tmux, zellij, screen, none or <editor>:<mode>
    #[arg(long, global = true)]
    pub backend: Option<BackendKind>,

    #[command(subcommand)]
    pub command: Commands,
}

/// Version string with build metadata.
pub const VERSION: &str = concat!(
    env!("CARGO_PKG_VERSION"),
    " (",
    env!("SESH_GIT_COMMIT"),
    " ",
    env!("SESH_BUILD_TIMESTAMP"),
    ")"
);

/// Top-level commands
#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Clone a repository into the workspace as a bare repo plus a worktree
    /// for its default branch
    Clone {
        /// Remote URL (https, ssh or scp-style)
        url: String,

        /// Project name to use instead of host/org/repo from the URL
        #[arg(long)]
        name: Option<String>,
    },

    /// Switch to the session for a branch, creating worktree and session as needed
    Switch {
        /// Branch name
        branch: String,

        /// Create a new branch from the default branch
        #[arg(short = 'b', long)]
        create: bool,

        /// Project (full name or repository name); defaults to the current one
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Go back to the previous session
    Pop,

    /// Delete a worktree and its session, or a whole project with --all
    Delete {
        /// Branch whose worktree to remove
        #[arg(required_unless_present = "all")]
        branch: Option<String>,

        /// Project (full name or repository name); defaults to the current one
        #[arg(short, long)]
        project: Option<String>,

        /// Remove worktrees even with uncommitted changes
        #[arg(short, long)]
        force: bool,

        /// Leave the session running
        #[arg(long, conflicts_with = "all")]
        keep_session: bool,

        /// Delete every worktree, every session and the bare repository
        #[arg(long)]
        all: bool,
    },

    /// Session commands that leave worktrees alone
    Session {
        #[command(subcommand)]
        command: SessionCommands,
    },

    /// Fetch from origin
    Fetch {
        /// Fetch every project, continuing past failures
        #[arg(long, conflicts_with = "project")]
        all: bool,

        /// Project (full name or repository name); defaults to the current one
        #[arg(short, long)]
        project: Option<String>,
    },

    /// List worktrees and their sessions, or projects with --projects
    List {
        /// List projects instead of worktrees
        #[arg(long, conflicts_with_all = ["project", "current_project", "running", "plain"])]
        projects: bool,

        /// Only this project
        #[arg(short, long, conflicts_with = "current_project")]
        project: Option<String>,

        /// Only the project containing the working directory
        #[arg(long)]
        current_project: bool,

        /// Only worktrees whose session is running
        #[arg(long)]
        running: bool,

        /// Print session names only, one per line
        #[arg(long)]
        plain: bool,
    },

    /// Show a session's project, branch, git status, last commit and last use
    Info {
        /// Session name, or a branch name with --project
        target: String,

        /// Treat TARGET as a branch of this project
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Stream branch names: local first, then those only on origin
    Branches {
        /// Project (full name or repository name); defaults to the current one
        #[arg(short, long)]
        project: Option<String>,
    },

    /// Remove worktrees that are no longer needed
    Clean {
        /// Remove worktrees that have no session
        #[arg(long, required_unless_present = "remote_deleted", conflicts_with = "remote_deleted")]
        orphaned: bool,

        /// Remove worktrees whose branch was deleted on origin (fetch first)
        #[arg(long)]
        remote_deleted: bool,

        /// Project (full name or repository name); defaults to the current one
        #[arg(short, long)]
        project: Option<String>,

        /// Show what would be removed
        #[arg(long)]
        dry_run: bool,
    },

    /// Show the backend, workspace, current worktree and configuration
    Status,
}

/// Session subcommands
#[derive(Subcommand, Debug)]
pub enum SessionCommands {
    /// Kill a session without touching its worktree
    Kill {
        /// Session name
        name: String,
    },
}

#[cfg(test)]
mod tests {
    use super::*;
    use clap::CommandFactory;

    #[test]
    fn verify_cli() {
        // This will panic if the CLI is misconfigured
        Cli::command().debug_assert();
    }

    #[test]
    fn test_parse_switch() {
        let cli = Cli::try_parse_from(["sesh", "switch", "-b", "feature/x", "-p", "repo", "-H"])
            .unwrap();
        assert!(cli.human_readable);
        match cli.command {
            Commands::Switch {
                branch,
                create,
                project,
            } => {
                assert_eq!(branch, "feature/x");
                assert!(create);
                assert_eq!(project.as_deref(), Some("repo"));
            }
            other => panic!("unexpected command: {:?}", other),
        }
    }

    #[test]
    fn test_parse_backend_flag() {
        let cli = Cli::try_parse_from(["sesh", "--backend", "code:workspace", "status"]).unwrap();
        assert_eq!(cli.backend.unwrap().to_string(), "code:workspace");
        assert!(Cli::try_parse_from(["sesh", "--backend", "emacs", "status"]).is_err());
    }

    #[test]
    fn test_delete_requires_branch_or_all() {
        assert!(Cli::try_parse_from(["sesh", "delete"]).is_err());
        assert!(Cli::try_parse_from(["sesh", "delete", "--all"]).is_ok());
        assert!(Cli::try_parse_from(["sesh", "delete", "--all", "--keep-session"]).is_err());
    }

    #[test]
    fn test_list_filters() {
        let cli = Cli::try_parse_from(["sesh", "list", "--running", "--current-project", "--plain"])
            .unwrap();
        match cli.command {
            Commands::List {
                running,
                current_project,
                plain,
                ..
            } => assert!(running && current_project && plain),
            other => panic!("unexpected command: {:?}", other),
        }
        assert!(Cli::try_parse_from(["sesh", "list", "--projects", "--plain"]).is_err());
        assert!(Cli::try_parse_from(["sesh", "list", "-p", "r", "--current-project"]).is_err());
    }

    #[test]
    fn test_clean_requires_a_mode() {
        assert!(Cli::try_parse_from(["sesh", "clean"]).is_err());
        assert!(Cli::try_parse_from(["sesh", "clean", "--orphaned", "--dry-run"]).is_ok());
        assert!(Cli::try_parse_from(["sesh", "clean", "--remote-deleted"]).is_ok());
    }
}
