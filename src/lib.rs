//! Sesh - git worktree and terminal session management.
//!
//! This library provides the core functionality for the `sesh` CLI tool:
//! deterministic naming of projects, worktrees and sessions, a thin adapter
//! over the `git` binary, filesystem discovery of the workspace, and a
//! pluggable session backend (tmux, zellij, screen, GUI editors or none).

pub mod cli;
pub mod commands;
pub mod config;
pub mod discovery;
pub mod git;
pub mod logging;
pub mod process;
pub mod session;
pub mod storage;
pub mod workspace;

use std::fmt;
use std::time::Duration;

/// The git operation that failed, used to classify [`Error::Git`].
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GitOp {
    Clone,
    CreateWorktree,
    RemoveWorktree,
    PruneWorktrees,
    ListWorktrees,
    BranchLookup,
    Fetch,
    Query,
}

impl fmt::Display for GitOp {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            GitOp::Clone => "clone failed",
            GitOp::CreateWorktree => "worktree creation failed",
            GitOp::RemoveWorktree => "worktree removal failed",
            GitOp::PruneWorktrees => "worktree prune failed",
            GitOp::ListWorktrees => "worktree listing failed",
            GitOp::BranchLookup => "branch lookup failed",
            GitOp::Fetch => "fetch failed",
            GitOp::Query => "git query failed",
        };
        f.write_str(s)
    }
}

/// Coarse classification of [`Error`], stable across message changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    InvalidInput,
    NotFound,
    AlreadyExists,
    UnsupportedOperation,
    BackendUnavailable,
    ExternalCommandFailure,
    StorageFailure,
    Io,
    Config,
    Other,
}

/// Library-level error type for sesh operations.
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Database error: {0}")]
    Storage(#[from] rusqlite::Error),

    #[error("Invalid input: {0}")]
    InvalidInput(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Already exists: {0}")]
    AlreadyExists(String),

    #[error("Unsupported operation: {0}")]
    Unsupported(String),

    #[error("No session backend available: {0}")]
    BackendUnavailable(String),

    #[error("git {op}: {detail}")]
    Git { op: GitOp, detail: String },

    #[error("{program} failed: {detail}")]
    Command { program: String, detail: String },

    #[error("{program} timed out after {}s", after.as_secs())]
    Timeout { program: String, after: Duration },

    #[error("Configuration error: {0}")]
    Config(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn kind(&self) -> ErrorKind {
        match self {
            Error::InvalidInput(_) => ErrorKind::InvalidInput,
            Error::NotFound(_) => ErrorKind::NotFound,
            Error::AlreadyExists(_) => ErrorKind::AlreadyExists,
            Error::Unsupported(_) => ErrorKind::UnsupportedOperation,
            Error::BackendUnavailable(_) => ErrorKind::BackendUnavailable,
            Error::Git { .. } | Error::Command { .. } | Error::Timeout { .. } => {
                ErrorKind::ExternalCommandFailure
            }
            Error::Storage(_) => ErrorKind::StorageFailure,
            Error::Io(_) => ErrorKind::Io,
            Error::Config(_) => ErrorKind::Config,
            Error::Json(_) | Error::Other(_) => ErrorKind::Other,
        }
    }

    /// Returns the git operation for [`Error::Git`].
    pub fn git_op(&self) -> Option<GitOp> {
        match self {
            Error::Git { op, .. } => Some(*op),
            _ => None,
        }
    }

    pub(crate) fn git(op: GitOp, detail: impl Into<String>) -> Self {
        Error::Git {
            op,
            detail: detail.into(),
        }
    }
}

/// Result type alias for sesh operations.
pub type Result<T> = std::result::Result<T, Error>;
