//! KDL schema definitions for config.kdl and per-project .sesh.kdl.

use kdl::KdlDocument;
use serde::{Deserialize, Serialize};

use crate::session::BackendKind;

/// User preferences stored in config.kdl.
///
/// # KDL Schema
///
/// ```kdl
/// workspace-dir "~/src"
/// session-backend "tmux"   // auto, tmux, zellij, screen, none, code:open, ...
/// startup-command "nvim ."
/// command-timeout 600      // seconds, 0 disables
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SeshConfig {
    /// Root of the workspace, `~` is expanded
    pub workspace_dir: Option<String>,

    /// Session backend name
    pub session_backend: Option<String>,

    /// Command typed into every newly created session
    pub startup_command: Option<String>,

    /// Timeout for git and multiplexer commands, in seconds
    pub command_timeout: Option<u64>,
}

fn first_string(doc: &KdlDocument, name: &str) -> Option<String> {
    doc.get(name)
        .and_then(|node| node.entries().first())
        .and_then(|entry| entry.value().as_string())
        .map(str::to_string)
}

impl SeshConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Validate the config values.
    pub fn validate(&self) -> Result<(), String> {
        if let Some(ref backend) = self.session_backend {
            backend
                .parse::<BackendKind>()
                .map_err(|e| format!("session-backend: {}", e))?;
        }
        if let Some(ref dir) = self.workspace_dir {
            if dir.trim().is_empty() {
                return Err("workspace-dir must not be empty".to_string());
            }
        }
        Ok(())
    }

    /// Parse config from a KDL document. Unknown nodes are ignored.
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        let mut config = Self::new();
        config.workspace_dir = first_string(doc, "workspace-dir");
        config.session_backend = first_string(doc, "session-backend");
        config.startup_command = first_string(doc, "startup-command");

        if let Some(node) = doc.get("command-timeout") {
            if let Some(entry) = node.entries().first() {
                if let Some(secs) = entry.value().as_integer() {
                    config.command_timeout = u64::try_from(secs).ok();
                }
            }
        }

        config
    }
}

/// Per-project settings from `.sesh.kdl` at the root of a worktree.
///
/// ```kdl
/// startup-command "make dev"
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ProjectConfig {
    pub startup_command: Option<String>,
}

impl ProjectConfig {
    pub fn from_kdl(doc: &KdlDocument) -> Self {
        Self {
            startup_command: first_string(doc, "startup-command"),
        }
    }
}
