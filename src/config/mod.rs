//! Configuration for sesh.
//!
//! ## config.kdl - User preferences
//!
//! Located in the config directory: `$SESH_CONFIG_DIR`, or
//! `~/.config/sesh/` on Linux (the platform config dir otherwise). The same
//! directory holds the metadata database and the log files.
//!
//! Contains:
//! - `workspace-dir` - Root of the workspace
//! - `session-backend` - `auto`, `tmux`, `zellij`, `screen`, `none` or `<editor>:<mode>`
//! - `startup-command` - Command typed into every new session
//! - `command-timeout` - Seconds before git/multiplexer commands are killed
//!
//! ## .sesh.kdl - Per-project settings
//!
//! Read from the root of the worktree being opened; only `startup-command`
//! is recognised.
//!
//! Use the [`resolver`] module for precedence resolution.

pub mod resolver;
pub mod schema;

use std::fs;
use std::path::{Path, PathBuf};

use kdl::KdlDocument;
use tracing::debug;

use crate::{Error, Result};

pub use resolver::{
    ConfigOverrides, Resolved, ResolvedConfig, ValueSource, resolve, resolve_config,
};
pub use schema::{ProjectConfig, SeshConfig};

/// Environment variable overriding the config directory.
pub const CONFIG_DIR_ENV: &str = "SESH_CONFIG_DIR";

pub const CONFIG_FILE: &str = "config.kdl";

pub const PROJECT_CONFIG_FILE: &str = ".sesh.kdl";

/// The directory holding config.kdl, the database and logs.
pub fn config_dir() -> Result<PathBuf> {
    if let Some(dir) = std::env::var_os(CONFIG_DIR_ENV).filter(|d| !d.is_empty()) {
        return Ok(PathBuf::from(dir));
    }
    dirs::config_dir()
        .map(|d| d.join("sesh"))
        .ok_or_else(|| Error::Config("could not determine config directory".to_string()))
}

fn read_kdl(path: &Path) -> Result<Option<KdlDocument>> {
    if !path.exists() {
        return Ok(None);
    }
    let text = fs::read_to_string(path)?;
    let doc = text
        .parse::<KdlDocument>()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(Some(doc))
}

/// Load `config.kdl` from `dir`. A missing file yields the defaults.
pub fn load_config(dir: &Path) -> Result<SeshConfig> {
    let path = dir.join(CONFIG_FILE);
    let Some(doc) = read_kdl(&path)? else {
        debug!(path = %path.display(), "no config file");
        return Ok(SeshConfig::default());
    };
    let config = SeshConfig::from_kdl(&doc);
    config
        .validate()
        .map_err(|e| Error::Config(format!("{}: {}", path.display(), e)))?;
    Ok(config)
}

/// Load `.sesh.kdl` from a worktree. A missing file yields the defaults.
pub fn load_project_config(worktree: &Path) -> Result<ProjectConfig> {
    Ok(read_kdl(&worktree.join(PROJECT_CONFIG_FILE))?
        .map(|doc| ProjectConfig::from_kdl(&doc))
        .unwrap_or_default())
}
