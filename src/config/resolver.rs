//! Precedence resolution for configuration.
//!
//! ## Precedence (highest to lowest)
//!
//! 1. CLI flags (passed at runtime)
//! 2. Environment (`SESH_WORKSPACE`, `SESH_SESSION_BACKEND`)
//! 3. `<config-dir>/config.kdl`
//! 4. Built-in defaults
//!
//! The startup command additionally honours a project's `.sesh.kdl`, which
//! wins over the global file.

use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Serialize, Serializer};

use crate::config::{ProjectConfig, SeshConfig};
use crate::session::BackendKind;
use crate::workspace::expand_home;
use crate::{Error, Result};

/// Environment variable overriding the workspace root.
pub const WORKSPACE_ENV: &str = "SESH_WORKSPACE";

/// Environment variable overriding the session backend.
pub const SESSION_BACKEND_ENV: &str = "SESH_SESSION_BACKEND";

/// Workspace root used when nothing else is configured.
pub const DEFAULT_WORKSPACE_DIR: &str = "~/.sesh";

/// Default command timeout in seconds.
pub const DEFAULT_COMMAND_TIMEOUT_SECS: u64 = 600;

/// Tracks where a resolved value came from.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ValueSource {
    /// Value from environment variable
    EnvVar(String),
    /// Value from CLI flag
    CliFlag,
    /// Value from the global config.kdl
    ConfigFile,
    /// Value from a project's .sesh.kdl
    Project,
    /// Built-in default value
    Default,
}

impl std::fmt::Display for ValueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            ValueSource::EnvVar(name) => write!(f, "env:{}", name),
            ValueSource::CliFlag => write!(f, "cli"),
            ValueSource::ConfigFile => write!(f, "config"),
            ValueSource::Project => write!(f, "project"),
            ValueSource::Default => write!(f, "default"),
        }
    }
}

impl Serialize for ValueSource {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        serializer.collect_str(self)
    }
}

/// A resolved value with its source.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Resolved<T> {
    pub value: T,
    pub source: ValueSource,
}

impl<T> Resolved<T> {
    pub fn new(value: T, source: ValueSource) -> Self {
        Self { value, source }
    }
}

/// Fully resolved configuration with source tracking.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct ResolvedConfig {
    pub workspace_dir: Resolved<PathBuf>,
    pub session_backend: Resolved<BackendKind>,
    pub startup_command: Option<Resolved<String>>,
    /// Seconds; 0 disables the timeout
    pub command_timeout: Resolved<u64>,
}

impl ResolvedConfig {
    pub fn workspace_dir(&self) -> &Path {
        &self.workspace_dir.value
    }

    pub fn session_backend(&self) -> BackendKind {
        self.session_backend.value
    }

    pub fn startup_command(&self) -> Option<&str> {
        self.startup_command.as_ref().map(|r| r.value.as_str())
    }

    pub fn command_timeout(&self) -> Option<Duration> {
        match self.command_timeout.value {
            0 => None,
            secs => Some(Duration::from_secs(secs)),
        }
    }

    /// Apply a project's `.sesh.kdl` on top of the resolved values.
    pub fn with_project(mut self, project: &ProjectConfig) -> Self {
        if let Some(ref command) = project.startup_command {
            self.startup_command = Some(Resolved::new(command.clone(), ValueSource::Project));
        }
        self
    }
}

/// CLI overrides for configuration resolution.
#[derive(Debug, Clone, Default)]
pub struct ConfigOverrides {
    pub workspace_dir: Option<PathBuf>,
    pub session_backend: Option<BackendKind>,
}

impl ConfigOverrides {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_workspace_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.workspace_dir = Some(dir.into());
        self
    }

    pub fn with_session_backend(mut self, backend: BackendKind) -> Self {
        self.session_backend = Some(backend);
        self
    }
}

/// Resolve configuration from its layers.
///
/// `env` looks up an environment variable; empty values count as unset.
pub fn resolve<F>(file: &SeshConfig, overrides: &ConfigOverrides, env: F) -> Result<ResolvedConfig>
where
    F: Fn(&str) -> Option<String>,
{
    let env = |name: &str| env(name).filter(|v| !v.trim().is_empty());

    let workspace_dir = if let Some(ref dir) = overrides.workspace_dir {
        Resolved::new(dir.clone(), ValueSource::CliFlag)
    } else if let Some(dir) = env(WORKSPACE_ENV) {
        Resolved::new(
            expand_home(&dir)?,
            ValueSource::EnvVar(WORKSPACE_ENV.to_string()),
        )
    } else if let Some(ref dir) = file.workspace_dir {
        Resolved::new(expand_home(dir)?, ValueSource::ConfigFile)
    } else {
        Resolved::new(expand_home(DEFAULT_WORKSPACE_DIR)?, ValueSource::Default)
    };

    let session_backend = if let Some(kind) = overrides.session_backend {
        Resolved::new(kind, ValueSource::CliFlag)
    } else if let Some(name) = env(SESSION_BACKEND_ENV) {
        let kind = name
            .parse()
            .map_err(|e| Error::Config(format!("{}: {}", SESSION_BACKEND_ENV, e)))?;
        Resolved::new(kind, ValueSource::EnvVar(SESSION_BACKEND_ENV.to_string()))
    } else if let Some(ref name) = file.session_backend {
        let kind = name
            .parse()
            .map_err(|e| Error::Config(format!("session-backend: {}", e)))?;
        Resolved::new(kind, ValueSource::ConfigFile)
    } else {
        Resolved::new(BackendKind::Auto, ValueSource::Default)
    };

    let startup_command = file
        .startup_command
        .as_ref()
        .filter(|c| !c.trim().is_empty())
        .map(|c| Resolved::new(c.clone(), ValueSource::ConfigFile));

    let command_timeout = match file.command_timeout {
        Some(secs) => Resolved::new(secs, ValueSource::ConfigFile),
        None => Resolved::new(DEFAULT_COMMAND_TIMEOUT_SECS, ValueSource::Default),
    };

    Ok(ResolvedConfig {
        workspace_dir,
        session_backend,
        startup_command,
        command_timeout,
    })
}

/// Resolve against the config file in `config_dir` and the process
/// environment.
pub fn resolve_config(config_dir: &Path, overrides: &ConfigOverrides) -> Result<ResolvedConfig> {
    let file = super::load_config(config_dir)?;
    resolve(&file, overrides, |name| std::env::var(name).ok())
}
