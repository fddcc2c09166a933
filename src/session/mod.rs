//! Session backends.
//!
//! A session is the terminal (or editor window) bound to one worktree. The
//! [`SessionBackend`] trait gives every tool the same contract:
//!
//! - `create` on a name that exists fails with `AlreadyExists`
//! - `attach`, `switch` and `delete` on an absent name fail with `NotFound`
//! - an operation a tool cannot perform fails with `Unsupported`
//! - failed operations leave backend state untouched
//!
//! Backends never read the process environment themselves: the facts they
//! need are captured once in [`SessionEnv`] and passed in.

pub mod command;
pub mod editor;
pub mod none;
pub mod screen;
pub mod tmux;
pub mod zellij;

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use serde::Serialize;
use tracing::debug;

use crate::process::{CommandRunner, CommandSpec};
use crate::{Error, Result};

pub use editor::{Editor, EditorBackend, EditorMode};
pub use none::NoneBackend;
pub use screen::ScreenBackend;
pub use tmux::TmuxBackend;
pub use zellij::ZellijBackend;

/// Multiplexers probed by auto-detection, in preference order.
pub const DETECTION_ORDER: &[&str] = &["tmux", "zellij", "screen"];

/// What the caller must do to finish an attach.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Attach {
    /// The current client was moved to the session
    Switched,
    /// Nothing left to do (the session is already visible)
    Opened,
    /// Replace the current process with this command
    Exec(CommandSpec),
}

/// Uniform interface over session tooling.
pub trait SessionBackend {
    /// Backend identifier, e.g. `tmux` or `code:open`.
    fn name(&self) -> String;

    /// Create a session rooted at `path`.
    fn create(&self, name: &str, path: &Path) -> Result<()>;

    /// Prepare to attach to a session.
    fn attach(&self, name: &str) -> Result<Attach>;

    /// Switch the current client to another session.
    fn switch(&self, name: &str) -> Result<()>;

    /// Names of all sessions.
    fn list(&self) -> Result<Vec<String>>;

    fn delete(&self, name: &str) -> Result<()>;

    fn exists(&self, name: &str) -> Result<bool>;

    /// Whether the tool is installed and able to host sessions.
    fn is_running(&self) -> Result<bool>;

    /// Whether this process runs inside a session of this backend.
    fn is_inside_session(&self) -> bool;

    /// Name of the session this process runs in, if any.
    fn current_session_name(&self) -> Result<Option<String>>;

    /// Type a command into a session's shell.
    fn run_in_session(&self, _name: &str, _command: &str) -> Result<()> {
        Err(Error::Unsupported(format!(
            "running commands in sessions is not supported by the {} backend",
            self.name()
        )))
    }
}

/// Session-related environment of the current process.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct SessionEnv {
    /// `$TMUX`
    pub tmux: Option<String>,
    /// `$STY`
    pub sty: Option<String>,
    /// `$ZELLIJ`
    pub zellij: Option<String>,
    /// `$ZELLIJ_SESSION_NAME`
    pub zellij_session_name: Option<String>,
}

impl SessionEnv {
    /// Capture the variables from the running process.
    pub fn from_process() -> Self {
        let var = |k: &str| std::env::var(k).ok().filter(|v| !v.is_empty());
        Self {
            tmux: var("TMUX"),
            sty: var("STY"),
            zellij: var("ZELLIJ"),
            zellij_session_name: var("ZELLIJ_SESSION_NAME"),
        }
    }

    pub fn inside_tmux(&self) -> bool {
        self.tmux.is_some()
    }

    pub fn inside_screen(&self) -> bool {
        self.sty.is_some()
    }

    pub fn inside_zellij(&self) -> bool {
        self.zellij.is_some()
    }

    pub fn inside_any(&self) -> bool {
        self.inside_tmux() || self.inside_screen() || self.inside_zellij()
    }
}

/// Configured session backend.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(into = "String")]
pub enum BackendKind {
    #[default]
    Auto,
    Tmux,
    Zellij,
    Screen,
    None,
    Editor(Editor, EditorMode),
}

impl BackendKind {
    /// Human-readable description.
    pub fn describe(&self) -> String {
        match self {
            BackendKind::Auto => "Auto-detect".to_string(),
            BackendKind::Tmux => "Tmux".to_string(),
            BackendKind::Zellij => "Zellij".to_string(),
            BackendKind::Screen => "GNU Screen".to_string(),
            BackendKind::None => "None (no session manager)".to_string(),
            BackendKind::Editor(editor, mode) => {
                format!("{} ({})", editor.display_name(), mode.describe())
            }
        }
    }
}

impl FromStr for BackendKind {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        let s = s.trim();
        let kind = match s.to_lowercase().as_str() {
            "" | "auto" => BackendKind::Auto,
            "tmux" => BackendKind::Tmux,
            "zellij" => BackendKind::Zellij,
            "screen" => BackendKind::Screen,
            "none" => BackendKind::None,
            other => {
                let (editor, mode) = other.split_once(':').ok_or_else(|| {
                    Error::InvalidInput(format!("unknown session backend: {}", s))
                })?;
                let editor: Editor = editor.parse()?;
                let mode: EditorMode = mode.parse()?;
                if !editor.supports(mode) {
                    return Err(Error::InvalidInput(format!(
                        "{} does not support mode '{}'",
                        editor, mode
                    )));
                }
                BackendKind::Editor(editor, mode)
            }
        };
        Ok(kind)
    }
}

impl fmt::Display for BackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendKind::Auto => write!(f, "auto"),
            BackendKind::Tmux => write!(f, "tmux"),
            BackendKind::Zellij => write!(f, "zellij"),
            BackendKind::Screen => write!(f, "screen"),
            BackendKind::None => write!(f, "none"),
            BackendKind::Editor(editor, mode) => write!(f, "{}:{}", editor, mode),
        }
    }
}

impl From<BackendKind> for String {
    fn from(kind: BackendKind) -> Self {
        kind.to_string()
    }
}

/// Pick a multiplexer from the executables that are available.
///
/// Preference is tmux, then zellij, then screen; with none of them the
/// `none` backend is chosen.
pub fn detect_backend(available: &[&str]) -> BackendKind {
    for candidate in DETECTION_ORDER {
        if available.contains(candidate) {
            return match *candidate {
                "tmux" => BackendKind::Tmux,
                "zellij" => BackendKind::Zellij,
                _ => BackendKind::Screen,
            };
        }
    }
    BackendKind::None
}

/// Probe `PATH` through `runner` and feed the result to [`detect_backend`].
pub fn detect_with(runner: &dyn CommandRunner) -> BackendKind {
    let available: Vec<&str> = DETECTION_ORDER
        .iter()
        .copied()
        .filter(|p| runner.is_available(p))
        .collect();
    let kind = detect_backend(&available);
    debug!(?available, backend = %kind, "detected session backend");
    kind
}

/// Construct the backend for `kind`, resolving `auto` by detection.
pub fn create_backend(
    kind: BackendKind,
    runner: Arc<dyn CommandRunner>,
    env: SessionEnv,
) -> Box<dyn SessionBackend> {
    let kind = match kind {
        BackendKind::Auto => detect_with(runner.as_ref()),
        other => other,
    };
    match kind {
        BackendKind::Tmux => Box::new(TmuxBackend::new(runner, env)),
        BackendKind::Zellij => Box::new(ZellijBackend::new(runner, env)),
        BackendKind::Screen => Box::new(ScreenBackend::new(runner, env)),
        BackendKind::Editor(editor, mode) => Box::new(EditorBackend::new(runner, editor, mode)),
        BackendKind::None | BackendKind::Auto => Box::new(NoneBackend),
    }
}
