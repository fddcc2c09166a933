//! GUI editor backend.
//!
//! Editors have no notion of a named session: `create` opens the worktree in
//! a window and everything that needs a session registry is unsupported.

use std::fmt;
use std::path::Path;
use std::str::FromStr;
use std::sync::Arc;

use tracing::info;

use super::{Attach, SessionBackend};
use crate::process::{CommandRunner, CommandSpec};
use crate::{Error, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Editor {
    Code,
    Cursor,
    Zed,
}

impl Editor {
    /// Executable name on `PATH`.
    pub fn command(&self) -> &'static str {
        match self {
            Editor::Code => "code",
            Editor::Cursor => "cursor",
            Editor::Zed => "zed",
        }
    }

    pub fn display_name(&self) -> &'static str {
        match self {
            Editor::Code => "VS Code",
            Editor::Cursor => "Cursor",
            Editor::Zed => "Zed",
        }
    }

    pub fn supports(&self, mode: EditorMode) -> bool {
        match self {
            Editor::Code | Editor::Cursor => matches!(
                mode,
                EditorMode::Open | EditorMode::Workspace | EditorMode::Replace
            ),
            Editor::Zed => matches!(mode, EditorMode::Open | EditorMode::Reuse),
        }
    }

    /// Arguments that open `path` in `mode`.
    fn open_args(&self, mode: EditorMode, path: &Path) -> Vec<String> {
        let path = path.to_string_lossy().into_owned();
        match (self, mode) {
            (Editor::Zed, EditorMode::Open) => vec!["-n".to_string(), path],
            (_, EditorMode::Workspace) => vec!["--add".to_string(), path],
            (_, EditorMode::Replace) | (_, EditorMode::Reuse) => vec!["-r".to_string(), path],
            (_, EditorMode::Open) => vec![path],
        }
    }
}

impl FromStr for Editor {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "code" => Ok(Editor::Code),
            "cursor" => Ok(Editor::Cursor),
            "zed" => Ok(Editor::Zed),
            other => Err(Error::InvalidInput(format!("unknown editor: {}", other))),
        }
    }
}

impl fmt::Display for Editor {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.command())
    }
}

/// How the editor places the worktree.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EditorMode {
    /// New window
    Open,
    /// Add a folder to the current window
    Workspace,
    /// Replace the folder in the current window
    Replace,
    /// Reuse the current window (zed)
    Reuse,
}

impl EditorMode {
    pub fn describe(&self) -> &'static str {
        match self {
            EditorMode::Open => "new window",
            EditorMode::Workspace => "add to workspace",
            EditorMode::Replace => "replace window",
            EditorMode::Reuse => "reuse window",
        }
    }
}

impl FromStr for EditorMode {
    type Err = Error;

    fn from_str(s: &str) -> Result<Self> {
        match s.trim().to_lowercase().as_str() {
            "open" => Ok(EditorMode::Open),
            "workspace" => Ok(EditorMode::Workspace),
            "replace" => Ok(EditorMode::Replace),
            "reuse" => Ok(EditorMode::Reuse),
            other => Err(Error::InvalidInput(format!("unknown editor mode: {}", other))),
        }
    }
}

impl fmt::Display for EditorMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            EditorMode::Open => "open",
            EditorMode::Workspace => "workspace",
            EditorMode::Replace => "replace",
            EditorMode::Reuse => "reuse",
        };
        f.write_str(s)
    }
}

pub struct EditorBackend {
    runner: Arc<dyn CommandRunner>,
    editor: Editor,
    mode: EditorMode,
}

impl EditorBackend {
    pub fn new(runner: Arc<dyn CommandRunner>, editor: Editor, mode: EditorMode) -> Self {
        Self {
            runner,
            editor,
            mode,
        }
    }

    /// The command `create` runs for `path`.
    pub fn open_command(&self, path: &Path) -> CommandSpec {
        CommandSpec::new(self.editor.command()).args(self.editor.open_args(self.mode, path))
    }

    fn unsupported(&self, what: &str) -> Error {
        Error::Unsupported(format!("{} is not supported with the {} backend", what, self.name()))
    }
}

impl SessionBackend for EditorBackend {
    fn name(&self) -> String {
        format!("{}:{}", self.editor, self.mode)
    }

    fn create(&self, name: &str, path: &Path) -> Result<()> {
        info!(
            session = name,
            path = %path.display(),
            editor = %self.editor,
            "opening worktree in editor"
        );
        self.runner
            .run(&self.open_command(path))?
            .into_result(self.editor.command())?;
        Ok(())
    }

    /// The window was opened by `create`.
    fn attach(&self, _name: &str) -> Result<Attach> {
        Ok(Attach::Opened)
    }

    fn switch(&self, _name: &str) -> Result<()> {
        Err(self.unsupported("switching sessions"))
    }

    fn list(&self) -> Result<Vec<String>> {
        Err(self.unsupported("listing sessions"))
    }

    fn delete(&self, _name: &str) -> Result<()> {
        Err(self.unsupported("deleting sessions"))
    }

    fn exists(&self, _name: &str) -> Result<bool> {
        Ok(false)
    }

    fn is_running(&self) -> Result<bool> {
        Ok(self.runner.is_available(self.editor.command()))
    }

    fn is_inside_session(&self) -> bool {
        false
    }

    fn current_session_name(&self) -> Result<Option<String>> {
        Err(self.unsupported("getting the current session"))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use crate::session::testing::ScriptedRunner;

    fn backend(editor: Editor, mode: EditorMode) -> (EditorBackend, Arc<ScriptedRunner>) {
        let runner = Arc::new(ScriptedRunner::new().with_available(&["cursor"]));
        (EditorBackend::new(runner.clone(), editor, mode), runner)
    }

    #[test]
    fn test_open_args_per_mode() {
        let p = Path::new("/w/repo/main");
        let cases = [
            (Editor::Code, EditorMode::Open, "code /w/repo/main"),
            (Editor::Code, EditorMode::Workspace, "code --add /w/repo/main"),
            (Editor::Cursor, EditorMode::Replace, "cursor -r /w/repo/main"),
            (Editor::Zed, EditorMode::Open, "zed -n /w/repo/main"),
            (Editor::Zed, EditorMode::Reuse, "zed -r /w/repo/main"),
        ];
        for (editor, mode, expected) in cases {
            let (b, _) = backend(editor, mode);
            assert_eq!(b.open_command(p).build(), expected);
        }
    }

    #[test]
    fn test_create_opens_path_and_attach_is_noop() {
        let (b, runner) = backend(Editor::Cursor, EditorMode::Workspace);
        b.create("repo-main", Path::new("/w/repo/main")).unwrap();
        assert_eq!(runner.rendered_calls(), vec!["cursor --add /w/repo/main"]);
        assert_eq!(b.attach("repo-main").unwrap(), Attach::Opened);
        assert_eq!(runner.rendered_calls().len(), 1);
    }

    #[test]
    fn test_registry_operations_unsupported() {
        let (b, _) = backend(Editor::Code, EditorMode::Open);
        assert_eq!(b.list().unwrap_err().kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(b.switch("a-b").unwrap_err().kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(b.delete("a-b").unwrap_err().kind(), ErrorKind::UnsupportedOperation);
        assert_eq!(
            b.current_session_name().unwrap_err().kind(),
            ErrorKind::UnsupportedOperation
        );
        assert!(!b.exists("a-b").unwrap());
        assert!(!b.is_inside_session());
    }

    #[test]
    fn test_is_running_checks_editor_binary() {
        let (cursor, _) = backend(Editor::Cursor, EditorMode::Open);
        assert!(cursor.is_running().unwrap());
        let (code, _) = backend(Editor::Code, EditorMode::Open);
        assert!(!code.is_running().unwrap());
    }

    #[test]
    fn test_name_and_support_matrix() {
        let (b, _) = backend(Editor::Zed, EditorMode::Reuse);
        assert_eq!(b.name(), "zed:reuse");
        assert!(Editor::Code.supports(EditorMode::Replace));
        assert!(!Editor::Code.supports(EditorMode::Reuse));
        assert!(!Editor::Zed.supports(EditorMode::Workspace));
        assert!("vim".parse::<Editor>().is_err());
        assert!("split".parse::<EditorMode>().is_err());
    }
}
