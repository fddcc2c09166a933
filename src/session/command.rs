//! Multiplexer command generation.
//!
//! Builders for tmux, GNU screen and zellij invocations. They only produce
//! [`CommandSpec`]s; running them is the job of a
//! [`CommandRunner`](crate::process::CommandRunner).

use std::path::Path;

use crate::process::CommandSpec;

/// Target a tmux session by exact name (no prefix matching).
pub fn exact_target(session: &str) -> String {
    format!("={}", session)
}

/// Builder for tmux commands.
#[derive(Debug, Clone)]
pub struct TmuxCommand {
    spec: CommandSpec,
}

impl TmuxCommand {
    fn new(command: &str) -> Self {
        Self {
            spec: CommandSpec::new("tmux").arg(command),
        }
    }

    fn flag(mut self, flag: &str) -> Self {
        self.spec = self.spec.arg(flag);
        self
    }

    fn flag_with_value(mut self, flag: &str, value: &str) -> Self {
        self.spec = self.spec.arg(flag).arg(value);
        self
    }

    fn arg(mut self, arg: &str) -> Self {
        self.spec = self.spec.arg(arg);
        self
    }

    /// Build the final command string.
    pub fn build(&self) -> String {
        self.spec.build()
    }

    pub fn into_spec(self) -> CommandSpec {
        self.spec
    }

    /// Create a new session.
    ///
    /// # Example
    /// ```
    /// use sesh::session::command::TmuxCommand;
    /// use std::path::Path;
    /// let cmd = TmuxCommand::new_session("repo-main", true, Some(Path::new("/ws/repo/main")));
    /// assert_eq!(cmd.build(), "tmux new-session -d -s repo-main -c /ws/repo/main");
    /// ```
    pub fn new_session(session: &str, detached: bool, start_directory: Option<&Path>) -> Self {
        let mut cmd = Self::new("new-session");
        if detached {
            cmd = cmd.flag("-d");
        }
        cmd = cmd.flag_with_value("-s", session);
        if let Some(dir) = start_directory {
            cmd = cmd.flag_with_value("-c", &dir.to_string_lossy());
        }
        cmd
    }

    /// Check whether a session exists. Exit status 1 means it does not.
    pub fn has_session(session: &str) -> Self {
        Self::new("has-session").flag_with_value("-t", &exact_target(session))
    }

    pub fn attach_session(session: &str) -> Self {
        Self::new("attach-session").flag_with_value("-t", &exact_target(session))
    }

    /// Move the current client to another session.
    pub fn switch_client(session: &str) -> Self {
        Self::new("switch-client").flag_with_value("-t", &exact_target(session))
    }

    pub fn kill_session(session: &str) -> Self {
        Self::new("kill-session").flag_with_value("-t", &exact_target(session))
    }

    /// List session names, one per line.
    pub fn list_sessions() -> Self {
        Self::new("list-sessions").flag_with_value("-F", "#{session_name}")
    }

    /// Name of the session the current client is attached to.
    pub fn current_session() -> Self {
        Self::new("display-message").flag_with_value("-p", "#{session_name}")
    }

    /// Send keys to the active pane of a session.
    ///
    /// # Example
    /// ```
    /// use sesh::session::command::TmuxCommand;
    /// let cmd = TmuxCommand::send_keys("repo-main", "make dev", true);
    /// assert_eq!(cmd.build(), "tmux send-keys -t =repo-main: -l make dev");
    /// ```
    pub fn send_keys(session: &str, keys: &str, literal: bool) -> Self {
        let mut cmd = Self::new("send-keys").flag_with_value("-t", &format!("={}:", session));
        if literal {
            cmd = cmd.flag("-l");
        }
        cmd.arg(keys)
    }
}

/// Builder for GNU screen commands.
#[derive(Debug, Clone)]
pub struct ScreenCommand;

impl ScreenCommand {
    /// Start a detached session whose shell begins in `path`.
    pub fn new_session(session: &str, path: &Path) -> CommandSpec {
        CommandSpec::new("screen")
            .args(["-dmS", session])
            .current_dir(path)
    }

    pub fn list_sessions() -> CommandSpec {
        CommandSpec::new("screen").arg("-ls")
    }

    pub fn attach(session: &str) -> CommandSpec {
        CommandSpec::new("screen").args(["-r", session])
    }

    pub fn quit(session: &str) -> CommandSpec {
        CommandSpec::new("screen").args(["-S", session, "-X", "quit"])
    }

    /// Type `text` into the session's window.
    pub fn stuff(session: &str, text: &str) -> CommandSpec {
        CommandSpec::new("screen").args(["-S", session, "-X", "stuff", text])
    }
}

/// Builder for zellij commands.
#[derive(Debug, Clone)]
pub struct ZellijCommand;

impl ZellijCommand {
    /// Create a session in the background, rooted at `path`.
    pub fn new_session(session: &str, path: &Path) -> CommandSpec {
        CommandSpec::new("zellij")
            .args(["attach", "--create-background", session])
            .current_dir(path)
    }

    pub fn list_sessions() -> CommandSpec {
        CommandSpec::new("zellij").args(["list-sessions", "--short", "--no-formatting"])
    }

    pub fn attach(session: &str) -> CommandSpec {
        CommandSpec::new("zellij").args(["attach", session])
    }

    pub fn switch_session(session: &str) -> CommandSpec {
        CommandSpec::new("zellij").args(["action", "switch-session", session])
    }

    pub fn delete_session(session: &str) -> CommandSpec {
        CommandSpec::new("zellij").args(["delete-session", "--force", session])
    }

    pub fn write_chars(session: &str, text: &str) -> CommandSpec {
        CommandSpec::new("zellij").args(["--session", session, "action", "write-chars", text])
    }
}
