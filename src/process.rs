//! External process execution.
//!
//! Every program sesh drives (git, tmux, zellij, screen, editors) is run
//! through this module so that logging and timeouts are applied
//! uniformly. Session backends go through the [`CommandRunner`] trait so
//! they can be exercised without the real tools installed.

use std::ffi::OsString;
use std::fmt;
use std::io::Read;
use std::path::{Path, PathBuf};
use std::process::{Child, Command, Stdio};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, warn};
use wait_timeout::ChildExt;

use crate::{Error, Result};

/// Grace period between SIGTERM and SIGKILL when a command times out.
#[cfg(unix)]
const TERMINATE_GRACE: Duration = Duration::from_secs(2);

/// Description of a command to run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    cwd: Option<PathBuf>,
    env: Vec<(String, String)>,
}

impl CommandSpec {
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            args: Vec::new(),
            cwd: None,
            env: Vec::new(),
        }
    }

    pub fn arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    pub fn args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Add a path argument.
    pub fn path_arg(self, path: &Path) -> Self {
        self.arg(path.to_string_lossy().into_owned())
    }

    pub fn current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.cwd = Some(dir.into());
        self
    }

    pub fn env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.env.push((key.into(), value.into()));
        self
    }

    pub fn program(&self) -> &str {
        &self.program
    }

    pub fn get_args(&self) -> &[String] {
        &self.args
    }

    pub fn get_current_dir(&self) -> Option<&Path> {
        self.cwd.as_deref()
    }

    /// Render as a single string, e.g. `tmux has-session -t =repo-main`.
    pub fn build(&self) -> String {
        self.to_string()
    }

    fn to_command(&self) -> Command {
        let mut cmd = Command::new(&self.program);
        cmd.args(self.args.iter().map(OsString::from));
        if let Some(dir) = &self.cwd {
            cmd.current_dir(dir);
        }
        for (k, v) in &self.env {
            cmd.env(k, v);
        }
        cmd
    }
}

impl fmt::Display for CommandSpec {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.program)?;
        for arg in &self.args {
            write!(f, " {}", arg)?;
        }
        Ok(())
    }
}

/// Captured result of a finished command.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandOutput {
    /// Exit code, `None` when terminated by a signal
    pub code: Option<i32>,
    pub stdout: String,
    pub stderr: String,
}

impl CommandOutput {
    pub fn success(&self) -> bool {
        self.code == Some(0)
    }

    /// Build a successful output, mostly for fakes.
    pub fn ok(stdout: impl Into<String>) -> Self {
        Self {
            code: Some(0),
            stdout: stdout.into(),
            stderr: String::new(),
        }
    }

    /// Build a failed output with the given exit code.
    pub fn failed(code: i32, stderr: impl Into<String>) -> Self {
        Self {
            code: Some(code),
            stdout: String::new(),
            stderr: stderr.into(),
        }
    }

    /// Convert a non-zero exit into [`Error::Command`].
    pub fn into_result(self, program: &str) -> Result<Self> {
        if self.success() {
            Ok(self)
        } else {
            Err(Error::Command {
                program: program.to_string(),
                detail: self.describe_failure(),
            })
        }
    }

    /// Short description of a failure for error messages.
    pub fn describe_failure(&self) -> String {
        let stderr = self.stderr.trim();
        match (self.code, stderr.is_empty()) {
            (Some(code), true) => format!("exit status {}", code),
            (Some(code), false) => format!("exit status {}: {}", code, stderr),
            (None, true) => "terminated by signal".to_string(),
            (None, false) => format!("terminated by signal: {}", stderr),
        }
    }
}

/// Abstraction over running external programs.
pub trait CommandRunner: Send + Sync {
    /// Run a command to completion and capture its output.
    ///
    /// A non-zero exit is not an error here; callers decide what an exit
    /// status means. Errors are reserved for spawn failures and timeouts.
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput>;

    /// Whether `program` can be found on `PATH`.
    fn is_available(&self, program: &str) -> bool;
}

/// Runs commands on the host.
#[derive(Debug, Clone, Default)]
pub struct SystemRunner {
    timeout: Option<Duration>,
}

impl SystemRunner {
    pub fn new(timeout: Option<Duration>) -> Self {
        Self { timeout }
    }
}

impl CommandRunner for SystemRunner {
    fn run(&self, cmd: &CommandSpec) -> Result<CommandOutput> {
        run(cmd, self.timeout)
    }

    fn is_available(&self, program: &str) -> bool {
        is_available(program)
    }
}

/// Whether `program` can be found on `PATH`.
pub fn is_available(program: &str) -> bool {
    which::which(program).is_ok()
}

/// Run a command, killing it if it outlives `timeout`.
pub fn run(spec: &CommandSpec, timeout: Option<Duration>) -> Result<CommandOutput> {
    debug!(command = %spec, ?timeout, "running external command");

    let mut child = spec
        .to_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(spec, e))?;

    let stdout = drain(child.stdout.take());
    let stderr = drain(child.stderr.take());

    let status = match timeout {
        Some(limit) => match child.wait_timeout(limit)? {
            Some(status) => status,
            None => {
                warn!(command = %spec, after = ?limit, "command timed out, terminating");
                terminate(&mut child);
                // grandchildren may still hold the pipes; leave the readers detached
                drop((stdout, stderr));
                return Err(Error::Timeout {
                    program: spec.program.clone(),
                    after: limit,
                });
            }
        },
        None => child.wait()?,
    };

    let output = CommandOutput {
        code: status.code(),
        stdout: join_drain(stdout),
        stderr: join_drain(stderr),
    };
    debug!(command = %spec, code = ?output.code, "external command finished");
    Ok(output)
}

/// Spawn a child with piped stdout for incremental reading.
pub fn spawn_piped(spec: &CommandSpec) -> Result<Child> {
    debug!(command = %spec, "spawning external command");
    spec.to_command()
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| spawn_error(spec, e))
}

/// Replace the current process image with `spec`.
///
/// Only returns if the replacement could not happen.
#[cfg(unix)]
pub fn exec(spec: &CommandSpec) -> Error {
    use std::os::unix::process::CommandExt;

    debug!(command = %spec, "replacing process image");
    let err = spec.to_command().exec();
    spawn_error(spec, err)
}

/// Run `spec` attached to the terminal and exit with its status.
#[cfg(not(unix))]
pub fn exec(spec: &CommandSpec) -> Error {
    debug!(command = %spec, "running attached command");
    match spec.to_command().status() {
        Ok(status) => std::process::exit(status.code().unwrap_or(1)),
        Err(e) => spawn_error(spec, e),
    }
}

/// Stop a child: SIGTERM, a short grace period, then SIGKILL.
pub fn terminate(child: &mut Child) {
    #[cfg(unix)]
    {
        use nix::sys::signal::{Signal, kill};
        use nix::unistd::Pid;

        if kill(Pid::from_raw(child.id() as i32), Signal::SIGTERM).is_ok() {
            if let Ok(Some(_)) = child.wait_timeout(TERMINATE_GRACE) {
                return;
            }
        }
    }
    let _ = child.kill();
    let _ = child.wait();
}

fn spawn_error(spec: &CommandSpec, err: std::io::Error) -> Error {
    let detail = if err.kind() == std::io::ErrorKind::NotFound {
        "executable not found on PATH".to_string()
    } else {
        err.to_string()
    };
    Error::Command {
        program: spec.program.clone(),
        detail,
    }
}

fn drain<R: Read + Send + 'static>(pipe: Option<R>) -> Option<JoinHandle<String>> {
    pipe.map(|mut r| {
        thread::spawn(move || {
            let mut buf = Vec::new();
            let _ = r.read_to_end(&mut buf);
            String::from_utf8_lossy(&buf).into_owned()
        })
    })
}

fn join_drain(handle: Option<JoinHandle<String>>) -> String {
    handle
        .and_then(|h| h.join().ok())
        .unwrap_or_default()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;

    #[test]
    fn test_build_renders_program_and_args() {
        let cmd = CommandSpec::new("tmux")
            .arg("new-session")
            .args(["-d", "-s", "repo-main"]);
        assert_eq!(cmd.build(), "tmux new-session -d -s repo-main");
        assert_eq!(cmd.program(), "tmux");
        assert_eq!(cmd.get_args(), &["new-session", "-d", "-s", "repo-main"]);
    }

    #[test]
    fn test_describe_failure() {
        assert_eq!(
            CommandOutput::failed(1, "  boom \n").describe_failure(),
            "exit status 1: boom"
        );
        assert_eq!(CommandOutput::failed(2, "").describe_failure(), "exit status 2");
    }

    #[test]
    fn test_into_result() {
        assert!(CommandOutput::ok("x").into_result("git").is_ok());
        let err = CommandOutput::failed(128, "fatal").into_result("git").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalCommandFailure);
        assert!(err.to_string().contains("fatal"));
    }

    #[cfg(unix)]
    #[test]
    fn test_run_captures_output_and_exit_code() {
        let out = run(&CommandSpec::new("sh").args(["-c", "echo out; echo err >&2; exit 3"]), None)
            .unwrap();
        assert_eq!(out.code, Some(3));
        assert_eq!(out.stdout.trim(), "out");
        assert_eq!(out.stderr.trim(), "err");
        assert!(!out.success());
    }

    #[cfg(unix)]
    #[test]
    fn test_run_respects_current_dir() {
        let dir = tempfile::TempDir::new().unwrap();
        let out = run(&CommandSpec::new("pwd").current_dir(dir.path()), None).unwrap();
        let reported = std::path::PathBuf::from(out.stdout.trim());
        assert_eq!(
            reported.canonicalize().unwrap(),
            dir.path().canonicalize().unwrap()
        );
    }

    #[cfg(unix)]
    #[test]
    fn test_run_times_out() {
        let spec = CommandSpec::new("sleep").arg("10");
        let start = std::time::Instant::now();
        let err = run(&spec, Some(Duration::from_millis(200))).unwrap_err();
        assert!(matches!(err, Error::Timeout { .. }));
        assert!(start.elapsed() < Duration::from_secs(8));
    }

    #[test]
    fn test_missing_program() {
        let err = run(&CommandSpec::new("definitely-not-a-real-binary-xyz"), None).unwrap_err();
        assert_eq!(err.kind(), ErrorKind::ExternalCommandFailure);
        assert!(err.to_string().contains("not found"));
        assert!(!is_available("definitely-not-a-real-binary-xyz"));
    }
}
