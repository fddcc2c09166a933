//! Common test utilities for sesh integration tests.
//!
//! Provides `TestEnv` for isolated test environments that never touch the
//! user's workspace, config directory or multiplexer.

#![allow(dead_code)]

use std::collections::BTreeMap;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command as StdCommand;
use std::sync::{Arc, Mutex};

use assert_cmd::Command;
pub use tempfile::TempDir;

use sesh::commands::Context;
use sesh::git::Git;
use sesh::session::{Attach, SessionBackend};
use sesh::storage::Storage;
use sesh::workspace::Workspace;
use sesh::{Error, Result};

/// Project name used for repositories cloned from local paths.
pub const PROJECT: &str = "example.com/team/widget";

/// A test environment with isolated directories.
///
/// - `workspace`: the sesh workspace root
/// - `config`: config directory holding the database and logs
/// - `remotes`: plain repositories that act as origins
///
/// Paths are canonicalized so they compare equal to what git reports.
pub struct TestEnv {
    _dirs: [TempDir; 3],
    pub workspace: PathBuf,
    pub config: PathBuf,
    pub remotes: PathBuf,
}

impl TestEnv {
    pub fn new() -> Self {
        let dirs = [
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
            TempDir::new().unwrap(),
        ];
        let [workspace, config, remotes] =
            [0, 1, 2].map(|i| dirs[i].path().canonicalize().unwrap());
        Self {
            _dirs: dirs,
            workspace,
            config,
            remotes,
        }
    }

    /// Get a Command for the sesh binary with isolated directories.
    ///
    /// The `none` backend is forced and multiplexer variables are cleared
    /// so nothing leaks into a real session.
    pub fn sesh(&self) -> Command {
        let mut cmd = Command::new(env!("CARGO_BIN_EXE_sesh"));
        cmd.current_dir(&self.workspace);
        cmd.env("SESH_CONFIG_DIR", &self.config);
        cmd.env("SESH_WORKSPACE", &self.workspace);
        cmd.env("SESH_SESSION_BACKEND", "none");
        for var in ["TMUX", "STY", "ZELLIJ", "ZELLIJ_SESSION_NAME", "SESH_LOG"] {
            cmd.env_remove(var);
        }
        cmd
    }

    /// Library context over this environment with the given backend.
    pub fn context(&self, backend: Box<dyn SessionBackend>) -> Context {
        Context::new(
            Workspace::new(&self.workspace),
            Git::default(),
            backend,
            Storage::open_in(&self.config).unwrap(),
        )
    }

    /// Create an origin repository with `main` and the given extra branches,
    /// each holding one commit.
    pub fn make_remote(&self, name: &str, branches: &[&str]) -> PathBuf {
        let path = self.remotes.join(name);
        fs::create_dir_all(&path).unwrap();
        git(&path, &["init", "--quiet"]);
        git(&path, &["symbolic-ref", "HEAD", "refs/heads/main"]);
        fs::write(path.join("README"), "widget\n").unwrap();
        git(&path, &["add", "README"]);
        commit(&path, "initial");
        for branch in branches {
            git(&path, &["branch", branch]);
        }
        path
    }

    /// Bare repository of a project in the workspace.
    pub fn bare_path(&self, project: &str) -> PathBuf {
        self.workspace.join(format!("{}.git", project))
    }

    /// Worktree directory of a project branch.
    pub fn worktree_path(&self, project: &str, branch: &str) -> PathBuf {
        Workspace::new(&self.workspace).worktree_path(project, branch)
    }
}

impl Default for TestEnv {
    fn default() -> Self {
        Self::new()
    }
}

/// Run git in `dir`, panicking on failure.
pub fn git(dir: &Path, args: &[&str]) -> String {
    let out = StdCommand::new("git")
        .arg("-C")
        .arg(dir)
        .args(["-c", "user.email=test@example.com", "-c", "user.name=Test"])
        .args(["-c", "commit.gpgsign=false", "-c", "init.defaultBranch=main"])
        .args(args)
        .output()
        .expect("failed to run git");
    assert!(
        out.status.success(),
        "git {:?} failed: {}",
        args,
        String::from_utf8_lossy(&out.stderr)
    );
    String::from_utf8_lossy(&out.stdout).into_owned()
}

pub fn commit(dir: &Path, message: &str) {
    git(dir, &["commit", "--quiet", "--allow-empty", "-m", message]);
}

/// Shared state of a [`MockBackend`], inspectable after the backend was
/// boxed into a context.
#[derive(Default)]
pub struct MockState {
    pub sessions: Mutex<BTreeMap<String, PathBuf>>,
    pub current: Mutex<Option<String>>,
    pub attached: Mutex<Vec<String>>,
}

impl MockState {
    pub fn names(&self) -> Vec<String> {
        self.sessions.lock().unwrap().keys().cloned().collect()
    }

    pub fn has(&self, name: &str) -> bool {
        self.sessions.lock().unwrap().contains_key(name)
    }

    pub fn path_of(&self, name: &str) -> Option<PathBuf> {
        self.sessions.lock().unwrap().get(name).cloned()
    }

    pub fn set_current(&self, name: Option<&str>) {
        *self.current.lock().unwrap() = name.map(str::to_string);
    }
}

/// In-memory multiplexer following the backend contract.
#[derive(Clone, Default)]
pub struct MockBackend {
    pub state: Arc<MockState>,
}

impl MockBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn boxed(&self) -> Box<dyn SessionBackend> {
        Box::new(self.clone())
    }
}

impl SessionBackend for MockBackend {
    fn name(&self) -> String {
        "mock".to_string()
    }

    fn create(&self, name: &str, path: &Path) -> Result<()> {
        let mut sessions = self.state.sessions.lock().unwrap();
        if sessions.contains_key(name) {
            return Err(Error::AlreadyExists(format!("session '{}'", name)));
        }
        sessions.insert(name.to_string(), path.to_path_buf());
        Ok(())
    }

    fn attach(&self, name: &str) -> Result<Attach> {
        if !self.state.has(name) {
            return Err(Error::NotFound(format!("session '{}'", name)));
        }
        self.state.attached.lock().unwrap().push(name.to_string());
        Ok(Attach::Switched)
    }

    fn switch(&self, name: &str) -> Result<()> {
        self.attach(name).map(|_| ())
    }

    fn list(&self) -> Result<Vec<String>> {
        Ok(self.state.names())
    }

    fn delete(&self, name: &str) -> Result<()> {
        match self.state.sessions.lock().unwrap().remove(name) {
            Some(_) => Ok(()),
            None => Err(Error::NotFound(format!("session '{}'", name))),
        }
    }

    fn exists(&self, name: &str) -> Result<bool> {
        Ok(self.state.has(name))
    }

    fn is_running(&self) -> Result<bool> {
        Ok(true)
    }

    fn is_inside_session(&self) -> bool {
        self.state.current.lock().unwrap().is_some()
    }

    fn current_session_name(&self) -> Result<Option<String>> {
        Ok(self.state.current.lock().unwrap().clone())
    }
}
