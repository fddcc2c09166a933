//! Branch queries and the streaming branch listing.

use std::collections::HashSet;
use std::io::{BufRead, BufReader, Read};
use std::path::{Path, PathBuf};
use std::process::Child;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::mpsc::{self, Receiver, SyncSender};
use std::sync::{Arc, Mutex};
use std::thread::{self, JoinHandle};

use tracing::{debug, warn};

use super::Git;
use crate::process;
use crate::{Error, GitOp, Result};

/// Buffered branch names between the producer thread and the consumer.
const STREAM_CAPACITY: usize = 64;

impl Git {
    /// Local branch names (`refs/heads`).
    pub fn list_local_branches(&self, repo: &Path) -> Result<Vec<String>> {
        let spec = self
            .command(repo)
            .args(["for-each-ref", "--format=%(refname:short)", "refs/heads/"]);
        let out = self.run_ok(&spec, GitOp::Query, "listing local branches")?;
        Ok(parse_branch_list(&out))
    }

    /// Whether `branch` exists, and whether it was found only remotely.
    ///
    /// Only `refs/heads` is consulted: remote-tracking refs are not
    /// guaranteed to exist in a bare repository, so the second value is
    /// always `false`. Exit status 1 from git means the ref is absent; any
    /// other failure is reported as an error.
    pub fn does_branch_exist(&self, repo: &Path, branch: &str) -> Result<(bool, bool)> {
        let exists = self.ref_exists(repo, &format!("refs/heads/{}", branch))?;
        Ok((exists, false))
    }

    /// Whether `branch` has an upstream configured (`branch.<b>.merge`).
    pub fn has_upstream(&self, repo: &Path, branch: &str) -> Result<bool> {
        let spec = self
            .command(repo)
            .args(["config", "--get", &format!("branch.{}.merge", branch)]);
        let out = self.run(&spec)?;
        match out.code {
            Some(0) => Ok(true),
            Some(1) => Ok(false),
            _ => Err(Error::git(
                GitOp::BranchLookup,
                format!("reading upstream of '{}': {}", branch, out.describe_failure()),
            )),
        }
    }

    /// Stream branch names: local branches first, then remote-only ones.
    pub fn stream_branches(&self, repo: &Path) -> BranchStream {
        BranchStream::start(self.clone(), repo.to_path_buf())
    }
}

/// Parse one-branch-per-line output, skipping blanks.
pub fn parse_branch_list(output: &str) -> Vec<String> {
    output
        .lines()
        .map(str::trim)
        .filter(|l| !l.is_empty())
        .map(String::from)
        .collect()
}

/// Parse a `git ls-remote --heads` line into a branch name.
pub fn parse_ls_remote_line(line: &str) -> Option<String> {
    let mut fields = line.split_whitespace();
    let _sha = fields.next()?;
    let reference = fields.next()?;
    let branch = reference.strip_prefix("refs/heads/")?;
    if branch.is_empty() || branch.ends_with("HEAD") {
        return None;
    }
    Some(branch.to_string())
}

/// Lazily produced branch names.
///
/// A producer thread sends every local branch, then runs
/// `git ls-remote --heads origin` and sends branches not already seen.
/// The first error ends the stream. Dropping the stream (or calling
/// [`BranchStream::cancel`]) kills the child process and joins the
/// producer.
pub struct BranchStream {
    rx: Option<Receiver<Result<String>>>,
    cancelled: Arc<AtomicBool>,
    child: Arc<Mutex<Option<Child>>>,
    producer: Option<JoinHandle<()>>,
    finished: bool,
}

impl BranchStream {
    fn start(git: Git, repo: PathBuf) -> Self {
        let (tx, rx) = mpsc::sync_channel(STREAM_CAPACITY);
        let cancelled = Arc::new(AtomicBool::new(false));
        let child = Arc::new(Mutex::new(None));

        let producer = {
            let cancelled = Arc::clone(&cancelled);
            let child = Arc::clone(&child);
            thread::spawn(move || produce(&git, &repo, &tx, &cancelled, &child))
        };

        Self {
            rx: Some(rx),
            cancelled,
            child,
            producer: Some(producer),
            finished: false,
        }
    }

    /// Stop producing, kill the child process and wait for the producer.
    pub fn cancel(&mut self) {
        self.shutdown();
    }

    fn shutdown(&mut self) {
        self.cancelled.store(true, Ordering::SeqCst);
        if let Ok(mut guard) = self.child.lock() {
            if let Some(mut child) = guard.take() {
                debug!("killing branch listing child");
                let _ = child.kill();
                let _ = child.wait();
            }
        }
        // unblocks a producer waiting on a full channel
        self.rx.take();
        if let Some(handle) = self.producer.take() {
            let _ = handle.join();
        }
        self.finished = true;
    }
}

impl Iterator for BranchStream {
    type Item = Result<String>;

    fn next(&mut self) -> Option<Self::Item> {
        if self.finished {
            return None;
        }
        let item = self.rx.as_ref()?.recv().ok();
        match item {
            Some(Ok(branch)) => Some(Ok(branch)),
            Some(Err(e)) => {
                self.shutdown();
                Some(Err(e))
            }
            None => {
                self.shutdown();
                None
            }
        }
    }
}

impl Drop for BranchStream {
    fn drop(&mut self) {
        self.shutdown();
    }
}

fn produce(
    git: &Git,
    repo: &Path,
    tx: &SyncSender<Result<String>>,
    cancelled: &AtomicBool,
    child_slot: &Mutex<Option<Child>>,
) {
    let local = match git.list_local_branches(repo) {
        Ok(branches) => branches,
        Err(e) => {
            let _ = tx.send(Err(e));
            return;
        }
    };

    let mut seen: HashSet<String> = HashSet::new();
    for branch in local {
        if cancelled.load(Ordering::SeqCst) {
            return;
        }
        seen.insert(branch.clone());
        if tx.send(Ok(branch)).is_err() {
            return;
        }
    }

    let spec = git.command(repo).args(["ls-remote", "--heads", "origin"]);
    let mut child = match process::spawn_piped(&spec) {
        Ok(child) => child,
        Err(e) => {
            let _ = tx.send(Err(e));
            return;
        }
    };
    let stdout = child.stdout.take();
    let stderr = child.stderr.take().map(|mut pipe| {
        thread::spawn(move || {
            let mut buf = String::new();
            let _ = pipe.read_to_string(&mut buf);
            buf
        })
    });

    match child_slot.lock() {
        Ok(mut guard) if !cancelled.load(Ordering::SeqCst) => *guard = Some(child),
        _ => {
            let _ = child.kill();
            let _ = child.wait();
            return;
        }
    }

    if let Some(stdout) = stdout {
        for line in BufReader::new(stdout).lines() {
            if cancelled.load(Ordering::SeqCst) {
                return;
            }
            let line = match line {
                Ok(line) => line,
                Err(e) => {
                    let _ = tx.send(Err(Error::Io(e)));
                    reap(child_slot);
                    return;
                }
            };
            if let Some(branch) = parse_ls_remote_line(&line) {
                if seen.insert(branch.clone()) && tx.send(Ok(branch)).is_err() {
                    return;
                }
            }
        }
    }

    // None when the consumer already killed and reaped the child
    let Some(status) = reap(child_slot) else {
        return;
    };
    if !status.success() {
        let stderr = stderr.and_then(|h| h.join().ok()).unwrap_or_default();
        warn!(repo = %repo.display(), "ls-remote failed");
        let detail = match status.code() {
            Some(code) => format!("ls-remote exit status {}: {}", code, stderr.trim()),
            None => format!("ls-remote terminated by signal: {}", stderr.trim()),
        };
        let _ = tx.send(Err(Error::git(GitOp::Query, detail)));
    }
}

fn reap(child_slot: &Mutex<Option<Child>>) -> Option<std::process::ExitStatus> {
    let mut child = child_slot.lock().ok()?.take()?;
    child.wait().ok()
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_branch_list() {
        let out = "main\n  feature/x  \n\n\r\nrelease\n";
        assert_eq!(parse_branch_list(out), vec!["main", "feature/x", "release"]);
    }

    #[test]
    fn test_parse_ls_remote_line() {
        assert_eq!(
            parse_ls_remote_line("abc123\trefs/heads/feature/x"),
            Some("feature/x".to_string())
        );
        assert_eq!(parse_ls_remote_line("abc123\trefs/tags/v1"), None);
        assert_eq!(parse_ls_remote_line("abc123\tHEAD"), None);
        assert_eq!(parse_ls_remote_line(""), None);
        assert_eq!(parse_ls_remote_line("   "), None);
    }

    #[test]
    fn test_stream_on_missing_repo_yields_single_error() {
        let dir = tempfile::TempDir::new().unwrap();
        let missing = dir.path().join("nope.git");
        let mut stream = Git::default().stream_branches(&missing);
        assert!(matches!(stream.next(), Some(Err(_))));
        assert!(stream.next().is_none());
    }
}
