//! Workspace layout.
//!
//! A workspace is a directory holding every project. Each project lives
//! under its name (`host/org/repo`) in two sibling entries:
//!
//! ```text
//! <root>/github.com/user/repo.git   bare repository
//! <root>/github.com/user/repo/main  worktree for branch `main`
//! ```

pub mod naming;

use std::fs;
use std::path::{Component, Path, PathBuf};

use crate::{Error, Result};

pub use naming::{
    RemoteUrl, parse_remote_url, parse_session_name, project_name, repo_name, sanitize_branch,
    session_name,
};

/// Suffix of bare repository directories.
pub const BARE_SUFFIX: &str = ".git";

/// A workspace rooted at a directory.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Workspace {
    root: PathBuf,
}

impl Workspace {
    pub fn new(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// `<root>/<project>.git`
    pub fn bare_repo_path(&self, project: &str) -> PathBuf {
        self.root.join(format!("{}{}", project, BARE_SUFFIX))
    }

    /// `<root>/<project>`, the directory that holds the project's worktrees.
    pub fn project_dir(&self, project: &str) -> PathBuf {
        self.root.join(project)
    }

    /// `<root>/<project>/<sanitized branch>`
    pub fn worktree_path(&self, project: &str, branch: &str) -> PathBuf {
        self.project_dir(project).join(sanitize_branch(branch))
    }

    /// Recover the project name from a bare repository or worktree path.
    pub fn project_from_path(&self, path: &Path) -> Result<String> {
        let rel = path.strip_prefix(&self.root).map_err(|_| {
            Error::InvalidInput(format!(
                "{} is not inside the workspace {}",
                path.display(),
                self.root.display()
            ))
        })?;

        let parts: Vec<String> = rel
            .components()
            .filter_map(|c| match c {
                Component::Normal(s) => Some(s.to_string_lossy().into_owned()),
                _ => None,
            })
            .collect();

        if let Some(last) = parts.last() {
            if let Some(stem) = last.strip_suffix(BARE_SUFFIX) {
                let mut name = parts[..parts.len() - 1].to_vec();
                name.push(stem.to_string());
                return Ok(name.join("/"));
            }
        }

        if parts.len() < 2 {
            return Err(Error::InvalidInput(format!(
                "invalid workspace path structure: {}",
                path.display()
            )));
        }
        Ok(parts[..parts.len() - 1].join("/"))
    }

    pub fn exists(&self) -> bool {
        self.root.is_dir()
    }

    /// Create the workspace root if needed.
    pub fn ensure(&self) -> Result<()> {
        fs::create_dir_all(&self.root)?;
        Ok(())
    }

    /// Whether the project's bare repository is present.
    pub fn project_exists(&self, project: &str) -> bool {
        self.bare_repo_path(project).is_dir()
    }

    /// Create the worktree directory for a project.
    pub fn ensure_project_dir(&self, project: &str) -> Result<PathBuf> {
        let dir = self.project_dir(project);
        fs::create_dir_all(&dir)?;
        Ok(dir)
    }
}

/// Expand a leading `~` to the home directory.
pub fn expand_home(path: &str) -> Result<PathBuf> {
    if path != "~" && !path.starts_with("~/") {
        return Ok(PathBuf::from(path));
    }
    let home = dirs::home_dir()
        .ok_or_else(|| Error::Config("cannot determine home directory".to_string()))?;
    match path.strip_prefix("~/") {
        Some(rest) => Ok(home.join(rest)),
        None => Ok(home),
    }
}
