//! Filesystem discovery of projects and worktrees.
//!
//! Nothing here is cached between invocations: the project graph is rebuilt
//! from the workspace directory and `git worktree list` every time.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use serde::Serialize;
use tracing::{debug, warn};

use crate::git::{Git, WorktreeInfo};
use crate::workspace::{BARE_SUFFIX, Workspace, naming};
use crate::{Error, Result};

/// A project in the workspace.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Project {
    /// `host/org/repo`
    pub name: String,
    /// Directory that holds the worktrees
    pub local_path: PathBuf,
    /// The bare repository
    pub bare_path: PathBuf,
    /// Last successful fetch, joined in from storage
    #[serde(skip_serializing_if = "Option::is_none")]
    pub last_fetched_at: Option<DateTime<Utc>>,
}

impl Project {
    pub fn new(workspace: &Workspace, name: &str) -> Self {
        Self {
            name: name.to_string(),
            local_path: workspace.project_dir(name),
            bare_path: workspace.bare_repo_path(name),
            last_fetched_at: None,
        }
    }

    /// Last path component of the name.
    pub fn repo_name(&self) -> &str {
        naming::repo_name(&self.name)
    }

    /// Session name for one of this project's branches.
    pub fn session_name(&self, branch: &str) -> String {
        naming::session_name(&self.name, branch)
    }
}

/// A checkout of one branch.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Worktree {
    pub path: PathBuf,
    /// Unsanitized branch name; empty for the bare placeholder
    pub branch: String,
    pub head_commit: String,
}

impl From<WorktreeInfo> for Worktree {
    fn from(info: WorktreeInfo) -> Self {
        Self {
            path: info.path,
            branch: info.branch,
            head_commit: info.commit,
        }
    }
}

impl Worktree {
    pub fn is_placeholder(&self) -> bool {
        self.branch.is_empty()
    }
}

/// Find every bare repository under the workspace root, in walk order.
///
/// A directory counts when its name ends in `.git` and it contains a
/// `config` file. Discovery never descends into a bare repository. A
/// missing workspace yields no projects.
pub fn discover_projects(workspace: &Workspace) -> Result<Vec<Project>> {
    let mut projects = Vec::new();
    if !workspace.exists() {
        debug!(root = %workspace.root().display(), "workspace does not exist");
        return Ok(projects);
    }
    walk(workspace, workspace.root(), &mut projects)?;
    Ok(projects)
}

/// [`discover_projects`] sorted by name.
pub fn discover_projects_sorted(workspace: &Workspace) -> Result<Vec<Project>> {
    let mut projects = discover_projects(workspace)?;
    projects.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(projects)
}

fn walk(workspace: &Workspace, dir: &Path, out: &mut Vec<Project>) -> Result<()> {
    for entry in fs::read_dir(dir)? {
        let entry = entry?;
        if !entry.file_type()?.is_dir() {
            continue;
        }
        let path = entry.path();
        let is_bare = entry
            .file_name()
            .to_str()
            .is_some_and(|n| n.ends_with(BARE_SUFFIX));

        if is_bare {
            if path.join("config").is_file() {
                let name = workspace.project_from_path(&path)?;
                out.push(Project::new(workspace, &name));
            }
            continue;
        }
        // checkouts carry a `.git` file; their contents are not projects
        if path.join(".git").exists() {
            continue;
        }
        walk(workspace, &path, out)?;
    }
    Ok(())
}

/// All worktrees of a project, including the bare placeholder entry.
pub fn discover_worktrees(git: &Git, project: &Project) -> Result<Vec<Worktree>> {
    Ok(git
        .list_worktrees(&project.bare_path)?
        .into_iter()
        .map(Worktree::from)
        .collect())
}

/// Worktrees that are real checkouts (placeholder filtered out).
pub fn actual_worktrees(git: &Git, project: &Project) -> Result<Vec<Worktree>> {
    Ok(discover_worktrees(git, project)?
        .into_iter()
        .filter(|w| !w.is_placeholder())
        .collect())
}

/// Look a project up by its full name.
pub fn get_project(workspace: &Workspace, name: &str) -> Result<Project> {
    let name = name.trim_end_matches('/');
    if workspace.project_exists(name) {
        Ok(Project::new(workspace, name))
    } else {
        Err(Error::NotFound(format!("project '{}'", name)))
    }
}

/// Look a project up by its repository name (`repo` for `host/org/repo`).
///
/// Several projects sharing the repository name is an input error.
pub fn get_project_by_short_name(workspace: &Workspace, repo: &str) -> Result<Project> {
    let mut matches: Vec<Project> = discover_projects_sorted(workspace)?
        .into_iter()
        .filter(|p| p.repo_name() == repo)
        .collect();
    match matches.len() {
        0 => Err(Error::NotFound(format!("project '{}'", repo))),
        1 => Ok(matches.remove(0)),
        _ => Err(Error::InvalidInput(format!(
            "'{}' matches several projects: {}",
            repo,
            matches
                .iter()
                .map(|p| p.name.as_str())
                .collect::<Vec<_>>()
                .join(", ")
        ))),
    }
}

/// Resolve a full name, falling back to a repository name.
pub fn resolve_project(workspace: &Workspace, name: &str) -> Result<Project> {
    match get_project(workspace, name) {
        Err(e) if !name.contains('/') => {
            debug!(name, "no project with that full name, trying short name");
            get_project_by_short_name(workspace, name).map_err(|_| e)
        }
        other => other,
    }
}

/// Project containing `path`, if it is inside the workspace.
pub fn project_for_path(workspace: &Workspace, path: &Path) -> Result<Project> {
    let mut current = Some(path);
    while let Some(dir) = current {
        if dir == workspace.root() {
            break;
        }
        if let Ok(name) = workspace.project_from_path(dir) {
            if workspace.project_exists(&name) {
                return Ok(Project::new(workspace, &name));
            }
        }
        current = dir.parent();
    }
    Err(Error::NotFound(format!(
        "no project contains {}",
        path.display()
    )))
}

/// The worktree of a project checked out on `branch`.
pub fn get_worktree(git: &Git, project: &Project, branch: &str) -> Result<Worktree> {
    actual_worktrees(git, project)?
        .into_iter()
        .find(|w| w.branch == branch)
        .ok_or_else(|| {
            Error::NotFound(format!(
                "worktree for branch '{}' in project '{}'",
                branch, project.name
            ))
        })
}

/// Best-effort match of a session name back to a project and worktree.
///
/// Compares against the generated session name of every worktree of the
/// projects whose repository name prefixes the session. When several
/// projects share a repository name the first in name order wins.
pub fn match_session_to_worktree(
    git: &Git,
    workspace: &Workspace,
    session: &str,
) -> Result<Option<(Project, Worktree)>> {
    naming::parse_session_name(session)?;
    for project in discover_projects_sorted(workspace)? {
        if !session.starts_with(&format!("{}-", project.repo_name())) {
            continue;
        }
        let worktrees = match actual_worktrees(git, &project) {
            Ok(w) => w,
            Err(e) => {
                warn!(project = %project.name, error = %e, "skipping project");
                continue;
            }
        };
        if let Some(wt) = worktrees
            .into_iter()
            .find(|w| project.session_name(&w.branch) == session)
        {
            return Ok(Some((project, wt)));
        }
    }
    Ok(None)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ErrorKind;
    use tempfile::TempDir;

    fn make_bare(ws: &Workspace, name: &str) {
        let path = ws.bare_repo_path(name);
        fs::create_dir_all(&path).unwrap();
        fs::write(path.join("config"), "[core]\n\tbare = true\n").unwrap();
    }

    #[test]
    fn test_discover_projects_finds_bare_repos() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        make_bare(&ws, "github.com/user/alpha");
        make_bare(&ws, "gitlab.com/org/sub/beta");
        // a worktree directory next to the bare repo is not a project
        fs::create_dir_all(ws.worktree_path("github.com/user/alpha", "main")).unwrap();
        // .git without config is ignored
        fs::create_dir_all(dir.path().join("example.com/x/broken.git")).unwrap();

        let names: Vec<String> = discover_projects_sorted(&ws)
            .unwrap()
            .into_iter()
            .map(|p| p.name)
            .collect();
        assert_eq!(names, vec!["github.com/user/alpha", "gitlab.com/org/sub/beta"]);
    }

    #[test]
    fn test_discover_does_not_descend_into_bare_repo() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        make_bare(&ws, "github.com/user/alpha");
        let nested = ws.bare_repo_path("github.com/user/alpha").join("modules/inner.git");
        fs::create_dir_all(&nested).unwrap();
        fs::write(nested.join("config"), "").unwrap();

        assert_eq!(discover_projects(&ws).unwrap().len(), 1);
    }

    #[test]
    fn test_discover_missing_workspace() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path().join("absent"));
        assert!(discover_projects(&ws).unwrap().is_empty());
    }

    #[test]
    fn test_get_project_not_found() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        let err = get_project(&ws, "github.com/user/none").unwrap_err();
        assert_eq!(err.kind(), ErrorKind::NotFound);
    }

    #[test]
    fn test_short_name_lookup() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        make_bare(&ws, "github.com/user/alpha");
        make_bare(&ws, "github.com/user/tool");
        make_bare(&ws, "gitlab.com/other/tool");

        assert_eq!(
            get_project_by_short_name(&ws, "alpha").unwrap().name,
            "github.com/user/alpha"
        );
        assert_eq!(
            get_project_by_short_name(&ws, "tool").unwrap_err().kind(),
            ErrorKind::InvalidInput
        );
        assert_eq!(
            resolve_project(&ws, "alpha").unwrap().bare_path,
            ws.bare_repo_path("github.com/user/alpha")
        );
        assert_eq!(
            resolve_project(&ws, "missing").unwrap_err().kind(),
            ErrorKind::NotFound
        );
    }

    #[test]
    fn test_project_for_path() {
        let dir = TempDir::new().unwrap();
        let ws = Workspace::new(dir.path());
        make_bare(&ws, "github.com/user/alpha");
        let nested = ws.worktree_path("github.com/user/alpha", "main").join("src/bin");
        fs::create_dir_all(&nested).unwrap();

        assert_eq!(
            project_for_path(&ws, &nested).unwrap().name,
            "github.com/user/alpha"
        );
        assert!(project_for_path(&ws, dir.path()).is_err());
    }
}
