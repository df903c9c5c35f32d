use regex::Regex;
use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::OnceLock;

/// `owner/name` of a GitHub repository.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RepoRef {
    pub owner: String,
    pub name: String,
}

static GITHUB_RE: OnceLock<Regex> = OnceLock::new();

fn github_re() -> &'static Regex {
    GITHUB_RE.get_or_init(|| {
        Regex::new(r"github\.com[/:]([A-Za-z0-9_.\-]+)/([A-Za-z0-9_.\-]+?)(?:\.git)?(?:[/#?].*)?$")
            .unwrap()
    })
}

impl RepoRef {
    /// Parse an https, ssh or deep link (`/pull/12`, `/tree/main`) to a repo.
    ///
    /// Segments starting with `.` are rejected: the name becomes a path
    /// component under the repositories directory.
    pub fn parse(url: &str) -> Option<Self> {
        let caps = github_re().captures(url.trim())?;
        let (owner, name) = (&caps[1], &caps[2]);
        if owner.starts_with('.') || name.starts_with('.') {
            return None;
        }
        Some(Self {
            owner: owner.to_string(),
            name: name.to_string(),
        })
    }

    pub fn clone_url(&self) -> String {
        format!("https://github.com/{}/{}.git", self.owner, self.name)
    }
}

impl fmt::Display for RepoRef {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}/{}", self.owner, self.name)
    }
}

/// Where a run executes, plus what the agent must do first if the repository
/// is not checked out yet.
#[derive(Debug, Clone, PartialEq)]
pub struct Workspace {
    pub dir: PathBuf,
    pub clone_instructions: Option<String>,
}

impl Workspace {
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            clone_instructions: None,
        }
    }
}

/// Pick a workspace under `repos_dir` for the first GitHub link in `urls`.
///
/// An existing `<repos_dir>/<name>` is used as-is. A linked repository with no
/// local copy runs in `repos_dir` with clone instructions. No link at all runs
/// in `repos_dir`.
pub fn select(repos_dir: &Path, urls: &[String]) -> Workspace {
    let Some(repo) = urls.iter().find_map(|u| RepoRef::parse(u)) else {
        return Workspace::at(repos_dir);
    };

    let local = repos_dir.join(&repo.name);
    if local.is_dir() {
        return Workspace::at(local);
    }

    Workspace {
        dir: repos_dir.to_path_buf(),
        clone_instructions: Some(clone_instructions(&repo, repos_dir)),
    }
}

fn clone_instructions(repo: &RepoRef, repos_dir: &Path) -> String {
    format!(
        "The repository {repo} is not checked out yet. Before anything else, run:\n\n\
         git clone {url} {dir}\n\n\
         then work inside {dir}.",
        url = repo.clone_url(),
        dir = repos_dir.join(&repo.name).display(),
    )
}
