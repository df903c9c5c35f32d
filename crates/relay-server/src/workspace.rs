use crate::tracker::Tracker;
use relay_core::io::ensure_dir;
use relay_core::webhook::Subject;
use relay_core::workspace::{self, Workspace};
use std::path::PathBuf;
use std::sync::Arc;

/// Maps a session's subject to the directory its run executes in.
#[derive(Clone)]
pub struct RepoResolver {
    tracker: Arc<dyn Tracker>,
    repos_dir: PathBuf,
}

impl RepoResolver {
    pub fn new(tracker: Arc<dyn Tracker>, repos_dir: PathBuf) -> Self {
        Self { tracker, repos_dir }
    }

    pub fn default_workspace(&self) -> Workspace {
        self.ensure_repos_dir();
        Workspace::at(&self.repos_dir)
    }

    /// Never fails: lookup errors fall back to the repositories directory.
    /// The repositories directory exists once this returns, unless creating
    /// it failed (logged).
    pub async fn resolve(&self, subject: &Subject) -> Workspace {
        let Subject::Issue { id, .. } = subject else {
            return self.default_workspace();
        };
        match self.tracker.issue_repository_urls(id).await {
            Ok(urls) => {
                self.ensure_repos_dir();
                workspace::select(&self.repos_dir, &urls)
            }
            Err(e) => {
                tracing::warn!(issue_id = %id, error = %e, "repository lookup failed; using repos dir");
                self.default_workspace()
            }
        }
    }

    /// Runs start inside this directory, so it must exist even on a fresh
    /// install.
    fn ensure_repos_dir(&self) {
        if let Err(e) = ensure_dir(&self.repos_dir) {
            tracing::error!(dir = %self.repos_dir.display(), error = %e, "cannot create repos dir");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::tracker::{CommentTarget, TrackerError};
    use async_trait::async_trait;
    use relay_core::activity::ActivityContent;
    use tempfile::TempDir;

    struct Links(Result<Vec<String>, &'static str>);

    #[async_trait]
    impl Tracker for Links {
        async fn create_activity(
            &self,
            _session_id: &str,
            _content: &ActivityContent,
            _ephemeral: bool,
        ) -> Result<(), TrackerError> {
            Ok(())
        }

        async fn create_comment(&self, _target: &CommentTarget, _body: &str) -> Result<(), TrackerError> {
            Ok(())
        }

        async fn issue_repository_urls(&self, _issue_id: &str) -> Result<Vec<String>, TrackerError> {
            self.0.clone().map_err(TrackerError::Rejected)
        }
    }

    fn issue() -> Subject {
        Subject::Issue {
            id: "issue-1".into(),
            identifier: None,
            title: "t".into(),
            description: None,
            url: None,
            team_key: None,
        }
    }

    #[tokio::test]
    async fn fresh_install_creates_repos_dir() {
        let dir = TempDir::new().unwrap();
        let repos = dir.path().join("state/repos");
        let resolver = RepoResolver::new(
            Arc::new(Links(Ok(vec!["https://github.com/orchard9/relay".into()]))),
            repos.clone(),
        );

        let ws = resolver.resolve(&issue()).await;
        assert_eq!(ws.dir, repos);
        assert!(repos.is_dir());
        assert!(ws.clone_instructions.is_some());
    }

    #[tokio::test]
    async fn lookup_failure_still_creates_repos_dir() {
        let dir = TempDir::new().unwrap();
        let repos = dir.path().join("repos");
        let resolver = RepoResolver::new(Arc::new(Links(Err("down"))), repos.clone());

        let ws = resolver.resolve(&issue()).await;
        assert_eq!(ws, Workspace::at(&repos));
        assert!(repos.is_dir());
    }

    #[test]
    fn default_workspace_creates_repos_dir() {
        let dir = TempDir::new().unwrap();
        let repos = dir.path().join("repos");
        let resolver = RepoResolver::new(Arc::new(Links(Ok(Vec::new()))), repos.clone());
        assert_eq!(resolver.default_workspace().dir, repos);
        assert!(repos.is_dir());
    }
}
