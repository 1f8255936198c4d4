//! Commit guard.
//!
//! Every automated commit starts with a marker. A post-commit hook firing for
//! such a commit must do nothing, otherwise each wiki commit would trigger
//! another run. The same guard performs the automated commit itself.

use tracing::{debug, info};

use crate::error::Error;
use crate::git::GitProvider;

/// Result of a successful auto-commit.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommitRecord {
    pub hash: String,
    pub description: String,
}

/// Recognizes and creates automated commits.
#[derive(Debug, Clone)]
pub struct CommitGuard {
    marker: String,
}

impl CommitGuard {
    pub fn new(marker: impl Into<String>) -> Self {
        Self {
            marker: marker.into(),
        }
    }

    pub fn marker(&self) -> &str {
        &self.marker
    }

    /// Whether a commit message was written by this tool.
    pub fn is_automated(&self, message: &str) -> bool {
        !self.marker.is_empty() && message.trim_start().starts_with(&self.marker)
    }

    /// True when the latest commit is an automated one and the run must skip.
    pub fn should_skip(&self, git: &dyn GitProvider) -> Result<bool, Error> {
        let Some(message) = git.last_commit_message()? else {
            return Ok(false);
        };
        let automated = self.is_automated(&message);
        if automated {
            debug!(marker = %self.marker, "Latest commit is automated");
        }
        Ok(automated)
    }

    /// Commit message for an automated commit.
    pub fn message(&self, description: &str) -> String {
        format!("{} {}", self.marker, description)
    }

    /// Stage and commit only `docs_path`.
    ///
    /// Returns `None` when nothing under the path changed. Any git failure
    /// becomes `CommitFailed`.
    pub fn commit(
        &self,
        git: &dyn GitProvider,
        docs_path: &str,
        description: &str,
    ) -> Result<Option<CommitRecord>, Error> {
        let message = self.message(description);
        let hash = git
            .commit_path(docs_path, &message)
            .map_err(|e| Error::CommitFailed(e.to_string()))?;

        match hash {
            Some(hash) => {
                info!(hash = %hash, "Committed wiki changes");
                Ok(Some(CommitRecord {
                    hash,
                    description: description.to_string(),
                }))
            }
            None => {
                info!(path = docs_path, "No wiki changes to commit");
                Ok(None)
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_support::{commit_files, make_git_repo};
    use crate::git::GitCli;

    #[test]
    fn test_is_automated() {
        let guard = CommitGuard::new("[repowiki]");
        assert!(guard.is_automated("[repowiki] update wiki for 3 changed files"));
        assert!(guard.is_automated("  [repowiki] full wiki generation"));
        assert!(!guard.is_automated("fix: handle [repowiki] prefix"));
        assert!(!guard.is_automated("feat: add parser"));
    }

    #[test]
    fn test_empty_marker_never_matches() {
        let guard = CommitGuard::new("");
        assert!(!guard.is_automated("anything"));
    }

    #[test]
    fn test_should_skip_reads_latest_commit() {
        let repo = make_git_repo();
        let git = GitCli::at(repo.path());
        let guard = CommitGuard::new("[repowiki]");

        assert!(!guard.should_skip(&git).unwrap());

        commit_files(repo.path(), &[("src/a.go", "package a")], "feat: a");
        assert!(!guard.should_skip(&git).unwrap());

        commit_files(
            repo.path(),
            &[(".qoder/repowiki/en/content/a.md", "# A")],
            &guard.message("update wiki for 1 changed files"),
        );
        assert!(guard.should_skip(&git).unwrap());
    }

    #[test]
    fn test_commit_and_noop() {
        let repo = make_git_repo();
        commit_files(repo.path(), &[("src/a.go", "package a")], "feat: a");
        let git = GitCli::at(repo.path());
        let guard = CommitGuard::new("[repowiki]");

        std::fs::create_dir_all(repo.path().join("wiki")).unwrap();
        std::fs::write(repo.path().join("wiki/a.md"), "# A").unwrap();

        let record = guard.commit(&git, "wiki", "full wiki generation").unwrap();
        let record = record.expect("commit expected");
        assert_eq!(record.description, "full wiki generation");
        assert_eq!(git.head().unwrap().as_deref(), Some(record.hash.as_str()));
        assert_eq!(
            git.last_commit_message().unwrap().as_deref(),
            Some("[repowiki] full wiki generation")
        );

        // Second commit with no changes is a no-op.
        assert!(guard.commit(&git, "wiki", "full wiki generation").unwrap().is_none());
    }

    #[test]
    fn test_commit_failure_is_tagged() {
        let dir = tempfile::tempdir().unwrap();
        std::fs::create_dir_all(dir.path().join("wiki")).unwrap();
        // Not a repository: every git call fails.
        let git = GitCli::at(dir.path());
        let guard = CommitGuard::new("[repowiki]");

        let err = guard.commit(&git, "wiki", "update").unwrap_err();
        assert!(err.content_generated());
    }
}
