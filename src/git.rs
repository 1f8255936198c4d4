//! Git access.
//!
//! The orchestrator only talks to git through [`GitProvider`]; [`GitCli`]
//! implements it by running the `git` binary.

use std::path::{Path, PathBuf};
use std::process::{Command, Output};

use tracing::debug;

use crate::error::Error;

/// How a path changed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ChangeKind {
    Added,
    Modified,
    Deleted,
    Renamed,
    Copied,
    TypeChanged,
    Other,
}

impl ChangeKind {
    /// Parse a `--name-status` letter (score suffix ignored).
    pub fn from_status(status: &str) -> Self {
        match status.chars().next() {
            Some('A') => ChangeKind::Added,
            Some('M') => ChangeKind::Modified,
            Some('D') => ChangeKind::Deleted,
            Some('R') => ChangeKind::Renamed,
            Some('C') => ChangeKind::Copied,
            Some('T') => ChangeKind::TypeChanged,
            _ => ChangeKind::Other,
        }
    }
}

/// One changed path, relative to the repository root.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ChangedPath {
    pub path: String,
    pub kind: ChangeKind,
}

/// Ordered, immutable list of changed paths.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct ChangeSet {
    entries: Vec<ChangedPath>,
}

impl ChangeSet {
    pub fn new(entries: Vec<ChangedPath>) -> Self {
        Self { entries }
    }

    /// Change set of plain paths, all marked modified.
    pub fn from_paths<I, S>(paths: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self::new(
            paths
                .into_iter()
                .map(|p| ChangedPath {
                    path: p.into(),
                    kind: ChangeKind::Modified,
                })
                .collect(),
        )
    }

    pub fn entries(&self) -> &[ChangedPath] {
        &self.entries
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}

/// Which changes an incremental run looks at.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ChangeScope {
    /// The latest commit.
    Head,
    /// A specific commit against its first parent.
    Commit(String),
    /// Everything between two revisions.
    Range { from: String, to: String },
    /// Paths supplied by the caller.
    Paths(Vec<String>),
}

/// Git capabilities the orchestrator needs.
pub trait GitProvider: Send + Sync {
    /// Repository root (top of the working tree).
    fn root(&self) -> &Path;

    /// HEAD commit hash, `None` before the first commit.
    fn head(&self) -> Result<Option<String>, Error>;

    /// Changed paths for a scope.
    fn changed_paths(&self, scope: &ChangeScope) -> Result<ChangeSet, Error>;

    /// Full message of the latest commit, `None` before the first commit.
    fn last_commit_message(&self) -> Result<Option<String>, Error>;

    /// Stage and commit only `path`. Returns the new commit hash, or `None`
    /// when nothing under `path` changed.
    fn commit_path(&self, path: &str, message: &str) -> Result<Option<String>, Error>;

    /// Directory git runs hooks from.
    fn hooks_dir(&self) -> Result<PathBuf, Error>;
}

/// [`GitProvider`] backed by the `git` command.
#[derive(Debug, Clone)]
pub struct GitCli {
    root: PathBuf,
}

impl GitCli {
    /// Find the repository containing `start`.
    pub fn discover(start: &Path) -> Result<Self, Error> {
        let output = Command::new("git")
            .args(["rev-parse", "--show-toplevel"])
            .current_dir(start)
            .output()
            .map_err(|e| Error::Git(format!("failed to run git: {e}")))?;

        if !output.status.success() {
            return Err(Error::NotAGitRepo(start.to_path_buf()));
        }

        let root = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok(Self {
            root: PathBuf::from(root),
        })
    }

    /// Use `root` as-is without asking git.
    pub fn at(root: impl Into<PathBuf>) -> Self {
        Self { root: root.into() }
    }

    fn run(&self, args: &[&str]) -> Result<Output, Error> {
        debug!(?args, "git");
        Command::new("git")
            .args(args)
            .current_dir(&self.root)
            .output()
            .map_err(|e| Error::Git(format!("failed to run git: {e}")))
    }

    /// Run git and return stdout, failing on a non-zero exit.
    fn run_ok(&self, args: &[&str]) -> Result<String, Error> {
        let output = self.run(args)?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::Git(format!(
                "git {} failed: {}",
                args.first().copied().unwrap_or_default(),
                stderr.trim()
            )));
        }
        Ok(String::from_utf8_lossy(&output.stdout).into_owned())
    }

    fn has_parent(&self, rev: &str) -> Result<bool, Error> {
        let parent = format!("{rev}^");
        Ok(self
            .run(&["rev-parse", "--verify", "--quiet", &parent])?
            .status
            .success())
    }
}

impl GitProvider for GitCli {
    fn root(&self) -> &Path {
        &self.root
    }

    fn head(&self) -> Result<Option<String>, Error> {
        let output = self.run(&["rev-parse", "--verify", "--quiet", "HEAD"])?;
        if !output.status.success() {
            return Ok(None);
        }
        let hash = String::from_utf8_lossy(&output.stdout).trim().to_string();
        Ok((!hash.is_empty()).then_some(hash))
    }

    fn changed_paths(&self, scope: &ChangeScope) -> Result<ChangeSet, Error> {
        let raw = match scope {
            ChangeScope::Paths(paths) => return Ok(ChangeSet::from_paths(paths.iter().cloned())),
            ChangeScope::Head => {
                if self.head()?.is_none() {
                    return Ok(ChangeSet::default());
                }
                self.commit_diff("HEAD")?
            }
            ChangeScope::Commit(rev) => self.commit_diff(rev)?,
            ChangeScope::Range { from, to } => {
                self.run_ok(&["diff", "--name-status", "-z", "-M", from, to])?
            }
        };
        Ok(parse_name_status(&raw))
    }

    fn last_commit_message(&self) -> Result<Option<String>, Error> {
        if self.head()?.is_none() {
            return Ok(None);
        }
        let message = self.run_ok(&["log", "-1", "--format=%B"])?;
        Ok(Some(message.trim_end().to_string()))
    }

    fn commit_path(&self, path: &str, message: &str) -> Result<Option<String>, Error> {
        if !self.root.join(path).exists() && self.run_ok(&["ls-files", "--", path])?.is_empty() {
            debug!(path, "Nothing to commit: path does not exist");
            return Ok(None);
        }

        self.run_ok(&["add", "-A", "--", path])?;

        let staged = self.run(&["diff", "--cached", "--quiet", "--", path])?;
        if staged.status.success() {
            debug!(path, "Nothing to commit: no changes under path");
            return Ok(None);
        }

        self.run_ok(&["commit", "-m", message, "--", path])?;
        self.head()
    }

    fn hooks_dir(&self) -> Result<PathBuf, Error> {
        let dir = self.run_ok(&["rev-parse", "--git-path", "hooks"])?;
        let dir = PathBuf::from(dir.trim());
        if dir.is_absolute() {
            Ok(dir)
        } else {
            Ok(self.root.join(dir))
        }
    }
}

impl GitCli {
    /// Changes introduced by one commit, against its first parent.
    fn commit_diff(&self, rev: &str) -> Result<String, Error> {
        if self.has_parent(rev)? {
            let parent = format!("{rev}^");
            self.run_ok(&["diff", "--name-status", "-z", "-M", &parent, rev])
        } else {
            self.run_ok(&[
                "diff-tree",
                "--root",
                "--no-commit-id",
                "--name-status",
                "-z",
                "-r",
                "-M",
                rev,
            ])
        }
    }
}

/// Parse NUL-separated `--name-status -z` output.
///
/// Renames and copies carry two paths; the new path is kept.
pub fn parse_name_status(raw: &str) -> ChangeSet {
    let mut fields = raw.split('\0').filter(|f| !f.is_empty());
    let mut entries = Vec::new();

    while let Some(status) = fields.next() {
        let kind = ChangeKind::from_status(status);
        let path = match kind {
            ChangeKind::Renamed | ChangeKind::Copied => {
                let _old = fields.next();
                fields.next()
            }
            _ => fields.next(),
        };
        let Some(path) = path else {
            break;
        };
        entries.push(ChangedPath {
            path: path.to_string(),
            kind,
        });
    }

    ChangeSet::new(entries)
}


#[cfg(test)]
mod tests {
    use super::test_support::*;
    use super::*;
    use std::fs;

    #[test]
    fn test_parse_name_status() {
        let raw = "M\0src/lib.rs\0A\0docs/new.md\0R087\0old/name.rs\0new/name.rs\0D\0gone.txt\0";
        let changes = parse_name_status(raw);
        let paths: Vec<&str> = changes.paths().collect();
        assert_eq!(
            paths,
            vec!["src/lib.rs", "docs/new.md", "new/name.rs", "gone.txt"]
        );
        assert_eq!(changes.entries()[2].kind, ChangeKind::Renamed);
        assert_eq!(changes.entries()[3].kind, ChangeKind::Deleted);
    }

    #[test]
    fn test_parse_empty() {
        assert!(parse_name_status("").is_empty());
    }

    #[test]
    fn test_discover_and_head() {
        let repo = make_git_repo();
        let nested = repo.path().join("a/b");
        fs::create_dir_all(&nested).unwrap();

        let git = GitCli::discover(&nested).unwrap();
        assert_eq!(
            git.root().canonicalize().unwrap(),
            repo.path().canonicalize().unwrap()
        );
        assert!(git.head().unwrap().is_none());
        assert!(git.last_commit_message().unwrap().is_none());
        assert!(git.changed_paths(&ChangeScope::Head).unwrap().is_empty());
    }

    #[test]
    fn test_discover_outside_repo() {
        let dir = tempfile::tempdir().unwrap();
        assert!(matches!(
            GitCli::discover(dir.path()),
            Err(Error::NotAGitRepo(_))
        ));
    }

    #[test]
    fn test_changed_paths_root_and_child_commits() {
        let repo = make_git_repo();
        commit_files(
            repo.path(),
            &[("src/main.go", "package main"), ("README.md", "hi")],
            "initial",
        );
        let git = GitCli::at(repo.path());

        let first = git.changed_paths(&ChangeScope::Head).unwrap();
        let mut paths: Vec<&str> = first.paths().collect();
        paths.sort();
        assert_eq!(paths, vec!["README.md", "src/main.go"]);
        let initial = git.head().unwrap().unwrap();

        commit_files(repo.path(), &[("src/util.go", "package main")], "add util");
        let second = git.changed_paths(&ChangeScope::Head).unwrap();
        assert_eq!(second.paths().collect::<Vec<_>>(), vec!["src/util.go"]);
        assert_eq!(second.entries()[0].kind, ChangeKind::Added);

        let by_commit = git
            .changed_paths(&ChangeScope::Commit(initial.clone()))
            .unwrap();
        assert_eq!(by_commit.len(), 2);

        commit_files(repo.path(), &[("lib/x.go", "package lib")], "add lib");
        let range = git
            .changed_paths(&ChangeScope::Range {
                from: initial,
                to: "HEAD".to_string(),
            })
            .unwrap();
        let mut paths: Vec<&str> = range.paths().collect();
        paths.sort();
        assert_eq!(paths, vec!["lib/x.go", "src/util.go"]);
    }

    #[test]
    fn test_last_commit_message() {
        let repo = make_git_repo();
        commit_files(repo.path(), &[("a.txt", "a")], "[repowiki] update wiki");
        let git = GitCli::at(repo.path());
        assert_eq!(
            git.last_commit_message().unwrap().as_deref(),
            Some("[repowiki] update wiki")
        );
    }

    #[test]
    fn test_commit_path_only_commits_that_path() {
        let repo = make_git_repo();
        commit_files(repo.path(), &[("src/a.rs", "fn a() {}")], "initial");
        let git = GitCli::at(repo.path());

        fs::create_dir_all(repo.path().join("wiki")).unwrap();
        fs::write(repo.path().join("wiki/page.md"), "# Page").unwrap();
        fs::write(repo.path().join("src/a.rs"), "fn a() { todo!() }").unwrap();

        let hash = git.commit_path("wiki", "[repowiki] docs").unwrap();
        assert!(hash.is_some());
        assert_eq!(git.head().unwrap(), hash);

        let committed = git.changed_paths(&ChangeScope::Head).unwrap();
        assert_eq!(committed.paths().collect::<Vec<_>>(), vec!["wiki/page.md"]);

        // The source edit is still only in the working tree.
        let status = git.run_ok(&["status", "--porcelain"]).unwrap();
        assert!(status.contains("src/a.rs"));
    }

    #[test]
    fn test_commit_path_noop() {
        let repo = make_git_repo();
        commit_files(repo.path(), &[("wiki/page.md", "# Page")], "initial");
        let git = GitCli::at(repo.path());
        let before = git.head().unwrap();

        assert_eq!(git.commit_path("wiki", "[repowiki] docs").unwrap(), None);
        assert_eq!(git.commit_path("missing", "[repowiki] docs").unwrap(), None);
        assert_eq!(git.head().unwrap(), before);
    }

    #[test]
    fn test_hooks_dir() {
        let repo = make_git_repo();
        let git = GitCli::at(repo.path());
        let hooks = git.hooks_dir().unwrap();
        assert!(hooks.ends_with(".git/hooks"));
    }
}
