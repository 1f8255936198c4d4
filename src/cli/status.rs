//! Show repowiki status for a repository.

use std::fmt::Write as _;
use std::fs;
use std::path::Path;
use std::time::Duration;

use crate::cli::{hooks, locate_engine};
use crate::config::Config;
use crate::error::Error;
use crate::git::GitProvider;
use crate::lock::LockManager;

/// Run the status command.
pub fn run() -> Result<(), Error> {
    let git = super::current_repo()?;
    print!("{}", render(&git)?);
    Ok(())
}

/// Status report for a repository.
pub fn render(git: &dyn GitProvider) -> Result<String, Error> {
    let root = git.root();
    let mut out = String::new();
    writeln!(out, "repowiki v{}\n", env!("CARGO_PKG_VERSION"))?;

    let config = match Config::load(root) {
        Ok(config) => config,
        Err(Error::ConfigNotFound(_)) => {
            writeln!(out, "  Status:       not configured")?;
            writeln!(out, "  Run 'repowiki enable' to get started.")?;
            return Ok(out);
        }
        Err(e) => return Err(e),
    };

    let enabled = if config.enabled { "enabled" } else { "disabled" };
    writeln!(out, "  Status:       {enabled}")?;
    writeln!(out, "  Engine:       {}", config.engine.id)?;

    let hooks_dir = git.hooks_dir()?;
    if hooks::is_installed(&hooks_dir) {
        writeln!(out, "  Hook:         installed ({})", hooks::hook_path(&hooks_dir).display())?;
    } else {
        writeln!(out, "  Hook:         not installed")?;
    }

    match locate_engine(&config) {
        Ok(path) => writeln!(out, "  Binary:       {}", path.display())?,
        Err(_) => writeln!(out, "  Binary:       not found ({})", config.engine.id)?,
    }

    let content = config.content_dir(root);
    if content.is_dir() {
        writeln!(
            out,
            "  Wiki path:    {}/{}/content/ ({} pages)",
            config.docs.path.trim_end_matches('/'),
            config.docs.language,
            count_pages(&content)
        )?;
    } else {
        writeln!(out, "  Wiki path:    {} (not generated yet)", config.docs.path)?;
    }

    if let Some(model) = &config.engine.model {
        writeln!(out, "  Model:        {model}")?;
    }
    writeln!(out, "  Auto-commit:  {}", config.commit.auto_commit)?;
    writeln!(out, "  Max turns:    {}", config.engine.max_turns)?;

    let locks = LockManager::new(root, Duration::from_secs(config.lock.stale_after_secs));
    match locks.inspect() {
        Ok(Some(marker)) => {
            let stale = if locks.is_stale(&marker) { ", stale" } else { "" };
            writeln!(
                out,
                "  Running:      pid {} on {} since {}{}",
                marker.owner.pid, marker.owner.host, marker.started_at, stale
            )?;
        }
        Ok(None) => {}
        Err(_) => writeln!(out, "  Running:      unreadable lock at {}", locks.path().display())?,
    }

    if let Some(state) = &config.state {
        writeln!(out, "  Last run:     {}", state.last_run)?;
        if let Some(hash) = &state.last_commit_hash {
            writeln!(out, "  Last commit:  {hash}")?;
        }
    }

    Ok(out)
}

/// Markdown files under `dir`, recursively.
fn count_pages(dir: &Path) -> usize {
    let Ok(entries) = fs::read_dir(dir) else {
        return 0;
    };
    entries
        .flatten()
        .map(|entry| {
            let path = entry.path();
            if path.is_dir() {
                count_pages(&path)
            } else if path.extension().is_some_and(|ext| ext == "md") {
                1
            } else {
                0
            }
        })
        .sum()
}
