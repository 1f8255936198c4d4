//! Enable repowiki for a repository.

use std::fs;
use std::path::{Path, PathBuf};

use tracing::{info, warn};

use crate::cli::{gitignore, hooks, locate_engine};
use crate::config::Config;
use crate::engine::EngineRegistry;
use crate::error::Error;
use crate::git::GitProvider;

/// Flags accepted by `repowiki enable`.
#[derive(Debug, Clone, Default)]
pub struct EnableOptions {
    pub engine: Option<String>,
    pub engine_path: Option<PathBuf>,
    pub model: Option<String>,
    pub force: bool,
    pub no_auto_commit: bool,
}

/// Run the enable command.
pub fn run(options: EnableOptions) -> Result<(), Error> {
    let git = super::current_repo()?;
    let root = git.root().to_path_buf();
    let binary = std::env::current_exe()?;

    let config = enable(&git, &options, &binary)?;

    println!("repowiki enabled in {}\n", root.display());
    println!("  Engine:  {}", config.engine.id);
    match locate_engine(&config) {
        Ok(path) => println!("  Binary:  {}", path.display()),
        Err(e) => {
            eprintln!("Warning: {}", e);
            eprintln!("Set the path with: repowiki enable --engine-path /path/to/binary\n");
        }
    }
    println!("  Config:  {}", Config::path(&root).display());
    println!("  Hook:    {}", hooks::hook_path(&git.hooks_dir()?).display());
    println!("\nEvery commit will now auto-update the repo wiki.");
    println!("Run 'repowiki generate' for initial full wiki generation.");
    Ok(())
}

/// Apply options, save config and install the hook. Returns the saved config.
pub fn enable(
    git: &dyn GitProvider,
    options: &EnableOptions,
    binary: &Path,
) -> Result<Config, Error> {
    let root = git.root();
    let mut config = Config::load_or_default(root)?;

    if let Some(engine) = &options.engine {
        let registry = EngineRegistry::builtin();
        if !registry.contains(engine) {
            return Err(Error::UnknownEngine {
                engine: engine.clone(),
                valid: registry.ids().join(", "),
            });
        }
        config.engine.id = engine.clone();
    }
    if let Some(path) = &options.engine_path {
        config.engine.path = Some(path.clone());
    }
    if let Some(model) = &options.model {
        config.engine.model = Some(model.clone());
    }
    if options.no_auto_commit {
        config.commit.auto_commit = false;
    }
    config.enabled = true;

    config.save(root)?;
    info!(path = %Config::path(root).display(), "Saved config");

    hooks::install(&git.hooks_dir()?, binary, options.force)?;

    if let Err(e) = gitignore::update(&root.join(".gitignore")) {
        warn!(error = %e, "Failed to update .gitignore");
    }

    create_editor_command(root, &config)?;
    Ok(config)
}

/// Write `.qoder/commands/update-wiki.md` unless it already exists.
fn create_editor_command(root: &Path, config: &Config) -> Result<(), Error> {
    let path = root.join(".qoder").join("commands").join("update-wiki.md");
    if path.exists() {
        return Ok(());
    }
    if let Some(parent) = path.parent() {
        fs::create_dir_all(parent)?;
    }

    let wiki = config.docs.path.trim_end_matches('/');
    let language = &config.docs.language;
    let content = format!(
        r#"---
description: Update the repository wiki documentation based on recent code changes
---

You are a technical documentation specialist. Update the repository wiki in `{wiki}/` to reflect the current state of the codebase.

## Instructions

1. Run `git diff --name-only HEAD~5 HEAD` to see recently changed files
2. Read the changed source files to understand what was modified
3. Read the existing wiki pages in `{wiki}/{language}/content/`
4. Update any wiki pages that reference or document the changed code
5. If new modules/features were added without wiki coverage, create new pages
6. Update `{wiki}/{language}/meta/repowiki-metadata.json` with new code snippet references

## Constraints

- Do NOT modify any source code files
- Only create/modify files within `{wiki}/`
"#
    );
    fs::write(&path, content)?;
    info!(path = %path.display(), "Created update-wiki command");
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::git::test_support::make_git_repo;
    use crate::git::GitCli;

    #[test]
    fn test_enable_writes_everything() {
        let repo = make_git_repo();
        let git = GitCli::at(repo.path());
        let options = EnableOptions {
            engine: Some("claude-code".to_string()),
            model: Some("sonnet".to_string()),
            no_auto_commit: true,
            ..Default::default()
        };

        let config = enable(&git, &options, Path::new("/usr/bin/repowiki")).unwrap();
        assert!(config.enabled);
        assert!(!config.commit.auto_commit);

        let saved = Config::load(repo.path()).unwrap();
        assert_eq!(saved.engine.id, "claude-code");
        assert_eq!(saved.engine.model.as_deref(), Some("sonnet"));

        assert!(hooks::is_installed(&git.hooks_dir().unwrap()));
        let ignore = fs::read_to_string(repo.path().join(".gitignore")).unwrap();
        assert!(ignore.contains("/.repowiki/logs/"));

        let command = fs::read_to_string(repo.path().join(".qoder/commands/update-wiki.md")).unwrap();
        assert!(command.contains("`.qoder/repowiki/en/content/`"));
    }

    #[test]
    fn test_enable_rejects_unknown_engine() {
        let repo = make_git_repo();
        let git = GitCli::at(repo.path());
        let options = EnableOptions {
            engine: Some("copilot".to_string()),
            ..Default::default()
        };

        let err = enable(&git, &options, Path::new("/usr/bin/repowiki")).unwrap_err();
        assert!(matches!(err, Error::UnknownEngine { .. }));
        assert!(!Config::path(repo.path()).exists());
    }

    #[test]
    fn test_enable_keeps_existing_settings() {
        let repo = make_git_repo();
        let git = GitCli::at(repo.path());

        let mut config = Config::default();
        config.enabled = false;
        config.docs.full_generate_threshold = 5;
        config.save(repo.path()).unwrap();

        let command = repo.path().join(".qoder/commands/update-wiki.md");
        fs::create_dir_all(command.parent().unwrap()).unwrap();
        fs::write(&command, "custom").unwrap();

        let config = enable(&git, &EnableOptions::default(), Path::new("/bin/repowiki")).unwrap();
        assert!(config.enabled);
        assert_eq!(config.docs.full_generate_threshold, 5);
        assert_eq!(fs::read_to_string(command).unwrap(), "custom");
    }
}
