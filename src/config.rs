//! Project configuration.
//!
//! Handles loading and saving `.repowiki/config.toml`.

use std::fs;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

use crate::error::Error;

/// Directory holding repowiki's own files, relative to the repository root.
pub const CONFIG_DIR: &str = ".repowiki";

/// Project configuration stored in `.repowiki/config.toml`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    /// Hook-triggered runs are skipped when false.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Generation engine settings.
    #[serde(default)]
    pub engine: EngineConfig,

    /// Documentation output and change classification.
    #[serde(default)]
    pub docs: DocsConfig,

    /// Auto-commit behavior.
    #[serde(default)]
    pub commit: CommitConfig,

    /// Run lock settings.
    #[serde(default)]
    pub lock: LockConfig,

    /// Last-run metadata (written by the orchestrator, not the user).
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub state: Option<LastRun>,
}

/// Generation engine settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Registered engine id (`qoder`, `claude-code`, `codex`).
    #[serde(default = "default_engine")]
    pub id: String,

    /// Explicit binary path; falls back to PATH lookup when missing.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub path: Option<PathBuf>,

    /// Engine-specific model name.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub model: Option<String>,

    /// Turn budget handed to the engine.
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
}

/// Documentation output and change classification.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct DocsConfig {
    /// Wiki output root (relative to project root).
    #[serde(default = "default_wiki_path")]
    pub path: String,

    #[serde(default = "default_language")]
    pub language: String,

    /// Changed paths starting with any of these prefixes are ignored.
    #[serde(default = "default_excluded_paths")]
    pub excluded_paths: Vec<String>,

    /// Number of relevant changed files at which an update becomes a full run.
    /// Zero disables the escalation.
    #[serde(default = "default_full_generate_threshold")]
    pub full_generate_threshold: usize,

    /// Path prefix to section name mappings.
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub sections: Vec<SectionRule>,
}

/// Maps a path prefix to a wiki section.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SectionRule {
    pub prefix: String,
    pub name: String,
}

/// Auto-commit behavior.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CommitConfig {
    #[serde(default = "default_true")]
    pub auto_commit: bool,

    /// Marker that starts every automated commit message.
    #[serde(default = "default_commit_prefix")]
    pub prefix: String,
}

/// Run lock settings.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockConfig {
    /// Age after which a lock marker is reclaimable regardless of its owner.
    #[serde(default = "default_stale_after_secs")]
    pub stale_after_secs: u64,
}

/// Last-run metadata.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LastRun {
    pub last_run: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub last_commit_hash: Option<String>,
}

// Default value functions
fn default_true() -> bool {
    true
}

fn default_engine() -> String {
    "qoder".to_string()
}

fn default_max_turns() -> u32 {
    50
}

fn default_wiki_path() -> String {
    ".qoder/repowiki".to_string()
}

fn default_language() -> String {
    "en".to_string()
}

fn default_excluded_paths() -> Vec<String> {
    vec![
        ".qoder/repowiki/".to_string(),
        ".repowiki/".to_string(),
        "node_modules/".to_string(),
        "vendor/".to_string(),
        ".git/".to_string(),
    ]
}

fn default_full_generate_threshold() -> usize {
    20
}

fn default_commit_prefix() -> String {
    "[repowiki]".to_string()
}

fn default_stale_after_secs() -> u64 {
    2 * 60 * 60
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            id: default_engine(),
            path: None,
            model: None,
            max_turns: default_max_turns(),
        }
    }
}

impl Default for DocsConfig {
    fn default() -> Self {
        Self {
            path: default_wiki_path(),
            language: default_language(),
            excluded_paths: default_excluded_paths(),
            full_generate_threshold: default_full_generate_threshold(),
            sections: Vec::new(),
        }
    }
}

impl Default for CommitConfig {
    fn default() -> Self {
        Self {
            auto_commit: true,
            prefix: default_commit_prefix(),
        }
    }
}

impl Default for LockConfig {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after_secs(),
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            enabled: true,
            engine: EngineConfig::default(),
            docs: DocsConfig::default(),
            commit: CommitConfig::default(),
            lock: LockConfig::default(),
            state: None,
        }
    }
}

impl Config {
    /// Path to `.repowiki/` for a project.
    pub fn dir(project_root: &Path) -> PathBuf {
        project_root.join(CONFIG_DIR)
    }

    /// Get the config file path for a project.
    pub fn path(project_root: &Path) -> PathBuf {
        Self::dir(project_root).join("config.toml")
    }

    /// Load config from a project directory.
    pub fn load(project_root: &Path) -> Result<Self, Error> {
        let config_path = Self::path(project_root);
        if !config_path.exists() {
            return Err(Error::ConfigNotFound(config_path));
        }
        let content = fs::read_to_string(&config_path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load config, falling back to defaults when the file is absent.
    pub fn load_or_default(project_root: &Path) -> Result<Self, Error> {
        match Self::load(project_root) {
            Err(Error::ConfigNotFound(_)) => Ok(Self::default()),
            other => other,
        }
    }

    /// Save config to a project directory.
    pub fn save(&self, project_root: &Path) -> Result<(), Error> {
        let config_path = Self::path(project_root);
        if let Some(parent) = config_path.parent() {
            fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self)?;

        let with_header = format!(
            "# repowiki project configuration\n# Edit directly or re-run 'repowiki enable' with flags\n\n{}",
            content
        );

        fs::write(&config_path, with_header)?;
        Ok(())
    }

    /// Record a successful run.
    ///
    /// Only the `state` table is written back: the file is reloaded so edits
    /// made while the run was in progress survive. Without a config file
    /// nothing is written.
    pub fn record_last_run(
        &mut self,
        project_root: &Path,
        commit_hash: Option<&str>,
    ) -> Result<(), Error> {
        let state = LastRun {
            last_run: chrono::Utc::now().to_rfc3339(),
            last_commit_hash: commit_hash.map(str::to_string),
        };
        self.state = Some(state.clone());

        let mut on_disk = match Self::load(project_root) {
            Ok(config) => config,
            Err(Error::ConfigNotFound(path)) => {
                warn!(path = %path.display(), "No config file, last run not recorded");
                return Ok(());
            }
            Err(e) => return Err(e),
        };
        on_disk.state = Some(state);
        on_disk.save(project_root)
    }

    /// Last processed commit, if any run has completed.
    pub fn last_commit_hash(&self) -> Option<&str> {
        self.state
            .as_ref()
            .and_then(|s| s.last_commit_hash.as_deref())
    }

    /// Directory holding generated wiki pages.
    pub fn content_dir(&self, project_root: &Path) -> PathBuf {
        project_root
            .join(&self.docs.path)
            .join(&self.docs.language)
            .join("content")
    }

    /// Check if the wiki has any content yet.
    pub fn docs_exist(&self, project_root: &Path) -> bool {
        fs::read_dir(self.content_dir(project_root))
            .map(|mut entries| entries.next().is_some())
            .unwrap_or(false)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_default_config() {
        let config = Config::default();
        assert!(config.enabled);
        assert_eq!(config.engine.id, "qoder");
        assert_eq!(config.engine.max_turns, 50);
        assert_eq!(config.docs.full_generate_threshold, 20);
        assert_eq!(config.commit.prefix, "[repowiki]");
        assert!(config.docs.excluded_paths.contains(&".repowiki/".to_string()));
        assert!(config.state.is_none());
    }

    #[test]
    fn test_save_and_load() {
        let dir = TempDir::new().unwrap();

        let mut config = Config::default();
        config.engine.id = "claude-code".to_string();
        config.engine.model = Some("sonnet".to_string());
        config.docs.sections.push(SectionRule {
            prefix: "src/api/".to_string(),
            name: "api".to_string(),
        });
        config.save(dir.path()).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.engine.id, "claude-code");
        assert_eq!(loaded.engine.model.as_deref(), Some("sonnet"));
        assert_eq!(loaded.docs.sections, config.docs.sections);
    }

    #[test]
    fn test_missing_fields_use_defaults() {
        let dir = TempDir::new().unwrap();
        fs::create_dir_all(Config::dir(dir.path())).unwrap();
        fs::write(
            Config::path(dir.path()),
            "[engine]\nid = \"codex\"\n\n[commit]\nauto_commit = false\n",
        )
        .unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.engine.id, "codex");
        assert_eq!(loaded.engine.max_turns, 50);
        assert!(!loaded.commit.auto_commit);
        assert_eq!(loaded.commit.prefix, "[repowiki]");
    }

    #[test]
    fn test_load_missing_and_invalid() {
        let dir = TempDir::new().unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(Error::ConfigNotFound(_))
        ));
        assert!(Config::load_or_default(dir.path()).is_ok());

        fs::create_dir_all(Config::dir(dir.path())).unwrap();
        fs::write(Config::path(dir.path()), "enabled = [not toml").unwrap();
        assert!(matches!(
            Config::load(dir.path()),
            Err(Error::ConfigParse(_))
        ));
    }

    #[test]
    fn test_record_last_run() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.save(dir.path()).unwrap();
        config.record_last_run(dir.path(), Some("abc123")).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert_eq!(loaded.last_commit_hash(), Some("abc123"));
        assert!(loaded.state.is_some());
    }

    #[test]
    fn test_record_last_run_keeps_edits_on_disk() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.save(dir.path()).unwrap();

        let mut edited = Config::load(dir.path()).unwrap();
        edited.enabled = false;
        edited.engine.max_turns = 7;
        edited.save(dir.path()).unwrap();

        config.record_last_run(dir.path(), Some("abc123")).unwrap();

        let loaded = Config::load(dir.path()).unwrap();
        assert!(!loaded.enabled);
        assert_eq!(loaded.engine.max_turns, 7);
        assert_eq!(loaded.last_commit_hash(), Some("abc123"));
    }

    #[test]
    fn test_record_last_run_without_config_file() {
        let dir = TempDir::new().unwrap();
        let mut config = Config::default();
        config.record_last_run(dir.path(), Some("abc123")).unwrap();

        assert_eq!(config.last_commit_hash(), Some("abc123"));
        assert!(matches!(
            Config::load(dir.path()),
            Err(Error::ConfigNotFound(_))
        ));
    }

    #[test]
    fn test_docs_exist() {
        let dir = TempDir::new().unwrap();
        let config = Config::default();
        assert!(!config.docs_exist(dir.path()));

        let content = config.content_dir(dir.path());
        fs::create_dir_all(&content).unwrap();
        assert!(!config.docs_exist(dir.path()));

        fs::write(content.join("Overview.md"), "# Overview\n").unwrap();
        assert!(config.docs_exist(dir.path()));
    }
}
