//! Claude Code (`claude`).

use std::path::{Path, PathBuf};

use super::{resolve_binary, run_cli, Engine, EngineRequest, EngineResult, SearchEnv, ALLOWED_TOOLS};
use crate::error::Error;

/// Claude Code in print mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct ClaudeCode;

impl ClaudeCode {
    pub const ID: &'static str = "claude-code";
    const BINARY: &'static str = "claude";

    fn well_known(env: &SearchEnv) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = [".local/bin/claude", ".claude/bin/claude"]
            .iter()
            .filter_map(|rel| env.home_join(rel))
            .collect();
        paths.push(PathBuf::from("/usr/local/bin/claude"));
        paths
    }

    /// Command-line arguments for a request.
    pub fn args(request: &EngineRequest) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            request.prompt.clone(),
            "--dangerously-skip-permissions".to_string(),
            "--allowedTools".to_string(),
            ALLOWED_TOOLS.to_string(),
            "--max-turns".to_string(),
            request.max_turns.to_string(),
        ];
        if let Some(model) = &request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args
    }
}

impl Engine for ClaudeCode {
    fn id(&self) -> &str {
        Self::ID
    }

    fn locate(&self, configured: Option<&Path>, env: &SearchEnv) -> Result<PathBuf, Error> {
        resolve_binary(
            Self::ID,
            Self::BINARY,
            configured,
            env,
            &Self::well_known(env),
            "install Claude Code or set engine.path in .repowiki/config.toml",
        )
    }

    fn invoke(&self, binary: &Path, request: &EngineRequest) -> Result<EngineResult, Error> {
        run_cli(Self::ID, binary, &request.workdir, &Self::args(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[test]
    fn test_args() {
        let request = EngineRequest {
            prompt: "document src/".to_string(),
            workdir: PathBuf::from("/repo"),
            max_turns: 10,
            model: Some("sonnet".to_string()),
        };
        let args = ClaudeCode::args(&request);
        assert_eq!(args[0], "-p");
        assert_eq!(args[1], "document src/");
        assert!(args.contains(&"--allowedTools".to_string()));
        assert!(!args.contains(&"--allowed-tools".to_string()));
        assert_eq!(&args[args.len() - 2..], ["--model", "sonnet"]);
    }

    #[cfg(unix)]
    #[test]
    fn test_falls_back_to_home_install() {
        let home = TempDir::new().unwrap();
        let bin_dir = home.path().join(".local/bin");
        std::fs::create_dir_all(&bin_dir).unwrap();
        let installed = crate::engine::test_support::write_script(&bin_dir, "claude", "true");

        let env = SearchEnv {
            path: Some(std::ffi::OsString::new()),
            home: Some(home.path().to_path_buf()),
        };
        let missing = home.path().join("missing/claude");
        let found = ClaudeCode.locate(Some(&missing), &env).unwrap();
        assert_eq!(found, installed);
    }

    #[cfg(unix)]
    #[test]
    fn test_invoke_runs_in_workdir() {
        let dir = TempDir::new().unwrap();
        let script = crate::engine::test_support::write_script(
            dir.path(),
            "claude",
            "for arg in \"$@\"; do echo \"$arg\"; done",
        );
        let request = EngineRequest {
            prompt: "hi".to_string(),
            workdir: dir.path().to_path_buf(),
            max_turns: 3,
            model: None,
        };

        let result = ClaudeCode.invoke(&script, &request).unwrap();
        let lines: Vec<&str> = result.output.lines().collect();
        assert_eq!(lines[0], "-p");
        assert_eq!(lines[1], "hi");
        assert!(lines.contains(&"--dangerously-skip-permissions"));
    }
}
