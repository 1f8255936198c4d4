//! OpenAI Codex CLI (`codex`).

use std::path::{Path, PathBuf};

use super::{resolve_binary, run_cli, Engine, EngineRequest, EngineResult, SearchEnv};
use crate::error::Error;

/// Codex in non-interactive `exec` mode.
#[derive(Debug, Default, Clone, Copy)]
pub struct Codex;

impl Codex {
    pub const ID: &'static str = "codex";
    const BINARY: &'static str = "codex";

    fn well_known(env: &SearchEnv) -> Vec<PathBuf> {
        let mut paths: Vec<PathBuf> = env.home_join(".local/bin/codex").into_iter().collect();
        paths.push(PathBuf::from("/usr/local/bin/codex"));
        paths.push(PathBuf::from("/opt/homebrew/bin/codex"));
        paths
    }

    /// Command-line arguments for a request.
    ///
    /// Codex has no turn limit flag; `--full-auto` covers both the
    /// permission bypass and the tool allowlist.
    pub fn args(request: &EngineRequest) -> Vec<String> {
        let mut args = vec![
            "exec".to_string(),
            request.prompt.clone(),
            "--full-auto".to_string(),
        ];
        if let Some(model) = &request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args
    }
}

impl Engine for Codex {
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
            "install OpenAI Codex CLI or set engine.path in .repowiki/config.toml",
        )
    }

    fn invoke(&self, binary: &Path, request: &EngineRequest) -> Result<EngineResult, Error> {
        run_cli(Self::ID, binary, &request.workdir, &Self::args(request))
    }
}
