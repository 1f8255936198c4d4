//! Qoder CLI (`qodercli`).

use std::path::{Path, PathBuf};

use super::{resolve_binary, run_cli, Engine, EngineRequest, EngineResult, SearchEnv, ALLOWED_TOOLS};
use crate::error::Error;

/// Qoder's headless CLI.
#[derive(Debug, Default, Clone, Copy)]
pub struct Qoder;

impl Qoder {
    pub const ID: &'static str = "qoder";
    const BINARY: &'static str = "qodercli";

    /// CLI bundled inside the desktop app.
    fn well_known() -> Vec<PathBuf> {
        if cfg!(target_os = "macos") {
            vec![
                PathBuf::from("/Applications/Qoder.app/Contents/Resources/app/resources/bin/aarch64_darwin/qodercli"),
                PathBuf::from("/Applications/Qoder.app/Contents/Resources/app/resources/bin/x86_64_darwin/qodercli"),
            ]
        } else {
            Vec::new()
        }
    }

    /// Command-line arguments for a request.
    pub fn args(request: &EngineRequest) -> Vec<String> {
        let mut args = vec![
            "-p".to_string(),
            request.prompt.clone(),
            "-q".to_string(),
            "-w".to_string(),
            request.workdir.display().to_string(),
            "--max-turns".to_string(),
            request.max_turns.to_string(),
            "--dangerously-skip-permissions".to_string(),
            "--allowed-tools".to_string(),
            ALLOWED_TOOLS.to_string(),
        ];
        if let Some(model) = &request.model {
            args.push("--model".to_string());
            args.push(model.clone());
        }
        args
    }
}

impl Engine for Qoder {
    fn id(&self) -> &str {
        Self::ID
    }

    fn locate(&self, configured: Option<&Path>, env: &SearchEnv) -> Result<PathBuf, Error> {
        resolve_binary(
            Self::ID,
            Self::BINARY,
            configured,
            env,
            &Self::well_known(),
            "install Qoder or set engine.path in .repowiki/config.toml",
        )
    }

    fn invoke(&self, binary: &Path, request: &EngineRequest) -> Result<EngineResult, Error> {
        run_cli(Self::ID, binary, &request.workdir, &Self::args(request))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn request(model: Option<&str>) -> EngineRequest {
        EngineRequest {
            prompt: "update the wiki".to_string(),
            workdir: PathBuf::from("/repo"),
            max_turns: 50,
            model: model.map(str::to_string),
        }
    }

    #[test]
    fn test_args() {
        let args = Qoder::args(&request(None));
        assert_eq!(
            args,
            vec![
                "-p",
                "update the wiki",
                "-q",
                "-w",
                "/repo",
                "--max-turns",
                "50",
                "--dangerously-skip-permissions",
                "--allowed-tools",
                "Read,Write,Edit,Glob,Grep,Bash",
            ]
        );
    }

    #[test]
    fn test_args_with_model() {
        let args = Qoder::args(&request(Some("performance")));
        assert_eq!(&args[args.len() - 2..], ["--model", "performance"]);
    }

    #[test]
    fn test_not_found() {
        let err = Qoder.locate(None, &SearchEnv::default()).unwrap_err();
        assert!(matches!(err, Error::EngineNotFound { ref engine, .. } if engine == "qoder"));
    }
}
