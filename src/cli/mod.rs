//! CLI commands for repowiki.

pub mod disable;
pub mod enable;
pub mod gitignore;
pub mod hooks;
pub mod logs;
pub mod run;
pub mod status;

use std::path::PathBuf;

use crate::config::Config;
use crate::engine::{EngineRegistry, SearchEnv};
use crate::error::Error;
use crate::git::GitCli;

/// Repository containing the current directory.
pub fn current_repo() -> Result<GitCli, Error> {
    let cwd = std::env::current_dir()?;
    GitCli::discover(&cwd)
}

/// Resolve the configured engine's binary.
pub fn locate_engine(config: &Config) -> Result<PathBuf, Error> {
    let engine = EngineRegistry::builtin().get(&config.engine.id)?;
    engine.locate(config.engine.path.as_deref(), &SearchEnv::from_env())
}
