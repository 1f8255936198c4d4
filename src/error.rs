//! Error types for repowiki.

use std::path::PathBuf;

use thiserror::Error;

/// Crate error type.
#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("Format error: {0}")]
    Fmt(#[from] std::fmt::Error),

    #[error("Config not found: {0} (run 'repowiki enable' first)")]
    ConfigNotFound(PathBuf),

    #[error("Config parse error: {0}")]
    ConfigParse(String),

    #[error("Not a git repository: {0}")]
    NotAGitRepo(PathBuf),

    #[error("Git error: {0}")]
    Git(String),

    /// Another run holds a lock that is not yet stale.
    #[error("Another repowiki run is in progress (pid {pid}, started {started_at})")]
    LockHeld { pid: u32, started_at: String },

    #[error("Unknown engine: {engine} (valid: {valid})")]
    UnknownEngine { engine: String, valid: String },

    #[error("{engine} not found; {hint}")]
    EngineNotFound { engine: String, hint: String },

    #[error("{engine} failed ({status})\n{diagnostics}")]
    EngineInvocationFailed {
        engine: String,
        status: String,
        diagnostics: String,
    },

    /// Generation succeeded but the auto-commit did not.
    #[error("Wiki content generated but not committed: {0}")]
    CommitFailed(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn other(msg: impl Into<String>) -> Self {
        Error::Other(msg.into())
    }

    /// True when the engine already wrote content before the run failed.
    pub fn content_generated(&self) -> bool {
        matches!(self, Error::CommitFailed(_))
    }

    /// Process exit status for this error.
    pub fn exit_code(&self) -> i32 {
        match self {
            // EX_TEMPFAIL: try again later
            Error::LockHeld { .. } => 75,
            Error::CommitFailed(_) => 3,
            _ => 1,
        }
    }
}

impl From<toml::de::Error> for Error {
    fn from(e: toml::de::Error) -> Self {
        Error::ConfigParse(e.to_string())
    }
}

impl From<toml::ser::Error> for Error {
    fn from(e: toml::ser::Error) -> Self {
        Error::ConfigParse(e.to_string())
    }
}
