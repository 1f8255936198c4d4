//! repowiki library.
//!
//! Keeps a repository wiki in sync with the code: after each commit the
//! changed paths are classified, an external generation engine rewrites the
//! affected pages, and the result is committed without re-triggering itself.

pub mod classify;
pub mod cli;
pub mod config;
pub mod engine;
pub mod error;
pub mod git;
pub mod guard;
pub mod lock;
pub mod orchestrator;
pub mod prompt;
pub mod runlog;

pub use error::Error;
