//! `generate` and `update`: build a run request and drive the orchestrator.
//!
//! The orchestrator blocks until the engine exits, so it runs on a blocking
//! task raced against Ctrl-C. An interrupt kills the engine, then releases
//! the lock before exiting.

use std::path::Path;
use std::sync::Arc;

use tracing::{debug, error, warn};

use crate::config::Config;
use crate::engine::RunningEngines;
use crate::error::Error;
use crate::git::{ChangeScope, GitProvider};
use crate::orchestrator::{Orchestrator, Outcome, RunOrigin, RunRequest};
use crate::runlog::RunLog;

/// Exit status after an interrupt.
const INTERRUPTED_EXIT: i32 = 130;

/// Which changes `update` should look at.
#[derive(Debug, Clone, Default)]
pub struct UpdateOptions {
    pub commit: Option<String>,
    pub since_last: bool,
    pub from_hook: bool,
}

/// Run `repowiki generate`.
pub async fn generate() -> Result<(), Error> {
    let git = super::current_repo()?;
    let config = Config::load_or_default(git.root())?;
    execute(config, Arc::new(git), RunRequest::full(RunOrigin::Manual)).await
}

/// Run `repowiki update`.
pub async fn update(options: UpdateOptions) -> Result<(), Error> {
    let git = super::current_repo()?;
    let config = load_for(git.root(), options.from_hook)?;
    let request = update_request(&config, &options);
    execute(config, Arc::new(git), request).await
}

/// Config for a run. A hook firing in an unconfigured repository runs disabled.
fn load_for(root: &Path, from_hook: bool) -> Result<Config, Error> {
    match Config::load(root) {
        Ok(config) => Ok(config),
        Err(Error::ConfigNotFound(path)) => {
            debug!(path = %path.display(), "No config, using defaults");
            let mut config = Config::default();
            if from_hook {
                config.enabled = false;
            }
            Ok(config)
        }
        Err(e) => Err(e),
    }
}

/// Translate `update` flags into a request.
pub fn update_request(config: &Config, options: &UpdateOptions) -> RunRequest {
    let origin = if options.from_hook {
        RunOrigin::Hook
    } else {
        RunOrigin::Manual
    };

    let scope = if let Some(rev) = &options.commit {
        ChangeScope::Commit(rev.clone())
    } else if options.since_last {
        match config.last_commit_hash() {
            Some(hash) => ChangeScope::Range {
                from: hash.to_string(),
                to: "HEAD".to_string(),
            },
            None => {
                warn!("No previous run recorded, updating for HEAD only");
                ChangeScope::Head
            }
        }
    } else {
        ChangeScope::Head
    };

    RunRequest::incremental(scope, origin)
}

async fn execute(config: Config, git: Arc<dyn GitProvider>, request: RunRequest) -> Result<(), Error> {
    let root = git.root().to_path_buf();
    let mut orchestrator = Orchestrator::new(config, git);
    let locks = orchestrator.lock_manager().clone();

    let task = tokio::task::spawn_blocking(move || orchestrator.run(request));

    tokio::select! {
        joined = task => {
            let outcome = joined.map_err(|e| Error::other(format!("run task failed: {e}")))??;
            match &outcome.outcome {
                Outcome::Skipped(reason) => println!("Skipped: {reason}"),
                other => println!("Done: {other}"),
            }
            Ok(())
        }
        _ = tokio::signal::ctrl_c() => {
            warn!("Interrupted, stopping engine and releasing run lock");
            let killed = RunningEngines::global().kill_all();
            debug!(killed, "Engines stopped after interrupt");
            match locks.force_release() {
                Ok(released) => debug!(released, "Lock release after interrupt"),
                Err(e) => error!(error = %e, "Failed to release run lock"),
            }
            RunLog::new(&root).append("interrupted");
            std::process::exit(INTERRUPTED_EXIT);
        }
    }
}
