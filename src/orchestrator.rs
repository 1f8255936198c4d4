//! Run orchestration.
//!
//! One [`Orchestrator::run`] call drives a single run through
//! `Idle → Locking → [Classifying] → Generating → [Committing] → Done`, with
//! `Failed` reachable from any non-terminal state. The commit guard is
//! evaluated before anything else; the lock is released before any terminal
//! state is reported.

use std::fmt;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use tracing::{info, warn};
use uuid::Uuid;

use crate::classify::{Classifier, Decision};
use crate::config::Config;
use crate::engine::{EngineRegistry, EngineRequest, SearchEnv};
use crate::error::Error;
use crate::git::{ChangeScope, GitProvider};
use crate::guard::{CommitGuard, CommitRecord};
use crate::lock::LockManager;
use crate::prompt;
use crate::runlog::RunLog;

/// Who started the run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunOrigin {
    /// The post-commit hook.
    Hook,
    /// A user on the command line.
    Manual,
}

impl fmt::Display for RunOrigin {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RunOrigin::Hook => f.write_str("hook"),
            RunOrigin::Manual => f.write_str("manual"),
        }
    }
}

/// What the caller asked for.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RunMode {
    /// Regenerate everything; no classification.
    Full,
    /// Classify the changes in scope first.
    Incremental(ChangeScope),
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunRequest {
    pub mode: RunMode,
    pub origin: RunOrigin,
}

impl RunRequest {
    pub fn full(origin: RunOrigin) -> Self {
        Self {
            mode: RunMode::Full,
            origin,
        }
    }

    pub fn incremental(scope: ChangeScope, origin: RunOrigin) -> Self {
        Self {
            mode: RunMode::Incremental(scope),
            origin,
        }
    }

    /// Whether the commit guard applies. A manual full regeneration bypasses it.
    fn guarded(&self) -> bool {
        self.origin == RunOrigin::Hook || matches!(self.mode, RunMode::Incremental(_))
    }
}

/// Run state.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RunState {
    Idle,
    Locking,
    Classifying,
    Generating,
    Committing,
    Done,
    Failed,
}

impl RunState {
    pub fn is_terminal(self) -> bool {
        matches!(self, RunState::Done | RunState::Failed)
    }

    /// Legal transitions.
    pub fn can_transition(self, to: RunState) -> bool {
        use RunState::*;
        match (self, to) {
            (from, Failed) => !from.is_terminal(),
            (Idle, Locking | Done) => true,
            (Locking, Classifying | Generating) => true,
            (Classifying, Generating | Done) => true,
            (Generating, Committing | Done) => true,
            (Committing, Done) => true,
            _ => false,
        }
    }
}

impl fmt::Display for RunState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let name = match self {
            RunState::Idle => "idle",
            RunState::Locking => "locking",
            RunState::Classifying => "classifying",
            RunState::Generating => "generating",
            RunState::Committing => "committing",
            RunState::Done => "done",
            RunState::Failed => "failed",
        };
        f.write_str(name)
    }
}

/// Why a run did nothing.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SkipReason {
    /// Hook run while the project is disabled.
    Disabled,
    /// The latest commit was made by this tool.
    AutomatedCommit,
    /// Every changed path is excluded.
    NoRelevantChanges,
}

impl fmt::Display for SkipReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SkipReason::Disabled => f.write_str("repowiki is disabled"),
            SkipReason::AutomatedCommit => f.write_str("latest commit is a repowiki commit"),
            SkipReason::NoRelevantChanges => f.write_str("no relevant changes"),
        }
    }
}

/// Kind of generation actually performed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GenerationMode {
    Full,
    Incremental,
}

impl fmt::Display for GenerationMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            GenerationMode::Full => f.write_str("full"),
            GenerationMode::Incremental => f.write_str("incremental"),
        }
    }
}

/// Terminal result of a successful run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Outcome {
    Skipped(SkipReason),
    Generated {
        mode: GenerationMode,
        output_len: usize,
        commit: Option<CommitRecord>,
    },
}

impl fmt::Display for Outcome {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Outcome::Skipped(reason) => write!(f, "skipped: {reason}"),
            Outcome::Generated {
                mode,
                commit: Some(record),
                ..
            } => write!(f, "{mode} generation committed as {}", short(&record.hash)),
            Outcome::Generated { mode, .. } => write!(f, "{mode} generation, nothing committed"),
        }
    }
}

/// Summary of a finished run.
#[derive(Debug, Clone)]
pub struct RunOutcome {
    pub run_id: Uuid,
    pub outcome: Outcome,
    /// Every state the run passed through, `Idle` first.
    pub states: Vec<RunState>,
}

/// Per-run bookkeeping.
struct Run {
    id: Uuid,
    state: RunState,
    states: Vec<RunState>,
    log: RunLog,
}

impl Run {
    fn new(log: &RunLog) -> Self {
        let id = Uuid::new_v4();
        let tag = id.simple().to_string()[..8].to_string();
        Self {
            id,
            state: RunState::Idle,
            states: vec![RunState::Idle],
            log: log.tagged(tag),
        }
    }

    fn advance(&mut self, to: RunState) {
        debug_assert!(
            self.state.can_transition(to),
            "illegal transition {} -> {}",
            self.state,
            to
        );
        self.state = to;
        self.states.push(to);
    }

    fn log(&self, message: &str) {
        self.log.append(message);
    }
}

/// Drives runs for one repository.
pub struct Orchestrator {
    config: Config,
    root: PathBuf,
    git: Arc<dyn GitProvider>,
    engines: EngineRegistry,
    locks: LockManager,
    search: SearchEnv,
    log: RunLog,
}

impl fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Orchestrator")
            .field("root", &self.root)
            .field("engine", &self.config.engine.id)
            .field("locks", &self.locks)
            .finish()
    }
}

impl Orchestrator {
    /// Orchestrator for the repository behind `git`, with the built-in engines.
    pub fn new(config: Config, git: Arc<dyn GitProvider>) -> Self {
        let root = git.root().to_path_buf();
        let locks = LockManager::new(&root, Duration::from_secs(config.lock.stale_after_secs));
        Self {
            log: RunLog::new(&root),
            search: SearchEnv::from_env(),
            engines: EngineRegistry::builtin(),
            config,
            root,
            git,
            locks,
        }
    }

    pub fn with_engines(mut self, engines: EngineRegistry) -> Self {
        self.engines = engines;
        self
    }

    pub fn with_lock_manager(mut self, locks: LockManager) -> Self {
        self.locks = locks;
        self
    }

    pub fn with_search_env(mut self, search: SearchEnv) -> Self {
        self.search = search;
        self
    }

    pub fn with_run_log(mut self, log: RunLog) -> Self {
        self.log = log;
        self
    }

    pub fn config(&self) -> &Config {
        &self.config
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    pub fn lock_manager(&self) -> &LockManager {
        &self.locks
    }

    /// Execute one run to a terminal state.
    pub fn run(&mut self, request: RunRequest) -> Result<RunOutcome, Error> {
        let mut run = Run::new(&self.log);
        info!(run_id = %run.id, origin = %request.origin, mode = ?request.mode, "Starting run");
        run.log(&format!("starting {} run ({})", mode_label(&request.mode), request.origin));

        if request.origin == RunOrigin::Hook && !self.config.enabled {
            return Ok(self.finish(run, Outcome::Skipped(SkipReason::Disabled)));
        }

        if request.guarded() {
            let guard = CommitGuard::new(&self.config.commit.prefix);
            match guard.should_skip(self.git.as_ref()) {
                Ok(true) => {
                    return Ok(self.finish(run, Outcome::Skipped(SkipReason::AutomatedCommit)))
                }
                Ok(false) => {}
                Err(e) => return Err(self.fail(run, e)),
            }
        }

        run.advance(RunState::Locking);
        let lock = match self.locks.acquire() {
            Ok(lock) => lock,
            Err(e) => return Err(self.fail(run, e)),
        };

        let result = self.execute(&mut run, request.mode);

        if let Err(e) = lock.release() {
            warn!(error = %e, "Failed to release run lock");
        }

        match result {
            Ok(outcome) => Ok(self.finish(run, outcome)),
            Err(e) => Err(self.fail(run, e)),
        }
    }

    /// Everything that happens while the lock is held.
    fn execute(&mut self, run: &mut Run, mode: RunMode) -> Result<Outcome, Error> {
        let head = self.git.head()?;

        let (mode, prompt, description) = match mode {
            RunMode::Full => {
                run.log("classification: full (requested)");
                (
                    GenerationMode::Full,
                    prompt::full(&self.config.docs),
                    "full wiki generation".to_string(),
                )
            }
            RunMode::Incremental(scope) => {
                run.advance(RunState::Classifying);
                let changes = self.git.changed_paths(&scope)?;
                let decision = Classifier::from_config(&self.config.docs).classify(&changes);
                info!(decision = %decision, changed = changes.len(), "Classified changes");
                run.log(&format!(
                    "classification: {decision} ({} changed paths)",
                    changes.len()
                ));

                match decision {
                    Decision::Skip => return Ok(Outcome::Skipped(SkipReason::NoRelevantChanges)),
                    Decision::Full => (
                        GenerationMode::Full,
                        prompt::full(&self.config.docs),
                        "full wiki generation".to_string(),
                    ),
                    Decision::Incremental { .. } if !self.config.docs_exist(&self.root) => {
                        run.log("no existing wiki content, escalating to full generation");
                        (
                            GenerationMode::Full,
                            prompt::full(&self.config.docs),
                            "full wiki generation".to_string(),
                        )
                    }
                    Decision::Incremental { sections, paths } => (
                        GenerationMode::Incremental,
                        prompt::incremental(&self.config.docs, &paths, &sections),
                        format!("update wiki for {} changed files", paths.len()),
                    ),
                }
            }
        };

        run.advance(RunState::Generating);
        let engine = self.engines.get(&self.config.engine.id)?;
        let binary = engine.locate(self.config.engine.path.as_deref(), &self.search)?;
        info!(engine = engine.id(), binary = %binary.display(), mode = %mode, "Invoking engine");

        let request = EngineRequest {
            prompt,
            workdir: self.root.clone(),
            max_turns: self.config.engine.max_turns,
            model: self.config.engine.model.clone(),
        };
        let result = engine.invoke(&binary, &request)?;
        info!(output_len = result.output.len(), "Engine completed");
        run.log(&format!(
            "engine {} completed, output length: {}",
            engine.id(),
            result.output.len()
        ));

        let commit = if self.config.commit.auto_commit {
            run.advance(RunState::Committing);
            let guard = CommitGuard::new(&self.config.commit.prefix);
            let record = guard.commit(self.git.as_ref(), &self.config.docs.path, &description)?;
            match &record {
                Some(r) => run.log(&format!("committed {}: {}", short(&r.hash), guard.message(&r.description))),
                None => run.log("no wiki changes to commit"),
            }
            record
        } else {
            None
        };

        if let Err(e) = self.config.record_last_run(&self.root, head.as_deref()) {
            warn!(error = %e, "Failed to record last run");
            run.log(&format!("failed to record last run: {e}"));
        }

        Ok(Outcome::Generated {
            mode,
            output_len: result.output.len(),
            commit,
        })
    }

    fn finish(&self, mut run: Run, outcome: Outcome) -> RunOutcome {
        run.advance(RunState::Done);
        info!(run_id = %run.id, outcome = %outcome, "Run finished");
        run.log(&format!("done: {outcome}"));
        RunOutcome {
            run_id: run.id,
            outcome,
            states: run.states,
        }
    }

    fn fail(&self, mut run: Run, error: Error) -> Error {
        let from = run.state;
        run.advance(RunState::Failed);
        warn!(run_id = %run.id, state = %from, error = %error, "Run failed");
        if error.content_generated() {
            run.log(&format!("failed: content generated but not committed: {error}"));
        } else {
            run.log(&format!("failed during {from}: {error}"));
        }
        error
    }
}

fn mode_label(mode: &RunMode) -> &'static str {
    match mode {
        RunMode::Full => "full",
        RunMode::Incremental(_) => "incremental",
    }
}

fn short(hash: &str) -> &str {
    hash.get(..8).unwrap_or(hash)
}
