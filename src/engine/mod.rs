//! Generation engines.
//!
//! An engine is an external AI coding CLI that edits the wiki on disk when
//! given a natural-language instruction. Every engine exposes the same two
//! capabilities: `locate` its binary and `invoke` it once per run. The
//! registry maps engine ids from config to implementations.

pub mod claude;
pub mod codex;
pub mod qoder;

use std::collections::BTreeMap;
use std::ffi::OsString;
use std::io::{self, Read};
use std::path::{Path, PathBuf};
use std::process::{Child, Command, ExitStatus, Stdio};
use std::sync::{Arc, Mutex, MutexGuard, OnceLock, PoisonError};
use std::thread::{self, JoinHandle};
use std::time::Duration;

use tracing::{debug, info, warn};

use crate::error::Error;

pub use claude::ClaudeCode;
pub use codex::Codex;
pub use qoder::Qoder;

/// How often a running engine is checked for exit.
const POLL_INTERVAL: Duration = Duration::from_millis(50);

static RUNNING: OnceLock<RunningEngines> = OnceLock::new();

/// Tools the engine may use without prompting.
pub const ALLOWED_TOOLS: &str = "Read,Write,Edit,Glob,Grep,Bash";

/// One engine invocation.
#[derive(Debug, Clone)]
pub struct EngineRequest {
    pub prompt: String,
    /// Working directory for the engine process (repository root).
    pub workdir: PathBuf,
    pub max_turns: u32,
    pub model: Option<String>,
}

/// Output of a successful invocation. Never parsed for structure.
#[derive(Debug, Clone)]
pub struct EngineResult {
    /// Stdout followed by any stderr.
    pub output: String,
    pub exit_code: Option<i32>,
}

/// External generation engine.
pub trait Engine: Send + Sync {
    /// Id used in config.
    fn id(&self) -> &str;

    /// Resolve the binary: configured path, then PATH, then known locations.
    fn locate(&self, configured: Option<&Path>, env: &SearchEnv) -> Result<PathBuf, Error>;

    /// Run the engine once and wait for it to exit.
    fn invoke(&self, binary: &Path, request: &EngineRequest) -> Result<EngineResult, Error>;
}

/// Where to look for engine binaries.
#[derive(Debug, Clone, Default)]
pub struct SearchEnv {
    /// PATH-style search list.
    pub path: Option<OsString>,
    pub home: Option<PathBuf>,
}

impl SearchEnv {
    /// Search environment of the current process.
    pub fn from_env() -> Self {
        Self {
            path: std::env::var_os("PATH"),
            home: dirs::home_dir(),
        }
    }

    /// Find an executable by name on the search path.
    pub fn lookup(&self, name: &str) -> Option<PathBuf> {
        let path = self.path.as_ref()?;
        std::env::split_paths(path)
            .filter(|dir| !dir.as_os_str().is_empty())
            .map(|dir| dir.join(name))
            .find(|candidate| is_executable(candidate))
    }

    /// Resolve a path relative to the home directory.
    pub fn home_join(&self, relative: &str) -> Option<PathBuf> {
        self.home.as_ref().map(|home| home.join(relative))
    }
}

/// Shared resolution order used by the built-in engines.
pub(crate) fn resolve_binary(
    engine: &str,
    binary_name: &str,
    configured: Option<&Path>,
    env: &SearchEnv,
    well_known: &[PathBuf],
    hint: &str,
) -> Result<PathBuf, Error> {
    if let Some(path) = configured {
        if path.exists() {
            debug!(engine, path = %path.display(), "Using configured engine path");
            return Ok(path.to_path_buf());
        }
        debug!(engine, path = %path.display(), "Configured engine path does not exist");
    }

    if let Some(path) = env.lookup(binary_name) {
        debug!(engine, path = %path.display(), "Found engine on PATH");
        return Ok(path);
    }

    if let Some(path) = well_known.iter().find(|p| p.is_file()) {
        debug!(engine, path = %path.display(), "Found engine in well-known location");
        return Ok(path.clone());
    }

    Err(Error::EngineNotFound {
        engine: engine.to_string(),
        hint: hint.to_string(),
    })
}

/// Engine processes in flight, so an interrupt can stop them.
#[derive(Debug, Clone, Default)]
pub struct RunningEngines {
    children: Arc<Mutex<Vec<Child>>>,
}

impl RunningEngines {
    /// Tracker used by the built-in engines.
    pub fn global() -> &'static RunningEngines {
        RUNNING.get_or_init(RunningEngines::default)
    }

    /// Number of tracked processes.
    pub fn count(&self) -> usize {
        self.children().len()
    }

    /// Kill and reap every tracked process. Returns how many were stopped.
    pub fn kill_all(&self) -> usize {
        let mut children = self.children();
        let count = children.len();
        for mut child in children.drain(..) {
            let pid = child.id();
            if let Err(e) = child.kill() {
                warn!(pid, error = %e, "Failed to kill engine");
            }
            if let Err(e) = child.wait() {
                warn!(pid, error = %e, "Failed to reap engine");
            }
            info!(pid, "Killed engine");
        }
        count
    }

    fn children(&self) -> MutexGuard<'_, Vec<Child>> {
        self.children.lock().unwrap_or_else(PoisonError::into_inner)
    }

    fn track(&self, child: Child) -> u32 {
        let pid = child.id();
        self.children().push(child);
        pid
    }

    /// Wait for `pid` to exit. `None` if it was killed through `kill_all`.
    fn wait(&self, pid: u32) -> io::Result<Option<ExitStatus>> {
        loop {
            {
                let mut children = self.children();
                let Some(pos) = children.iter().position(|c| c.id() == pid) else {
                    return Ok(None);
                };
                match children[pos].try_wait() {
                    Ok(Some(status)) => {
                        children.swap_remove(pos);
                        return Ok(Some(status));
                    }
                    Ok(None) => {}
                    Err(e) => {
                        children.swap_remove(pos);
                        return Err(e);
                    }
                }
            }
            thread::sleep(POLL_INTERVAL);
        }
    }
}

/// Spawn a CLI engine in `workdir`, wait for it and collect its output.
pub(crate) fn run_cli(
    engine: &str,
    binary: &Path,
    workdir: &Path,
    args: &[String],
) -> Result<EngineResult, Error> {
    run_tracked(RunningEngines::global(), engine, binary, workdir, args)
}

fn run_tracked(
    running: &RunningEngines,
    engine: &str,
    binary: &Path,
    workdir: &Path,
    args: &[String],
) -> Result<EngineResult, Error> {
    info!(engine, binary = %binary.display(), "Invoking engine");

    let failed = |status: &str, diagnostics: String| Error::EngineInvocationFailed {
        engine: engine.to_string(),
        status: status.to_string(),
        diagnostics,
    };

    let mut child = Command::new(binary)
        .args(args)
        .current_dir(workdir)
        .stdin(Stdio::null())
        .stdout(Stdio::piped())
        .stderr(Stdio::piped())
        .spawn()
        .map_err(|e| failed("spawn failed", e.to_string()))?;

    let stdout = read_pipe(child.stdout.take());
    let stderr = read_pipe(child.stderr.take());
    let pid = running.track(child);
    debug!(engine, pid, "Engine started");

    let status = match running.wait(pid) {
        Ok(Some(status)) => status,
        Ok(None) => {
            return Err(failed("killed", "stopped before it finished".to_string()));
        }
        Err(e) => return Err(failed("wait failed", e.to_string())),
    };

    let stdout = join_pipe(stdout)?;
    let stderr = join_pipe(stderr)?;
    let stdout = String::from_utf8_lossy(&stdout);
    let stderr = String::from_utf8_lossy(&stderr);

    if !status.success() {
        let diagnostics = if stderr.trim().is_empty() {
            stdout.trim()
        } else {
            stderr.trim()
        };
        return Err(failed(&status.to_string(), diagnostics.to_string()));
    }

    let mut combined = stdout.into_owned();
    if !stderr.trim().is_empty() {
        if !combined.is_empty() && !combined.ends_with('\n') {
            combined.push('\n');
        }
        combined.push_str(&stderr);
    }

    Ok(EngineResult {
        output: combined,
        exit_code: status.code(),
    })
}

/// Drain a child pipe on its own thread.
fn read_pipe<R: Read + Send + 'static>(pipe: Option<R>) -> JoinHandle<io::Result<Vec<u8>>> {
    thread::spawn(move || {
        let mut buf = Vec::new();
        if let Some(mut pipe) = pipe {
            pipe.read_to_end(&mut buf)?;
        }
        Ok(buf)
    })
}

fn join_pipe(handle: JoinHandle<io::Result<Vec<u8>>>) -> Result<Vec<u8>, Error> {
    let buf = handle
        .join()
        .map_err(|_| Error::other("engine output reader panicked"))??;
    Ok(buf)
}

#[cfg(unix)]
fn is_executable(path: &Path) -> bool {
    use std::os::unix::fs::PermissionsExt;
    path.metadata()
        .map(|m| m.is_file() && m.permissions().mode() & 0o111 != 0)
        .unwrap_or(false)
}

#[cfg(not(unix))]
fn is_executable(path: &Path) -> bool {
    path.is_file()
}

/// Engines available to the orchestrator, keyed by id.
#[derive(Clone, Default)]
pub struct EngineRegistry {
    engines: BTreeMap<String, Arc<dyn Engine>>,
}

impl EngineRegistry {
    /// Registry with no engines.
    pub fn empty() -> Self {
        Self::default()
    }

    /// Registry with the built-in engines.
    pub fn builtin() -> Self {
        let mut registry = Self::empty();
        registry.register(Arc::new(Qoder));
        registry.register(Arc::new(ClaudeCode));
        registry.register(Arc::new(Codex));
        registry
    }

    /// Add or replace an engine.
    pub fn register(&mut self, engine: Arc<dyn Engine>) {
        self.engines.insert(engine.id().to_string(), engine);
    }

    /// Look up an engine by id.
    pub fn get(&self, id: &str) -> Result<Arc<dyn Engine>, Error> {
        self.engines
            .get(id)
            .cloned()
            .ok_or_else(|| Error::UnknownEngine {
                engine: id.to_string(),
                valid: self.ids().join(", "),
            })
    }

    pub fn contains(&self, id: &str) -> bool {
        self.engines.contains_key(id)
    }

    /// Registered ids, sorted.
    pub fn ids(&self) -> Vec<&str> {
        self.engines.keys().map(String::as_str).collect()
    }
}

impl std::fmt::Debug for EngineRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("EngineRegistry")
            .field("engines", &self.ids())
            .finish()
    }
}

#[cfg(test)]
pub(crate) mod test_support {
    use std::fs;
    use std::path::{Path, PathBuf};

    /// Write an executable shell script.
    #[cfg(unix)]
    pub fn write_script(dir: &Path, name: &str, body: &str) -> PathBuf {
        use std::os::unix::fs::PermissionsExt;
        let path = dir.join(name);
        fs::write(&path, format!("#!/bin/sh\n{}\n", body)).unwrap();
        let mut perms = fs::metadata(&path).unwrap().permissions();
        perms.set_mode(0o755);
        fs::set_permissions(&path, perms).unwrap();
        path
    }
}
