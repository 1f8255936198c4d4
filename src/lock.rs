//! Run lock for a repository.
//!
//! A single JSON marker at `.repowiki/run.lock` records the owning process.
//! A marker is stale once its owner is gone or it is older than the
//! configured timeout; stale markers are reclaimed on the next acquire.
//! Acquisition never waits: a live marker fails fast with `LockHeld`.

use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use tracing::{debug, info, warn};

use crate::config::Config;
use crate::error::Error;

/// Lock file name inside `.repowiki/`.
pub const LOCK_FILE: &str = "run.lock";

/// Reclaim attempts before giving up on a contended lock.
const MAX_ACQUIRE_ATTEMPTS: u32 = 3;

/// Source of the current time.
pub trait Clock: Send + Sync {
    fn now(&self) -> DateTime<Utc>;
}

/// Wall clock.
#[derive(Debug, Default, Clone, Copy)]
pub struct SystemClock;

impl Clock for SystemClock {
    fn now(&self) -> DateTime<Utc> {
        Utc::now()
    }
}

/// Answers whether a process id on this host is still running.
pub trait Liveness: Send + Sync {
    fn is_alive(&self, pid: u32) -> bool;
}

/// Asks the operating system.
#[derive(Debug, Default, Clone, Copy)]
pub struct ProcessLiveness;

impl Liveness for ProcessLiveness {
    fn is_alive(&self, pid: u32) -> bool {
        is_process_alive(pid)
    }
}

/// Identity of a lock owner.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockOwner {
    pub pid: u32,
    pub user: String,
    pub host: String,
}

impl LockOwner {
    /// The current process.
    pub fn current() -> Self {
        Self {
            pid: std::process::id(),
            user: whoami::username(),
            host: whoami::fallible::hostname().unwrap_or_default(),
        }
    }
}

/// Contents of the lock file.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LockMarker {
    #[serde(flatten)]
    pub owner: LockOwner,
    pub started_at: DateTime<Utc>,
}

/// Acquires and releases the repository run lock.
#[derive(Clone)]
pub struct LockManager {
    path: PathBuf,
    stale_after: Duration,
    owner: LockOwner,
    clock: Arc<dyn Clock>,
    liveness: Arc<dyn Liveness>,
}

impl std::fmt::Debug for LockManager {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LockManager")
            .field("path", &self.path)
            .field("stale_after", &self.stale_after)
            .field("owner", &self.owner)
            .finish()
    }
}

impl LockManager {
    /// Lock manager for a repository using the real clock and process table.
    pub fn new(project_root: &Path, stale_after: Duration) -> Self {
        Self {
            path: Self::lock_path(project_root),
            stale_after,
            owner: LockOwner::current(),
            clock: Arc::new(SystemClock),
            liveness: Arc::new(ProcessLiveness),
        }
    }

    /// Path of the lock marker for a repository.
    pub fn lock_path(project_root: &Path) -> PathBuf {
        Config::dir(project_root).join(LOCK_FILE)
    }

    /// Replace the clock.
    pub fn with_clock(mut self, clock: Arc<dyn Clock>) -> Self {
        self.clock = clock;
        self
    }

    /// Replace the liveness oracle.
    pub fn with_liveness(mut self, liveness: Arc<dyn Liveness>) -> Self {
        self.liveness = liveness;
        self
    }

    /// Act on behalf of a different owner.
    pub fn with_owner(mut self, owner: LockOwner) -> Self {
        self.owner = owner;
        self
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Take the lock or fail with `LockHeld`.
    pub fn acquire(&self) -> Result<LockGuard, Error> {
        if let Some(parent) = self.path.parent() {
            fs::create_dir_all(parent)?;
        }

        for attempt in 0..MAX_ACQUIRE_ATTEMPTS {
            let marker = LockMarker {
                owner: self.owner.clone(),
                started_at: self.clock.now(),
            };

            if self.try_create(&marker)? {
                debug!(path = %self.path.display(), pid = marker.owner.pid, "Acquired run lock");
                return Ok(LockGuard {
                    manager: self.clone(),
                    released: false,
                });
            }

            let observed = match fs::read_to_string(&self.path) {
                Ok(raw) => raw,
                // Released between our create attempt and the read.
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };

            match serde_json::from_str::<LockMarker>(&observed) {
                Ok(existing) => {
                    if !self.is_stale(&existing) {
                        return Err(held(&existing));
                    }
                    info!(
                        pid = existing.owner.pid,
                        started_at = %existing.started_at,
                        attempt,
                        "Reclaiming stale run lock"
                    );
                }
                Err(e) => {
                    warn!(error = %e, "Unreadable run lock, reclaiming");
                }
            }

            if let Discard::Restored(raw) = self.discard(&observed)? {
                // Someone reclaimed first; their marker is back in place.
                if let Ok(fresh) = serde_json::from_str::<LockMarker>(&raw) {
                    return Err(held(&fresh));
                }
            }
        }

        // Still contended after reclaiming; report whoever holds it now.
        match self.read_marker() {
            Ok(Some(existing)) => Err(held(&existing)),
            _ => Err(Error::other("could not acquire run lock")),
        }
    }

    /// Current holder of the lock, if any.
    pub fn inspect(&self) -> Result<Option<LockMarker>, Error> {
        self.read_marker()
    }

    /// Whether a marker may be reclaimed.
    pub fn is_stale(&self, marker: &LockMarker) -> bool {
        let age = self
            .clock
            .now()
            .signed_duration_since(marker.started_at)
            .to_std()
            .unwrap_or_default();
        if age > self.stale_after {
            return true;
        }

        // Another host's pid means nothing here; only age can free it.
        if marker.owner.host != self.owner.host {
            return false;
        }

        !self.liveness.is_alive(marker.owner.pid)
    }

    /// Remove the marker if this process still owns it.
    ///
    /// Returns whether a marker was removed.
    pub fn force_release(&self) -> Result<bool, Error> {
        let observed = match fs::read_to_string(&self.path) {
            Ok(raw) => raw,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(false),
            Err(e) => return Err(e.into()),
        };
        let marker: LockMarker = serde_json::from_str(&observed)?;
        if marker.owner != self.owner {
            return Ok(false);
        }
        Ok(matches!(self.discard(&observed)?, Discard::Removed))
    }

    /// Remove the marker only if it still holds `observed`.
    ///
    /// The marker is renamed to a private tombstone first so a marker
    /// published in the meantime is never deleted; if the tombstone holds
    /// something else it is linked back into place.
    fn discard(&self, observed: &str) -> Result<Discard, Error> {
        let tombstone = self.path.with_extension(format!(
            "lock.stale.{}",
            uuid::Uuid::new_v4().simple()
        ));
        match fs::rename(&self.path, &tombstone) {
            Ok(()) => {}
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(Discard::Missing),
            Err(e) => return Err(e.into()),
        }

        let result = match fs::read_to_string(&tombstone) {
            Ok(raw) if raw == observed => Ok(Discard::Removed),
            Ok(raw) => self.restore(&tombstone).map(|()| Discard::Restored(raw)),
            Err(e) => self.restore(&tombstone).and(Err(e.into())),
        };
        if let Err(e) = fs::remove_file(&tombstone) {
            warn!(error = %e, path = %tombstone.display(), "Failed to remove lock tombstone");
        }
        result
    }

    /// Put a marker that was moved aside by mistake back in place.
    fn restore(&self, tombstone: &Path) -> Result<(), Error> {
        match fs::hard_link(tombstone, &self.path) {
            Ok(()) => {
                debug!(path = %self.path.display(), "Restored run lock taken by another process");
                Ok(())
            }
            Err(e) if e.kind() == ErrorKind::AlreadyExists => {
                warn!(path = %self.path.display(), "Run lock replaced before it could be restored");
                Ok(())
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Atomically publish a marker; false if one already exists.
    fn try_create(&self, marker: &LockMarker) -> Result<bool, Error> {
        let tmp = self.path.with_extension(format!(
            "lock.{}.{}",
            marker.owner.pid,
            uuid::Uuid::new_v4().simple()
        ));
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(serde_json::to_string_pretty(marker)?.as_bytes())?;
            file.sync_all()?;
        }

        let result = fs::hard_link(&tmp, &self.path);
        let _ = fs::remove_file(&tmp);

        match result {
            Ok(()) => Ok(true),
            Err(e) if e.kind() == ErrorKind::AlreadyExists => Ok(false),
            Err(e) => Err(e.into()),
        }
    }

    fn read_marker(&self) -> Result<Option<LockMarker>, Error> {
        match fs::read_to_string(&self.path) {
            Ok(content) => Ok(Some(serde_json::from_str(&content)?)),
            Err(e) if e.kind() == ErrorKind::NotFound => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}

/// What `discard` found behind the marker.
enum Discard {
    /// The observed marker was removed.
    Removed,
    /// No marker was there.
    Missing,
    /// A different marker was found and put back.
    Restored(String),
}

fn held(marker: &LockMarker) -> Error {
    Error::LockHeld {
        pid: marker.owner.pid,
        started_at: marker.started_at.to_rfc3339(),
    }
}

/// Held run lock. Released on drop.
#[derive(Debug)]
pub struct LockGuard {
    manager: LockManager,
    released: bool,
}

impl LockGuard {
    /// Release the lock now.
    pub fn release(mut self) -> Result<(), Error> {
        self.released = true;
        self.manager.force_release().map(|_| ())
    }
}

impl Drop for LockGuard {
    fn drop(&mut self) {
        if self.released {
            return;
        }
        if let Err(e) = self.manager.force_release() {
            warn!(error = %e, path = %self.manager.path.display(), "Failed to release run lock");
        }
    }
}

/// Check if a process with the given pid is still alive.
#[cfg(target_os = "linux")]
fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    Path::new(&format!("/proc/{}/stat", pid)).exists()
}

#[cfg(all(unix, not(target_os = "linux")))]
fn is_process_alive(pid: u32) -> bool {
    if pid == 0 {
        return false;
    }
    std::process::Command::new("kill")
        .args(["-0", &pid.to_string()])
        .output()
        .map(|o| o.status.success())
        // Can't tell; keep the lock.
        .unwrap_or(true)
}

#[cfg(not(unix))]
fn is_process_alive(_pid: u32) -> bool {
    true
}
