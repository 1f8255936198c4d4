//! Append-only run log.
//!
//! One file per UTC day under `.repowiki/logs/`. Hook-triggered runs have no
//! terminal, so this is where their outcome ends up.

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use chrono::{DateTime, Utc};
use tracing::warn;

use crate::config::Config;
use crate::error::Error;

/// Log directory name inside `.repowiki/`.
pub const LOG_DIR: &str = "logs";

/// Writes timestamped lines to the day's log file.
#[derive(Debug, Clone)]
pub struct RunLog {
    dir: PathBuf,
    tag: Option<String>,
}

impl RunLog {
    /// Run log for a project.
    pub fn new(project_root: &Path) -> Self {
        Self::at(Self::dir_for(project_root))
    }

    /// Run log writing into `dir`.
    pub fn at(dir: impl Into<PathBuf>) -> Self {
        Self {
            dir: dir.into(),
            tag: None,
        }
    }

    /// Log directory for a project.
    pub fn dir_for(project_root: &Path) -> PathBuf {
        Config::dir(project_root).join(LOG_DIR)
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    /// Copy of this log that prefixes every line with `tag`.
    pub fn tagged(&self, tag: impl Into<String>) -> Self {
        Self {
            dir: self.dir.clone(),
            tag: Some(tag.into()),
        }
    }

    /// Append a line. Failures are reported but never propagated.
    pub fn append(&self, message: &str) {
        if let Err(e) = self.append_at(Utc::now(), message) {
            warn!(error = %e, dir = %self.dir.display(), "Failed to write run log");
        }
    }

    fn append_at(&self, now: DateTime<Utc>, message: &str) -> Result<(), Error> {
        fs::create_dir_all(&self.dir)?;
        let path = self.dir.join(format!("{}.log", now.format("%Y-%m-%d")));

        let mut file = OpenOptions::new().create(true).append(true).open(path)?;
        let line = match &self.tag {
            Some(tag) => format!("[{}] [{}] {}\n", now.to_rfc3339(), tag, message),
            None => format!("[{}] {}\n", now.to_rfc3339(), message),
        };
        file.write_all(line.as_bytes())?;
        Ok(())
    }

    /// Newest log file name and its content.
    pub fn latest(&self) -> Result<Option<(String, String)>, Error> {
        let entries = match fs::read_dir(&self.dir) {
            Ok(entries) => entries,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };

        let newest = entries
            .flatten()
            .map(|e| e.file_name().to_string_lossy().into_owned())
            .filter(|name| name.ends_with(".log"))
            .max();

        match newest {
            Some(name) => {
                let content = fs::read_to_string(self.dir.join(&name))?;
                Ok(Some((name, content)))
            }
            None => Ok(None),
        }
    }
}
