//! Change classification.
//!
//! Turns the paths touched by a commit into a regeneration decision:
//! skip, regenerate everything, or update the affected wiki sections.

use std::collections::HashSet;
use std::fmt;

use crate::config::{DocsConfig, SectionRule};
use crate::git::ChangeSet;

/// Section name for files at the repository root.
pub const ROOT_SECTION: &str = "root";

/// A named group of wiki content.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct Section(pub String);

impl Section {
    pub fn name(&self) -> &str {
        &self.0
    }
}

impl fmt::Display for Section {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(&self.0)
    }
}

/// What an incremental run should do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Decision {
    /// Nothing relevant changed.
    Skip,
    /// Too many relevant changes; regenerate from scratch.
    Full,
    /// Update only these sections.
    Incremental {
        sections: Vec<Section>,
        /// Non-excluded changed paths, in commit order.
        paths: Vec<String>,
    },
}

impl fmt::Display for Decision {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Decision::Skip => f.write_str("skip"),
            Decision::Full => f.write_str("full"),
            Decision::Incremental { sections, paths } => {
                let names: Vec<&str> = sections.iter().map(Section::name).collect();
                write!(
                    f,
                    "incremental ({} files, sections: {})",
                    paths.len(),
                    names.join(", ")
                )
            }
        }
    }
}

/// Classifies change sets using the configured rules.
#[derive(Debug, Clone)]
pub struct Classifier {
    excluded: Vec<String>,
    threshold: usize,
    rules: Vec<SectionRule>,
}

impl Classifier {
    pub fn new(excluded: Vec<String>, threshold: usize, rules: Vec<SectionRule>) -> Self {
        Self {
            excluded: excluded.iter().map(|p| normalize(p)).collect(),
            threshold,
            rules: rules
                .into_iter()
                .map(|r| SectionRule {
                    prefix: normalize(&r.prefix),
                    name: r.name,
                })
                .collect(),
        }
    }

    pub fn from_config(docs: &DocsConfig) -> Self {
        Self::new(
            docs.excluded_paths.clone(),
            docs.full_generate_threshold,
            docs.sections.clone(),
        )
    }

    /// Whether a path matches an excluded prefix.
    pub fn is_excluded(&self, path: &str) -> bool {
        let path = normalize(path);
        self.excluded
            .iter()
            .any(|prefix| !prefix.is_empty() && path.starts_with(prefix.as_str()))
    }

    /// Decide what to regenerate for a change set.
    pub fn classify(&self, changes: &ChangeSet) -> Decision {
        let remaining: Vec<String> = changes
            .paths()
            .map(normalize)
            .filter(|p| !p.is_empty() && !self.is_excluded(p))
            .collect();

        if remaining.is_empty() {
            return Decision::Skip;
        }

        if self.threshold > 0 && remaining.len() >= self.threshold {
            return Decision::Full;
        }

        let mut seen = HashSet::new();
        let sections = remaining
            .iter()
            .map(|p| self.section_for(p))
            .filter(|s| seen.insert(s.clone()))
            .collect();

        Decision::Incremental {
            sections,
            paths: remaining,
        }
    }

    /// Section for one path: longest matching rule, else its top-level directory.
    pub fn section_for(&self, path: &str) -> Section {
        let path = normalize(path);

        let best = self
            .rules
            .iter()
            .filter(|r| !r.prefix.is_empty() && path.starts_with(r.prefix.as_str()))
            .max_by_key(|r| r.prefix.len());
        if let Some(rule) = best {
            return Section(rule.name.clone());
        }

        match path.split_once('/') {
            Some((top, _)) if !top.is_empty() => Section(top.to_string()),
            _ => Section(ROOT_SECTION.to_string()),
        }
    }
}

/// Forward slashes, no leading `./`.
fn normalize(path: &str) -> String {
    let path = path.replace('\\', "/");
    let mut trimmed = path.as_str();
    while let Some(rest) = trimmed.strip_prefix("./") {
        trimmed = rest;
    }
    trimmed.to_string()
}
