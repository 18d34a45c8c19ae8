// src/isolate.rs
//! Namespace isolation of relocated agent libraries
//!
//! Isolated entries live under a private prefix (`inst/` by default) and
//! class files are renamed to a non-loadable extension, so neither the
//! host application's classloaders nor the JVM's system loader can pick
//! them up. Only the agent's own loader, which strips the prefix and
//! restores `.class` ([`NamespacePlan::restore_path`]), can read them.

use crate::archive::{self, Archive, ArchiveEntry, EntryKind};
use crate::error::{Error, Result};
use crate::shared::SharedContract;
use glob::{MatchOptions, Pattern};
use regex::Regex;
use serde::{Deserialize, Serialize};
use tracing::debug;

const CLASS_SUFFIX: &str = ".class";

/// A file-name rename applied during isolation
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RenameRule {
    /// Regex matched against the file name (last path segment)
    pub pattern: String,
    /// Replacement, may reference capture groups (`$1`)
    pub replacement: String,
}

/// `[isolation]` section of bundle.toml
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct IsolationConfig {
    pub prefix: String,
    pub class_extension: String,
    /// Glob patterns of entries dropped entirely
    pub exclude: Vec<String>,
    pub rename: Vec<RenameRule>,
}

impl Default for IsolationConfig {
    fn default() -> Self {
        Self {
            prefix: "inst".to_string(),
            class_extension: "classdata".to_string(),
            exclude: [
                "META-INF/INDEX.LIST",
                "META-INF/*.DSA",
                "META-INF/*.SF",
                "META-INF/*.RSA",
                "META-INF/*.EC",
            ]
            .iter()
            .map(|s| s.to_string())
            .collect(),
            // LICENSE clashes with a license/ directory on case-insensitive filesystems
            rename: vec![RenameRule {
                pattern: "^LICENSE$".to_string(),
                replacement: "LICENSE.renamed".to_string(),
            }],
        }
    }
}

/// Output of [`NamespacePlan::isolate`]
#[derive(Debug, Clone)]
pub struct IsolationResult {
    pub archive: Archive,
    /// Original paths of the entries that were dropped
    pub excluded: Vec<String>,
}

/// Where and how isolated entries are placed
#[derive(Debug, Clone)]
pub struct NamespacePlan {
    prefix: String,
    class_suffix: String,
    excludes: Vec<Pattern>,
    renames: Vec<(Regex, String)>,
}

impl NamespacePlan {
    pub fn new(config: &IsolationConfig) -> Result<Self> {
        let prefix = config.prefix.trim_matches('/');
        if prefix.is_empty() || prefix.split('/').any(|s| s.is_empty() || s == "." || s == "..") {
            return Err(Error::Config(format!(
                "isolation prefix '{}' must be a relative directory",
                config.prefix
            )));
        }

        let ext = config.class_extension.trim_start_matches('.');
        if ext.is_empty() || ext == "class" || ext.contains('/') {
            return Err(Error::Config(format!(
                "isolated class extension '{}' must differ from 'class'",
                config.class_extension
            )));
        }

        let excludes = config
            .exclude
            .iter()
            .map(|pat| {
                Pattern::new(pat).map_err(|e| {
                    Error::Config(format!("invalid isolation exclude pattern '{}': {}", pat, e))
                })
            })
            .collect::<Result<Vec<_>>>()?;

        let renames = config
            .rename
            .iter()
            .map(|rule| {
                Regex::new(&rule.pattern)
                    .map(|re| (re, rule.replacement.clone()))
                    .map_err(|e| {
                        Error::Config(format!("invalid rename pattern '{}': {}", rule.pattern, e))
                    })
            })
            .collect::<Result<Vec<_>>>()?;

        Ok(Self {
            prefix: prefix.to_string(),
            class_suffix: format!(".{}", ext),
            excludes,
            renames,
        })
    }

    /// The namespace directory, without trailing slash
    pub fn prefix(&self) -> &str {
        &self.prefix
    }

    /// Extension given to isolated class files, with leading dot
    pub fn class_suffix(&self) -> &str {
        &self.class_suffix
    }

    /// Whether a path lies inside the isolated namespace
    pub fn is_isolated(&self, path: &str) -> bool {
        path.strip_prefix(self.prefix.as_str())
            .is_some_and(|rest| rest.starts_with('/'))
    }

    pub fn is_excluded(&self, path: &str) -> bool {
        let options = MatchOptions {
            require_literal_separator: true,
            ..MatchOptions::new()
        };
        self.excludes.iter().any(|p| p.matches_with(path, options))
    }

    /// The isolated location of an entry, or `None` if it is excluded
    pub fn isolated_path(&self, path: &str) -> Option<String> {
        if self.is_excluded(path) {
            return None;
        }

        let (dir, name) = match path.rsplit_once('/') {
            Some((dir, name)) => (Some(dir), name),
            None => (None, path),
        };

        let mut name = match name.strip_suffix(CLASS_SUFFIX) {
            Some(stem) => format!("{}{}", stem, self.class_suffix),
            None => name.to_string(),
        };
        for (re, replacement) in &self.renames {
            name = re.replace(&name, replacement.as_str()).into_owned();
        }

        Some(match dir {
            Some(dir) => format!("{}/{}/{}", self.prefix, dir, name),
            None => format!("{}/{}", self.prefix, name),
        })
    }

    /// Map an isolated class entry back to the path a standard loader would use
    ///
    /// Returns `None` for paths outside the namespace. Renamed resources
    /// keep their new name.
    pub fn restore_path(&self, path: &str) -> Option<String> {
        let rest = path.strip_prefix(self.prefix.as_str())?.strip_prefix('/')?;
        Some(match rest.strip_suffix(self.class_suffix.as_str()) {
            Some(stem) => format!("{}{}", stem, CLASS_SUFFIX),
            None => rest.to_string(),
        })
    }

    /// Move every entry of a relocated archive into the namespace
    ///
    /// Class entries of shared packages must already have been removed;
    /// finding one is a contract violation.
    pub fn isolate(&self, archive: Archive, shared: &SharedContract) -> Result<IsolationResult> {
        let name = archive.name().to_string();
        let mut out = Archive::new(name.clone());
        let mut excluded = Vec::new();

        for entry in archive.into_entries() {
            if entry.kind == EntryKind::Class {
                let (_, rest) = archive::split_versioned(&entry.path);
                if shared.covers_internal_name(rest) {
                    return Err(Error::SharedContract(format!(
                        "{} from {} belongs to a shared library and cannot be isolated",
                        entry.path, name
                    )));
                }
            }

            let Some(path) = self.isolated_path(&entry.path) else {
                debug!("Excluding {} from isolated namespace", entry.path);
                excluded.push(entry.path);
                continue;
            };

            if !self.is_isolated(&path) || path.ends_with(CLASS_SUFFIX) {
                return Err(Error::IsolationBreach(format!(
                    "{} would be placed at loadable path {}",
                    entry.path, path
                )));
            }

            let original = entry.path.clone();
            let isolated: ArchiveEntry = entry.with_path(path);
            if let Err(rejected) = out.push(isolated) {
                return Err(Error::DuplicateEntry {
                    path: rejected.path,
                    sources: vec![format!("{} ({})", name, original)],
                });
            }
        }

        debug!(
            "Isolated {} entries of {} under {}/ ({} excluded)",
            out.len(),
            name,
            self.prefix,
            excluded.len()
        );
        Ok(IsolationResult {
            archive: out,
            excluded,
        })
    }
}
