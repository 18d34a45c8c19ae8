// src/library.rs
//! Library sets: the named groups of input jars
//!
//! A build has three of them (bootstrap, agent libraries, upstream agent).
//! Membership comes from outside the pipeline and is fixed once resolved.

use crate::archive::{self, Archive};
use crate::error::{Error, Result};
use rayon::prelude::*;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info};
use walkdir::WalkDir;

/// Role of a library set in the bundle
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LibrarySetKind {
    /// Classes loaded by the privileged tier; relocated, not isolated
    Bootstrap,
    /// Instrumentation modules and their dependencies; relocated and isolated
    AgentLibs,
    /// The pre-built agent this bundle extends; relocated, not isolated
    Upstream,
}

impl LibrarySetKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bootstrap => "bootstrap",
            Self::AgentLibs => "agentLibs",
            Self::Upstream => "upstreamAgent",
        }
    }
}

impl fmt::Display for LibrarySetKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A named, ordered collection of input jar files
#[derive(Debug, Clone)]
pub struct LibrarySet {
    name: String,
    kind: LibrarySetKind,
    files: Vec<PathBuf>,
}

impl LibrarySet {
    /// Build a set from explicit file paths
    pub fn new(name: impl Into<String>, kind: LibrarySetKind, files: Vec<PathBuf>) -> Self {
        Self {
            name: name.into(),
            kind,
            files,
        }
    }

    /// Resolve configured paths into jar files
    ///
    /// Relative paths are taken from `base_dir`. A directory contributes
    /// every `*.jar` beneath it in path order.
    pub fn resolve(
        name: &str,
        kind: LibrarySetKind,
        paths: &[PathBuf],
        base_dir: &Path,
    ) -> Result<Self> {
        let mut files = Vec::new();

        for path in paths {
            let full = if path.is_absolute() {
                path.clone()
            } else {
                base_dir.join(path)
            };

            if full.is_dir() {
                let before = files.len();
                for entry in WalkDir::new(&full).sort_by_file_name() {
                    let entry = entry.map_err(|e| {
                        Error::archive_read(&full, format!("cannot scan directory: {}", e))
                    })?;
                    if entry.file_type().is_file()
                        && entry.path().extension().is_some_and(|ext| ext == "jar")
                    {
                        files.push(entry.into_path());
                    }
                }
                debug!(
                    "{}: {} jars found under {}",
                    name,
                    files.len() - before,
                    full.display()
                );
            } else if full.is_file() {
                files.push(full);
            } else {
                return Err(Error::archive_read(&full, "input does not exist"));
            }
        }

        let mut seen = std::collections::HashSet::new();
        files.retain(|f| seen.insert(f.clone()));

        Ok(Self::new(name, kind, files))
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn kind(&self) -> LibrarySetKind {
        self.kind
    }

    pub fn files(&self) -> &[PathBuf] {
        &self.files
    }

    pub fn len(&self) -> usize {
        self.files.len()
    }

    pub fn is_empty(&self) -> bool {
        self.files.is_empty()
    }

    /// Read every jar of the set in parallel, in declaration order
    ///
    /// Per-jar manifests and module descriptors are dropped here; the
    /// bundle writes its own manifest.
    pub fn load(&self) -> Result<Vec<Archive>> {
        let archives = self
            .files
            .par_iter()
            .map(|path| Archive::read(path).map(without_descriptors))
            .collect::<Result<Vec<_>>>()?;

        let entries: usize = archives.iter().map(Archive::len).sum();
        info!(
            "Loaded {} ({}): {} jars, {} entries",
            self.name,
            self.kind,
            archives.len(),
            entries
        );
        Ok(archives)
    }
}

/// Drop `META-INF/MANIFEST.MF` and `module-info.class` entries
pub fn without_descriptors(jar: Archive) -> Archive {
    if !jar.paths().any(archive::is_descriptor) {
        return jar;
    }

    let mut out = Archive::new(jar.name());
    for entry in jar.into_entries() {
        if archive::is_descriptor(&entry.path) {
            debug!("Dropping descriptor {} from {}", entry.path, out.name());
            continue;
        }
        // Paths were unique in the source archive
        let _ = out.push(entry);
    }
    out
}
