// src/archive/mod.rs

//! In-memory representation of jar archives
//!
//! An [`Archive`] is an ordered list of file entries with unique,
//! forward-slash relative paths. Directory entries are not modelled; the
//! reader skips them and the writer never emits them. Every pipeline stage
//! consumes archives and produces new ones, so nothing here mutates files
//! on disk.

mod reader;
mod writer;

pub use writer::{
    MANIFEST_PATH, copy_to_temp, encode_jar, promote, promote_pair, write_jar, write_jar_to_temp,
};

use std::collections::HashMap;

const VERSIONS_PREFIX: &str = "META-INF/versions/";

/// What kind of content an entry carries
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntryKind {
    /// A `.class` file whose bytes embed binary class names
    Class,
    /// Anything under `META-INF/` that is not a class
    Metadata,
    /// Any other resource
    Resource,
}

impl EntryKind {
    /// Classify an entry by its path
    pub fn classify(path: &str) -> Self {
        if path.ends_with(".class") {
            Self::Class
        } else if path.starts_with("META-INF/") {
            Self::Metadata
        } else {
            Self::Resource
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Class => "class",
            Self::Metadata => "metadata",
            Self::Resource => "resource",
        }
    }
}

impl std::fmt::Display for EntryKind {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// A single file inside an archive
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArchiveEntry {
    pub path: String,
    pub content: Vec<u8>,
    pub kind: EntryKind,
}

impl ArchiveEntry {
    pub fn new(path: impl Into<String>, content: impl Into<Vec<u8>>) -> Self {
        let path = path.into();
        let kind = EntryKind::classify(&path);
        Self {
            path,
            content: content.into(),
            kind,
        }
    }

    /// Move the entry to a new path, reclassifying it
    pub fn with_path(mut self, path: impl Into<String>) -> Self {
        self.path = path.into();
        self.kind = EntryKind::classify(&self.path);
        self
    }

    /// The last path segment
    pub fn file_name(&self) -> &str {
        file_name(&self.path)
    }
}

/// The last segment of a slash-delimited path
pub fn file_name(path: &str) -> &str {
    path.rsplit('/').next().unwrap_or(path)
}

/// Split a multi-release path into its `META-INF/versions/<n>/` prefix and the rest
///
/// Paths outside the versioned tree return an empty prefix.
pub fn split_versioned(path: &str) -> (&str, &str) {
    if let Some(rest) = path.strip_prefix(VERSIONS_PREFIX)
        && let Some((version, _)) = rest.split_once('/')
        && !version.is_empty()
        && version.bytes().all(|b| b.is_ascii_digit())
    {
        let split = VERSIONS_PREFIX.len() + version.len() + 1;
        return path.split_at(split);
    }
    ("", path)
}

/// Whether a path is a per-jar descriptor that the bundle supersedes
///
/// Input manifests and module descriptors are replaced by the bundle's own
/// manifest and must never reach the merged archive.
pub fn is_descriptor(path: &str) -> bool {
    if path == MANIFEST_PATH {
        return true;
    }
    let (_, rest) = split_versioned(path);
    rest == "module-info.class"
}

/// An ordered set of entries with unique paths
#[derive(Debug, Clone, Default)]
pub struct Archive {
    name: String,
    entries: Vec<ArchiveEntry>,
    index: HashMap<String, usize>,
}

impl Archive {
    /// Create an empty archive
    ///
    /// The name identifies the archive in logs and error messages; for
    /// archives read from disk it is the file name.
    pub fn new(name: impl Into<String>) -> Self {
        Self {
            name: name.into(),
            entries: Vec::new(),
            index: HashMap::new(),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    /// The same entries under a different name
    pub fn with_name(mut self, name: impl Into<String>) -> Self {
        self.name = name.into();
        self
    }

    /// Add an entry unless its path is already taken
    ///
    /// Returns the rejected entry when the path already exists; the
    /// existing entry is never replaced.
    pub fn push(&mut self, entry: ArchiveEntry) -> std::result::Result<(), ArchiveEntry> {
        if self.index.contains_key(&entry.path) {
            return Err(entry);
        }
        self.index.insert(entry.path.clone(), self.entries.len());
        self.entries.push(entry);
        Ok(())
    }

    pub fn get(&self, path: &str) -> Option<&ArchiveEntry> {
        self.index.get(path).map(|&i| &self.entries[i])
    }

    /// Mutable access to an entry's content
    pub fn content_mut(&mut self, path: &str) -> Option<&mut Vec<u8>> {
        let i = *self.index.get(path)?;
        Some(&mut self.entries[i].content)
    }

    pub fn contains(&self, path: &str) -> bool {
        self.index.contains_key(path)
    }

    pub fn entries(&self) -> &[ArchiveEntry] {
        &self.entries
    }

    pub fn into_entries(self) -> Vec<ArchiveEntry> {
        self.entries
    }

    pub fn paths(&self) -> impl Iterator<Item = &str> {
        self.entries.iter().map(|e| e.path.as_str())
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Total uncompressed size of all entries
    pub fn content_size(&self) -> u64 {
        self.entries.iter().map(|e| e.content.len() as u64).sum()
    }
}
