// src/relocate/mod.rs
//! Package relocation for jar library sets
//!
//! Relocation renames every class (and every resource living in a
//! relocated package directory) and rewrites every binary reference to the
//! moved names, so a library can be bundled next to another copy of itself
//! without either one seeing the other. Entries are only ever renamed or
//! rewritten; relocation never adds or drops an entry.

pub mod classfile;
pub mod rules;
pub mod services;

pub use classfile::ClassFileError;
pub use rules::{RelocationMap, RelocationRule};

use crate::archive::{Archive, ArchiveEntry, EntryKind, split_versioned};
use crate::error::{Error, Result};
use rayon::prelude::*;
use std::collections::HashMap;
use tracing::debug;

/// Applies a [`RelocationMap`] to archives
#[derive(Debug, Clone)]
pub struct Relocator {
    map: RelocationMap,
}

/// Counters for one relocated archive
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct RelocationStats {
    pub renamed: usize,
    pub rewritten: usize,
}

impl Relocator {
    pub fn new(map: RelocationMap) -> Self {
        Self { map }
    }

    pub fn map(&self) -> &RelocationMap {
        &self.map
    }

    /// The relocated path of an entry, if it moves
    pub fn relocate_path(&self, path: &str, kind: EntryKind) -> Option<String> {
        match kind {
            EntryKind::Class => {
                let (version_prefix, rest) = split_versioned(path);
                let name = rest.strip_suffix(".class")?;
                self.map
                    .map_internal_name(name)
                    .map(|mapped| format!("{}{}.class", version_prefix, mapped))
            }
            EntryKind::Metadata => services::relocate_descriptor_path(&self.map, path),
            EntryKind::Resource => self.map.map_internal_name(path),
        }
    }

    /// Relocate one entry's path and content
    ///
    /// `origin` names the containing archive in error messages.
    pub fn relocate_entry(&self, entry: &ArchiveEntry, origin: &str) -> Result<ArchiveEntry> {
        let content = match entry.kind {
            EntryKind::Class => classfile::relocate_class(&self.map, &entry.content)
                .map_err(|e| Error::archive_read(format!("{}!/{}", origin, entry.path), e.to_string()))?,
            EntryKind::Metadata if services::is_service_descriptor(&entry.path) => {
                services::relocate_descriptor(&self.map, &entry.content)
            }
            _ => None,
        };

        let path = self
            .relocate_path(&entry.path, entry.kind)
            .unwrap_or_else(|| entry.path.clone());

        Ok(ArchiveEntry {
            path,
            content: content.unwrap_or_else(|| entry.content.clone()),
            kind: entry.kind,
        })
    }

    /// Relocate a whole archive
    ///
    /// Fails if two entries of the archive end up at the same path, which
    /// happens when a relocated name lands on a name the archive already
    /// contained.
    pub fn relocate_archive(&self, archive: &Archive) -> Result<Archive> {
        if self.map.is_empty() {
            return Ok(archive.clone());
        }

        let mut out = Archive::new(archive.name());
        let mut origins: HashMap<String, &str> = HashMap::new();
        let mut stats = RelocationStats::default();

        for entry in archive.entries() {
            let relocated = self.relocate_entry(entry, archive.name())?;
            if relocated.path != entry.path {
                stats.renamed += 1;
            }
            if relocated.content != entry.content {
                stats.rewritten += 1;
            }

            let path = relocated.path.clone();
            if out.push(relocated).is_err() {
                return Err(Error::AmbiguousRelocation(format!(
                    "{} and {} in {} both end up at {}",
                    origins.get(path.as_str()).copied().unwrap_or("?"),
                    entry.path,
                    archive.name(),
                    path
                )));
            }
            origins.insert(path, entry.path.as_str());
        }

        debug!(
            "Relocated {}: {} entries renamed, {} rewritten",
            archive.name(),
            stats.renamed,
            stats.rewritten
        );
        Ok(out)
    }

    /// Relocate independent archives in parallel, keeping their order
    pub fn relocate_all(&self, archives: &[Archive]) -> Result<Vec<Archive>> {
        archives
            .par_iter()
            .map(|archive| self.relocate_archive(archive))
            .collect()
    }
}
