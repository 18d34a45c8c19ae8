// src/merge.rs
//! Combining archives under a duplicate-resolution policy
//!
//! The pipeline merges twice: the relocated agent libraries under
//! [`DuplicatePolicy::Fail`], and the final bundle under
//! [`DuplicatePolicy::Exclude`]. Both go through [`Merger::merge`]; the
//! policy is the only difference.

use crate::archive::Archive;
use crate::error::{Error, Result};
use crate::relocate::services;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;
use tracing::debug;

/// What to do when two inputs carry the same path
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DuplicatePolicy {
    /// Any duplicate aborts the merge
    Fail,
    /// The first input to register a path wins; later entries are dropped
    Exclude,
}

impl DuplicatePolicy {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Fail => "fail",
            Self::Exclude => "exclude",
        }
    }
}

impl fmt::Display for DuplicatePolicy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Output of [`Merger::merge`]
#[derive(Debug, Clone)]
pub struct MergeResult {
    pub archive: Archive,
    /// Entries dropped under [`DuplicatePolicy::Exclude`]
    pub duplicates_skipped: usize,
    /// Service descriptors that were concatenated rather than deduplicated
    pub services_merged: usize,
}

/// Merges archives in order into a single archive
#[derive(Debug, Clone, Copy)]
pub struct Merger {
    policy: DuplicatePolicy,
    merge_service_files: bool,
}

impl Merger {
    pub fn new(policy: DuplicatePolicy) -> Self {
        Self {
            policy,
            merge_service_files: false,
        }
    }

    /// Concatenate `META-INF/services` descriptors that share a path
    pub fn with_service_files(mut self, enabled: bool) -> Self {
        self.merge_service_files = enabled;
        self
    }

    pub fn policy(&self) -> DuplicatePolicy {
        self.policy
    }

    fn is_mergeable(&self, path: &str) -> bool {
        self.merge_service_files && services::is_service_descriptor(path)
    }

    /// Merge `inputs` in order into an archive called `name`
    pub fn merge(&self, name: &str, inputs: Vec<Archive>) -> Result<MergeResult> {
        if self.policy == DuplicatePolicy::Fail {
            self.check_conflicts(&inputs)?;
        }

        let mut out = Archive::new(name);
        let mut owners: HashMap<String, String> = HashMap::new();
        let mut duplicates_skipped = 0;
        let mut services_merged = 0;

        for input in inputs {
            let source = input.name().to_string();
            for entry in input.into_entries() {
                if let Some(owner) = owners.get(&entry.path) {
                    if self.is_mergeable(&entry.path) {
                        if let Some(content) = out.content_mut(&entry.path) {
                            *content = services::merge_descriptors(content, &entry.content);
                            services_merged += 1;
                        }
                        continue;
                    }

                    debug!(
                        "Skipping duplicate {} from {} (kept from {})",
                        entry.path, source, owner
                    );
                    duplicates_skipped += 1;
                    continue;
                }

                owners.insert(entry.path.clone(), source.clone());
                if let Err(rejected) = out.push(entry) {
                    // owners mirrors the output index, so this is unreachable
                    return Err(Error::DuplicateEntry {
                        path: rejected.path,
                        sources: vec![source],
                    });
                }
            }
        }

        debug!(
            "Merged {} ({} policy): {} entries, {} duplicates skipped, {} service files merged",
            name,
            self.policy,
            out.len(),
            duplicates_skipped,
            services_merged
        );

        Ok(MergeResult {
            archive: out,
            duplicates_skipped,
            services_merged,
        })
    }

    /// Report the first path (in merge order) contributed by more than one input
    fn check_conflicts(&self, inputs: &[Archive]) -> Result<()> {
        let mut seen: HashMap<&str, Vec<&str>> = HashMap::new();
        let mut order: Vec<&str> = Vec::new();

        for input in inputs {
            for path in input.paths() {
                if self.is_mergeable(path) {
                    continue;
                }
                let sources = seen.entry(path).or_insert_with(|| {
                    order.push(path);
                    Vec::new()
                });
                sources.push(input.name());
            }
        }

        for path in order {
            if let Some(sources) = seen.get(path)
                && sources.len() > 1
            {
                return Err(Error::DuplicateEntry {
                    path: path.to_string(),
                    sources: sources.iter().map(|s| s.to_string()).collect(),
                });
            }
        }
        Ok(())
    }
}
