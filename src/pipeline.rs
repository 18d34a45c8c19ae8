// src/pipeline.rs
//! The bundle build pipeline
//!
//! A build is a fixed sequence of stages, each consuming the previous
//! stage's output:
//!
//! ```text
//! resolve inputs -> relocate agentLibs (FAIL merge) -> isolate
//!   -> relocate bootstrap/upstream + merge bundle (EXCLUDE merge)
//!   -> build manifest -> write classifier jar -> copy primary jar -> done
//! ```
//!
//! Any failure stops the build and is returned wrapped in
//! [`Error::Stage`](crate::Error::Stage). Output jars are only promoted to
//! their final paths after both have been fully written, and a failed
//! second rename restores the first (see [`archive::promote_pair`]).

use crate::archive::{self, Archive, EntryKind};
use crate::config::BundleConfig;
use crate::error::{Error, Result};
use crate::hash;
use crate::isolate::NamespacePlan;
use crate::library::{LibrarySet, LibrarySetKind};
use crate::manifest::{IMPLEMENTATION_VERSION, ManifestAttributes};
use crate::merge::{DuplicatePolicy, Merger};
use crate::progress::ProgressTracker;
use crate::relocate::{RelocationMap, Relocator};
use crate::shared::SharedContract;
use std::fmt;
use std::io::Cursor;
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Name of the intermediate archive holding the merged, relocated agent libraries
pub const RELOCATED_AGENT_LIBS: &str = "javaagentLibs-relocated.jar";
/// Name of the intermediate isolated archive
pub const ISOLATED_AGENT_LIBS: &str = "javaagentLibs-isolated.jar";

/// A pipeline stage, in execution order
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Stage {
    ResolveInputs,
    RelocateAgentLibs,
    Isolate,
    MergeBundle,
    BuildManifest,
    WriteClassifierJar,
    CopyPrimaryJar,
    Done,
}

impl Stage {
    pub const ALL: [Stage; 8] = [
        Stage::ResolveInputs,
        Stage::RelocateAgentLibs,
        Stage::Isolate,
        Stage::MergeBundle,
        Stage::BuildManifest,
        Stage::WriteClassifierJar,
        Stage::CopyPrimaryJar,
        Stage::Done,
    ];

    /// Number of stages a successful build passes through
    pub const COUNT: u64 = Self::ALL.len() as u64;

    pub fn as_str(&self) -> &'static str {
        match self {
            Self::ResolveInputs => "resolve-inputs",
            Self::RelocateAgentLibs => "relocate",
            Self::Isolate => "isolate",
            Self::MergeBundle => "merge",
            Self::BuildManifest => "manifest",
            Self::WriteClassifierJar => "write",
            Self::CopyPrimaryJar => "copy",
            Self::Done => "done",
        }
    }

    /// Human readable description for progress output
    pub fn description(&self) -> &'static str {
        match self {
            Self::ResolveInputs => "Resolving inputs",
            Self::RelocateAgentLibs => "Relocating agent libraries",
            Self::Isolate => "Isolating agent libraries",
            Self::MergeBundle => "Merging bundle",
            Self::BuildManifest => "Building manifest",
            Self::WriteClassifierJar => "Writing classifier jar",
            Self::CopyPrimaryJar => "Copying primary jar",
            Self::Done => "Done",
        }
    }
}

impl fmt::Display for Stage {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Counters collected while assembling a bundle
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct AssemblyStats {
    /// Jars read per library set: bootstrap, agentLibs, upstream
    pub bootstrap_jars: usize,
    pub agent_lib_jars: usize,
    pub upstream_jars: usize,
    /// Agent-lib jars recognised as shared libraries and left out
    pub shared_jars_dropped: Vec<String>,
    /// Shared-package classes found inside other agent-lib jars
    pub stray_shared_entries: usize,
    /// Entries removed by the isolation exclude list
    pub isolation_excluded: usize,
    /// Entries dropped by the final EXCLUDE merge
    pub duplicates_skipped: usize,
    /// Service descriptors concatenated across all merges
    pub services_merged: usize,
}

/// A bundle assembled in memory, not yet written
#[derive(Debug, Clone)]
pub struct AssembledBundle {
    pub archive: Archive,
    pub manifest: ManifestAttributes,
    pub stats: AssemblyStats,
}

impl AssembledBundle {
    /// Encode the bundle exactly as it would be written to disk
    pub fn encode(&self) -> Result<Vec<u8>> {
        archive::encode_jar(Cursor::new(Vec::new()), &self.manifest, &self.archive)
            .map(Cursor::into_inner)
            .map_err(|e| Error::write_failure(self.archive.name(), e))
    }

    /// Entries in the written jar, manifest included
    pub fn entry_count(&self) -> usize {
        self.archive.len() + 1
    }
}

/// Result of a successful build
#[derive(Debug, Clone)]
pub struct BuildReport {
    pub classifier_jar: PathBuf,
    pub primary_jar: PathBuf,
    /// SHA-256 shared by both jars
    pub sha256: String,
    pub size: u64,
    pub entries: usize,
    pub implementation_version: String,
    pub stats: AssemblyStats,
}

/// Agent-lib jars after shared-library filtering
struct AgentLibs {
    archives: Vec<Archive>,
    dropped: Vec<String>,
    stray: usize,
}

/// A validated build ready to run
#[derive(Debug)]
pub struct Pipeline {
    config: BundleConfig,
    relocator: Relocator,
    plan: NamespacePlan,
}

impl Pipeline {
    /// Validate the configuration and relocation map; performs no I/O
    pub fn new(config: BundleConfig) -> Result<Self> {
        config.validate()?;
        let map = RelocationMap::new(&config.relocate, config.shared_contract.clone())?;
        let plan = NamespacePlan::new(&config.isolation)?;
        debug!(
            "Pipeline for {} {}: {} relocation rules, isolation prefix {}/",
            config.project.name,
            config.project.version,
            map.len(),
            plan.prefix()
        );
        Ok(Self {
            config,
            relocator: Relocator::new(map),
            plan,
        })
    }

    pub fn config(&self) -> &BundleConfig {
        &self.config
    }

    pub fn plan(&self) -> &NamespacePlan {
        &self.plan
    }

    pub fn shared(&self) -> &SharedContract {
        self.relocator.map().shared()
    }

    /// Run every stage up to the manifest, without writing anything
    pub fn assemble(&self, progress: &dyn ProgressTracker) -> Result<AssembledBundle> {
        let mut stats = AssemblyStats::default();

        let (bootstrap, agent_libs, upstream) = run_stage(progress, Stage::ResolveInputs, || {
            let inputs = &self.config.inputs;
            let base = self.config.base_dir();
            let bootstrap =
                LibrarySet::resolve("bootstrap", LibrarySetKind::Bootstrap, &inputs.bootstrap, base)?;
            let agent_libs =
                LibrarySet::resolve("agentLibs", LibrarySetKind::AgentLibs, &inputs.agent_libs, base)?;
            let upstream =
                LibrarySet::resolve("upstreamAgent", LibrarySetKind::Upstream, &inputs.upstream, base)?;

            let loaded = (bootstrap.load()?, self.filter_agent_libs(&agent_libs)?, upstream.load()?);
            Ok(loaded)
        })?;
        stats.bootstrap_jars = bootstrap.len();
        stats.agent_lib_jars = agent_libs.archives.len();
        stats.upstream_jars = upstream.len();
        stats.shared_jars_dropped = agent_libs.dropped;
        stats.stray_shared_entries = agent_libs.stray;

        let merger = Merger::new(DuplicatePolicy::Fail)
            .with_service_files(self.config.merge.service_files);
        let relocated = run_stage(progress, Stage::RelocateAgentLibs, || {
            progress.set_message(&format!("{} jars", agent_libs.archives.len()));
            let relocated = self.relocator.relocate_all(&agent_libs.archives)?;
            merger.merge(RELOCATED_AGENT_LIBS, relocated)
        })?;
        stats.services_merged += relocated.services_merged;

        let isolated = run_stage(progress, Stage::Isolate, || {
            progress.set_message(RELOCATED_AGENT_LIBS);
            let mut result = self.plan.isolate(relocated.archive, self.shared())?;
            result.archive = result.archive.with_name(ISOLATED_AGENT_LIBS);
            Ok(result)
        })?;
        stats.isolation_excluded = isolated.excluded.len();

        let merger = Merger::new(DuplicatePolicy::Exclude)
            .with_service_files(self.config.merge.service_files);
        let merged = run_stage(progress, Stage::MergeBundle, || {
            let mut inputs = Vec::with_capacity(1 + bootstrap.len() + upstream.len());
            inputs.push(isolated.archive);
            progress.set_message("bootstrap");
            inputs.extend(self.relocator.relocate_all(&bootstrap)?);
            progress.set_message("upstreamAgent");
            inputs.extend(self.relocator.relocate_all(&upstream)?);
            merger.merge(&self.bundle_name(), inputs)
        })?;
        stats.duplicates_skipped = merged.duplicates_skipped;
        stats.services_merged += merged.services_merged;

        let manifest = run_stage(progress, Stage::BuildManifest, || {
            let project = &self.config.project;
            Ok(ManifestAttributes::for_bundle(
                &self.config.manifest,
                &project.version,
                &project.upstream_version,
            ))
        })?;

        info!(
            "Assembled {} with {} entries ({} duplicates skipped)",
            merged.archive.name(),
            merged.archive.len() + 1,
            stats.duplicates_skipped
        );

        Ok(AssembledBundle {
            archive: merged.archive,
            manifest,
            stats,
        })
    }

    /// Build the bundle and write both output jars
    pub fn run(&self, progress: &dyn ProgressTracker) -> Result<BuildReport> {
        match self.run_inner(progress) {
            Ok(report) => {
                progress.finish_with_message(&format!(
                    "Built {} ({} entries)",
                    report.classifier_jar.display(),
                    report.entries
                ));
                Ok(report)
            }
            Err(e) => {
                progress.finish_with_error(&e.root().to_string());
                Err(e)
            }
        }
    }

    fn run_inner(&self, progress: &dyn ProgressTracker) -> Result<BuildReport> {
        let bundle = self.assemble(progress)?;
        let dir = self.config.output_dir();
        let classifier_path = self.config.classifier_jar_path();
        let primary_path = self.config.primary_jar_path();

        let classifier_temp = run_stage(progress, Stage::WriteClassifierJar, || {
            progress.set_message(&classifier_path.display().to_string());
            archive::write_jar_to_temp(&dir, &bundle.manifest, &bundle.archive)
        })?;

        let sha256 = run_stage(progress, Stage::CopyPrimaryJar, || {
            progress.set_message(&primary_path.display().to_string());
            let primary_temp = archive::copy_to_temp(&classifier_temp, &dir)?;
            let sha256 = hash::sha256_file(classifier_temp.path())
                .map_err(|e| Error::write_failure(classifier_temp.path(), e))?;

            // Neither jar reaches its final path until both are complete
            archive::promote_pair(classifier_temp, &classifier_path, primary_temp, &primary_path)?;
            Ok(sha256)
        })?;

        let size = run_stage(progress, Stage::Done, || {
            std::fs::metadata(&classifier_path)
                .map(|m| m.len())
                .map_err(|e| Error::write_failure(&classifier_path, e))
        })?;
        info!(
            "Wrote {} and {} ({} bytes, {})",
            classifier_path.display(),
            primary_path.display(),
            size,
            hash::prefixed(&sha256)
        );

        Ok(BuildReport {
            implementation_version: bundle
                .manifest
                .value(IMPLEMENTATION_VERSION)
                .unwrap_or_default(),
            entries: bundle.entry_count(),
            stats: bundle.stats,
            classifier_jar: classifier_path,
            primary_jar: primary_path,
            sha256,
            size,
        })
    }

    fn bundle_name(&self) -> String {
        format!(
            "{}-{}-{}.jar",
            self.config.project.name, self.config.project.version, self.config.output.classifier
        )
    }

    /// Load agent-lib jars, leaving out the shared libraries
    fn filter_agent_libs(&self, set: &LibrarySet) -> Result<AgentLibs> {
        let shared = self.shared();
        let mut out = AgentLibs {
            archives: Vec::with_capacity(set.len()),
            dropped: Vec::new(),
            stray: 0,
        };

        for (path, archive) in set.files().iter().zip(set.load()?) {
            if let Some(lib) = shared.identify(path, &archive) {
                info!(
                    "Leaving {} out of agent libraries (shared library {})",
                    archive.name(),
                    lib.coordinate
                );
                out.dropped.push(archive.name().to_string());
                continue;
            }

            let has_stray = archive.entries().iter().any(|e| is_shared_class(shared, &e.path, e.kind));
            if !has_stray {
                out.archives.push(archive);
                continue;
            }

            let mut kept = Archive::new(archive.name());
            for entry in archive.into_entries() {
                if is_shared_class(shared, &entry.path, entry.kind) {
                    warn!(
                        "Dropping {} from {}: shared classes must come from the bootstrap tier",
                        entry.path,
                        kept.name()
                    );
                    out.stray += 1;
                    continue;
                }
                let _ = kept.push(entry);
            }
            out.archives.push(kept);
        }

        Ok(out)
    }
}

fn is_shared_class(shared: &SharedContract, path: &str, kind: EntryKind) -> bool {
    kind == EntryKind::Class && shared.covers_internal_name(archive::split_versioned(path).1)
}

/// Enter a stage and attribute any failure to it
fn run_stage<T>(
    progress: &dyn ProgressTracker,
    stage: Stage,
    f: impl FnOnce() -> Result<T>,
) -> Result<T> {
    progress.set_stage(stage);
    debug!("Entering stage {}", stage);
    f().map_err(|e| e.in_stage(stage))
}
