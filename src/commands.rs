// src/commands.rs
//! Command handlers for the agent-bundle CLI

use agent_bundle::archive::{Archive, EntryKind, MANIFEST_PATH};
use agent_bundle::config::BundleConfig;
use agent_bundle::hash;
use agent_bundle::isolate::{IsolationConfig, NamespacePlan};
use agent_bundle::manifest::ManifestAttributes;
use agent_bundle::pipeline::{AssemblyStats, Pipeline};
use agent_bundle::progress::{CliProgress, LogProgress, ProgressTracker, SilentProgress};
use agent_bundle::shared::SharedContract;
use agent_bundle::verify::{self, VerifyReport};
use anyhow::{Context, Result};
use clap::CommandFactory;
use clap_complete::Shell;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::cli::Cli;

/// How a build reports progress
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ProgressMode {
    Bar,
    Log,
    Silent,
}

/// Overrides given on the command line for one build
pub struct BuildOverrides {
    pub project_version: Option<String>,
    pub upstream_version: Option<String>,
    pub output_dir: Option<PathBuf>,
}

pub fn cmd_build(
    config_path: &Path,
    overrides: BuildOverrides,
    dry_run: bool,
    mode: ProgressMode,
) -> Result<()> {
    let mut config = BundleConfig::from_file(config_path)
        .with_context(|| format!("Failed to load {}", config_path.display()))?;
    if let Some(version) = overrides.project_version {
        config.set_version(version);
    }
    if let Some(version) = overrides.upstream_version {
        config.set_upstream_version(version);
    }
    if let Some(dir) = overrides.output_dir {
        config.set_output_dir(dir);
    }

    let pipeline = Pipeline::new(config).context("Invalid bundle configuration")?;

    let progress: Box<dyn ProgressTracker> = match mode {
        ProgressMode::Bar => Box::new(CliProgress::new()),
        ProgressMode::Log => Box::new(LogProgress::new(pipeline.config().project.name.clone())),
        ProgressMode::Silent => Box::new(SilentProgress::new()),
    };

    if dry_run {
        let bundle = pipeline.assemble(progress.as_ref())?;
        let bytes = bundle.encode().context("Failed to encode bundle")?;
        progress.finish_with_message("Dry run complete");

        println!("Dry run: nothing written");
        println!("Would write: {}", pipeline.config().classifier_jar_path().display());
        println!("Would write: {}", pipeline.config().primary_jar_path().display());
        println!("Version: {}", pipeline.config().implementation_version());
        println!("Entries: {}", bundle.entry_count());
        println!("Size: {} bytes", bytes.len());
        println!("SHA-256: {}", hash::sha256(&bytes));
        print_stats(&bundle.stats);
        return Ok(());
    }

    let report = pipeline.run(progress.as_ref())?;

    println!("Built bundle {}", report.implementation_version);
    println!("  {}", report.classifier_jar.display());
    println!("  {}", report.primary_jar.display());
    println!("Entries: {}", report.entries);
    println!("Size: {} bytes", report.size);
    println!("SHA-256: {}", report.sha256);
    print_stats(&report.stats);
    Ok(())
}

fn print_stats(stats: &AssemblyStats) {
    println!(
        "Inputs: {} bootstrap, {} agent libs, {} upstream",
        stats.bootstrap_jars, stats.agent_lib_jars, stats.upstream_jars
    );
    if !stats.shared_jars_dropped.is_empty() {
        println!("Shared libraries left out: {}", stats.shared_jars_dropped.join(", "));
    }
    if stats.stray_shared_entries > 0 {
        println!("Stray shared classes dropped: {}", stats.stray_shared_entries);
    }
    println!("Excluded by isolation: {}", stats.isolation_excluded);
    println!("Duplicates skipped: {}", stats.duplicates_skipped);
    println!("Service files merged: {}", stats.services_merged);
}

pub fn cmd_inspect(jar: &Path, manifest_only: bool) -> Result<()> {
    if !jar.exists() {
        anyhow::bail!("Jar not found: {}", jar.display());
    }
    let archive =
        Archive::read(jar).with_context(|| format!("Failed to read {}", jar.display()))?;

    let manifest = archive
        .get(MANIFEST_PATH)
        .map(|entry| ManifestAttributes::parse(&entry.content))
        .transpose()
        .context("Failed to parse manifest")?;

    if manifest_only {
        match manifest {
            Some(manifest) => {
                for (name, value) in manifest.iter() {
                    println!("{}: {}", name, value.render());
                }
            }
            None => println!("No manifest"),
        }
        return Ok(());
    }

    println!("{}", jar.display());
    println!("Entries: {}", archive.len());
    println!("Uncompressed size: {} bytes", archive.content_size());

    let mut kinds: BTreeMap<&str, usize> = BTreeMap::new();
    let mut top_level: BTreeMap<&str, usize> = BTreeMap::new();
    for entry in archive.entries() {
        *kinds.entry(entry.kind.as_str()).or_default() += 1;
        let dir = entry.path.split_once('/').map_or("(root)", |(dir, _)| dir);
        *top_level.entry(dir).or_default() += 1;
    }

    println!();
    println!("By kind:");
    for (kind, count) in &kinds {
        println!("  {:<10} {}", kind, count);
    }
    println!();
    println!("By top-level directory:");
    for (dir, count) in &top_level {
        println!("  {:<30} {}", dir, count);
    }

    let classes = archive
        .entries()
        .iter()
        .filter(|e| e.kind == EntryKind::Class)
        .count();
    println!();
    println!("Loadable classes: {}", classes);
    if let Some(manifest) = manifest {
        println!();
        println!("Manifest:");
        for (name, value) in manifest.iter() {
            println!("  {}: {}", name, value.render());
        }
    }
    Ok(())
}

pub fn cmd_verify(jar: &Path, twin: Option<&Path>, config_path: Option<&Path>) -> Result<()> {
    if !jar.exists() {
        anyhow::bail!("Bundle not found: {}", jar.display());
    }

    let (plan, shared) = match config_path {
        Some(path) => {
            let config = BundleConfig::from_file(path)
                .with_context(|| format!("Failed to load {}", path.display()))?;
            (NamespacePlan::new(&config.isolation)?, config.shared_contract)
        }
        None => (
            NamespacePlan::new(&IsolationConfig::default())?,
            SharedContract::default(),
        ),
    };

    println!("Verifying: {}", jar.display());
    println!();

    let report = verify::verify_bundle(jar, &plan, &shared).context("Verification failed")?;
    print_report(&report);

    let mut valid = report.valid;
    if let Some(twin) = twin {
        let check = verify::verify_twins(jar, twin).context("Twin comparison failed")?;
        if check.identical {
            println!("Twin: [IDENTICAL] {}", twin.display());
        } else {
            println!(
                "Twin: [DIFFERENT] {} ({} vs {})",
                twin.display(),
                check.first_sha256,
                check.second_sha256
            );
            valid = false;
        }
    }

    if !valid {
        anyhow::bail!("Bundle verification failed");
    }
    Ok(())
}

fn print_report(report: &VerifyReport) {
    let status = if report.valid { "[OK]" } else { "[FAILED]" };
    println!("{} {}", status, hash::prefixed(&report.sha256));
    println!("Entries: {}", report.entries);
    println!(
        "Isolated: {} entries, {} classes checked",
        report.isolated_entries, report.isolated_classes
    );
    if let Some(manifest) = &report.manifest {
        println!("Manifest: {} attributes", manifest.len());
    }
    for problem in &report.problems {
        println!("  - {}", problem);
    }
}

pub fn cmd_completions(shell: Shell) -> Result<()> {
    clap_complete::generate(
        shell,
        &mut Cli::command(),
        "agent-bundle",
        &mut std::io::stdout(),
    );
    Ok(())
}
