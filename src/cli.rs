// src/cli.rs
//! CLI definitions for agent-bundle
//!
//! Argument parsing only; the command implementations live in `commands`.

use clap::{ArgAction, Parser, Subcommand};
use clap_complete::Shell;
use std::path::PathBuf;

#[derive(Parser)]
#[command(name = "agent-bundle")]
#[command(version)]
#[command(about = "Assemble a classloader-isolated javaagent bundle from relocated library sets", long_about = None)]
pub struct Cli {
    /// More log output (-v debug, -vv trace)
    #[arg(short, long, global = true, action = ArgAction::Count)]
    pub verbose: u8,

    /// Only log warnings and errors
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Build the bundle described by a bundle.toml
    Build {
        /// Path to the bundle configuration
        #[arg(short, long, default_value = "bundle.toml")]
        config: PathBuf,

        /// Override project.version
        #[arg(long)]
        project_version: Option<String>,

        /// Override project.upstream_version
        #[arg(long)]
        upstream_version: Option<String>,

        /// Override output.dir
        #[arg(long)]
        output_dir: Option<PathBuf>,

        /// Assemble in memory and report, without writing any jar
        #[arg(long)]
        dry_run: bool,

        /// Log stages instead of drawing a progress bar
        #[arg(long)]
        no_progress: bool,
    },

    /// Show the contents of a jar
    Inspect {
        /// Jar to inspect
        jar: PathBuf,

        /// Print only the manifest attributes
        #[arg(long)]
        manifest: bool,
    },

    /// Check a built bundle for isolation and manifest problems
    Verify {
        /// Bundle jar to verify
        jar: PathBuf,

        /// Second jar that must be byte-identical (the classifier-less copy)
        #[arg(long)]
        twin: Option<PathBuf>,

        /// Take the isolation prefix and shared libraries from this configuration
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Generate shell completions
    Completions {
        /// Shell to generate completions for
        #[arg(value_enum)]
        shell: Shell,
    },
}
