// src/main.rs

use anyhow::Result;
use clap::Parser;
use std::io::IsTerminal;

mod cli;
mod commands;

use cli::{Cli, Commands};
use commands::{BuildOverrides, ProgressMode};

fn main() -> Result<()> {
    let cli = Cli::parse();

    let default_level = match (cli.quiet, cli.verbose) {
        (true, _) => "warn",
        (false, 0) => "info",
        (false, 1) => "debug",
        (false, _) => "trace",
    };

    // Initialize tracing subscriber for logging; RUST_LOG wins over -v/-q
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new(default_level)),
        )
        .with_writer(std::io::stderr)
        .init();

    match cli.command {
        Commands::Build {
            config,
            project_version,
            upstream_version,
            output_dir,
            dry_run,
            no_progress,
        } => {
            let mode = if cli.quiet {
                ProgressMode::Silent
            } else if no_progress || !std::io::stderr().is_terminal() {
                ProgressMode::Log
            } else {
                ProgressMode::Bar
            };
            commands::cmd_build(
                &config,
                BuildOverrides {
                    project_version,
                    upstream_version,
                    output_dir,
                },
                dry_run,
                mode,
            )
        }
        Commands::Inspect { jar, manifest } => commands::cmd_inspect(&jar, manifest),
        Commands::Verify { jar, twin, config } => {
            commands::cmd_verify(&jar, twin.as_deref(), config.as_deref())
        }
        Commands::Completions { shell } => commands::cmd_completions(shell),
    }
}
