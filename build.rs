// build.rs

use clap::{Arg, ArgAction, Command};
use clap_mangen::Man;
use std::env;
use std::fs;
use std::path::PathBuf;

/// Common argument: bundle configuration path
fn config_arg(default: Option<&'static str>) -> Arg {
    let arg = Arg::new("config")
        .short('c')
        .long("config")
        .value_name("PATH")
        .help("Bundle configuration (bundle.toml)");
    match default {
        Some(value) => arg.default_value(value),
        None => arg,
    }
}

fn build_cli() -> Command {
    Command::new("agent-bundle")
        .version(env!("CARGO_PKG_VERSION"))
        .about("Assemble a classloader-isolated javaagent bundle from relocated library sets")
        .subcommand_required(true)
        .arg(
            Arg::new("verbose")
                .short('v')
                .long("verbose")
                .action(ArgAction::Count)
                .global(true)
                .help("More log output (-v debug, -vv trace)"),
        )
        .arg(
            Arg::new("quiet")
                .short('q')
                .long("quiet")
                .action(ArgAction::SetTrue)
                .global(true)
                .help("Only log warnings and errors"),
        )
        .subcommand(
            Command::new("build")
                .about("Build the bundle described by a bundle.toml")
                .arg(config_arg(Some("bundle.toml")))
                .arg(Arg::new("project_version").long("project-version").help("Override project.version"))
                .arg(
                    Arg::new("upstream_version")
                        .long("upstream-version")
                        .help("Override project.upstream_version"),
                )
                .arg(Arg::new("output_dir").long("output-dir").help("Override output.dir"))
                .arg(
                    Arg::new("dry_run")
                        .long("dry-run")
                        .action(ArgAction::SetTrue)
                        .help("Assemble in memory and report, without writing any jar"),
                )
                .arg(
                    Arg::new("no_progress")
                        .long("no-progress")
                        .action(ArgAction::SetTrue)
                        .help("Log stages instead of drawing a progress bar"),
                ),
        )
        .subcommand(
            Command::new("inspect")
                .about("Show the contents of a jar")
                .arg(Arg::new("jar").required(true).help("Jar to inspect"))
                .arg(
                    Arg::new("manifest")
                        .long("manifest")
                        .action(ArgAction::SetTrue)
                        .help("Print only the manifest attributes"),
                ),
        )
        .subcommand(
            Command::new("verify")
                .about("Check a built bundle for isolation and manifest problems")
                .arg(Arg::new("jar").required(true).help("Bundle jar to verify"))
                .arg(
                    Arg::new("twin")
                        .long("twin")
                        .help("Second jar that must be byte-identical"),
                )
                .arg(config_arg(None)),
        )
        .subcommand(
            Command::new("completions")
                .about("Generate shell completions")
                .arg(Arg::new("shell").required(true).help("Shell to generate completions for")),
        )
}

fn main() {
    println!("cargo:rerun-if-changed=build.rs");

    let manifest_dir = match env::var("CARGO_MANIFEST_DIR") {
        Ok(dir) => PathBuf::from(dir),
        Err(e) => {
            println!("cargo:warning=CARGO_MANIFEST_DIR not set: {}", e);
            return;
        }
    };
    let man_dir = manifest_dir.join("man");

    if let Err(e) = fs::create_dir_all(&man_dir) {
        println!("cargo:warning=Failed to create man directory: {}", e);
        return;
    }

    let man = Man::new(build_cli());
    let mut buffer = Vec::new();

    if let Err(e) = man.render(&mut buffer) {
        println!("cargo:warning=Failed to render man page: {}", e);
        return;
    }

    let man_path = man_dir.join("agent-bundle.1");
    if let Err(e) = fs::write(&man_path, buffer) {
        println!("cargo:warning=Failed to write man page: {}", e);
    }
}
