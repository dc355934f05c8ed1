//! Hotbuild CLI - Command line interface
//!
//! Workspace-based builds - all configuration from `<base>/hotbuild.json`

use clap::{Parser, Subcommand};
use hotbuild_config::{BuildConfig, Workspace};
use hotbuild_orchestrator::{Engine, ProcessCompileService, ReferenceRoots};
use hotbuild_vfs::NativeFileSystem;
use std::path::{Path, PathBuf};
use std::process;
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error};

mod config;
mod logging;
mod platform;

use crate::config::LogConfig;
use crate::logging::LogFormat;

#[derive(Parser)]
#[command(
    name = "hotbuild",
    about = "Hot compilation of plugin sources against a running host",
    version = "0.1.0"
)]
struct Cli {
    /// Workspace directory holding source, output, assemblies and logs
    #[arg(long, value_name = "DIR", default_value = ".")]
    base: PathBuf,

    /// Compile service helper executable
    #[arg(long, value_name = "PROGRAM", default_value = "hotbuild-compiler")]
    compiler: PathBuf,

    /// Extra argument passed to the helper (repeatable)
    #[arg(long = "compiler-arg", value_name = "ARG")]
    compiler_args: Vec<String>,

    /// Host install root (interface and runtime binaries)
    #[arg(long, value_name = "DIR")]
    host: Option<PathBuf>,

    /// Runtime install directory (platform assemblies)
    #[arg(long, value_name = "DIR")]
    runtime: Option<PathBuf>,

    #[arg(long, value_enum, default_value = "compact")]
    log_format: LogFormat,

    /// Also append logs to this file
    #[arg(long, value_name = "FILE")]
    log_file: Option<PathBuf>,

    /// Per-stage level, e.g. `compile=trace` (repeatable)
    #[arg(long = "log", value_name = "STAGE=LEVEL")]
    log: Vec<String>,

    /// Increase verbosity (-v debug, -vv trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Compile every source group
    Build {
        /// Source directory (default: the workspace source folder)
        path: Option<PathBuf>,
    },
    /// Delete every file in the source folder
    Clean,
    /// Show workspace folders and file counts
    Paths,
    /// Print the configuration document
    Config,
    /// Turn compilation on
    Enable,
    /// Turn compilation off
    Disable,
    /// Compile a script file and run it once
    Script {
        file: PathBuf,
        /// JSON context handed to the script
        #[arg(long, default_value = "null")]
        context: String,
        #[arg(long, default_value_t = 5000)]
        timeout_ms: u64,
    },
}

fn main() {
    let cli = Cli::parse();

    let log_config = LogConfig::from_args(cli.verbose, &cli.log).unwrap_or_else(|e| fail(&e));
    if let Err(e) = logging::init_with_file(&log_config, cli.log_format, cli.log_file.as_deref()) {
        fail(&format!("cannot open log file: {}", e));
    }

    let workspace = Workspace::new(&cli.base);
    let build_config = config::load_or_create(&workspace).unwrap_or_else(|e| fail(&e));
    debug!(target: "hotbuild::cli", base = %workspace.base().display(), "configuration loaded");

    let ok = match &cli.command {
        Command::Config => {
            println!("# {}", workspace.config_path().display());
            match build_config.to_json_pretty() {
                Ok(text) => println!("{}", text),
                Err(e) => fail(&e.to_string()),
            }
            true
        }
        Command::Enable => set_enabled(&workspace, build_config, true),
        Command::Disable => set_enabled(&workspace, build_config, false),
        Command::Paths => {
            println!("{}", engine(&cli, &workspace, build_config).orchestrator().describe_paths());
            true
        }
        Command::Clean => match engine(&cli, &workspace, build_config).orchestrator().clean_sources() {
            Ok(removed) => {
                println!("✅ removed {} file(s) from {}", removed, workspace.source_dir().display());
                true
            }
            Err(e) => {
                error!(target: "hotbuild::cli", %e, "clean failed");
                false
            }
        },
        Command::Build { path } => {
            let engine = engine(&cli, &workspace, build_config);
            let root = path.clone().unwrap_or_else(|| workspace.source_dir());
            match engine.orchestrator().build_dir(&root) {
                Ok(report) => platform::print_report(&report),
                Err(failure) => {
                    platform::print_failure(&failure);
                    false
                }
            }
        }
        Command::Script {
            file,
            context,
            timeout_ms,
        } => run_script(&cli, &workspace, build_config, file, context, *timeout_ms),
    };

    if !ok {
        process::exit(1);
    }
}

fn fail(message: &str) -> ! {
    eprintln!("Error: {}", message);
    process::exit(1);
}

fn engine(cli: &Cli, workspace: &Workspace, config: BuildConfig) -> Engine {
    let mut roots = ReferenceRoots::for_workspace(workspace);
    if let Some(host) = &cli.host {
        roots = roots.with_host(host);
    }
    if let Some(runtime) = &cli.runtime {
        roots = roots.with_runtime(runtime);
    }
    let service = ProcessCompileService::new(&cli.compiler).with_args(cli.compiler_args.iter());
    Engine::new(
        config,
        workspace.clone(),
        Arc::new(NativeFileSystem::new()),
        Arc::new(service),
        roots,
    )
}

fn set_enabled(workspace: &Workspace, mut config: BuildConfig, enabled: bool) -> bool {
    config.enabled = enabled;
    match config::save(&workspace.config_path(), &config) {
        Ok(()) => {
            println!("compilation {}", if enabled { "enabled" } else { "disabled" });
            true
        }
        Err(e) => {
            eprintln!("Error: {}", e);
            false
        }
    }
}

fn run_script(
    cli: &Cli,
    workspace: &Workspace,
    config: BuildConfig,
    file: &Path,
    context: &str,
    timeout_ms: u64,
) -> bool {
    let context: serde_json::Value = match serde_json::from_str(context) {
        Ok(value) => value,
        Err(e) => {
            eprintln!("Error: context is not JSON: {}", e);
            return false;
        }
    };

    let result = engine(cli, workspace, config).run_script_file(
        file,
        context,
        Duration::from_millis(timeout_ms),
    );
    match result {
        Ok(value) => {
            println!("{}", value);
            true
        }
        Err(e) => {
            eprintln!("❌ {}", e);
            false
        }
    }
}
