//! Workflow Gates CLI
//!
//! Runs a gate workflow against a project, or validates a task graph file.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use workflow_gates::{run_workflow, validate_task_file, Error};

#[derive(Parser)]
#[command(name = "workflow-gates", version)]
struct Cli {
    #[command(subcommand)]
    cmd: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the gated workflow
    Run {
        /// Path to the workflow configuration (YAML, TOML or JSON)
        #[arg(long, default_value = "workflow/gate_controller.yaml")]
        config: PathBuf,

        /// Project root the gates validate
        #[arg(long, default_value = ".")]
        project_root: PathBuf,

        /// Enable debug logging
        #[arg(long)]
        verbose: bool,
    },

    /// Validate a task graph file
    ValidateTasks {
        #[arg(long, default_value = "tasks.json")]
        input: PathBuf,
    },
}

fn init_tracing(verbose: bool) {
    let level = if verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::from_default_env().add_directive(level.into()))
        .with_writer(std::io::stderr)
        .init();
}

fn run(config: PathBuf, project_root: PathBuf, verbose: bool) -> ExitCode {
    init_tracing(verbose);

    match run_workflow(&config, &project_root) {
        Ok(report) => {
            println!("Workflow completed: {}", report.run_id);
            for outcome in &report.outcomes {
                println!("  [{:?}] {}: {}", outcome.status, outcome.name, outcome.details);
            }
            println!("Manifest: {}", report.manifest_path.display());
            ExitCode::SUCCESS
        }
        Err(e @ Error::GateFailed { .. }) => {
            eprintln!("{}", e);
            ExitCode::from(2)
        }
        Err(e) if e.is_config() => {
            eprintln!("configuration error: {}", e);
            ExitCode::from(3)
        }
        Err(e) => {
            eprintln!("unexpected error: {}", e);
            ExitCode::from(4)
        }
    }
}

fn validate_tasks(input: PathBuf) -> ExitCode {
    let report = match validate_task_file(&input) {
        Ok(report) => report,
        Err(e) => {
            println!("[ERR] {}", e);
            return ExitCode::from(2);
        }
    };

    if report.is_valid() {
        println!("[OK] tasks DAG valid; ids unique; references resolved; enums valid");
        println!("Order: {}", report.order.join(" -> "));
        ExitCode::SUCCESS
    } else {
        println!("[FAIL] tasks validation errors:");
        for error in report.errors() {
            println!(" - {}", error);
        }
        ExitCode::from(2)
    }
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    match cli.cmd {
        Command::Run {
            config,
            project_root,
            verbose,
        } => run(config, project_root, verbose),
        Command::ValidateTasks { input } => validate_tasks(input),
    }
}
