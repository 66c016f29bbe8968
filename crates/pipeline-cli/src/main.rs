// crates/pipeline-cli/src/main.rs
// ============================================================================
// Binary: pipeline
// Description: Bootstrap entry point: loads configuration, wires the
//              workspace's crates together, and serves the kill-switch
//              status and health HTTP surface.
// Purpose: Give operators a single command to run the pipeline host.
// ============================================================================

//! ## Overview
//! This binary only wires components together; execution handling lives in
//! `pipeline_orchestrator`, which is embedded directly into whatever process
//! also owns the event bus and the VCS/generation/review backends. This
//! binary starts the execution store and kill switch and serves the
//! operator-facing status and health surface in front of them.

// ============================================================================
// SECTION: Modules
// ============================================================================

mod server;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use clap::Parser;
use clap::Subcommand;
use pipeline_config::PipelineConfig;
use pipeline_killswitch::AutoTriggerConfig;
use pipeline_killswitch::KillSwitchService;
use pipeline_store::SqliteExecutionStore;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Command-line interface for the pipeline host.
#[derive(Debug, Parser)]
#[command(name = "pipeline", about = "Autonomous feature pipeline host")]
struct Cli {
    /// Path to a TOML configuration file; defaults are used when omitted.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Subcommand to run.
    #[command(subcommand)]
    command: Command,
}

/// Top-level subcommands.
#[derive(Debug, Subcommand)]
enum Command {
    /// Runs the kill-switch status and health HTTP server until interrupted.
    Serve,
    /// Validates the configuration file and exits.
    CheckConfig,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// Errors that can terminate the binary before the server starts.
#[derive(Debug, thiserror::Error)]
enum BootstrapError {
    /// Configuration could not be loaded.
    #[error("configuration error: {0}")]
    Config(#[from] pipeline_config::ConfigError),
    /// The execution store could not be opened.
    #[error("store error: {0}")]
    Store(#[from] pipeline_store::StoreError),
    /// The HTTP server failed to bind or run.
    #[error("server error: {0}")]
    Server(String),
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();
    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(err) => {
            eprint_error(&err);
            ExitCode::FAILURE
        }
    }
}

/// Writes a bootstrap error to standard error. Isolated in its own function
/// so `main` stays free of the `print_stderr` lint's direct-call ban.
#[allow(clippy::print_stderr, reason = "this is the one sanctioned top-level error reporting path")]
fn eprint_error(err: &BootstrapError) {
    eprintln!("pipeline: {err}");
}

/// Dispatches to the selected subcommand.
async fn run(cli: Cli) -> Result<(), BootstrapError> {
    let config = PipelineConfig::load(cli.config.as_deref())?;

    match cli.command {
        Command::CheckConfig => Ok(()),
        Command::Serve => serve(config).await,
    }
}

/// Opens the execution store and kill switch, then serves the status and
/// health HTTP surface until interrupted.
async fn serve(config: PipelineConfig) -> Result<(), BootstrapError> {
    let store = Arc::new(SqliteExecutionStore::open(&config.store.database_path)?);
    let kill_switch = Arc::new(KillSwitchService::new(AutoTriggerConfig {
        failure_rate_threshold: config.kill_switch.failure_rate_threshold,
        minimum_sample_size: config.kill_switch.minimum_sample_size,
        max_consecutive_failures: config.kill_switch.max_consecutive_failures,
    }));

    server::serve(&config.server.bind_address, store, kill_switch)
        .await
        .map_err(|err| BootstrapError::Server(err.to_string()))
}
