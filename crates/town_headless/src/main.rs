//! Headless town scenario runner.
//!
//! # Usage
//!
//! ```bash
//! # Run a scenario, writing JSON lines to stdout
//! cargo run -p town_headless -- run --scenario scenarios/fire_drill.ron
//!
//! # Attach a late observer at tick 44 and check it agrees with the authority
//! cargo run -p town_headless -- run --scenario scenarios/fire_drill.ron --observer-join-tick 44
//!
//! # Validate a tuning file
//! cargo run -p town_headless -- check-config town.ron
//!
//! # Print the default tuning
//! cargo run -p town_headless -- default-config
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

use town_core::config::TownConfig;
use town_headless::{RunOptions, Scenario, ScenarioError, ScenarioRunner};

#[derive(Parser)]
#[command(name = "town_headless")]
#[command(about = "Headless town scenario runner for CI")]
#[command(version)]
struct Cli {
    /// Enable verbose logging to stderr
    #[arg(short, long, global = true)]
    verbose: bool,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run a scenario
    Run {
        /// Scenario file to load
        #[arg(short, long)]
        scenario: PathBuf,

        /// Attach a late observer at this tick
        #[arg(long)]
        observer_join_tick: Option<u64>,

        /// Tuning file (defaults if omitted)
        #[arg(short, long)]
        config: Option<PathBuf>,
    },

    /// Validate a tuning file
    CheckConfig {
        /// Tuning file
        path: PathBuf,
    },

    /// Print the default tuning as RON
    DefaultConfig,
}

fn main() -> ExitCode {
    let cli = Cli::parse();

    // Initialize logging to stderr (stdout is for records)
    let log_level = if cli.verbose {
        tracing::Level::DEBUG
    } else {
        tracing::Level::INFO
    };

    tracing_subscriber::registry()
        .with(
            tracing_subscriber::fmt::layer()
                .with_writer(std::io::stderr)
                .with_ansi(true),
        )
        .with(tracing_subscriber::filter::LevelFilter::from_level(
            log_level,
        ))
        .init();

    let result = match cli.command {
        Commands::Run {
            scenario,
            observer_join_tick,
            config,
        } => cmd_run(&scenario, observer_join_tick, config.as_deref()),
        Commands::CheckConfig { path } => cmd_check_config(&path),
        Commands::DefaultConfig => cmd_default_config(),
    };

    match result {
        Ok(code) => code,
        Err(e) => {
            tracing::error!(error = %e, "headless run failed");
            eprintln!("Error: {e}");
            ExitCode::FAILURE
        }
    }
}

/// Run a single scenario
fn cmd_run(
    scenario: &std::path::Path,
    observer_join_tick: Option<u64>,
    config: Option<&std::path::Path>,
) -> Result<ExitCode, ScenarioError> {
    let scenario = Scenario::load(scenario)?;
    let config = match config {
        Some(path) => TownConfig::load(path)?,
        None => TownConfig::default(),
    };

    let runner = ScenarioRunner::new(scenario, config, RunOptions { observer_join_tick });
    let stdout = std::io::stdout();
    let summary = runner.run(&mut stdout.lock())?;

    if summary.replica_consistent == Some(false) {
        return Ok(ExitCode::FAILURE);
    }
    Ok(ExitCode::SUCCESS)
}

/// Validate a tuning file
fn cmd_check_config(path: &std::path::Path) -> Result<ExitCode, ScenarioError> {
    let config = TownConfig::load(path)?;
    tracing::info!(tick_rate = config.tick_rate, "config is valid");
    println!("{} is valid", path.display());
    Ok(ExitCode::SUCCESS)
}

/// Print the default tuning
fn cmd_default_config() -> Result<ExitCode, ScenarioError> {
    println!("{}", TownConfig::default().to_ron_string()?);
    Ok(ExitCode::SUCCESS)
}
