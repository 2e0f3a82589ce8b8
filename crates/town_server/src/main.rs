//! Town authority host.
//!
//! Reads JSON commands from stdin (see [`town_server::console`]) and runs the
//! session on a fixed timer.
//!
//! ```bash
//! RUST_LOG=info cargo run -p town_server -- --tick-rate 30 --watch < demo.jsonl
//! ```

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tokio::io::BufReader;
use tokio::task::LocalSet;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use town_core::components::{DecorationIndex, FactoryId, ParticipantId, StructureId};
use town_core::config::TownConfig;
use town_core::interfaces::Presentation;
use town_core::structure::{LifecycleState, PaintStage};
use town_server::console::run_console;
use town_server::{AuthorityHost, HostError, ObserverLink, ServerConfig};

#[derive(Parser)]
#[command(name = "town_server")]
#[command(about = "Authoritative town host")]
#[command(version)]
struct Cli {
    /// Tuning file (defaults if omitted)
    #[arg(short, long)]
    config: Option<PathBuf>,

    /// Ticks per second
    #[arg(short, long)]
    tick_rate: Option<u32>,

    /// Maximum observers
    #[arg(long, default_value_t = 8)]
    max_observers: usize,

    /// Attach a logging observer
    #[arg(long)]
    watch: bool,
}

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    tracing_subscriber::registry()
        .with(tracing_subscriber::fmt::layer())
        .with(EnvFilter::from_default_env())
        .init();

    let cli = Cli::parse();
    match serve(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            tracing::error!(error = %e, "server failed");
            ExitCode::FAILURE
        }
    }
}

async fn serve(cli: Cli) -> Result<(), HostError> {
    let config = match &cli.config {
        Some(path) => TownConfig::load(path)?,
        None => TownConfig::default(),
    };
    let server = ServerConfig {
        tick_rate: cli.tick_rate,
        max_observers: cli.max_observers,
        ..ServerConfig::default()
    };
    let host = AuthorityHost::new(config, server)?;
    let handle = host.handle();

    let local = LocalSet::new();
    local
        .run_until(async move {
            let task = tokio::task::spawn_local(host.run());

            if cli.watch {
                let link = handle.join(ParticipantId(1)).await?;
                tokio::task::spawn_local(watch(link));
            }

            let commands = run_console(BufReader::new(tokio::io::stdin()), &handle).await?;
            let ticks = task
                .await
                .map_err(|e| HostError::Task(e.to_string()))??;
            tracing::info!(commands, ticks, "done");
            Ok::<(), HostError>(())
        })
        .await
}

/// Logs what an observer sees.
struct LogPresentation;

impl Presentation for LogPresentation {
    fn apply_visual(
        &mut self,
        structure: StructureId,
        state: LifecycleState,
        decoration: DecorationIndex,
        paint: PaintStage,
    ) {
        tracing::info!(
            %structure,
            ?state,
            decoration = decoration.0,
            ?paint,
            "observer: visual"
        );
    }

    fn apply_requirement(&mut self, factory: FactoryId, met: bool) {
        tracing::info!(%factory, met, "observer: requirement");
    }

    fn apply_hazard_intensity(&mut self, structure: StructureId, ratio: f32) {
        tracing::debug!(%structure, ratio, "observer: fire");
    }
}

async fn watch(mut link: ObserverLink) {
    let mut replica = match link.replica(LogPresentation) {
        Ok(replica) => replica,
        Err(e) => {
            tracing::warn!(error = %e, "observer could not attach");
            return;
        }
    };
    loop {
        match link.next_frame().await {
            Ok(Some(frame)) => {
                if let Err(e) = replica.apply_bytes(&frame) {
                    tracing::warn!(error = %e, "observer dropped a frame");
                }
            }
            Ok(None) => break,
            Err(e) => {
                tracing::warn!(error = %e, "observer detached");
                break;
            }
        }
    }
    tracing::info!(last_seq = replica.last_seq(), "observer finished");
}
