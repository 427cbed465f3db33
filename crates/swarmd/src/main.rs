//! swarmd — the SwarmGrid daemon.
//!
//! Single binary that assembles all SwarmGrid subsystems:
//! - Resource ledger
//! - Coordinator (agent registry, task queue, load balancer)
//! - Health monitor (heartbeat timeouts, task deadlines)
//! - Scaling controller
//! - Snapshot publisher
//! - REST API + Prometheus exposition
//!
//! # Usage
//!
//! ```text
//! swarmd run --config swarm.toml --port 8440
//! swarmd check-config --config swarm.toml
//! ```

mod daemon;
mod process;

use std::path::PathBuf;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use swarm_core::{HumanDuration, SwarmConfig};

const DEFAULT_LOG_FILTER: &str = "info,swarmd=debug,swarmgrid=debug";

#[derive(Parser)]
#[command(name = "swarmd", about = "SwarmGrid coordination daemon")]
struct Cli {
    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand)]
enum Command {
    /// Run the coordinator with all background loops and the REST API.
    Run {
        /// Configuration file.
        #[arg(long, default_value = "swarm.toml")]
        config: PathBuf,

        /// Port to listen on.
        #[arg(long, default_value = "8440")]
        port: u16,

        /// Emit logs as JSON lines.
        #[arg(long)]
        log_json: bool,

        /// Override the health sweep interval, e.g. "5s".
        #[arg(long)]
        sweep_interval: Option<HumanDuration>,

        /// Override the scaling evaluation interval, e.g. "15s".
        #[arg(long)]
        evaluation_interval: Option<HumanDuration>,

        /// Command that starts one agent process. Enables autoscaling.
        #[arg(long)]
        agent_command: Option<String>,
    },

    /// Validate a configuration file and print the effective settings.
    CheckConfig {
        /// Configuration file.
        #[arg(long, default_value = "swarm.toml")]
        config: PathBuf,
    },
}

fn init_tracing(json: bool) {
    let filter =
        EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_LOG_FILTER));
    if json {
        tracing_subscriber::fmt()
            .json()
            .with_env_filter(filter)
            .init();
    } else {
        tracing_subscriber::fmt().with_env_filter(filter).init();
    }
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    match cli.command {
        Command::Run {
            config,
            port,
            log_json,
            sweep_interval,
            evaluation_interval,
            agent_command,
        } => {
            init_tracing(log_json);
            let mut swarm = SwarmConfig::from_file(&config)?;
            if let Some(interval) = sweep_interval {
                swarm.health.sweep_interval = interval;
            }
            if let Some(interval) = evaluation_interval {
                swarm.scaling.evaluation_interval = interval;
            }
            swarm.validate()?;
            tracing::info!(path = ?config, "configuration loaded");

            daemon::run(
                swarm,
                daemon::RunOptions {
                    port,
                    agent_command,
                },
            )
            .await
        }
        Command::CheckConfig { config } => {
            let swarm = SwarmConfig::from_file(&config)?;
            println!("# {} is valid\n", config.display());
            print!("{}", swarm.to_toml_string()?);
            Ok(())
        }
    }
}
