// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # widthswarm Orchestrator
//!
//! The `widthswarm` binary runs one swarm: it creates the shared arena,
//! launches every agent, waits for all of them and prints
//! `True Width | Estimated Width | Difference`.
//!
//! ## Modes
//!
//! - **Default**: every agent is a separate `widthswarm-agent` process
//! - **`--in-process`**: agents run on threads of this process, same protocol
//!
//! A run refuses to start while any shared object of its namespace exists.
//! After a crash, `--purge` removes the leftovers before the run.
//!
//! ## Commands
//!
//! - `widthswarm` - Run a swarm (no arguments required, 50 agents by default)
//! - `widthswarm config show|validate|generate` - Configuration management

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;
use std::time::Duration;
use tracing::info;

use widthswarm::commands::{self, ConfigCommand};
use widthswarm::{init_logging, level_for_verbosity, report, ProcessLauncher};
use widthswarm_core::swarm_config::SwarmConfigManifest;
use widthswarm_swarm::{AgentLauncher, SwarmOrchestrator, ThreadLauncher};

/// widthswarm - Estimate an exit's width with a swarm of agents
#[derive(Parser)]
#[command(name = "widthswarm")]
#[command(version, about, long_about = None)]
#[command(propagate_version = true)]
struct Cli {
    /// Path to configuration file (overrides discovery)
    #[arg(
        short,
        long,
        global = true,
        env = "WIDTHSWARM_CONFIG_PATH",
        value_name = "FILE"
    )]
    config: Option<PathBuf>,

    /// Number of agents
    #[arg(short = 'n', long)]
    agents: Option<u32>,

    /// Run-wide seed for reproducible runs
    #[arg(long)]
    seed: Option<u64>,

    /// Time every agent waits before reducing (e.g. "10s", "250ms")
    #[arg(long, value_parser = humantime::parse_duration)]
    window: Option<Duration>,

    /// Prefix of every shared object name
    #[arg(long)]
    namespace: Option<String>,

    /// Agent and orchestrator verbosity (0-3)
    #[arg(long, value_parser = clap::value_parser!(u8).range(0..=3))]
    verbosity: Option<u8>,

    /// Log level (trace, debug, info, warn, error); overrides --verbosity
    #[arg(long, global = true, env = "WIDTHSWARM_LOG_LEVEL")]
    log_level: Option<String>,

    /// Path to the agent binary (default: next to this executable)
    #[arg(long, env = "WIDTHSWARM_AGENT_BIN", value_name = "FILE")]
    agent_bin: Option<PathBuf>,

    /// Run agents on threads of this process instead of separate processes
    #[arg(long)]
    in_process: bool,

    /// Remove shared objects a crashed run left in the namespace first.
    /// Only safe when no other run uses the namespace.
    #[arg(long)]
    purge: bool,

    #[command(subcommand)]
    command: Option<Commands>,
}

#[derive(Subcommand)]
enum Commands {
    /// Configuration management
    #[command(name = "config")]
    Config {
        #[command(subcommand)]
        command: ConfigCommand,
    },
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    if let Some(Commands::Config { command }) = cli.command {
        init_logging(cli.log_level.as_deref().unwrap_or("warn"))?;
        return commands::config::handle_command(command, cli.config);
    }

    let mut manifest = SwarmConfigManifest::load_or_default(cli.config.clone())
        .context("Failed to load configuration")?;
    let spec = &mut manifest.spec;
    if let Some(agents) = cli.agents {
        spec.agents = agents;
    }
    if let Some(seed) = cli.seed {
        spec.seed = Some(seed);
    }
    if let Some(window) = cli.window {
        spec.window = window;
    }
    if let Some(namespace) = cli.namespace {
        spec.namespace = namespace;
    }
    if let Some(verbosity) = cli.verbosity {
        spec.verbosity = verbosity;
    }
    manifest
        .validate()
        .context("Configuration validation failed")?;

    let spec = manifest.spec;
    let level = cli
        .log_level
        .unwrap_or_else(|| level_for_verbosity(spec.verbosity).to_string());
    init_logging(&level)?;

    let launcher: Arc<dyn AgentLauncher> = if cli.in_process {
        info!("Running {} agents in-process", spec.agents);
        Arc::new(ThreadLauncher::new())
    } else {
        let program = cli
            .agent_bin
            .unwrap_or_else(ProcessLauncher::locate_agent_binary);
        let launcher = ProcessLauncher::new(program, spec.verbosity);
        info!(
            "Running {} agent processes ({})",
            spec.agents,
            launcher.program().display()
        );
        Arc::new(launcher)
    };

    let orchestrator = SwarmOrchestrator::new(spec, launcher);
    if cli.purge {
        orchestrator
            .purge_stale()
            .context("Failed to purge stale shared objects")?;
    }
    let run = orchestrator.run().await.context("Swarm run failed")?;
    report::print_report(&run);

    Ok(())
}
