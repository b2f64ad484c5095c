// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! # widthswarm Agent
//!
//! One swarm member, launched by the orchestrator as
//! `widthswarm-agent <id> <x> <y> <total> <verbosity>`.
//!
//! Exit status 0 on success, 1 on a wrong argument count, an out-of-range
//! argument or any fatal shared-object error.

use clap::error::ErrorKind;
use clap::Parser;
use std::process::ExitCode;
use std::time::{Duration, Instant};
use tracing::error;

use widthswarm::{init_logging, level_for_verbosity};
use widthswarm_core::consensus::DEFAULT_NEIGHBOR_RADIUS;
use widthswarm_core::geometry::Position;
use widthswarm_core::record::AgentId;
use widthswarm_core::swarm_config::{DEFAULT_NAMESPACE, DEFAULT_WINDOW};
use widthswarm_swarm::{Agent, AgentAssignment, AgentSettings};

/// widthswarm agent process
#[derive(Parser)]
#[command(name = "widthswarm-agent")]
#[command(version, about, long_about = None)]
struct Cli {
    /// Slot index of this agent (0..total)
    id: u32,

    /// X coordinate on the grid
    x: i32,

    /// Y coordinate on the grid
    y: i32,

    /// Number of agents in the swarm
    total: u32,

    /// Verbosity (0-3)
    #[arg(value_parser = clap::value_parser!(u8).range(0..=3))]
    verbosity: u8,

    /// Prefix of every shared object name
    #[arg(long, env = "WIDTHSWARM_NAMESPACE", default_value = DEFAULT_NAMESPACE)]
    namespace: String,

    /// Waiting window in milliseconds, measured from process start
    #[arg(long, env = "WIDTHSWARM_WINDOW_MS")]
    window_ms: Option<u64>,

    /// Run-wide seed
    #[arg(long, env = "WIDTHSWARM_SEED")]
    seed: Option<u64>,

    /// Neighbourhood radius (inclusive)
    #[arg(
        long,
        env = "WIDTHSWARM_RADIUS",
        default_value_t = DEFAULT_NEIGHBOR_RADIUS,
        value_parser = clap::value_parser!(i32).range(0..)
    )]
    radius: i32,
}

fn main() -> ExitCode {
    let started = Instant::now();
    let cli = match Cli::try_parse() {
        Ok(cli) => cli,
        Err(e) => {
            let _ = e.print();
            return match e.kind() {
                ErrorKind::DisplayHelp | ErrorKind::DisplayVersion => ExitCode::SUCCESS,
                _ => ExitCode::from(1),
            };
        }
    };

    if let Err(e) = init_logging(level_for_verbosity(cli.verbosity)) {
        eprintln!("{:#}", e);
        return ExitCode::from(1);
    }

    let assignment = AgentAssignment {
        id: AgentId(cli.id),
        position: Position::new(cli.x, cli.y),
        swarm_size: cli.total,
    };
    let settings = AgentSettings {
        namespace: cli.namespace,
        window: cli
            .window_ms
            .map(Duration::from_millis)
            .unwrap_or(DEFAULT_WINDOW),
        seed: cli.seed,
        neighbor_radius: cli.radius,
    };

    match Agent::new(assignment, settings).run_from(started) {
        Ok(_) => ExitCode::SUCCESS,
        Err(e) => {
            error!("{}", e);
            ExitCode::from(1)
        }
    }
}
