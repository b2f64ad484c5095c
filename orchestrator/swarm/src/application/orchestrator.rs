// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Orchestrator
//!
//! Owns a run from start to finish:
//!
//! 1. Draw the exit width and agent placements (seeded when configured).
//! 2. Create the shared arena. An existing object in the namespace means
//!    another run owns it, and the run fails without touching it.
//! 3. Launch every agent through the [`AgentLauncher`].
//! 4. Reap every agent.
//! 5. Read the accumulator and compute `estimate = accumulator / N`.
//! 6. Tear the arena down.
//!
//! Leftovers of a crashed run are only removed on request, through
//! [`SwarmOrchestrator::purge_stale`].
//!
//! Failures in steps 2 and 3 abort the run. When launching agent `k` fails,
//! agents `0..k` are killed and reaped before the arena is removed. Agents that
//! exit unsuccessfully and teardown failures are reported but never change the
//! computed estimate.

use super::agent::{AgentAssignment, AgentSettings};
use super::launcher::{AgentLauncher, LaunchError, RunningAgent};
use crate::infrastructure::arena::SharedArena;
use crate::infrastructure::error::{ResourceError, TeardownError};
use futures::future::join_all;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::sync::Arc;
use thiserror::Error;
use tracing::{debug, error, info, warn};
use widthswarm_core::geometry::Position;
use widthswarm_core::record::{AgentId, ExitGeometry};
use widthswarm_core::swarm_config::{ConfigError, SwarmSpec};

#[derive(Debug, Error)]
pub enum OrchestratorError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("failed to set up shared objects: {0}")]
    Resource(#[from] ResourceError),

    #[error("failed to remove shared objects left by a previous run: {0}")]
    Purge(#[source] TeardownError),

    #[error(transparent)]
    Launch(#[from] LaunchError),
}

/// Outcome of one run.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct RunReport {
    pub true_width: i32,
    pub accumulator: i64,
    pub estimated_width: i32,
    pub difference: i32,
    pub failed_agents: Vec<AgentId>,
    pub teardown_errors: Vec<String>,
}

pub struct SwarmOrchestrator {
    spec: SwarmSpec,
    launcher: Arc<dyn AgentLauncher>,
}

impl SwarmOrchestrator {
    pub fn new(spec: SwarmSpec, launcher: Arc<dyn AgentLauncher>) -> Self {
        Self { spec, launcher }
    }

    fn settings(&self) -> AgentSettings {
        AgentSettings {
            namespace: self.spec.namespace.clone(),
            window: self.spec.window,
            seed: self.spec.seed,
            neighbor_radius: self.spec.neighbor_radius,
        }
    }

    /// Exit geometry and one position per agent.
    ///
    /// With a seed both are reproducible: the width is the first draw, then
    /// one position per agent unless placements are configured.
    pub fn draw_layout(&self) -> (ExitGeometry, Vec<Position>) {
        let mut rng = match self.spec.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_os_rng(),
        };
        let exit = ExitGeometry::random(&mut rng, self.spec.exit.position);
        let placements = if self.spec.placements.is_empty() {
            (0..self.spec.agents)
                .map(|_| Position::random(&mut rng))
                .collect()
        } else {
            self.spec.placements.clone()
        };
        (exit, placements)
    }

    /// Remove objects a crashed run left behind in this namespace.
    ///
    /// Must not be called while another run uses the namespace.
    pub fn purge_stale(&self) -> Result<usize, OrchestratorError> {
        let purged = SharedArena::purge(&self.spec.namespace).map_err(OrchestratorError::Purge)?;
        if purged > 0 {
            warn!(
                "Removed {} shared object(s) left behind in namespace '{}'",
                purged, self.spec.namespace
            );
        }
        Ok(purged)
    }

    pub async fn run(&self) -> Result<RunReport, OrchestratorError> {
        let agent_count = self.spec.agents;
        if agent_count == 0 {
            return Err(ConfigError::Invalid("swarm needs at least one agent".to_string()).into());
        }

        let (exit, placements) = self.draw_layout();
        if placements.len() != agent_count as usize {
            return Err(ConfigError::Invalid(format!(
                "{} placements configured for {} agents",
                placements.len(),
                agent_count
            ))
            .into());
        }

        let arena = SharedArena::create(&self.spec.namespace, agent_count, &exit)?;
        let settings = self.settings();

        let mut running: Vec<Box<dyn RunningAgent>> = Vec::with_capacity(placements.len());
        for (id, position) in AgentId::all(agent_count).zip(placements) {
            let assignment = AgentAssignment {
                id,
                position,
                swarm_size: agent_count,
            };
            match self.launcher.launch(&assignment, &settings).await {
                Ok(agent) => {
                    debug!("Launched agent {} at {}", id, position);
                    metrics::counter!("widthswarm_agents_launched_total").increment(1);
                    running.push(agent);
                }
                Err(e) => {
                    error!("{}; stopping {} launched agent(s)", e, running.len());
                    Self::abort(running).await;
                    Self::teardown(arena);
                    return Err(e.into());
                }
            }
        }
        info!("Launched {} agents, waiting for them to finish", agent_count);

        let exits = join_all(running.iter_mut().map(|agent| async move {
            let status = agent.wait().await;
            (agent.id(), status)
        }))
        .await;

        let mut failed_agents = Vec::new();
        for (id, status) in exits {
            if status.is_success() {
                debug!("Agent {} {}", id, status);
            } else {
                warn!("Agent {} {}", id, status);
                failed_agents.push(id);
            }
        }
        if !failed_agents.is_empty() {
            metrics::counter!("widthswarm_agent_failures_total")
                .increment(failed_agents.len() as u64);
        }

        let accumulator = arena.accumulator().load();
        let estimated_width = (accumulator / i64::from(agent_count)) as i32;
        let difference = (exit.width - estimated_width).abs();
        info!(
            "Accumulator {} over {} agents: estimated width {}, true width {}",
            accumulator, agent_count, estimated_width, exit.width
        );

        let teardown_errors = Self::teardown(arena);

        Ok(RunReport {
            true_width: exit.width,
            accumulator,
            estimated_width,
            difference,
            failed_agents,
            teardown_errors,
        })
    }

    async fn abort(mut running: Vec<Box<dyn RunningAgent>>) {
        for agent in running.iter_mut() {
            match agent.kill().await {
                Ok(()) => {
                    let status = agent.wait().await;
                    debug!("Stopped agent {}: {}", agent.id(), status);
                }
                Err(e) => warn!("{}; leaving it behind", e),
            }
        }
    }

    fn teardown(arena: SharedArena) -> Vec<String> {
        match arena.destroy() {
            Ok(()) => Vec::new(),
            Err(TeardownError { failures }) => failures
                .into_iter()
                .map(|e| {
                    warn!("Teardown: {}", e);
                    e.to_string()
                })
                .collect(),
        }
    }
}
