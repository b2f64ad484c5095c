// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Agent Lifecycle
//!
//! One swarm member. The same code runs inside the `widthswarm-agent` process
//! and inside the in-process [`ThreadLauncher`](super::launcher::ThreadLauncher).
//!
//! ```text
//! Measuring → Publishing → AwaitingBarrier → Consensus → WaitingWindow → Reducing → Done
//! ```
//!
//! | Phase | Shared objects touched |
//! |-------|------------------------|
//! | Measuring | exit geometry (read) |
//! | Publishing | own record slot (write once) |
//! | AwaitingBarrier | barrier (`arrive`, then wait for `N`) |
//! | Consensus | every record slot (read, one worker each) |
//! | WaitingWindow | none; sleeps until `start + window` |
//!
//! `start` is [`Agent::run`]'s own start unless the caller passes an earlier
//! instant to [`Agent::run_from`], as the agent binary does with its process
//! start.
//! | Reducing | accumulator, under the reduction guard |
//!
//! Any [`ResourceError`] aborts the agent. Mappings it holds are released on
//! the way out; on success they are detached explicitly.

use crate::infrastructure::arena::{Accumulator, AgentTable, ArenaNames, ExitView};
use crate::infrastructure::barrier::ProcessBarrier;
use crate::infrastructure::error::ResourceError;
use crate::infrastructure::guard::ReductionGuard;
use crate::infrastructure::peer_source::ShmPeerSource;
use rand::rngs::StdRng;
use rand::SeedableRng;
use std::fmt;
use std::time::{Duration, Instant};
use thiserror::Error;
use tracing::{debug, info, info_span};
use widthswarm_core::consensus::{Consensus, ConsensusEngine, DEFAULT_NEIGHBOR_RADIUS};
use widthswarm_core::geometry::Position;
use widthswarm_core::noise::{agent_seed, BandedNoiseModel, NoiseModel};
use widthswarm_core::record::{AgentId, AgentRecord, ExitGeometry};
use widthswarm_core::swarm_config::{DEFAULT_NAMESPACE, DEFAULT_WINDOW};

/// Identity handed to an agent at launch.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentAssignment {
    pub id: AgentId,
    pub position: Position,
    pub swarm_size: u32,
}

/// Run-wide settings every agent of a swarm shares.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AgentSettings {
    pub namespace: String,
    /// Measured from the start instant given to [`Agent::run_from`].
    pub window: Duration,
    pub seed: Option<u64>,
    pub neighbor_radius: i32,
}

impl Default for AgentSettings {
    fn default() -> Self {
        Self {
            namespace: DEFAULT_NAMESPACE.to_string(),
            window: DEFAULT_WINDOW,
            seed: None,
            neighbor_radius: DEFAULT_NEIGHBOR_RADIUS,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AgentPhase {
    Measuring,
    Publishing,
    AwaitingBarrier,
    Consensus,
    WaitingWindow,
    Reducing,
    Done,
}

impl fmt::Display for AgentPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            AgentPhase::Measuring => "measuring",
            AgentPhase::Publishing => "publishing",
            AgentPhase::AwaitingBarrier => "awaiting barrier",
            AgentPhase::Consensus => "consensus",
            AgentPhase::WaitingWindow => "waiting window",
            AgentPhase::Reducing => "reducing",
            AgentPhase::Done => "done",
        };
        f.write_str(s)
    }
}

#[derive(Debug, Error)]
pub enum AgentError {
    #[error("agent {id} failed while {phase}: {source}")]
    Resource {
        id: AgentId,
        phase: AgentPhase,
        #[source]
        source: ResourceError,
    },

    #[error("invalid assignment: {0}")]
    InvalidAssignment(String),
}

/// What a finished agent contributed.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AgentOutcome {
    pub record: AgentRecord,
    pub consensus: Consensus,
    /// Accumulator value right after this agent's addition.
    pub accumulator_after: i64,
}

pub struct Agent<N: NoiseModel = BandedNoiseModel> {
    assignment: AgentAssignment,
    settings: AgentSettings,
    noise: N,
}

impl Agent<BandedNoiseModel> {
    pub fn new(assignment: AgentAssignment, settings: AgentSettings) -> Self {
        Self::with_noise_model(assignment, settings, BandedNoiseModel::new())
    }
}

impl<N: NoiseModel> Agent<N> {
    pub fn with_noise_model(
        assignment: AgentAssignment,
        settings: AgentSettings,
        noise: N,
    ) -> Self {
        Self {
            assignment,
            settings,
            noise,
        }
    }

    /// This agent's measurement of `exit`.
    ///
    /// Deterministic for a seeded run: the noise draw comes from an RNG seeded
    /// with [`agent_seed`] of the run seed and the agent id.
    pub fn measure(&self, exit: &ExitGeometry) -> AgentRecord {
        let mut rng = match self.settings.seed {
            Some(seed) => StdRng::seed_from_u64(agent_seed(seed, self.assignment.id.0)),
            None => StdRng::from_os_rng(),
        };
        AgentRecord::measure(self.assignment.id, self.assignment.position, exit, |d, w| {
            self.noise.estimate(&mut rng, d, w)
        })
    }

    fn failed(&self, phase: AgentPhase) -> impl Fn(ResourceError) -> AgentError + '_ {
        move |source| AgentError::Resource {
            id: self.assignment.id,
            phase,
            source,
        }
    }

    /// Run the full lifecycle against the arena of `settings.namespace`.
    pub fn run(&self) -> Result<AgentOutcome, AgentError> {
        self.run_from(Instant::now())
    }

    /// Like [`Agent::run`], with the waiting window counted from `start`.
    pub fn run_from(&self, start: Instant) -> Result<AgentOutcome, AgentError> {
        let AgentAssignment {
            id,
            position,
            swarm_size,
        } = self.assignment;

        let span = info_span!("agent", id = %id);
        let _enter = span.enter();

        if id.0 >= swarm_size {
            return Err(AgentError::InvalidAssignment(format!(
                "agent id {} outside a swarm of {}",
                id, swarm_size
            )));
        }
        if !position.is_on_grid() {
            return Err(AgentError::InvalidAssignment(format!(
                "position {} is off the grid",
                position
            )));
        }

        let names = ArenaNames::new(&self.settings.namespace)
            .map_err(self.failed(AgentPhase::Measuring))?;

        // Measuring
        let exit_view = ExitView::attach(&names).map_err(self.failed(AgentPhase::Measuring))?;
        let exit = exit_view.read();
        exit_view.detach().map_err(self.failed(AgentPhase::Measuring))?;
        let record = self.measure(&exit);
        info!(
            "Agent {} at {}: distance to exit {}, estimate {}",
            id, position, record.distance_to_exit, record.local_estimate
        );

        // Publishing
        let table = AgentTable::attach(&names, swarm_size)
            .map_err(self.failed(AgentPhase::Publishing))?;
        table
            .slot(id)
            .and_then(|slot| slot.publish(&record))
            .map_err(self.failed(AgentPhase::Publishing))?;
        table.detach().map_err(self.failed(AgentPhase::Publishing))?;
        debug!("Agent {} published its record", id);

        // AwaitingBarrier
        let barrier = ProcessBarrier::open(&names.barrier)
            .map_err(self.failed(AgentPhase::AwaitingBarrier))?;
        let arrived = barrier
            .arrive()
            .map_err(self.failed(AgentPhase::AwaitingBarrier))?;
        debug!("Agent {} arrived at the barrier ({}/{})", id, arrived, swarm_size);
        barrier
            .wait_until_all_arrived(swarm_size)
            .map_err(self.failed(AgentPhase::AwaitingBarrier))?;
        barrier.detach().map_err(self.failed(AgentPhase::AwaitingBarrier))?;

        // Consensus
        let peers: Vec<AgentId> = AgentId::all(swarm_size).collect();
        let source = ShmPeerSource::new(names.clone(), swarm_size);
        let consensus =
            ConsensusEngine::new(self.settings.neighbor_radius).run(&record, &peers, &source);
        info!(
            "Agent {} local consensus {} from {} neighbour(s)",
            id, consensus.estimate, consensus.neighbors
        );

        // WaitingWindow
        let remaining = self.settings.window.saturating_sub(start.elapsed());
        debug!("Agent {} waiting {:?} before reducing", id, remaining);
        std::thread::sleep(remaining);

        // Reducing
        let guard =
            ReductionGuard::open(&names.guard).map_err(self.failed(AgentPhase::Reducing))?;
        let accumulator =
            Accumulator::attach(&names).map_err(self.failed(AgentPhase::Reducing))?;
        let accumulator_after = {
            let permit = guard
                .acquire()
                .map_err(self.failed(AgentPhase::Reducing))?;
            accumulator.add(&permit, i64::from(consensus.estimate))
        };
        accumulator.detach().map_err(self.failed(AgentPhase::Reducing))?;
        guard.close().map_err(self.failed(AgentPhase::Reducing))?;
        debug!(
            "Agent {} added {} (accumulator now {})",
            id, consensus.estimate, accumulator_after
        );

        info!("Agent {} {}", id, AgentPhase::Done);
        Ok(AgentOutcome {
            record,
            consensus,
            accumulator_after,
        })
    }
}
