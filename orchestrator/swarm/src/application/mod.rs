// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Application Layer
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`agent`] | `Agent`, `AgentAssignment`, `AgentSettings`, `AgentPhase` |
//! | [`launcher`] | `AgentLauncher`, `RunningAgent`, `ThreadLauncher` |
//! | [`orchestrator`] | `SwarmOrchestrator`, `RunReport` |

pub mod agent;
pub mod launcher;
pub mod orchestrator;

pub use agent::{Agent, AgentAssignment, AgentError, AgentOutcome, AgentPhase, AgentSettings};
pub use launcher::{AgentExit, AgentLauncher, LaunchError, RunningAgent, ThreadLauncher};
pub use orchestrator::{OrchestratorError, RunReport, SwarmOrchestrator};
