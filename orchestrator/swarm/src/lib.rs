// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `widthswarm-swarm`: Shared-Memory Swarm Coordination
//!
//! Runs a swarm of agents that estimate the exit width together, coordinating
//! only through named POSIX shared objects on the local host.
//!
//! ## Crate Layout
//!
//! | Module | Layer | Contents |
//! |--------|-------|----------|
//! | [`infrastructure`] | Infrastructure | shared regions, barrier, reduction guard, arena |
//! | [`application`] | Application | agent lifecycle, launcher seam, orchestrator |
//!
//! ## Key Concepts
//!
//! - **Arena**: five named objects per namespace, created and destroyed by the
//!   orchestrator only.
//! - **Barrier**: no agent reads a peer record before all `N` have published.
//! - **Reduction guard**: serialises the single accumulator update per agent.

pub mod application;
pub mod infrastructure;

pub use application::*;
pub use infrastructure::{ResourceError, SharedArena};
