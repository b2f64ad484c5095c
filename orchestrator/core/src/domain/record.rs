// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Records
//!
//! Plain value types exchanged through the shared arena:
//!
//! - [`ExitGeometry`]: the ground truth, written once by the orchestrator.
//! - [`AgentRecord`]: one agent's published measurement.
//! - [`AgentId`]: index of an agent's slot in the record table.

use crate::domain::geometry::Position;
use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::ops::RangeInclusive;

/// Range the true exit width is drawn from.
pub const EXIT_WIDTH_RANGE: RangeInclusive<i32> = 16..=26;

/// Where the exit sits unless configured otherwise.
pub const DEFAULT_EXIT_POSITION: Position = Position::new(99, 50);

/// Slot index of an agent inside the record table (`0..N`).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
pub struct AgentId(pub u32);

impl AgentId {
    pub fn index(&self) -> usize {
        self.0 as usize
    }

    /// Every id of a swarm of `count` agents, in slot order.
    pub fn all(count: u32) -> impl Iterator<Item = AgentId> {
        (0..count).map(AgentId)
    }
}

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

/// Ground truth shared by every agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExitGeometry {
    pub width: i32,
    pub position: Position,
}

impl ExitGeometry {
    /// Draw a width uniformly from [`EXIT_WIDTH_RANGE`].
    pub fn random<R: Rng + ?Sized>(rng: &mut R, position: Position) -> Self {
        Self {
            width: rng.random_range(EXIT_WIDTH_RANGE),
            position,
        }
    }
}

/// A single agent's published measurement.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentRecord {
    pub id: AgentId,
    pub position: Position,
    pub distance_to_exit: i32,
    pub local_estimate: i32,
}

impl AgentRecord {
    /// Measure the exit from `position`, turning the distance into an estimate
    /// with `estimate`.
    pub fn measure(
        id: AgentId,
        position: Position,
        exit: &ExitGeometry,
        estimate: impl FnOnce(i32, i32) -> i32,
    ) -> Self {
        let distance_to_exit = position.distance_to(&exit.position);
        Self {
            id,
            position,
            distance_to_exit,
            local_estimate: estimate(distance_to_exit, exit.width),
        }
    }
}
