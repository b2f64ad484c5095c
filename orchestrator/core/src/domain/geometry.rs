// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Grid Geometry
//!
//! Integer coordinates on the square arena floor and the truncated Euclidean
//! distance every other component measures with.

use rand::Rng;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Side length of the arena floor. Valid coordinates lie in `[0, GRID_SIZE)`.
pub const GRID_SIZE: i32 = 100;

/// A point on the arena floor.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct Position {
    pub x: i32,
    pub y: i32,
}

impl Position {
    pub const fn new(x: i32, y: i32) -> Self {
        Self { x, y }
    }

    /// Draw a position uniformly from `[0, GRID_SIZE) x [0, GRID_SIZE)`.
    pub fn random<R: Rng + ?Sized>(rng: &mut R) -> Self {
        Self {
            x: rng.random_range(0..GRID_SIZE),
            y: rng.random_range(0..GRID_SIZE),
        }
    }

    /// Euclidean distance to `other`, truncated toward zero.
    pub fn distance_to(&self, other: &Position) -> i32 {
        let dx = f64::from(self.x - other.x);
        let dy = f64::from(self.y - other.y);
        dx.hypot(dy) as i32
    }

    pub fn is_on_grid(&self) -> bool {
        (0..GRID_SIZE).contains(&self.x) && (0..GRID_SIZE).contains(&self.y)
    }
}

impl fmt::Display for Position {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "({}, {})", self.x, self.y)
    }
}
