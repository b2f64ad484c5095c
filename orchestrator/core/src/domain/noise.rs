// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Noise Model
//!
//! Turns an agent's distance to the exit into a noisy width estimate.
//!
//! Accuracy degrades in bands of five distance units. Each band has an
//! accuracy window `[min, max]` (percent) that shrinks quadratically with the
//! band index until it bottoms out at `[60, 68]`:
//!
//! | Distance | Band | Accuracy window |
//! |----------|------|-----------------|
//! | 0        | 0    | 100 – 100       |
//! | 1 – 5    | 1    | 95 – 100        |
//! | 6 – 10   | 2    | 88 – 95         |
//! | 11 – 15  | 3    | 79 – 88         |
//! | 16 – 20  | 4    | 68 – 79         |
//! | ≥ 21     | ≥ 5  | 60 – 68         |
//!
//! An accuracy is drawn uniformly from the window; the estimate is then off by
//! `true_width * (100 - accuracy) / 100`, in a direction chosen by a fair coin.

use rand::Rng;

/// Width of a distance band.
pub const BAND_WIDTH: i32 = 5;
/// Lowest accuracy any band may draw.
pub const ACCURACY_FLOOR: i32 = 60;
/// Lowest upper bound any band's window may have.
pub const ACCURACY_CEILING_FLOOR: i32 = 68;

const BASE_REDUCTION: i32 = 5;
const REDUCTION_STEP: i32 = 2;

/// Maps a distance and the true width to a noisy estimate.
///
/// Implementations must be `Send + Sync` so agents can share one model across
/// threads; randomness is always injected by the caller.
pub trait NoiseModel: Send + Sync {
    fn estimate(&self, rng: &mut dyn rand::RngCore, distance: i32, true_width: i32) -> i32;
}

/// Inclusive accuracy window for one distance band.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct AccuracyBand {
    pub min: i32,
    pub max: i32,
}

impl AccuracyBand {
    pub fn for_distance(distance: i32) -> Self {
        let band = band_index(distance);
        Self {
            min: unfloored_min(band).max(ACCURACY_FLOOR),
            max: unfloored_max(band).max(ACCURACY_CEILING_FLOOR),
        }
    }
}

/// Band index: 0 at the exit itself, then one band per [`BAND_WIDTH`] units.
pub fn band_index(distance: i32) -> i32 {
    if distance <= 0 {
        0
    } else {
        (distance - 1) / BAND_WIDTH + 1
    }
}

fn unfloored_min(band: i32) -> i32 {
    if band <= 0 {
        return 100;
    }
    let mut accuracy = 100 - BASE_REDUCTION;
    for step in 2..=band {
        accuracy -= BASE_REDUCTION + (step - 1) * REDUCTION_STEP;
        if accuracy < ACCURACY_FLOOR {
            break;
        }
    }
    accuracy
}

fn unfloored_max(band: i32) -> i32 {
    let mut accuracy = 100;
    for step in 2..=band {
        accuracy -= BASE_REDUCTION + (step - 2) * REDUCTION_STEP;
        if accuracy < ACCURACY_CEILING_FLOOR {
            break;
        }
    }
    accuracy
}

/// The banded model described in the module docs.
#[derive(Debug, Clone, Copy, Default)]
pub struct BandedNoiseModel;

impl BandedNoiseModel {
    pub fn new() -> Self {
        Self
    }

    /// Absolute error for a given accuracy percentage.
    pub fn error_magnitude(true_width: i32, accuracy: i32) -> i32 {
        true_width * (100 - accuracy) / 100
    }
}

impl NoiseModel for BandedNoiseModel {
    fn estimate(&self, rng: &mut dyn rand::RngCore, distance: i32, true_width: i32) -> i32 {
        let band = AccuracyBand::for_distance(distance);
        let accuracy = rng.random_range(band.min..=band.max);
        let error = Self::error_magnitude(true_width, accuracy);

        if rng.random_bool(0.5) {
            true_width + error
        } else {
            true_width - error
        }
    }
}

/// Derive an agent's private RNG seed from a run-wide seed.
pub fn agent_seed(run_seed: u64, agent: u32) -> u64 {
    run_seed
        .wrapping_mul(0x9E37_79B9_7F4A_7C15)
        .rotate_left(17)
        ^ u64::from(agent).wrapping_mul(0xBF58_476D_1CE4_E5B9)
}
