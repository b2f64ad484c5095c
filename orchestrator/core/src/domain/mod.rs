// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Domain Layer
//!
//! Pure domain types for exit-width estimation. No shared-memory or process
//! dependencies.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`geometry`] | `Position`, `GRID_SIZE` |
//! | [`record`] | `AgentId`, `AgentRecord`, `ExitGeometry` |
//! | [`noise`] | `NoiseModel`, `BandedNoiseModel` |
//! | [`consensus`] | `ConsensusEngine`, `PeerSource`, `WorkerError` |
//! | [`swarm_config`] | `SwarmConfigManifest` |

pub mod consensus;
pub mod geometry;
pub mod noise;
pub mod record;
pub mod swarm_config;
