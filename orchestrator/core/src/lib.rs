// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # `widthswarm-core`: Exit-Width Estimation Domain
//!
//! Value types and pure algorithms shared by the orchestrator and every agent
//! process: grid geometry, the published agent record, the banded noise model,
//! the per-agent consensus engine, and the swarm configuration manifest.
//!
//! Shared memory, synchronization primitives and process management live in
//! `widthswarm-swarm`.

pub mod domain;

pub use domain::*;
