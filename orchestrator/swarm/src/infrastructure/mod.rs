// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Swarm Infrastructure Layer
//!
//! Named, process-shared objects on top of POSIX `shm_open`/`mmap`,
//! process-shared pthread primitives and named semaphores.
//!
//! | Module | Key Types |
//! |--------|-----------|
//! | [`shm`] | `ShmName`, `ShmRegion` |
//! | [`barrier`] | `ProcessBarrier` |
//! | [`guard`] | `ReductionGuard`, `ReductionPermit` |
//! | [`arena`] | `SharedArena`, `ExitView`, `AgentTable`, `RecordSlot`, `Accumulator` |
//! | [`peer_source`] | `ShmPeerSource` |
//! | [`error`] | `ResourceError`, `TeardownError` |

pub mod arena;
pub mod barrier;
pub mod error;
pub mod guard;
pub mod peer_source;
pub mod shm;

pub use arena::{Accumulator, AgentTable, ArenaNames, ExitView, RecordSlot, SharedArena};
pub use barrier::ProcessBarrier;
pub use error::{ResourceError, TeardownError};
pub use guard::{ReductionGuard, ReductionPermit};
pub use peer_source::ShmPeerSource;
pub use shm::{ShmName, ShmRegion};
