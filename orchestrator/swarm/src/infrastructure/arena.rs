// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Shared Arena
//!
//! Every cross-process object of a run, addressed by names derived from one
//! well-known namespace string:
//!
//! | Object | Name | Kind |
//! |--------|------|------|
//! | Exit geometry | `/<ns>.exit` | shared memory |
//! | Agent records | `/<ns>.agents` | shared memory, `N` slots |
//! | Global accumulator | `/<ns>.accumulator` | shared memory |
//! | Barrier | `/<ns>.barrier` | shared memory (pthread mutex + condvar) |
//! | Reduction guard | `/<ns>.guard` | named semaphore |
//!
//! ## Access discipline
//!
//! | Object | Writer | When | Guarded by |
//! |--------|--------|------|------------|
//! | Exit geometry | orchestrator | before any agent starts | lifecycle order |
//! | Record slot `i` | agent `i` only, once | before it arrives at the barrier | [`RecordSlot`] state tag |
//! | Record slot `i` (read) | any agent | after the barrier opens | barrier |
//! | Accumulator | every agent, once | after its window elapsed | [`ReductionPermit`] |
//!
//! Creation is exclusive. If any object of the namespace already exists,
//! [`SharedArena::create`] fails with [`ResourceError::InUse`] and leaves the
//! existing objects alone. Leftovers of a crashed run are only removed by an
//! explicit [`SharedArena::purge`].
//!
//! Slots carry an explicit state tag (`UNSET → WRITING → PUBLISHED`). A read of
//! a slot that is not yet published yields `None` instead of sentinel data.

use super::barrier::ProcessBarrier;
use super::error::{ResourceError, TeardownError};
use super::guard::{ReductionGuard, ReductionPermit};
use super::shm::{ShmName, ShmRegion};
use std::mem::size_of;
use std::sync::atomic::{AtomicI32, AtomicI64, AtomicU32, Ordering};
use tracing::{debug, info, warn};
use widthswarm_core::geometry::Position;
use widthswarm_core::record::{AgentId, AgentRecord, ExitGeometry};

/// Value every record field holds until its owner publishes.
pub const SENTINEL: i32 = -1;

const SLOT_UNSET: u32 = 0;
const SLOT_WRITING: u32 = 1;
const SLOT_PUBLISHED: u32 = 2;

/// The five object names of one namespace.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ArenaNames {
    pub exit: ShmName,
    pub agents: ShmName,
    pub accumulator: ShmName,
    pub barrier: ShmName,
    pub guard: ShmName,
}

impl ArenaNames {
    pub fn new(namespace: &str) -> Result<Self, ResourceError> {
        let name = |suffix: &str| ShmName::new(format!("/{}.{}", namespace, suffix));
        Ok(Self {
            exit: name("exit")?,
            agents: name("agents")?,
            accumulator: name("accumulator")?,
            barrier: name("barrier")?,
            guard: name("guard")?,
        })
    }
}

// ----------------------------------------------------------------------------
// Exit geometry
// ----------------------------------------------------------------------------

#[repr(C)]
struct ExitCell {
    width: AtomicI32,
    x: AtomicI32,
    y: AtomicI32,
}

/// Mapping of the exit geometry region.
#[derive(Debug)]
pub struct ExitView {
    region: ShmRegion,
}

impl ExitView {
    pub fn create(names: &ArenaNames) -> Result<Self, ResourceError> {
        Ok(Self {
            region: ShmRegion::create(&names.exit, size_of::<ExitCell>())?,
        })
    }

    pub fn attach(names: &ArenaNames) -> Result<Self, ResourceError> {
        Ok(Self {
            region: ShmRegion::attach(&names.exit, size_of::<ExitCell>())?,
        })
    }

    fn cell(&self) -> &ExitCell {
        unsafe { &*self.region.as_ptr().cast::<ExitCell>() }
    }

    pub fn write(&self, exit: &ExitGeometry) {
        let cell = self.cell();
        cell.width.store(exit.width, Ordering::Relaxed);
        cell.x.store(exit.position.x, Ordering::Relaxed);
        cell.y.store(exit.position.y, Ordering::Release);
    }

    pub fn read(&self) -> ExitGeometry {
        let cell = self.cell();
        let y = cell.y.load(Ordering::Acquire);
        ExitGeometry {
            width: cell.width.load(Ordering::Relaxed),
            position: Position::new(cell.x.load(Ordering::Relaxed), y),
        }
    }

    pub fn detach(self) -> Result<(), ResourceError> {
        self.region.detach()
    }
}

// ----------------------------------------------------------------------------
// Agent records
// ----------------------------------------------------------------------------

#[repr(C)]
struct RecordCell {
    state: AtomicU32,
    id: AtomicI32,
    x: AtomicI32,
    y: AtomicI32,
    distance: AtomicI32,
    estimate: AtomicI32,
}

impl RecordCell {
    fn reset(&self) {
        for field in [&self.id, &self.x, &self.y, &self.distance, &self.estimate] {
            field.store(SENTINEL, Ordering::Relaxed);
        }
        self.state.store(SLOT_UNSET, Ordering::Release);
    }
}

/// Mapping of the agent record table.
#[derive(Debug)]
pub struct AgentTable {
    region: ShmRegion,
    count: usize,
}

/// Write handle for one record slot. Publishing consumes it.
#[derive(Debug)]
pub struct RecordSlot<'a> {
    table: &'a AgentTable,
    id: AgentId,
}

impl AgentTable {
    pub fn create(names: &ArenaNames, count: u32) -> Result<Self, ResourceError> {
        let count = count as usize;
        let region = ShmRegion::create(&names.agents, Self::byte_len(count))?;
        let table = Self { region, count };
        table.reset();
        Ok(table)
    }

    pub fn attach(names: &ArenaNames, count: u32) -> Result<Self, ResourceError> {
        let count = count as usize;
        let region = ShmRegion::attach(&names.agents, Self::byte_len(count))?;
        Ok(Self { region, count })
    }

    fn byte_len(count: usize) -> usize {
        size_of::<RecordCell>() * count.max(1)
    }

    fn cells(&self) -> &[RecordCell] {
        unsafe { std::slice::from_raw_parts(self.region.as_ptr().cast::<RecordCell>(), self.count) }
    }

    fn cell(&self, id: AgentId) -> Result<&RecordCell, ResourceError> {
        self.cells()
            .get(id.index())
            .ok_or(ResourceError::SlotOutOfRange {
                id: id.0,
                count: self.count,
            })
    }

    /// Put every slot back to the unset state.
    pub fn reset(&self) {
        for cell in self.cells() {
            cell.reset();
        }
    }

    /// Write handle for `id`'s slot.
    pub fn slot(&self, id: AgentId) -> Result<RecordSlot<'_>, ResourceError> {
        self.cell(id)?;
        Ok(RecordSlot { table: self, id })
    }

    /// The published record in `id`'s slot, or `None` if it is not published.
    pub fn read(&self, id: AgentId) -> Result<Option<AgentRecord>, ResourceError> {
        let cell = self.cell(id)?;
        if cell.state.load(Ordering::Acquire) != SLOT_PUBLISHED {
            return Ok(None);
        }
        Ok(Some(AgentRecord {
            id: AgentId(cell.id.load(Ordering::Relaxed) as u32),
            position: Position::new(cell.x.load(Ordering::Relaxed), cell.y.load(Ordering::Relaxed)),
            distance_to_exit: cell.distance.load(Ordering::Relaxed),
            local_estimate: cell.estimate.load(Ordering::Relaxed),
        }))
    }

    /// Number of slots currently published.
    pub fn published(&self) -> usize {
        self.cells()
            .iter()
            .filter(|c| c.state.load(Ordering::Acquire) == SLOT_PUBLISHED)
            .count()
    }

    pub fn detach(self) -> Result<(), ResourceError> {
        self.region.detach()
    }
}

impl RecordSlot<'_> {
    pub fn id(&self) -> AgentId {
        self.id
    }

    /// Write `record` into the slot and mark it published.
    ///
    /// The slot id wins over `record.id`. Fails if the slot was already
    /// claimed by another writer.
    pub fn publish(self, record: &AgentRecord) -> Result<(), ResourceError> {
        let cell = self.table.cell(self.id)?;
        cell.state
            .compare_exchange(SLOT_UNSET, SLOT_WRITING, Ordering::Acquire, Ordering::Relaxed)
            .map_err(|_| ResourceError::SlotTaken(self.id.0))?;

        cell.id.store(self.id.0 as i32, Ordering::Relaxed);
        cell.x.store(record.position.x, Ordering::Relaxed);
        cell.y.store(record.position.y, Ordering::Relaxed);
        cell.distance.store(record.distance_to_exit, Ordering::Relaxed);
        cell.estimate.store(record.local_estimate, Ordering::Relaxed);
        cell.state.store(SLOT_PUBLISHED, Ordering::Release);
        Ok(())
    }
}

// ----------------------------------------------------------------------------
// Global accumulator
// ----------------------------------------------------------------------------

#[repr(C)]
struct AccumulatorCell {
    value: AtomicI64,
}

/// Mapping of the global accumulator.
#[derive(Debug)]
pub struct Accumulator {
    region: ShmRegion,
}

impl Accumulator {
    pub fn create(names: &ArenaNames) -> Result<Self, ResourceError> {
        let accumulator = Self {
            region: ShmRegion::create(&names.accumulator, size_of::<AccumulatorCell>())?,
        };
        accumulator.cell().value.store(0, Ordering::Release);
        Ok(accumulator)
    }

    pub fn attach(names: &ArenaNames) -> Result<Self, ResourceError> {
        Ok(Self {
            region: ShmRegion::attach(&names.accumulator, size_of::<AccumulatorCell>())?,
        })
    }

    fn cell(&self) -> &AccumulatorCell {
        unsafe { &*self.region.as_ptr().cast::<AccumulatorCell>() }
    }

    pub fn load(&self) -> i64 {
        self.cell().value.load(Ordering::Acquire)
    }

    /// `accumulator += value` as a plain read-modify-write; the permit makes
    /// it exclusive. Returns the new total.
    pub fn add(&self, _permit: &ReductionPermit<'_>, value: i64) -> i64 {
        let cell = self.cell();
        let total = cell.value.load(Ordering::Acquire) + value;
        cell.value.store(total, Ordering::Release);
        total
    }

    pub fn detach(self) -> Result<(), ResourceError> {
        self.region.detach()
    }
}

// ----------------------------------------------------------------------------
// Arena lifecycle
// ----------------------------------------------------------------------------

/// Unlinks the objects created so far if arena construction fails midway.
struct Rollback<'a> {
    names: &'a ArenaNames,
    regions: Vec<&'a ShmName>,
    guard: bool,
    armed: bool,
}

impl Drop for Rollback<'_> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        for name in &self.regions {
            if let Err(e) = ShmRegion::destroy(name) {
                warn!("Rollback could not remove {}: {}", name, e);
            }
        }
        if self.guard {
            if let Err(e) = ReductionGuard::destroy(&self.names.guard) {
                warn!("Rollback could not remove {}: {}", self.names.guard, e);
            }
        }
    }
}

/// Orchestrator-owned handle to every shared object of a run.
#[derive(Debug)]
pub struct SharedArena {
    names: ArenaNames,
    agent_count: u32,
    exit: ExitView,
    agents: AgentTable,
    accumulator: Accumulator,
    barrier: ProcessBarrier,
    guard: ReductionGuard,
}

impl SharedArena {
    /// Create and initialise all five objects: exit written, records unset,
    /// accumulator zero, barrier at zero, guard available.
    ///
    /// If any step fails, everything created before it is removed again.
    pub fn create(
        namespace: &str,
        agent_count: u32,
        exit_geometry: &ExitGeometry,
    ) -> Result<Self, ResourceError> {
        let names = ArenaNames::new(namespace)?;
        let mut rollback = Rollback {
            names: &names,
            regions: Vec::new(),
            guard: false,
            armed: true,
        };

        let exit = ExitView::create(&names)?;
        rollback.regions.push(&names.exit);
        exit.write(exit_geometry);

        let agents = AgentTable::create(&names, agent_count)?;
        rollback.regions.push(&names.agents);

        let accumulator = Accumulator::create(&names)?;
        rollback.regions.push(&names.accumulator);

        let barrier = ProcessBarrier::create(&names.barrier)?;
        rollback.regions.push(&names.barrier);

        let guard = ReductionGuard::create(&names.guard)?;
        rollback.guard = true;

        rollback.armed = false;
        drop(rollback);

        info!(
            "Created shared arena '{}' for {} agents (exit width {}, at {})",
            namespace, agent_count, exit_geometry.width, exit_geometry.position
        );
        Ok(Self {
            names,
            agent_count,
            exit,
            agents,
            accumulator,
            barrier,
            guard,
        })
    }

    pub fn names(&self) -> &ArenaNames {
        &self.names
    }

    pub fn agent_count(&self) -> u32 {
        self.agent_count
    }

    pub fn exit(&self) -> &ExitView {
        &self.exit
    }

    pub fn agents(&self) -> &AgentTable {
        &self.agents
    }

    pub fn accumulator(&self) -> &Accumulator {
        &self.accumulator
    }

    pub fn barrier(&self) -> &ProcessBarrier {
        &self.barrier
    }

    pub fn guard(&self) -> &ReductionGuard {
        &self.guard
    }

    /// Detach and remove every object, attempting all of them even when some
    /// fail.
    pub fn destroy(self) -> Result<(), TeardownError> {
        let Self {
            names,
            exit,
            agents,
            accumulator,
            barrier,
            guard,
            ..
        } = self;
        let mut failures = Vec::new();

        if let Err(e) = barrier.destroy() {
            failures.extend(e.failures);
        }
        if let Err(e) = guard.close() {
            failures.push(e);
        }
        if let Err(e) = ReductionGuard::destroy(&names.guard) {
            failures.push(e);
        }
        for (region, name) in [
            (exit.detach(), &names.exit),
            (agents.detach(), &names.agents),
            (accumulator.detach(), &names.accumulator),
        ] {
            if let Err(e) = region {
                failures.push(e);
            }
            if let Err(e) = ShmRegion::destroy(name) {
                failures.push(e);
            }
        }

        if failures.is_empty() {
            debug!("Shared arena torn down");
            Ok(())
        } else {
            Err(TeardownError { failures })
        }
    }

    /// Remove every object of `names` without attaching to any of them.
    pub fn unlink_all(names: &ArenaNames) -> Result<(), TeardownError> {
        TeardownError::from_results([
            ProcessBarrier::unlink(&names.barrier),
            ReductionGuard::destroy(&names.guard),
            ShmRegion::destroy(&names.exit),
            ShmRegion::destroy(&names.agents),
            ShmRegion::destroy(&names.accumulator),
        ])
    }

    /// Remove objects a crashed earlier run left behind under `namespace`.
    /// Returns how many were found.
    ///
    /// Nothing checks whether the objects are still in use, so this must only
    /// be called when no run owns the namespace.
    pub fn purge(namespace: &str) -> Result<usize, TeardownError> {
        let names = ArenaNames::new(namespace).map_err(|e| TeardownError { failures: vec![e] })?;
        match Self::unlink_all(&names) {
            Ok(()) => Ok(5),
            Err(TeardownError { failures }) => {
                let total = failures.len();
                let real: Vec<_> = failures
                    .into_iter()
                    .filter(|e| !matches!(e, ResourceError::NotFound(_)))
                    .collect();
                if real.is_empty() {
                    Ok(5 - total)
                } else {
                    Err(TeardownError { failures: real })
                }
            }
        }
    }
}
