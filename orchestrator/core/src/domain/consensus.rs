// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! # Consensus Engine
//!
//! Computes an agent's local consensus: the integer mean of the estimates of
//! every agent within [`DEFAULT_NEIGHBOR_RADIUS`] (inclusive) of it, itself
//! included.
//!
//! One scoped worker thread is started per agent id. Each worker fetches its
//! peer's record through a [`PeerSource`], checks the distance and, for a
//! neighbour, folds the estimate into a tally guarded by a process-local
//! mutex. Workers never write to shared state.
//!
//! A worker that fails ([`WorkerError`]) is logged and its peer is simply left
//! out of the mean; it never fails the agent.

use crate::domain::record::{AgentId, AgentRecord};
use parking_lot::Mutex;
use std::thread;
use thiserror::Error;
use tracing::{debug, trace, warn};

/// Neighbourhood radius, inclusive.
pub const DEFAULT_NEIGHBOR_RADIUS: i32 = 5;

/// Failure of a single consensus worker.
#[derive(Debug, Error)]
pub enum WorkerError {
    #[error("worker for peer {peer} could not attach to the record table: {source}")]
    Attach {
        peer: AgentId,
        #[source]
        source: Box<dyn std::error::Error + Send + Sync>,
    },

    #[error("record of peer {0} has not been published")]
    Unpublished(AgentId),

    #[error("failed to start worker thread for peer {peer}: {source}")]
    Spawn {
        peer: AgentId,
        #[source]
        source: std::io::Error,
    },
}

/// Read access to published peer records.
///
/// Called concurrently from every worker thread.
pub trait PeerSource: Sync {
    fn fetch(&self, peer: AgentId) -> Result<AgentRecord, WorkerError>;
}

/// Result of one consensus round.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Consensus {
    /// `sum / neighbors`, or the agent's own estimate if no worker contributed.
    pub estimate: i32,
    pub sum: i64,
    pub neighbors: u32,
    pub failed_workers: u32,
}

#[derive(Debug, Default)]
struct Tally {
    sum: i64,
    neighbors: u32,
}

/// Per-agent thread fan-out computing the local consensus.
#[derive(Debug, Clone, Copy)]
pub struct ConsensusEngine {
    radius: i32,
}

impl Default for ConsensusEngine {
    fn default() -> Self {
        Self::new(DEFAULT_NEIGHBOR_RADIUS)
    }
}

impl ConsensusEngine {
    pub fn new(radius: i32) -> Self {
        Self { radius }
    }

    pub fn radius(&self) -> i32 {
        self.radius
    }

    /// Run one worker per id in `peers` and join them all before averaging.
    pub fn run<S: PeerSource>(&self, me: &AgentRecord, peers: &[AgentId], source: &S) -> Consensus {
        let tally = Mutex::new(Tally::default());

        let failed_workers = thread::scope(|scope| {
            let mut failed = 0u32;
            let mut workers = Vec::with_capacity(peers.len());

            for &peer in peers {
                let tally = &tally;
                let spawned = thread::Builder::new()
                    .name(format!("consensus-{}-{}", me.id, peer))
                    .spawn_scoped(scope, move || self.visit(me, peer, source, tally));

                match spawned {
                    Ok(handle) => workers.push((peer, handle)),
                    Err(source) => {
                        warn!("{}", WorkerError::Spawn { peer, source });
                        failed += 1;
                    }
                }
            }

            for (peer, handle) in workers {
                match handle.join() {
                    Ok(Ok(())) => {}
                    Ok(Err(e)) => {
                        warn!("Consensus worker failed: {}", e);
                        failed += 1;
                    }
                    Err(_) => {
                        warn!("Consensus worker for peer {} panicked", peer);
                        failed += 1;
                    }
                }
            }

            failed
        });

        let Tally { sum, neighbors } = tally.into_inner();
        let estimate = if neighbors == 0 {
            warn!(
                "Agent {} collected no neighbour estimates, falling back to its own",
                me.id
            );
            me.local_estimate
        } else {
            (sum / i64::from(neighbors)) as i32
        };

        metrics::histogram!("widthswarm_consensus_neighbors").record(f64::from(neighbors));
        if failed_workers > 0 {
            metrics::counter!("widthswarm_consensus_worker_failures_total")
                .increment(u64::from(failed_workers));
        }
        debug!(
            "Agent {} consensus: sum={} neighbours={} estimate={}",
            me.id, sum, neighbors, estimate
        );

        Consensus {
            estimate,
            sum,
            neighbors,
            failed_workers,
        }
    }

    fn visit<S: PeerSource>(
        &self,
        me: &AgentRecord,
        peer: AgentId,
        source: &S,
        tally: &Mutex<Tally>,
    ) -> Result<(), WorkerError> {
        let record = source.fetch(peer)?;
        let distance = me.position.distance_to(&record.position);
        trace!(
            "Agent {} checking agent {}: distance={} exit_distance={} estimate={}",
            me.id,
            peer,
            distance,
            record.distance_to_exit,
            record.local_estimate
        );

        if distance <= self.radius {
            let mut tally = tally.lock();
            tally.sum += i64::from(record.local_estimate);
            tally.neighbors += 1;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::domain::geometry::Position;
    use std::collections::HashMap;
    use std::sync::atomic::{AtomicUsize, Ordering};

    struct MapSource {
        records: HashMap<AgentId, AgentRecord>,
        fetches: AtomicUsize,
    }

    impl MapSource {
        fn new(records: &[AgentRecord]) -> Self {
            Self {
                records: records.iter().map(|r| (r.id, *r)).collect(),
                fetches: AtomicUsize::new(0),
            }
        }
    }

    impl PeerSource for MapSource {
        fn fetch(&self, peer: AgentId) -> Result<AgentRecord, WorkerError> {
            self.fetches.fetch_add(1, Ordering::SeqCst);
            self.records
                .get(&peer)
                .copied()
                .ok_or(WorkerError::Unpublished(peer))
        }
    }

    fn record(id: u32, x: i32, y: i32, estimate: i32) -> AgentRecord {
        AgentRecord {
            id: AgentId(id),
            position: Position::new(x, y),
            distance_to_exit: 0,
            local_estimate: estimate,
        }
    }

    fn ids(count: u32) -> Vec<AgentId> {
        AgentId::all(count).collect()
    }

    #[test]
    fn test_isolated_agent_averages_itself() {
        let me = record(0, 10, 10, 23);
        let others = [me, record(1, 50, 50, 11), record(2, 90, 90, 30)];
        let source = MapSource::new(&others);

        let consensus = ConsensusEngine::default().run(&me, &ids(3), &source);

        assert_eq!(consensus.neighbors, 1);
        assert_eq!(consensus.sum, 23);
        assert_eq!(consensus.estimate, 23);
        assert_eq!(consensus.failed_workers, 0);
        assert_eq!(source.fetches.load(Ordering::SeqCst), 3);
    }

    #[test]
    fn test_radius_is_inclusive() {
        let me = record(0, 0, 0, 20);
        // Exactly 5 away, then sqrt(37) = 6.08 away.
        let records = [me, record(1, 3, 4, 25), record(2, 1, 6, 99)];
        let source = MapSource::new(&records);

        let consensus = ConsensusEngine::default().run(&me, &ids(3), &source);

        assert_eq!(consensus.neighbors, 2);
        assert_eq!(consensus.sum, 45);
        assert_eq!(consensus.estimate, 22);
    }

    #[test]
    fn test_truncated_distance_admits_near_miss() {
        let me = record(0, 0, 0, 10);
        // sqrt(26) = 5.09 truncates to 5.
        let records = [me, record(1, 1, 5, 14)];
        let source = MapSource::new(&records);

        let consensus = ConsensusEngine::default().run(&me, &ids(2), &source);

        assert_eq!(consensus.neighbors, 2);
        assert_eq!(consensus.estimate, 12);
    }

    #[test]
    fn test_failed_worker_is_omitted() {
        let me = record(0, 40, 40, 18);
        // Agent 1 is close but never published.
        let records = [me, record(2, 41, 41, 24)];
        let source = MapSource::new(&records);

        let consensus = ConsensusEngine::default().run(&me, &ids(3), &source);

        assert_eq!(consensus.failed_workers, 1);
        assert_eq!(consensus.neighbors, 2);
        assert_eq!(consensus.estimate, 21);
    }

    #[test]
    fn test_falls_back_to_own_estimate_when_everything_fails() {
        let me = record(0, 40, 40, 17);
        let source = MapSource::new(&[]);

        let consensus = ConsensusEngine::default().run(&me, &ids(2), &source);

        assert_eq!(consensus.failed_workers, 2);
        assert_eq!(consensus.neighbors, 0);
        assert_eq!(consensus.estimate, 17);
    }

    #[test]
    fn test_large_swarm_counts_every_neighbour_once() {
        let me = record(0, 50, 50, 20);
        let mut records = vec![me];
        // 60 agents stacked on the same spot, 40 far away.
        for id in 1..61 {
            records.push(record(id, 50, 50, 20 + (id as i32 % 3)));
        }
        for id in 61..101 {
            records.push(record(id, 0, 0, 1));
        }
        let source = MapSource::new(&records);

        let consensus = ConsensusEngine::new(5).run(&me, &ids(101), &source);

        let expected_sum: i64 = records[..61].iter().map(|r| i64::from(r.local_estimate)).sum();
        assert_eq!(consensus.neighbors, 61);
        assert_eq!(consensus.sum, expected_sum);
        assert_eq!(consensus.estimate, (expected_sum / 61) as i32);
    }
}
