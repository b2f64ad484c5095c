// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! [`PeerSource`] backed by the shared record table.
//!
//! Every fetch attaches its own mapping of the table, reads one slot and
//! detaches again, so a consensus worker never shares a mapping with its
//! siblings.

use super::arena::{AgentTable, ArenaNames};
use super::error::ResourceError;
use widthswarm_core::consensus::{PeerSource, WorkerError};
use widthswarm_core::record::{AgentId, AgentRecord};

#[derive(Debug, Clone)]
pub struct ShmPeerSource {
    names: ArenaNames,
    agent_count: u32,
}

impl ShmPeerSource {
    pub fn new(names: ArenaNames, agent_count: u32) -> Self {
        Self { names, agent_count }
    }
}

impl PeerSource for ShmPeerSource {
    fn fetch(&self, peer: AgentId) -> Result<AgentRecord, WorkerError> {
        let attach_err = |e: ResourceError| WorkerError::Attach {
            peer,
            source: Box::new(e),
        };

        let table = AgentTable::attach(&self.names, self.agent_count).map_err(attach_err)?;
        let record = table.read(peer).map_err(attach_err)?;
        table.detach().map_err(attach_err)?;

        record.ok_or(WorkerError::Unpublished(peer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::arena::SharedArena;
    use widthswarm_core::geometry::Position;
    use widthswarm_core::record::ExitGeometry;

    #[test]
    fn test_fetch_published_and_unpublished() {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let ns = format!("wst-peers-{}", &id[..12]);
        let exit = ExitGeometry {
            width: 18,
            position: Position::new(99, 50),
        };
        let arena = SharedArena::create(&ns, 2, &exit).unwrap();
        let record = AgentRecord {
            id: AgentId(0),
            position: Position::new(3, 3),
            distance_to_exit: 100,
            local_estimate: 14,
        };
        arena.agents().slot(AgentId(0)).unwrap().publish(&record).unwrap();

        let source = ShmPeerSource::new(arena.names().clone(), 2);
        assert_eq!(source.fetch(AgentId(0)).unwrap(), record);
        assert!(matches!(
            source.fetch(AgentId(1)),
            Err(WorkerError::Unpublished(AgentId(1)))
        ));
        assert!(matches!(
            source.fetch(AgentId(5)),
            Err(WorkerError::Attach { peer: AgentId(5), .. })
        ));

        arena.destroy().unwrap();
    }

    #[test]
    fn test_fetch_without_arena_fails_to_attach() {
        let names = ArenaNames::new("wst-peers-never-created").unwrap();
        let source = ShmPeerSource::new(names, 1);
        assert!(matches!(
            source.fetch(AgentId(0)),
            Err(WorkerError::Attach { .. })
        ));
    }
}
