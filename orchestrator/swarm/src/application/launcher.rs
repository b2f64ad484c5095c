// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0
//! Agent launch seam.
//!
//! The orchestrator only ever sees an [`AgentLauncher`] and the
//! [`RunningAgent`] handles it returns. The process launcher lives in the CLI
//! crate; [`ThreadLauncher`] runs agents inside the current process with the
//! same shared-memory protocol.

use super::agent::{Agent, AgentAssignment, AgentError, AgentOutcome, AgentSettings};
use async_trait::async_trait;
use std::fmt;
use thiserror::Error;
use tokio::sync::oneshot;
use tracing::debug;
use widthswarm_core::record::AgentId;

#[derive(Debug, Error)]
pub enum LaunchError {
    #[error("failed to launch agent {id}: {source}")]
    Spawn {
        id: AgentId,
        #[source]
        source: std::io::Error,
    },

    #[error("failed to stop agent {id}: {reason}")]
    Kill { id: AgentId, reason: String },
}

/// How an agent ended, as far as the orchestrator can tell.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AgentExit {
    Succeeded,
    Failed { code: Option<i32>, reason: String },
}

impl AgentExit {
    pub fn is_success(&self) -> bool {
        matches!(self, AgentExit::Succeeded)
    }
}

impl fmt::Display for AgentExit {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            AgentExit::Succeeded => f.write_str("succeeded"),
            AgentExit::Failed {
                code: Some(code),
                reason,
            } => write!(f, "failed with status {}: {}", code, reason),
            AgentExit::Failed { code: None, reason } => write!(f, "failed: {}", reason),
        }
    }
}

/// Handle to one launched agent.
#[async_trait]
pub trait RunningAgent: Send {
    fn id(&self) -> AgentId;

    /// Wait for the agent to terminate. Called at most once.
    async fn wait(&mut self) -> AgentExit;

    /// Stop the agent without waiting for it to finish its lifecycle.
    async fn kill(&mut self) -> Result<(), LaunchError>;
}

#[async_trait]
pub trait AgentLauncher: Send + Sync {
    async fn launch(
        &self,
        assignment: &AgentAssignment,
        settings: &AgentSettings,
    ) -> Result<Box<dyn RunningAgent>, LaunchError>;
}

/// Runs every agent on its own named OS thread inside this process.
///
/// Each agent blocks at the barrier until the whole swarm arrived, so agents
/// get dedicated threads rather than slots in tokio's bounded blocking pool.
#[derive(Debug, Clone, Copy, Default)]
pub struct ThreadLauncher;

impl ThreadLauncher {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl AgentLauncher for ThreadLauncher {
    async fn launch(
        &self,
        assignment: &AgentAssignment,
        settings: &AgentSettings,
    ) -> Result<Box<dyn RunningAgent>, LaunchError> {
        let id = assignment.id;
        let agent = Agent::new(*assignment, settings.clone());
        let (tx, rx) = oneshot::channel();

        std::thread::Builder::new()
            .name(format!("agent-{}", id))
            .spawn(move || {
                // The receiver is gone only if the orchestrator gave up on us.
                let _ = tx.send(agent.run());
            })
            .map_err(|source| LaunchError::Spawn { id, source })?;

        debug!("Launched in-process agent {}", id);
        Ok(Box::new(ThreadAgent { id, result: Some(rx) }))
    }
}

struct ThreadAgent {
    id: AgentId,
    result: Option<oneshot::Receiver<Result<AgentOutcome, AgentError>>>,
}

#[async_trait]
impl RunningAgent for ThreadAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    async fn wait(&mut self) -> AgentExit {
        let Some(rx) = self.result.take() else {
            return AgentExit::Failed {
                code: None,
                reason: "already reaped".to_string(),
            };
        };
        match rx.await {
            Ok(Ok(_)) => AgentExit::Succeeded,
            Ok(Err(e)) => AgentExit::Failed {
                code: Some(1),
                reason: e.to_string(),
            },
            Err(_) => AgentExit::Failed {
                code: None,
                reason: "agent thread panicked".to_string(),
            },
        }
    }

    async fn kill(&mut self) -> Result<(), LaunchError> {
        Err(LaunchError::Kill {
            id: self.id,
            reason: "in-process agents cannot be interrupted".to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::infrastructure::arena::SharedArena;
    use std::time::Duration;
    use widthswarm_core::geometry::Position;
    use widthswarm_core::record::ExitGeometry;

    #[tokio::test]
    async fn test_thread_launcher_runs_agent_to_completion() {
        let id = uuid::Uuid::new_v4().simple().to_string();
        let ns = format!("wst-launch-{}", &id[..12]);
        let exit = ExitGeometry {
            width: 24,
            position: Position::new(99, 50),
        };
        let arena = SharedArena::create(&ns, 1, &exit).unwrap();
        let settings = AgentSettings {
            namespace: ns,
            window: Duration::from_millis(10),
            seed: Some(3),
            ..AgentSettings::default()
        };
        let assignment = AgentAssignment {
            id: AgentId(0),
            position: Position::new(99, 50),
            swarm_size: 1,
        };

        let mut running = ThreadLauncher::new().launch(&assignment, &settings).await.unwrap();
        assert_eq!(running.id(), AgentId(0));
        assert_eq!(running.wait().await, AgentExit::Succeeded);
        assert!(matches!(running.wait().await, AgentExit::Failed { code: None, .. }));
        assert!(running.kill().await.is_err());

        assert_eq!(arena.accumulator().load(), 24);
        arena.destroy().unwrap();
    }

    #[tokio::test]
    async fn test_thread_launcher_reports_agent_failure() {
        let settings = AgentSettings {
            namespace: "wst-launch-no-such-arena".to_string(),
            ..AgentSettings::default()
        };
        let assignment = AgentAssignment {
            id: AgentId(0),
            position: Position::new(1, 1),
            swarm_size: 1,
        };

        let mut running = ThreadLauncher::new().launch(&assignment, &settings).await.unwrap();
        let exit = running.wait().await;
        assert!(!exit.is_success());
        assert!(matches!(exit, AgentExit::Failed { code: Some(1), .. }));
    }

    #[test]
    fn test_exit_display() {
        assert_eq!(AgentExit::Succeeded.to_string(), "succeeded");
        let failed = AgentExit::Failed {
            code: Some(1),
            reason: "boom".to_string(),
        };
        assert_eq!(failed.to_string(), "failed with status 1: boom");
    }
}
