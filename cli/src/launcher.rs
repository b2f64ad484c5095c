// Copyright (c) 2026 100monkeys.ai
// SPDX-License-Identifier: AGPL-3.0

//! Launches every agent as a separate `widthswarm-agent` process.
//!
//! The agent gets its identity as five positional arguments
//! (`<id> <x> <y> <total> <verbosity>`) and the run-wide settings through
//! environment variables, so the positional interface stays exactly five
//! arguments long.

use async_trait::async_trait;
use std::os::unix::process::ExitStatusExt;
use std::path::{Path, PathBuf};
use std::process::Stdio;
use tokio::process::{Child, Command};
use tracing::debug;
use widthswarm_core::record::AgentId;
use widthswarm_swarm::{
    AgentAssignment, AgentExit, AgentLauncher, AgentSettings, LaunchError, RunningAgent,
};

/// File name of the agent binary.
pub const AGENT_BINARY: &str = "widthswarm-agent";

#[derive(Debug, Clone)]
pub struct ProcessLauncher {
    program: PathBuf,
    verbosity: u8,
}

impl ProcessLauncher {
    pub fn new(program: impl Into<PathBuf>, verbosity: u8) -> Self {
        Self {
            program: program.into(),
            verbosity,
        }
    }

    pub fn program(&self) -> &Path {
        &self.program
    }

    /// The agent binary next to the running executable, else whatever `PATH`
    /// resolves.
    pub fn locate_agent_binary() -> PathBuf {
        std::env::current_exe()
            .ok()
            .and_then(|exe| exe.parent().map(|dir| dir.join(AGENT_BINARY)))
            .filter(|candidate| candidate.is_file())
            .unwrap_or_else(|| PathBuf::from(AGENT_BINARY))
    }

    fn command(&self, assignment: &AgentAssignment, settings: &AgentSettings) -> Command {
        let mut command = Command::new(&self.program);
        command
            .arg(assignment.id.to_string())
            .arg(assignment.position.x.to_string())
            .arg(assignment.position.y.to_string())
            .arg(assignment.swarm_size.to_string())
            .arg(self.verbosity.to_string())
            .env("WIDTHSWARM_NAMESPACE", &settings.namespace)
            .env("WIDTHSWARM_WINDOW_MS", settings.window.as_millis().to_string())
            .env("WIDTHSWARM_RADIUS", settings.neighbor_radius.to_string())
            .stdin(Stdio::null())
            .kill_on_drop(true);
        match settings.seed {
            Some(seed) => command.env("WIDTHSWARM_SEED", seed.to_string()),
            None => command.env_remove("WIDTHSWARM_SEED"),
        };
        command
    }
}

#[async_trait]
impl AgentLauncher for ProcessLauncher {
    async fn launch(
        &self,
        assignment: &AgentAssignment,
        settings: &AgentSettings,
    ) -> Result<Box<dyn RunningAgent>, LaunchError> {
        let id = assignment.id;
        let child = self
            .command(assignment, settings)
            .spawn()
            .map_err(|source| LaunchError::Spawn { id, source })?;
        debug!(
            "Spawned agent {} as pid {}",
            id,
            child.id().map_or_else(|| "?".to_string(), |pid| pid.to_string())
        );
        Ok(Box::new(ProcessAgent { id, child }))
    }
}

struct ProcessAgent {
    id: AgentId,
    child: Child,
}

#[async_trait]
impl RunningAgent for ProcessAgent {
    fn id(&self) -> AgentId {
        self.id
    }

    async fn wait(&mut self) -> AgentExit {
        match self.child.wait().await {
            Ok(status) if status.success() => AgentExit::Succeeded,
            Ok(status) => AgentExit::Failed {
                code: status.code(),
                reason: match status.signal() {
                    Some(signal) => format!("terminated by signal {}", signal),
                    None => "exited unsuccessfully".to_string(),
                },
            },
            Err(e) => AgentExit::Failed {
                code: None,
                reason: format!("could not be reaped: {}", e),
            },
        }
    }

    async fn kill(&mut self) -> Result<(), LaunchError> {
        self.child.start_kill().map_err(|e| LaunchError::Kill {
            id: self.id,
            reason: e.to_string(),
        })
    }
}
