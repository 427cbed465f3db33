//! Agent driver that runs each agent as a local child process.
//!
//! The configured command is spawned once per launched agent with the
//! agent's identity in its environment:
//!
//! | Variable | Value |
//! |---|---|
//! | `SWARM_AGENT_ID` | agent id |
//! | `SWARM_CAPABILITIES` | comma-separated capability tags |
//! | `SWARM_API_URL` | base URL of this daemon's REST API |
//!
//! Agents register nothing themselves; they heartbeat, pull their
//! assignments from `GET /api/v1/agents/{id}/tasks` and report back over
//! the REST API.

use std::collections::HashMap;
use std::process::Stdio;

use anyhow::{Context, anyhow};
use tokio::process::{Child, Command};
use tokio::sync::Mutex;
use tracing::{debug, info, warn};

use swarm_core::{AgentId, AgentSpec};
use swarmgrid_coordinator::{AgentDriver, Assignment, DriverFuture};

pub struct CommandDriver {
    program: String,
    args: Vec<String>,
    api_url: String,
    children: Mutex<HashMap<AgentId, Child>>,
}

impl CommandDriver {
    /// `command` is split on whitespace into program and arguments.
    pub fn new(command: &str, api_url: String) -> anyhow::Result<Self> {
        let mut parts = command.split_whitespace().map(str::to_string);
        let program = parts.next().ok_or_else(|| anyhow!("agent command is empty"))?;
        Ok(Self {
            program,
            args: parts.collect(),
            api_url,
            children: Mutex::new(HashMap::new()),
        })
    }

    pub async fn running(&self) -> usize {
        self.children.lock().await.len()
    }

    /// Kill every agent process still running.
    pub async fn stop_all(&self) {
        let mut children = self.children.lock().await;
        for (agent_id, mut child) in children.drain() {
            if let Err(e) = child.kill().await {
                warn!(agent = %agent_id, error = %e, "agent process kill failed");
            }
        }
    }
}

impl AgentDriver for CommandDriver {
    fn start<'a>(&'a self, spec: &'a AgentSpec) -> DriverFuture<'a> {
        Box::pin(async move {
            let agent_id = spec.id.as_deref().ok_or_else(|| anyhow!("agent spec has no id"))?;
            let capabilities: Vec<&str> = spec.capabilities.iter().map(String::as_str).collect();

            let child = Command::new(&self.program)
                .args(&self.args)
                .env("SWARM_AGENT_ID", agent_id)
                .env("SWARM_CAPABILITIES", capabilities.join(","))
                .env("SWARM_API_URL", &self.api_url)
                .stdin(Stdio::null())
                .kill_on_drop(true)
                .spawn()
                .with_context(|| format!("spawn {} for agent {agent_id}", self.program))?;

            info!(agent = agent_id, pid = ?child.id(), "agent process started");
            self.children.lock().await.insert(agent_id.to_string(), child);
            Ok(())
        })
    }

    fn stop<'a>(&'a self, agent_id: &'a str) -> DriverFuture<'a> {
        Box::pin(async move {
            let child = self.children.lock().await.remove(agent_id);
            match child {
                Some(mut child) => {
                    child
                        .kill()
                        .await
                        .with_context(|| format!("kill agent {agent_id}"))?;
                    info!(agent = agent_id, "agent process stopped");
                }
                None => debug!(agent = agent_id, "no process for agent"),
            }
            Ok(())
        })
    }

    fn deliver<'a>(&'a self, assignment: &'a Assignment) -> DriverFuture<'a> {
        Box::pin(async move {
            debug!(
                task = %assignment.task_id,
                agent = %assignment.agent_id,
                "assignment left for pull"
            );
            Ok(())
        })
    }
}
