//! Agent records held by the coordinator.

use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use swarm_core::{AgentId, AgentSpec, AgentStatus, ResourceVector, TaskId};
use swarmgrid_ledger::AllocationId;

use crate::health::HealthTracker;

pub(crate) struct AgentRecord {
    pub id: AgentId,
    pub capabilities: BTreeSet<String>,
    pub requirements: ResourceVector,
    pub weight: u32,
    pub status: AgentStatus,
    /// Draining agents finish what they have but get no new tasks.
    pub draining: bool,
    /// Baseline footprint handle; `None` once released.
    pub allocation: Option<AllocationId>,
    pub registered_seq: u64,
    pub registered_at: u64,
    pub last_heartbeat: Instant,
    pub health: HealthTracker,
    pub active_tasks: BTreeSet<TaskId>,
    pub completed: u64,
    pub failed: u64,
}

impl AgentRecord {
    pub fn new(
        id: AgentId,
        spec: AgentSpec,
        allocation: AllocationId,
        seq: u64,
        registered_at: u64,
        failure_threshold: u32,
    ) -> Self {
        Self {
            id,
            capabilities: spec.capabilities,
            requirements: spec.requirements,
            weight: spec.weight,
            status: AgentStatus::Registered,
            draining: false,
            allocation: Some(allocation),
            registered_seq: seq,
            registered_at,
            last_heartbeat: Instant::now(),
            health: HealthTracker::new(failure_threshold),
            active_tasks: BTreeSet::new(),
            completed: 0,
            failed: 0,
        }
    }

    /// Eligible for new work, ignoring slot limits.
    pub fn accepts_work(&self) -> bool {
        self.status == AgentStatus::Healthy && !self.draining
    }

    pub fn spec(&self) -> AgentSpec {
        AgentSpec {
            id: Some(self.id.clone()),
            capabilities: self.capabilities.clone(),
            requirements: self.requirements,
            weight: self.weight,
        }
    }

    pub fn view(&self, now: Instant) -> AgentView {
        AgentView {
            id: self.id.clone(),
            status: self.status,
            draining: self.draining,
            capabilities: self.capabilities.iter().cloned().collect(),
            requirements: self.requirements,
            weight: self.weight,
            allocation: self.allocation,
            active_tasks: self.active_tasks.len(),
            consecutive_failures: self.health.consecutive_failures(),
            last_heartbeat_age_ms: now
                .saturating_duration_since(self.last_heartbeat)
                .as_millis() as u64,
            registered_at: self.registered_at,
            completed: self.completed,
            failed: self.failed,
        }
    }
}

/// Read-only view of an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentView {
    pub id: AgentId,
    pub status: AgentStatus,
    pub draining: bool,
    pub capabilities: Vec<String>,
    pub requirements: ResourceVector,
    pub weight: u32,
    pub allocation: Option<AllocationId>,
    pub active_tasks: usize,
    pub consecutive_failures: u32,
    pub last_heartbeat_age_ms: u64,
    /// Unix seconds.
    pub registered_at: u64,
    pub completed: u64,
    pub failed: u64,
}
