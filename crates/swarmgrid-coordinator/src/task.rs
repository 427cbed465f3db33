//! Task records, the pending queue, and assignment handles.

use std::cmp::Reverse;
use std::collections::BTreeSet;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use swarm_core::{AgentId, Priority, ResourceVector, TaskId, TaskSpec, TaskStatus};
use swarmgrid_ledger::AllocationId;

use crate::error::RejectionReason;

/// A task bound to an agent, handed to the driver for delivery.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Assignment {
    pub task_id: TaskId,
    pub agent_id: AgentId,
    /// 1-based attempt number.
    pub attempt: u32,
    pub allocation: AllocationId,
    pub capability: String,
    pub priority: Priority,
    pub payload: serde_json::Value,
}

/// How one attempt at a task ended.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum AttemptOutcome {
    Completed,
    Failed { error: String },
    TimedOut,
    AgentLost { reason: String },
}

impl AttemptOutcome {
    pub fn is_failure(&self) -> bool {
        !matches!(self, AttemptOutcome::Completed)
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttemptRecord {
    pub attempt: u32,
    pub agent_id: AgentId,
    #[serde(flatten)]
    pub outcome: AttemptOutcome,
    /// Unix seconds.
    pub finished_at: u64,
}

pub(crate) struct TaskRecord {
    pub id: TaskId,
    pub capability: String,
    pub priority: Priority,
    pub requirements: ResourceVector,
    pub payload: serde_json::Value,
    pub deadline_ms: Option<u64>,
    pub status: TaskStatus,
    pub agent: Option<AgentId>,
    pub allocation: Option<AllocationId>,
    /// Deadline of the current attempt.
    pub deadline: Option<Instant>,
    pub submitted_seq: u64,
    pub submitted_at: u64,
    /// Attempts started so far.
    pub attempt: u32,
    /// Failed attempts so far; compared against the retry limit.
    pub failures: u32,
    pub history: Vec<AttemptRecord>,
    pub last_rejection: Option<RejectionReason>,
}

impl TaskRecord {
    pub fn new(id: TaskId, spec: TaskSpec, seq: u64, submitted_at: u64) -> Self {
        Self {
            id,
            capability: spec.capability,
            priority: spec.priority,
            requirements: spec.requirements,
            payload: spec.payload,
            deadline_ms: spec.deadline_ms,
            status: TaskStatus::Pending,
            agent: None,
            allocation: None,
            deadline: None,
            submitted_seq: seq,
            submitted_at,
            attempt: 0,
            failures: 0,
            history: Vec::new(),
            last_rejection: None,
        }
    }

    pub fn queue_key(&self) -> QueueKey {
        (Reverse(self.priority), self.submitted_seq, self.id.clone())
    }

    pub fn assignment(&self) -> Option<Assignment> {
        Some(Assignment {
            task_id: self.id.clone(),
            agent_id: self.agent.clone()?,
            attempt: self.attempt,
            allocation: self.allocation?,
            capability: self.capability.clone(),
            priority: self.priority,
            payload: self.payload.clone(),
        })
    }

    pub fn view(&self) -> TaskView {
        TaskView {
            id: self.id.clone(),
            capability: self.capability.clone(),
            priority: self.priority,
            status: self.status,
            agent: self.agent.clone(),
            allocation: self.allocation,
            requirements: self.requirements,
            attempts: self.attempt,
            failures: self.failures,
            submitted_at: self.submitted_at,
            history: self.history.clone(),
            last_rejection: self.last_rejection.clone(),
        }
    }
}

/// Read-only view of a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskView {
    pub id: TaskId,
    pub capability: String,
    pub priority: Priority,
    pub status: TaskStatus,
    pub agent: Option<AgentId>,
    pub allocation: Option<AllocationId>,
    pub requirements: ResourceVector,
    pub attempts: u32,
    pub failures: u32,
    pub submitted_at: u64,
    pub history: Vec<AttemptRecord>,
    /// Why the task is still pending, if it was ever rejected.
    pub last_rejection: Option<RejectionReason>,
}

/// Ordering key: higher priority first, then submission order.
pub(crate) type QueueKey = (Reverse<Priority>, u64, TaskId);

/// Pending tasks in dispatch order.
#[derive(Debug, Default)]
pub(crate) struct PendingQueue {
    entries: BTreeSet<QueueKey>,
}

impl PendingQueue {
    pub fn push(&mut self, key: QueueKey) {
        self.entries.insert(key);
    }

    pub fn remove(&mut self, key: &QueueKey) -> bool {
        self.entries.remove(key)
    }

    /// Keys in dispatch order.
    pub fn ordered_keys(&self) -> Vec<QueueKey> {
        self.entries.iter().cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }
}
