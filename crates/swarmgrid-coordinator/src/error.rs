//! Coordinator error types.

use serde::{Deserialize, Serialize};
use thiserror::Error;

use swarm_core::{AgentId, ConfigError, TaskId, TaskStatus};
use swarmgrid_ledger::ConstrainedDimension;

/// Why no agent could be chosen for a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Ineligibility {
    /// No live agent advertises the task's capability.
    NoCapableAgent,
    /// Capable agents exist but none is healthy and accepting work.
    NoHealthyAgent,
    /// Every healthy capable agent is at its concurrency limit.
    AllSaturated,
}

impl std::fmt::Display for Ineligibility {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(match self {
            Ineligibility::NoCapableAgent => "no agent advertises the capability",
            Ineligibility::NoHealthyAgent => "no capable agent is healthy",
            Ineligibility::AllSaturated => "all capable agents are at capacity",
        })
    }
}

/// Typed reason a task stayed pending.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "reason", rename_all = "snake_case")]
pub enum RejectionReason {
    NoEligibleAgent { detail: Ineligibility },
    InsufficientCapacity { constrained: Vec<ConstrainedDimension> },
}

/// Errors that can occur during coordinator operations.
#[derive(Debug, Error)]
pub enum CoordinatorError {
    #[error("invalid configuration: {0}")]
    Config(#[from] ConfigError),

    #[error("agent already registered: {0}")]
    DuplicateAgent(AgentId),

    #[error("agent not found: {0}")]
    AgentNotFound(AgentId),

    #[error("agent pool is full ({max} agents)")]
    PoolFull { max: u32 },

    #[error("insufficient capacity for {id}: {}", format_constrained(.constrained))]
    InsufficientCapacity {
        id: String,
        constrained: Vec<ConstrainedDimension>,
    },

    #[error("no eligible agent for task {task_id}: {reason}")]
    NoEligibleAgent {
        task_id: TaskId,
        reason: Ineligibility,
    },

    #[error("task already submitted: {0}")]
    DuplicateTask(TaskId),

    #[error("task not found: {0}")]
    TaskNotFound(TaskId),

    #[error("task {task_id} is not in flight (status {status})")]
    TaskNotInFlight { task_id: TaskId, status: TaskStatus },

    #[error("internal invariant violated: {0}")]
    InvariantViolation(String),

    #[error("agent driver error: {0}")]
    Driver(String),
}

impl CoordinatorError {
    /// The rejection carried by a capacity or eligibility error.
    pub fn rejection(&self) -> Option<RejectionReason> {
        match self {
            CoordinatorError::NoEligibleAgent { reason, .. } => {
                Some(RejectionReason::NoEligibleAgent { detail: *reason })
            }
            CoordinatorError::InsufficientCapacity { constrained, .. } => {
                Some(RejectionReason::InsufficientCapacity {
                    constrained: constrained.clone(),
                })
            }
            _ => None,
        }
    }

    /// Capacity-class errors are operational and may be retried by the caller.
    pub fn is_capacity(&self) -> bool {
        matches!(
            self,
            CoordinatorError::InsufficientCapacity { .. }
                | CoordinatorError::NoEligibleAgent { .. }
                | CoordinatorError::PoolFull { .. }
        )
    }
}

fn format_constrained(dims: &[ConstrainedDimension]) -> String {
    dims.iter()
        .map(ToString::to_string)
        .collect::<Vec<_>>()
        .join(", ")
}

pub type CoordinatorResult<T> = Result<T, CoordinatorError>;
