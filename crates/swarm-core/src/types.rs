//! Shared types used across SwarmGrid crates.

use std::collections::BTreeSet;
use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::resources::ResourceVector;

/// Unique identifier for a registered agent.
pub type AgentId = String;

/// Unique identifier for a submitted task.
pub type TaskId = String;

/// Task priority. Higher values are more urgent.
pub type Priority = i32;

// ── Agents ────────────────────────────────────────────────────────

/// Lifecycle status of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AgentStatus {
    /// Registered, waiting for its first healthy heartbeat.
    Registered,
    /// Accepting work.
    Healthy,
    /// Reporting failures but below the failure threshold.
    Degraded,
    /// Failed; in-flight work re-queued and resources released.
    Unreachable,
    /// Removed by explicit deregistration.
    Deregistered,
}

impl AgentStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            AgentStatus::Registered => "registered",
            AgentStatus::Healthy => "healthy",
            AgentStatus::Degraded => "degraded",
            AgentStatus::Unreachable => "unreachable",
            AgentStatus::Deregistered => "deregistered",
        }
    }
}

impl fmt::Display for AgentStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Status reported by an agent heartbeat.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum HeartbeatStatus {
    Healthy,
    Unhealthy,
}

/// Registration request for an agent.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentSpec {
    /// Caller-supplied id; generated when absent.
    #[serde(default)]
    pub id: Option<AgentId>,
    /// Task classes this agent can execute.
    #[serde(default)]
    pub capabilities: BTreeSet<String>,
    /// Baseline resource footprint reserved while the agent is live.
    #[serde(default)]
    pub requirements: ResourceVector,
    /// Static weight for the weighted strategy.
    #[serde(default = "default_weight")]
    pub weight: u32,
}

fn default_weight() -> u32 {
    1
}

impl AgentSpec {
    pub fn new<I, S>(id: impl Into<AgentId>, capabilities: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        Self {
            id: Some(id.into()),
            capabilities: capabilities.into_iter().map(Into::into).collect(),
            requirements: ResourceVector::ZERO,
            weight: default_weight(),
        }
    }

    pub fn with_requirements(mut self, requirements: ResourceVector) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_weight(mut self, weight: u32) -> Self {
        self.weight = weight;
        self
    }
}

// ── Tasks ─────────────────────────────────────────────────────────

/// Lifecycle status of a task.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    Pending,
    Assigned,
    Running,
    Completed,
    Failed,
    TimedOut,
}

impl TaskStatus {
    /// Assigned or running on an agent.
    pub fn is_in_flight(&self) -> bool {
        matches!(self, TaskStatus::Assigned | TaskStatus::Running)
    }

    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            TaskStatus::Completed | TaskStatus::Failed | TaskStatus::TimedOut
        )
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            TaskStatus::Pending => "pending",
            TaskStatus::Assigned => "assigned",
            TaskStatus::Running => "running",
            TaskStatus::Completed => "completed",
            TaskStatus::Failed => "failed",
            TaskStatus::TimedOut => "timed_out",
        }
    }
}

impl fmt::Display for TaskStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Outcome reported by an agent for a task it ran.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "outcome", rename_all = "snake_case")]
pub enum TaskOutcome {
    Completed,
    Failed { error: String },
}

/// Submission request for a task.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TaskSpec {
    /// Caller-supplied id; generated when absent.
    #[serde(default)]
    pub id: Option<TaskId>,
    /// Capability an agent must advertise to run this task.
    pub capability: String,
    #[serde(default)]
    pub priority: Priority,
    /// Per-attempt deadline in milliseconds, counted from assignment.
    #[serde(default)]
    pub deadline_ms: Option<u64>,
    /// Resource estimate reserved while the task is in flight.
    #[serde(default)]
    pub requirements: ResourceVector,
    /// Opaque body forwarded to the agent.
    #[serde(default)]
    pub payload: serde_json::Value,
}

impl TaskSpec {
    pub fn new(id: impl Into<TaskId>, capability: impl Into<String>) -> Self {
        Self {
            id: Some(id.into()),
            capability: capability.into(),
            priority: 0,
            deadline_ms: None,
            requirements: ResourceVector::ZERO,
            payload: serde_json::Value::Null,
        }
    }

    pub fn with_priority(mut self, priority: Priority) -> Self {
        self.priority = priority;
        self
    }

    pub fn with_requirements(mut self, requirements: ResourceVector) -> Self {
        self.requirements = requirements;
        self
    }

    pub fn with_deadline_ms(mut self, deadline_ms: u64) -> Self {
        self.deadline_ms = Some(deadline_ms);
        self
    }

    pub fn with_payload(mut self, payload: serde_json::Value) -> Self {
        self.payload = payload;
        self
    }
}

// ── Balancing ─────────────────────────────────────────────────────

/// Agent-selection strategy for task distribution.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LoadBalancingStrategy {
    RoundRobin,
    #[default]
    LeastLoaded,
    CapabilityWeighted,
    PriorityWeighted,
    Weighted,
}

impl LoadBalancingStrategy {
    pub fn as_str(&self) -> &'static str {
        match self {
            LoadBalancingStrategy::RoundRobin => "round_robin",
            LoadBalancingStrategy::LeastLoaded => "least_loaded",
            LoadBalancingStrategy::CapabilityWeighted => "capability_weighted",
            LoadBalancingStrategy::PriorityWeighted => "priority_weighted",
            LoadBalancingStrategy::Weighted => "weighted",
        }
    }
}

impl fmt::Display for LoadBalancingStrategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for LoadBalancingStrategy {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().replace('-', "_").as_str() {
            "round_robin" => Ok(LoadBalancingStrategy::RoundRobin),
            "least_loaded" => Ok(LoadBalancingStrategy::LeastLoaded),
            "capability_weighted" => Ok(LoadBalancingStrategy::CapabilityWeighted),
            "priority_weighted" => Ok(LoadBalancingStrategy::PriorityWeighted),
            "weighted" => Ok(LoadBalancingStrategy::Weighted),
            other => Err(format!("unknown load balancing strategy: {other}")),
        }
    }
}

/// Where the weighted strategy takes an agent's weight from.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum WeightSource {
    /// The weight declared at registration.
    #[default]
    Static,
    /// Declared weight scaled by the agent's task success rate.
    Performance,
}
