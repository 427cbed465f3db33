//! Scaling decision records and the bounded history window.

use std::collections::VecDeque;
use std::fmt;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;

use swarm_core::AgentId;

use crate::policy::ScalingSignals;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingDirection {
    Up,
    Down,
}

impl fmt::Display for ScalingDirection {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScalingDirection::Up => "up",
            ScalingDirection::Down => "down",
        })
    }
}

/// One scaling action. Immutable once recorded.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScalingDecisionRecord {
    /// Unix seconds.
    pub timestamp: u64,
    pub direction: ScalingDirection,
    /// Agents added or removed by this action.
    pub magnitude: u32,
    /// Signals that triggered the action.
    pub signals: ScalingSignals,
    pub reason: String,
    pub policy: String,
    /// Unix seconds at which this direction's cooldown ends.
    pub cooldown_until: u64,
    pub pool_before: u32,
    pub pool_after: u32,
    /// Removals still waiting for an idle agent.
    pub deferred: u32,
    /// Agents added, removed or put into drain.
    pub agents: Vec<AgentId>,
}

/// Shared, bounded history of scaling decisions. Oldest entries are
/// evicted first.
#[derive(Debug, Clone)]
pub struct ScalingHistory {
    records: Arc<RwLock<VecDeque<ScalingDecisionRecord>>>,
    limit: usize,
}

impl ScalingHistory {
    pub fn new(limit: usize) -> Self {
        let limit = limit.max(1);
        Self {
            records: Arc::new(RwLock::new(VecDeque::with_capacity(limit))),
            limit,
        }
    }

    pub async fn push(&self, record: ScalingDecisionRecord) {
        let mut records = self.records.write().await;
        records.push_back(record);
        while records.len() > self.limit {
            records.pop_front();
        }
    }

    pub async fn latest(&self) -> Option<ScalingDecisionRecord> {
        self.records.read().await.back().cloned()
    }

    /// Up to `n` most recent records, newest first.
    pub async fn recent(&self, n: usize) -> Vec<ScalingDecisionRecord> {
        self.records.read().await.iter().rev().take(n).cloned().collect()
    }

    pub async fn len(&self) -> usize {
        self.records.read().await.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.records.read().await.is_empty()
    }

    pub fn limit(&self) -> usize {
        self.limit
    }
}
