//! Scaling policies.
//!
//! A policy turns the current load signals into a raw recommendation.
//! Sustain windows, cooldowns and pool bounds are applied afterwards by the
//! controller, so a policy only answers "which way, and by how much".

use serde::{Deserialize, Serialize};

use swarm_core::PoolConfig;
use swarmgrid_coordinator::CoordinatorSnapshot;

/// Load signals observed at the start of a scaling cycle.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct ScalingSignals {
    /// Bottleneck-dimension utilization, 0.0..=1.0.
    pub utilization: f64,
    /// Mean utilization across dimensions with capacity.
    pub mean_utilization: f64,
    /// Live agents, draining ones included.
    pub pool_size: u32,
    pub draining: u32,
    /// Non-draining agents with no work in flight.
    pub idle_agents: u32,
    pub pending_tasks: u32,
    pub in_flight_tasks: u32,
    pub min_agents: u32,
    pub max_agents: u32,
}

impl ScalingSignals {
    pub fn from_snapshot(snapshot: &CoordinatorSnapshot, pool: &PoolConfig) -> Self {
        let idle = snapshot
            .agents
            .iter()
            .filter(|a| !a.draining && a.active_tasks == 0)
            .count();
        Self {
            utilization: snapshot.utilization(),
            mean_utilization: snapshot.usage.mean_utilization(),
            pool_size: snapshot.pool_size as u32,
            draining: snapshot.draining() as u32,
            idle_agents: idle as u32,
            pending_tasks: snapshot.tasks.pending as u32,
            in_flight_tasks: snapshot.tasks.in_flight() as u32,
            min_agents: pool.min_agents,
            max_agents: pool.max_agents,
        }
    }

    /// Agents that will remain once draining ones are gone.
    pub fn active_pool(&self) -> u32 {
        self.pool_size.saturating_sub(self.draining)
    }
}

/// What a policy would like to happen.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Recommendation {
    ScaleUp { count: u32, reason: String },
    ScaleDown { count: u32, reason: String },
    Hold { reason: String },
}

impl Recommendation {
    pub fn reason(&self) -> &str {
        match self {
            Recommendation::ScaleUp { reason, .. }
            | Recommendation::ScaleDown { reason, .. }
            | Recommendation::Hold { reason } => reason,
        }
    }
}

/// Decides a scaling direction from load signals.
pub trait ScalingPolicy: Send + Sync {
    /// Name recorded in scaling decision records.
    fn name(&self) -> &str;

    fn recommend(&self, signals: &ScalingSignals) -> Recommendation;
}

/// Threshold policy over aggregate utilization.
#[derive(Debug, Clone)]
pub struct ThresholdPolicy {
    pub scale_up_threshold: f64,
    pub scale_down_threshold: f64,
    pub step: u32,
}

impl ThresholdPolicy {
    pub fn new(scale_up_threshold: f64, scale_down_threshold: f64, step: u32) -> Self {
        Self {
            scale_up_threshold,
            scale_down_threshold,
            step: step.max(1),
        }
    }
}

impl ScalingPolicy for ThresholdPolicy {
    fn name(&self) -> &str {
        "threshold"
    }

    fn recommend(&self, signals: &ScalingSignals) -> Recommendation {
        let u = signals.utilization;
        if u > self.scale_up_threshold {
            Recommendation::ScaleUp {
                count: self.step,
                reason: format!(
                    "utilization {:.2} above {:.2}",
                    u, self.scale_up_threshold
                ),
            }
        } else if u < self.scale_down_threshold {
            Recommendation::ScaleDown {
                count: self.step,
                reason: format!(
                    "utilization {:.2} below {:.2}",
                    u, self.scale_down_threshold
                ),
            }
        } else {
            Recommendation::Hold {
                reason: format!(
                    "utilization {:.2} within [{:.2}, {:.2}]",
                    u, self.scale_down_threshold, self.scale_up_threshold
                ),
            }
        }
    }
}
