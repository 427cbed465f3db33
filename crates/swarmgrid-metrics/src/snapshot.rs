//! Monitoring snapshot: everything an operator sees in one document.

use serde::{Deserialize, Serialize};

use swarmgrid_autoscale::{ScalingDecisionRecord, ScalingHistory};
use swarmgrid_coordinator::{Coordinator, CoordinatorSnapshot};

/// Coordinator state plus the most recent scaling decision.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct MonitoringSnapshot {
    #[serde(flatten)]
    pub coordinator: CoordinatorSnapshot,
    pub last_scaling: Option<ScalingDecisionRecord>,
}

impl MonitoringSnapshot {
    pub async fn collect(coordinator: &Coordinator, history: Option<&ScalingHistory>) -> Self {
        let snapshot = coordinator.snapshot().await;
        let last_scaling = match history {
            Some(h) => h.latest().await,
            None => None,
        };
        Self {
            coordinator: snapshot,
            last_scaling,
        }
    }

    pub fn utilization(&self) -> f64 {
        self.coordinator.utilization()
    }
}
