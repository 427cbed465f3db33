//! Heartbeat-driven health tracking.
//!
//! Counts consecutive unhealthy heartbeats for a single agent. A healthy
//! heartbeat resets the count; reaching the failure threshold marks the
//! agent failed, at which point the coordinator runs failure handling.

use tracing::{debug, warn};

use swarm_core::HeartbeatStatus;

/// Health classification derived from recent heartbeats.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HealthVerdict {
    /// No heartbeat seen yet.
    Unknown,
    Healthy,
    /// Failing, but below the threshold.
    Degraded,
    /// Threshold reached.
    Failed,
}

/// Tracks consecutive heartbeat results for a single agent.
#[derive(Debug)]
pub struct HealthTracker {
    verdict: HealthVerdict,
    consecutive_failures: u32,
    failure_threshold: u32,
}

impl HealthTracker {
    pub fn new(failure_threshold: u32) -> Self {
        Self {
            verdict: HealthVerdict::Unknown,
            consecutive_failures: 0,
            failure_threshold: failure_threshold.max(1),
        }
    }

    /// Record a heartbeat and return the new verdict.
    pub fn record(&mut self, status: HeartbeatStatus) -> HealthVerdict {
        match status {
            HeartbeatStatus::Healthy => {
                if self.verdict != HealthVerdict::Healthy && self.consecutive_failures > 0 {
                    debug!(
                        failures = self.consecutive_failures,
                        "agent recovered to healthy"
                    );
                }
                self.consecutive_failures = 0;
                self.verdict = HealthVerdict::Healthy;
            }
            HeartbeatStatus::Unhealthy => {
                self.consecutive_failures += 1;
                if self.consecutive_failures >= self.failure_threshold {
                    if self.verdict != HealthVerdict::Failed {
                        warn!(
                            failures = self.consecutive_failures,
                            threshold = self.failure_threshold,
                            "agent reached failure threshold"
                        );
                    }
                    self.verdict = HealthVerdict::Failed;
                } else {
                    self.verdict = HealthVerdict::Degraded;
                }
            }
        }
        self.verdict
    }

    pub fn consecutive_failures(&self) -> u32 {
        self.consecutive_failures
    }
}
