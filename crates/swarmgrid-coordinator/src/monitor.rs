//! Health monitor: background loop that sweeps the coordinator.
//!
//! Each tick fails agents whose heartbeats have lapsed and times out task
//! attempts past their deadline. An optional callback sees every sweep
//! that changed something.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::watch;
use tracing::{debug, info};

use crate::coordinator::{Coordinator, SweepReport};

/// Callback invoked after a sweep that failed agents or timed out tasks.
pub type SweepCallback = Arc<dyn Fn(SweepReport) -> SweepFuture + Send + Sync>;

pub type SweepFuture = std::pin::Pin<Box<dyn std::future::Future<Output = ()> + Send>>;

/// Drives periodic [`Coordinator::sweep`] calls.
pub struct HealthMonitor {
    coordinator: Arc<Coordinator>,
    on_sweep: Option<SweepCallback>,
}

impl HealthMonitor {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            on_sweep: None,
        }
    }

    /// Set a callback for sweeps that changed state.
    pub fn with_callback(mut self, callback: SweepCallback) -> Self {
        self.on_sweep = Some(callback);
        self
    }

    /// Run one sweep and fire the callback if anything happened.
    pub async fn tick(&self) -> SweepReport {
        let report = self.coordinator.sweep().await;
        if report.failed_agents.is_empty() && report.timed_out.is_empty() {
            debug!(dispatched = report.dispatched, "sweep clean");
        } else {
            info!(
                failed_agents = report.failed_agents.len(),
                timed_out = report.timed_out.len(),
                dispatched = report.dispatched,
                "sweep recovered work"
            );
            if let Some(ref cb) = self.on_sweep {
                cb(report.clone()).await;
            }
        }
        report
    }

    /// Sweep every `interval` until shutdown is signalled.
    pub async fn run(&self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(interval_ms = interval.as_millis() as u64, "health monitor started");

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {
                    self.tick().await;
                }
                _ = shutdown.changed() => {
                    info!("health monitor shutting down");
                    break;
                }
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};

    use swarm_core::{AgentSpec, HeartbeatStatus, ResourceVector, SwarmConfig};

    fn coordinator() -> Arc<Coordinator> {
        let config = SwarmConfig::scaffold(ResourceVector::cores(8));
        Arc::new(Coordinator::standalone(config).unwrap())
    }

    #[tokio::test(start_paused = true)]
    async fn tick_fires_callback_on_lapsed_agent() {
        let coord = coordinator();
        coord
            .register_agent(AgentSpec::new("a1", ["build"]))
            .await
            .unwrap();
        coord
            .report_heartbeat("a1", HeartbeatStatus::Healthy)
            .await
            .unwrap();

        let calls = Arc::new(AtomicUsize::new(0));
        let seen = calls.clone();
        let callback: SweepCallback = Arc::new(move |report: SweepReport| -> SweepFuture {
            let seen = seen.clone();
            Box::pin(async move {
                assert_eq!(report.failed_agents, vec!["a1".to_string()]);
                seen.fetch_add(1, Ordering::SeqCst);
            })
        });
        let monitor = HealthMonitor::new(coord.clone()).with_callback(callback);

        assert!(monitor.tick().await.failed_agents.is_empty());
        assert_eq!(calls.load(Ordering::SeqCst), 0);

        tokio::time::advance(Duration::from_secs(31)).await;
        monitor.tick().await;
        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert_eq!(coord.pool_size().await, 0);
    }

    #[tokio::test(start_paused = true)]
    async fn run_stops_on_shutdown() {
        let monitor = HealthMonitor::new(coordinator());
        let (tx, rx) = watch::channel(false);
        let handle = tokio::spawn(async move {
            monitor.run(Duration::from_secs(5), rx).await;
        });

        tokio::time::advance(Duration::from_secs(12)).await;
        tx.send(true).unwrap();
        handle.await.unwrap();
    }
}
