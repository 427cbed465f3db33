//! Snapshot publisher: pushes monitoring snapshots to subscribers.
//!
//! Snapshots go out over a `tokio::sync::broadcast` channel. Slow
//! subscribers lag and skip snapshots; publishing never blocks the loop.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::{broadcast, watch};
use tracing::{debug, info, warn};

use swarmgrid_autoscale::ScalingHistory;
use swarmgrid_coordinator::Coordinator;

use crate::snapshot::MonitoringSnapshot;

/// Snapshots buffered per subscriber before it starts lagging.
const CHANNEL_CAPACITY: usize = 16;

/// Periodically collects and broadcasts monitoring snapshots.
pub struct SnapshotPublisher {
    coordinator: Arc<Coordinator>,
    history: Option<ScalingHistory>,
    interval: Duration,
    tx: broadcast::Sender<Arc<MonitoringSnapshot>>,
}

impl SnapshotPublisher {
    pub fn new(coordinator: Arc<Coordinator>, interval: Duration) -> Self {
        let (tx, _) = broadcast::channel(CHANNEL_CAPACITY);
        Self {
            coordinator,
            history: None,
            interval,
            tx,
        }
    }

    /// Include the latest scaling decision in each snapshot.
    pub fn with_history(mut self, history: ScalingHistory) -> Self {
        self.history = Some(history);
        self
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Arc<MonitoringSnapshot>> {
        self.tx.subscribe()
    }

    pub fn subscriber_count(&self) -> usize {
        self.tx.receiver_count()
    }

    /// Collect a snapshot and send it to current subscribers. Returns the
    /// number of subscribers reached.
    pub async fn publish_now(&self) -> usize {
        let snapshot =
            Arc::new(MonitoringSnapshot::collect(&self.coordinator, self.history.as_ref()).await);
        match self.tx.send(snapshot) {
            Ok(n) => {
                debug!(subscribers = n, "monitoring snapshot published");
                n
            }
            // No subscribers.
            Err(_) => 0,
        }
    }

    /// Run the publish loop until shutdown signal.
    pub async fn run(&self, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = self.interval.as_secs(),
            "snapshot publisher started"
        );

        loop {
            tokio::select! {
                _ = tokio::time::sleep(self.interval) => {
                    if self.tx.receiver_count() == 0 {
                        continue;
                    }
                    if self.publish_now().await == 0 {
                        warn!("snapshot publish reached no subscribers");
                    }
                }
                _ = shutdown.changed() => {
                    info!("snapshot publisher shutting down");
                    break;
                }
            }
        }
    }
}
