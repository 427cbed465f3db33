//! swarmgrid-metrics — monitoring export for SwarmGrid.
//!
//! Assembles `MonitoringSnapshot`s from the coordinator and the scaling
//! history, pushes them to subscribers on a fixed interval, and renders
//! them in Prometheus text format.
//!
//! # Architecture
//!
//! ```text
//! MonitoringSnapshot::collect()
//!   ├── Coordinator::snapshot()   ← ledger usage, agents, tasks, counters
//!   └── ScalingHistory::latest()  ← most recent scaling decision
//!
//! SnapshotPublisher
//!   ├── subscribe() → broadcast::Receiver
//!   └── run() → periodic push loop
//!
//! Prometheus exposition
//!   └── render_prometheus() → text/plain for /metrics endpoint
//! ```

pub mod prometheus;
pub mod publisher;
pub mod snapshot;

pub use prometheus::render_prometheus;
pub use publisher::SnapshotPublisher;
pub use snapshot::MonitoringSnapshot;
