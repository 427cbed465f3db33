//! swarmgrid-coordinator — agent registry and task distribution.
//!
//! Owns the live agent set, the pending task queue and the selection
//! policy. Capacity is reserved through the `swarmgrid-ledger` before any
//! work is handed out, and released on every terminal path.
//!
//! # Architecture
//!
//! ```text
//! Coordinator
//!   ├── register / deregister / drain / launch / terminate agents
//!   ├── distribute_task → LoadBalancer → ResourceLedger::allocate
//!   │     └── pending queue (priority, then submission order)
//!   ├── heartbeats → HealthTracker → failure handling
//!   ├── task results → release → retry policy → dispatch pending
//!   └── AgentDriver (start / stop / deliver)
//!
//! HealthMonitor
//!   └── periodic Coordinator::sweep (heartbeat timeouts, task deadlines)
//! ```
//!
//! # Fault recovery
//!
//! An agent that reports `failure_threshold` consecutive unhealthy
//! heartbeats, or misses heartbeats for longer than `heartbeat_timeout`,
//! is marked `Unreachable`. Its in-flight tasks fail and are re-queued
//! (until their retry limit), and everything it held is released.

pub mod agent;
pub mod balancer;
pub mod coordinator;
mod counters;
pub mod driver;
pub mod error;
pub mod health;
pub mod monitor;
pub mod task;

pub use agent::AgentView;
pub use balancer::{Candidate, LoadBalancer};
pub use coordinator::{
    Coordinator, CoordinatorSnapshot, RecoveryReport, SweepReport, TaskSummary,
};
pub use counters::CounterSnapshot;
pub use driver::{AgentDriver, ChannelDriver, DriverEvent, DriverFuture, NullDriver};
pub use error::{CoordinatorError, CoordinatorResult, Ineligibility, RejectionReason};
pub use health::{HealthTracker, HealthVerdict};
pub use monitor::{HealthMonitor, SweepCallback, SweepFuture};
pub use task::{Assignment, AttemptOutcome, AttemptRecord, TaskView};
