//! Operational counters.
//!
//! Every failure path in the coordinator bumps one of these, so nothing
//! is silently swallowed. Plain atomics; reads are not synchronized with
//! each other.

use std::sync::atomic::{AtomicU64, Ordering};

use serde::{Deserialize, Serialize};

#[derive(Default)]
pub(crate) struct CoordinatorCounters {
    pub agents_registered: AtomicU64,
    pub agents_deregistered: AtomicU64,
    pub agent_failures: AtomicU64,
    pub heartbeats: AtomicU64,
    pub stale_heartbeats: AtomicU64,
    pub tasks_submitted: AtomicU64,
    pub tasks_assigned: AtomicU64,
    pub tasks_completed: AtomicU64,
    pub tasks_failed: AtomicU64,
    pub tasks_timed_out: AtomicU64,
    pub tasks_requeued: AtomicU64,
    pub rejections_no_eligible: AtomicU64,
    pub rejections_capacity: AtomicU64,
    pub stale_reports: AtomicU64,
    pub delivery_failures: AtomicU64,
    pub driver_errors: AtomicU64,
    pub invariant_violations: AtomicU64,
}

impl CoordinatorCounters {
    pub fn bump(counter: &AtomicU64) {
        counter.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CounterSnapshot {
        let get = |c: &AtomicU64| c.load(Ordering::Relaxed);
        CounterSnapshot {
            agents_registered: get(&self.agents_registered),
            agents_deregistered: get(&self.agents_deregistered),
            agent_failures: get(&self.agent_failures),
            heartbeats: get(&self.heartbeats),
            stale_heartbeats: get(&self.stale_heartbeats),
            tasks_submitted: get(&self.tasks_submitted),
            tasks_assigned: get(&self.tasks_assigned),
            tasks_completed: get(&self.tasks_completed),
            tasks_failed: get(&self.tasks_failed),
            tasks_timed_out: get(&self.tasks_timed_out),
            tasks_requeued: get(&self.tasks_requeued),
            rejections_no_eligible: get(&self.rejections_no_eligible),
            rejections_capacity: get(&self.rejections_capacity),
            stale_reports: get(&self.stale_reports),
            delivery_failures: get(&self.delivery_failures),
            driver_errors: get(&self.driver_errors),
            invariant_violations: get(&self.invariant_violations),
        }
    }
}

/// Serializable copy of the coordinator counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct CounterSnapshot {
    pub agents_registered: u64,
    pub agents_deregistered: u64,
    pub agent_failures: u64,
    pub heartbeats: u64,
    pub stale_heartbeats: u64,
    pub tasks_submitted: u64,
    pub tasks_assigned: u64,
    pub tasks_completed: u64,
    /// Tasks that reached terminal `Failed`.
    pub tasks_failed: u64,
    /// Tasks that reached terminal `TimedOut`.
    pub tasks_timed_out: u64,
    pub tasks_requeued: u64,
    pub rejections_no_eligible: u64,
    pub rejections_capacity: u64,
    pub stale_reports: u64,
    pub delivery_failures: u64,
    pub driver_errors: u64,
    pub invariant_violations: u64,
}
