//! Resource ledger: the single source of truth for capacity accounting.
//!
//! Every grant and release goes through one `RwLock`, so mutations are
//! serialized and a usage snapshot is always a consistent point-in-time
//! view. Nothing here performs I/O; the lock is held only for in-memory
//! bookkeeping.

use std::collections::BTreeMap;
use std::fmt;
use std::time::{SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::RwLock;
use tracing::{debug, warn};

use swarm_core::{AgentId, ResourceDimension, ResourceVector, TaskId};

use crate::error::{ConstrainedDimension, LedgerError, LedgerResult};
use crate::optimize::{suggest_rebalance, Reallocation, DEFAULT_REBALANCE_TOLERANCE};

/// Handle to a granted allocation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct AllocationId(pub u64);

impl fmt::Display for AllocationId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "alloc-{}", self.0)
    }
}

/// Who an allocation was granted to.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum Holder {
    /// An agent's baseline footprint.
    Agent { agent_id: AgentId },
    /// A task's estimate, charged on behalf of the agent running it.
    Task { task_id: TaskId, agent_id: AgentId },
}

impl Holder {
    pub fn agent(agent_id: impl Into<AgentId>) -> Self {
        Holder::Agent {
            agent_id: agent_id.into(),
        }
    }

    pub fn task(task_id: impl Into<TaskId>, agent_id: impl Into<AgentId>) -> Self {
        Holder::Task {
            task_id: task_id.into(),
            agent_id: agent_id.into(),
        }
    }

    /// The agent this allocation is charged to.
    pub fn agent_id(&self) -> &str {
        match self {
            Holder::Agent { agent_id } | Holder::Task { agent_id, .. } => agent_id,
        }
    }
}

/// A granted reservation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Allocation {
    pub id: AllocationId,
    pub holder: Holder,
    pub amount: ResourceVector,
    /// Unix timestamp (seconds) of the grant.
    pub granted_at: u64,
}

/// Result of a release call.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Release {
    /// The allocation was active and is now returned to the free pool.
    Released(ResourceVector),
    /// The allocation had already been released.
    AlreadyReleased,
    /// The id was never issued by this ledger.
    Unknown,
}

impl Release {
    pub fn is_released(&self) -> bool {
        matches!(self, Release::Released(_))
    }
}

/// Usage of one dimension.
#[derive(Debug, Clone, Copy, PartialEq, Serialize, Deserialize)]
pub struct DimensionUsage {
    pub dimension: ResourceDimension,
    pub used: u64,
    pub total: u64,
    pub free: u64,
    /// used / total, or 0.0 for dimensions without capacity.
    pub utilization: f64,
}

/// Point-in-time view of the ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UsageSnapshot {
    pub capacity: ResourceVector,
    pub used: ResourceVector,
    pub dimensions: Vec<DimensionUsage>,
    pub allocation_count: usize,
}

impl UsageSnapshot {
    /// Aggregate utilization: the most utilized dimension that has capacity.
    pub fn utilization(&self) -> f64 {
        self.dimensions
            .iter()
            .filter(|d| d.total > 0)
            .map(|d| d.utilization)
            .fold(0.0, f64::max)
    }

    /// Mean utilization across dimensions with capacity.
    pub fn mean_utilization(&self) -> f64 {
        self.used.share_of(&self.capacity)
    }

    pub fn free(&self) -> ResourceVector {
        self.capacity.saturating_sub(&self.used)
    }

    pub fn dimension(&self, dimension: ResourceDimension) -> Option<&DimensionUsage> {
        self.dimensions.iter().find(|d| d.dimension == dimension)
    }
}

/// Cumulative ledger counters.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct LedgerStats {
    pub granted: u64,
    pub denied: u64,
    pub released: u64,
    /// Releases of already-released or unknown allocations.
    pub stale_releases: u64,
}

struct LedgerState {
    capacity: ResourceVector,
    used: ResourceVector,
    allocations: BTreeMap<AllocationId, Allocation>,
    next_id: u64,
    stats: LedgerStats,
}

impl LedgerState {
    fn free(&self) -> ResourceVector {
        self.capacity.saturating_sub(&self.used)
    }

    fn check(&self, request: &ResourceVector) -> Result<(), Vec<ConstrainedDimension>> {
        let free = self.free();
        let constrained: Vec<ConstrainedDimension> = request
            .exceeding(&free)
            .into_iter()
            .map(|dimension| ConstrainedDimension {
                dimension,
                requested: request.get(dimension),
                free: free.get(dimension),
            })
            .collect();
        if constrained.is_empty() {
            Ok(())
        } else {
            Err(constrained)
        }
    }

    fn release(&mut self, id: AllocationId) -> Release {
        match self.allocations.remove(&id) {
            Some(alloc) => {
                self.used = self.used.saturating_sub(&alloc.amount);
                self.stats.released += 1;
                debug!(allocation = %id, holder = alloc.holder.agent_id(), "allocation released");
                Release::Released(alloc.amount)
            }
            None => {
                self.stats.stale_releases += 1;
                if id.0 < self.next_id {
                    warn!(allocation = %id, "release of already-released allocation ignored");
                    Release::AlreadyReleased
                } else {
                    warn!(allocation = %id, "release of unknown allocation ignored");
                    Release::Unknown
                }
            }
        }
    }
}

/// Tracks total versus allocated capacity across all dimensions.
pub struct ResourceLedger {
    state: RwLock<LedgerState>,
}

impl ResourceLedger {
    /// Create a ledger with the given total capacity.
    pub fn new(capacity: ResourceVector) -> Self {
        Self {
            state: RwLock::new(LedgerState {
                capacity,
                used: ResourceVector::ZERO,
                allocations: BTreeMap::new(),
                next_id: 1,
                stats: LedgerStats::default(),
            }),
        }
    }

    /// Grant `request` to `holder` if every dimension has room.
    ///
    /// Either the whole request is granted or nothing is; the error names
    /// every dimension that was short.
    pub async fn allocate(
        &self,
        holder: Holder,
        request: ResourceVector,
    ) -> LedgerResult<AllocationId> {
        let mut state = self.state.write().await;

        if let Err(constrained) = state.check(&request) {
            state.stats.denied += 1;
            debug!(
                holder = holder.agent_id(),
                %request,
                constrained = constrained.len(),
                "allocation denied"
            );
            return Err(LedgerError::InsufficientCapacity(constrained));
        }

        let id = AllocationId(state.next_id);
        state.next_id += 1;
        state.used = state.used + request;
        state.stats.granted += 1;
        debug!(allocation = %id, holder = holder.agent_id(), %request, "allocation granted");
        state.allocations.insert(
            id,
            Allocation {
                id,
                holder,
                amount: request,
                granted_at: epoch_secs(),
            },
        );
        Ok(id)
    }

    /// Dry-run of `allocate`.
    pub async fn can_satisfy(&self, request: &ResourceVector) -> LedgerResult<()> {
        let state = self.state.read().await;
        state
            .check(request)
            .map_err(LedgerError::InsufficientCapacity)
    }

    /// Return an allocation to the free pool.
    ///
    /// Idempotent: stale ids are counted and logged, never fatal.
    pub async fn release(&self, id: AllocationId) -> Release {
        let mut state = self.state.write().await;
        state.release(id)
    }

    /// Release several allocations in one critical section.
    ///
    /// When this returns, every release has been committed.
    pub async fn release_many(&self, ids: &[AllocationId]) -> Vec<(AllocationId, Release)> {
        let mut state = self.state.write().await;
        ids.iter().map(|id| (*id, state.release(*id))).collect()
    }

    /// Per-dimension used/total/free.
    pub async fn current_usage(&self) -> UsageSnapshot {
        let state = self.state.read().await;
        let dimensions = ResourceDimension::ALL
            .into_iter()
            .map(|dimension| {
                let used = state.used.get(dimension);
                let total = state.capacity.get(dimension);
                DimensionUsage {
                    dimension,
                    used,
                    total,
                    free: total.saturating_sub(used),
                    utilization: if total > 0 {
                        used as f64 / total as f64
                    } else {
                        0.0
                    },
                }
            })
            .collect();

        UsageSnapshot {
            capacity: state.capacity,
            used: state.used,
            dimensions,
            allocation_count: state.allocations.len(),
        }
    }

    /// Advisory rebalancing suggestions; nothing is moved.
    pub async fn optimize(&self) -> Vec<Reallocation> {
        self.optimize_with_tolerance(DEFAULT_REBALANCE_TOLERANCE).await
    }

    /// `optimize` with an explicit load-gap tolerance.
    pub async fn optimize_with_tolerance(&self, tolerance: f64) -> Vec<Reallocation> {
        let state = self.state.read().await;
        let allocations: Vec<&Allocation> = state.allocations.values().collect();
        suggest_rebalance(&state.capacity, &allocations, tolerance)
    }

    /// Look up an active allocation.
    pub async fn allocation(&self, id: AllocationId) -> Option<Allocation> {
        let state = self.state.read().await;
        state.allocations.get(&id).cloned()
    }

    /// All active allocations charged to an agent.
    pub async fn allocations_for_agent(&self, agent_id: &str) -> Vec<Allocation> {
        let state = self.state.read().await;
        state
            .allocations
            .values()
            .filter(|a| a.holder.agent_id() == agent_id)
            .cloned()
            .collect()
    }

    pub async fn capacity(&self) -> ResourceVector {
        self.state.read().await.capacity
    }

    pub async fn stats(&self) -> LedgerStats {
        self.state.read().await.stats
    }

    /// Recompute usage from the active allocations and compare with the
    /// running totals and the configured capacity.
    pub async fn is_consistent(&self) -> bool {
        let state = self.state.read().await;
        let recomputed = state
            .allocations
            .values()
            .fold(ResourceVector::ZERO, |acc, a| acc + a.amount);
        recomputed == state.used && state.used.fits_within(&state.capacity)
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}
