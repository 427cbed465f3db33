//! Agent selection strategies.
//!
//! The coordinator filters agents down to eligible candidates (capable,
//! healthy, not draining, below their slot limit) and the balancer picks
//! one. All selection is deterministic for a given candidate set and
//! balancer state, so distribution is reproducible in tests.
//!
//! Balancer state lives inside the coordinator's registry and is only
//! touched under its write lock, so no interior atomics are needed.

use std::cmp::{Ordering, Reverse};
use std::collections::HashMap;

use tokio::time::Instant;

use swarm_core::{AgentId, LoadBalancingStrategy};

/// An eligible agent, as seen by the balancer.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub id: &'a str,
    /// Tasks currently in flight on the agent.
    pub active: usize,
    pub last_heartbeat: Instant,
    /// Position in registration order.
    pub registered_seq: u64,
    /// Total capabilities the agent advertises.
    pub capability_count: usize,
    /// Effective weight for the weighted strategy, at least 1.
    pub weight: u64,
}

/// Load-then-freshness ordering shared by several strategies: fewest
/// active tasks, then most recent heartbeat, then earliest registration.
fn least_loaded_key<'a>(c: &Candidate<'a>) -> (usize, Reverse<Instant>, u64) {
    (c.active, Reverse(c.last_heartbeat), c.registered_seq)
}

fn pick_least_loaded<'a>(candidates: &[Candidate<'a>]) -> Option<&'a str> {
    candidates.iter().min_by_key(|c| least_loaded_key(c)).map(|c| c.id)
}

/// Stateful agent selector.
#[derive(Debug, Default)]
pub struct LoadBalancer {
    strategy: LoadBalancingStrategy,
    /// Registration seq of the last round-robin pick.
    rr_last: Option<u64>,
    /// Smooth weighted round-robin running weights.
    current_weight: HashMap<AgentId, i64>,
}

impl LoadBalancer {
    pub fn new(strategy: LoadBalancingStrategy) -> Self {
        Self {
            strategy,
            rr_last: None,
            current_weight: HashMap::new(),
        }
    }

    /// Choose one candidate. Returns `None` only for an empty slice.
    pub fn select(&mut self, candidates: &[Candidate<'_>]) -> Option<AgentId> {
        if candidates.is_empty() {
            return None;
        }
        let picked = match self.strategy {
            LoadBalancingStrategy::RoundRobin => self.round_robin(candidates),
            LoadBalancingStrategy::LeastLoaded | LoadBalancingStrategy::PriorityWeighted => {
                pick_least_loaded(candidates)
            }
            LoadBalancingStrategy::CapabilityWeighted => candidates
                .iter()
                .min_by(|a, b| {
                    a.capability_count
                        .cmp(&b.capability_count)
                        .then_with(|| least_loaded_key(a).cmp(&least_loaded_key(b)))
                })
                .map(|c| c.id),
            LoadBalancingStrategy::Weighted => self.smooth_weighted(candidates),
        };
        picked.map(str::to_string)
    }

    /// Forget per-agent state for a removed agent.
    pub fn forget(&mut self, agent_id: &str) {
        self.current_weight.remove(agent_id);
    }

    /// Cursor over registration order. The first pick of every cycle goes
    /// to the least-loaded candidate; later picks advance past the cursor.
    fn round_robin<'a>(&mut self, candidates: &[Candidate<'a>]) -> Option<&'a str> {
        let next = self.rr_last.and_then(|last| {
            candidates
                .iter()
                .filter(|c| c.registered_seq > last)
                .min_by_key(|c| c.registered_seq)
        });
        let chosen = match next {
            Some(c) => c,
            None => candidates
                .iter()
                .min_by_key(|c| (c.active, c.registered_seq))?,
        };
        self.rr_last = Some(chosen.registered_seq);
        Some(chosen.id)
    }

    /// Nginx-style smooth weighted round robin.
    fn smooth_weighted<'a>(&mut self, candidates: &[Candidate<'a>]) -> Option<&'a str> {
        let mut total: i64 = 0;
        let mut best: Option<(&Candidate<'a>, i64)> = None;

        for c in candidates {
            let weight = c.weight.max(1) as i64;
            total += weight;
            let cw = self.current_weight.entry(c.id.to_string()).or_insert(0);
            *cw += weight;
            let better = match best {
                None => true,
                Some((b, bw)) => match (*cw).cmp(&bw) {
                    Ordering::Greater => true,
                    Ordering::Equal => c.registered_seq < b.registered_seq,
                    Ordering::Less => false,
                },
            };
            if better {
                best = Some((c, *cw));
            }
        }

        let (chosen, _) = best?;
        if let Some(cw) = self.current_weight.get_mut(chosen.id) {
            *cw -= total;
        }
        Some(chosen.id)
    }
}

/// Weight derived from an agent's track record: declared weight scaled by
/// a smoothed success rate, expressed in hundredths so that integer
/// arithmetic keeps the ratio.
pub fn performance_weight(base: u32, completed: u64, failed: u64) -> u64 {
    let base = base.max(1) as u64;
    let scaled = base * 100 * (completed + 1) / (completed + failed + 2);
    scaled.max(1)
}
