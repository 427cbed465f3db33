//! Rebalancing advice.
//!
//! Scores each agent by the share of system capacity charged to it
//! (baseline footprint plus the tasks it runs) and proposes moving task
//! allocations from the most loaded agent to the least loaded one while
//! doing so narrows the gap. The output is advisory; the coordinator
//! decides whether anything is acted on.

use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use tracing::debug;

use swarm_core::{AgentId, ResourceVector, TaskId};

use crate::ledger::{Allocation, AllocationId, Holder};

/// Load gap (as a fraction of capacity) below which agents count as balanced.
pub const DEFAULT_REBALANCE_TOLERANCE: f64 = 0.10;

/// A suggested move of one task allocation between agents.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Reallocation {
    pub allocation: AllocationId,
    pub task_id: TaskId,
    pub from_agent: AgentId,
    pub to_agent: AgentId,
    /// Share of system capacity the allocation represents.
    pub share: f64,
    /// Projected load gap between the two agents after the move.
    pub projected_gap: f64,
}

/// Compute rebalancing suggestions over the given allocations.
pub fn suggest_rebalance(
    capacity: &ResourceVector,
    allocations: &[&Allocation],
    tolerance: f64,
) -> Vec<Reallocation> {
    let mut load: BTreeMap<&str, f64> = BTreeMap::new();
    // (allocation, task, share) per agent, movable candidates only.
    let mut movable: BTreeMap<&str, Vec<(AllocationId, &str, f64)>> = BTreeMap::new();

    for alloc in allocations {
        let agent = alloc.holder.agent_id();
        let share = alloc.amount.share_of(capacity);
        *load.entry(agent).or_insert(0.0) += share;
        if let Holder::Task { task_id, .. } = &alloc.holder
            && share > 0.0
        {
            movable
                .entry(agent)
                .or_default()
                .push((alloc.id, task_id.as_str(), share));
        }
    }

    let mut suggestions = Vec::new();
    if load.len() < 2 {
        return suggestions;
    }

    let max_moves: usize = movable.values().map(Vec::len).sum();
    for _ in 0..max_moves {
        let Some((&heavy, &heavy_load)) = load
            .iter()
            .max_by(|a, b| a.1.total_cmp(b.1).then_with(|| b.0.cmp(a.0)))
        else {
            break;
        };
        let Some((&light, &light_load)) = load
            .iter()
            .min_by(|a, b| a.1.total_cmp(b.1).then_with(|| a.0.cmp(b.0)))
        else {
            break;
        };

        let gap = heavy_load - light_load;
        if heavy == light || gap <= tolerance {
            break;
        }

        // Best candidate: the share closest to half the gap, strictly
        // smaller than the gap so the move narrows it.
        let Some(candidates) = movable.get_mut(heavy) else {
            break;
        };
        let best = candidates
            .iter()
            .enumerate()
            .filter(|(_, (_, _, share))| *share < gap)
            .min_by(|a, b| {
                let da = (a.1 .2 - gap / 2.0).abs();
                let db = (b.1 .2 - gap / 2.0).abs();
                da.total_cmp(&db).then_with(|| a.1 .0.cmp(&b.1 .0))
            })
            .map(|(idx, _)| idx);

        let Some(idx) = best else {
            break;
        };
        let (allocation, task_id, share) = candidates.swap_remove(idx);

        if let Some(l) = load.get_mut(heavy) {
            *l -= share;
        }
        if let Some(l) = load.get_mut(light) {
            *l += share;
        }
        let projected_gap = (gap - 2.0 * share).abs();

        debug!(
            %allocation,
            task = task_id,
            from = heavy,
            to = light,
            share,
            projected_gap,
            "rebalance suggested"
        );
        suggestions.push(Reallocation {
            allocation,
            task_id: task_id.to_string(),
            from_agent: heavy.to_string(),
            to_agent: light.to_string(),
            share,
            projected_gap,
        });
    }

    suggestions
}
