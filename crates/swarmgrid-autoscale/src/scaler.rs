//! Scaling controller: grows and shrinks the agent pool.
//!
//! Each cycle observes the coordinator, asks the policy for a direction,
//! and acts only once that direction has held for its sustain window,
//! the pool bounds allow it, and that direction's cooldown has expired.
//! Agents are added through `Coordinator::launch_agent` and removed through
//! `Coordinator::terminate_agent`; busy agents are drained first.

use std::fmt;
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::watch;
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use swarm_core::{AgentId, PoolConfig, ScalingConfig};
use swarmgrid_coordinator::{Coordinator, CoordinatorError, CoordinatorResult};

use crate::history::{ScalingDecisionRecord, ScalingDirection, ScalingHistory};
use crate::policy::{Recommendation, ScalingPolicy, ScalingSignals, ThresholdPolicy};

/// Load-change wakeups closer together than this are folded into one cycle.
const MIN_EARLY_WAKE: Duration = Duration::from_secs(1);

/// Where the controller is in its cycle.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ScalingPhase {
    Idle,
    Evaluating,
    ScalingUp,
    ScalingDown,
    NoAction,
    Cooldown,
}

impl fmt::Display for ScalingPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(match self {
            ScalingPhase::Idle => "idle",
            ScalingPhase::Evaluating => "evaluating",
            ScalingPhase::ScalingUp => "scaling_up",
            ScalingPhase::ScalingDown => "scaling_down",
            ScalingPhase::NoAction => "no_action",
            ScalingPhase::Cooldown => "cooldown",
        })
    }
}

/// Decides when to grow or shrink the agent pool.
pub struct ScalingController {
    coordinator: Arc<Coordinator>,
    policy: Box<dyn ScalingPolicy>,
    config: ScalingConfig,
    pool: PoolConfig,
    history: ScalingHistory,
    phase: ScalingPhase,
    /// Since when the policy has continuously recommended each direction.
    up_since: Option<Instant>,
    down_since: Option<Instant>,
    last_scale_up: Option<Instant>,
    last_scale_down: Option<Instant>,
    /// First scale-down that found no idle agent, while low load persists.
    deferred_since: Option<Instant>,
    last_evaluation: Option<Instant>,
    launched: u64,
}

impl ScalingController {
    /// Controller using the default threshold policy from the coordinator's
    /// configuration.
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        let scaling = &coordinator.config().scaling;
        let policy = ThresholdPolicy::new(
            scaling.scale_up_threshold,
            scaling.scale_down_threshold,
            scaling.step,
        );
        Self::with_policy(coordinator, Box::new(policy))
    }

    pub fn with_policy(coordinator: Arc<Coordinator>, policy: Box<dyn ScalingPolicy>) -> Self {
        let config = coordinator.config().scaling.clone();
        let pool = coordinator.config().pool.clone();
        let history = ScalingHistory::new(config.history_limit);
        Self {
            coordinator,
            policy,
            config,
            pool,
            history,
            phase: ScalingPhase::Idle,
            up_since: None,
            down_since: None,
            last_scale_up: None,
            last_scale_down: None,
            deferred_since: None,
            last_evaluation: None,
            launched: 0,
        }
    }

    /// Shared handle to the decision history.
    pub fn history(&self) -> ScalingHistory {
        self.history.clone()
    }

    pub fn phase(&self) -> ScalingPhase {
        self.phase
    }

    pub fn policy_name(&self) -> &str {
        self.policy.name()
    }

    pub async fn observe(&self) -> ScalingSignals {
        let snapshot = self.coordinator.snapshot().await;
        ScalingSignals::from_snapshot(&snapshot, &self.pool)
    }

    // ── Decisions ─────────────────────────────────────────────────

    fn cooldown(&self) -> Duration {
        self.config.cooldown.as_duration()
    }

    fn cooldown_remaining(&self, last: Option<Instant>, now: Instant) -> Option<Duration> {
        let elapsed = now.saturating_duration_since(last?);
        self.cooldown().checked_sub(elapsed).filter(|d| !d.is_zero())
    }

    /// Track how long the policy has pointed the same way. Idempotent for
    /// repeated calls with the same recommendation.
    fn note(&mut self, rec: &Recommendation, now: Instant) {
        match rec {
            Recommendation::ScaleUp { .. } => {
                self.up_since.get_or_insert(now);
                self.down_since = None;
                self.deferred_since = None;
            }
            Recommendation::ScaleDown { .. } => {
                self.down_since.get_or_insert(now);
                self.up_since = None;
            }
            Recommendation::Hold { .. } => {
                self.up_since = None;
                self.down_since = None;
                self.deferred_since = None;
            }
        }
    }

    /// Whether a scale-up is due, with the reason either way.
    pub fn should_scale_up(&mut self, signals: &ScalingSignals) -> (bool, String) {
        let now = Instant::now();
        let rec = self.policy.recommend(signals);
        self.note(&rec, now);

        let Recommendation::ScaleUp { reason, .. } = rec else {
            return (false, rec.reason().to_string());
        };
        if signals.pool_size >= self.pool.max_agents {
            return (
                false,
                format!("pool at maximum ({}/{})", signals.pool_size, self.pool.max_agents),
            );
        }
        if let Some(left) = self.cooldown_remaining(self.last_scale_up, now) {
            return (false, format!("scale-up cooldown, {}s left", left.as_secs()));
        }
        let held = self
            .up_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        let sustain = self.config.scale_up_sustain.as_duration();
        if held < sustain {
            return (
                false,
                format!("{reason} for {}s of {}s", held.as_secs(), sustain.as_secs()),
            );
        }
        (true, reason)
    }

    /// Whether a scale-down is due, with the reason either way.
    pub fn should_scale_down(&mut self, signals: &ScalingSignals) -> (bool, String) {
        let now = Instant::now();
        let rec = self.policy.recommend(signals);
        self.note(&rec, now);

        let Recommendation::ScaleDown { reason, .. } = rec else {
            return (false, rec.reason().to_string());
        };
        if signals.active_pool() <= self.pool.min_agents {
            return (
                false,
                format!("pool at minimum ({}/{})", signals.active_pool(), self.pool.min_agents),
            );
        }
        if let Some(left) = self.cooldown_remaining(self.last_scale_down, now) {
            return (false, format!("scale-down cooldown, {}s left", left.as_secs()));
        }
        let held = self
            .down_since
            .map(|since| now.saturating_duration_since(since))
            .unwrap_or_default();
        let sustain = self.config.scale_down_sustain.as_duration();
        if held < sustain {
            return (
                false,
                format!("{reason} for {}s of {}s", held.as_secs(), sustain.as_secs()),
            );
        }
        (true, reason)
    }

    fn recommended_count(&self, signals: &ScalingSignals) -> u32 {
        match self.policy.recommend(signals) {
            Recommendation::ScaleUp { count, .. } | Recommendation::ScaleDown { count, .. } => {
                count
            }
            Recommendation::Hold { .. } => 0,
        }
    }

    // ── Actions ───────────────────────────────────────────────────

    /// Launch up to `count` agents from the template, bounded by the step
    /// size and `max_agents`.
    pub async fn scale_up(
        &mut self,
        count: u32,
        reason: &str,
    ) -> CoordinatorResult<Option<ScalingDecisionRecord>> {
        let signals = self.observe().await;
        let room = self.pool.max_agents.saturating_sub(signals.pool_size);
        let n = count.min(self.config.step).min(room);
        if n == 0 {
            debug!(count, room, "scale-up has no room");
            return Ok(None);
        }
        self.launch(n, signals, reason).await
    }

    /// Launch template agents until the pool reaches `min_agents`,
    /// regardless of step size and sustain windows. Waits out the
    /// scale-up cooldown like any other scale-up.
    pub async fn ensure_minimum(&mut self) -> CoordinatorResult<Option<ScalingDecisionRecord>> {
        let signals = self.observe().await;
        let missing = self.pool.min_agents.saturating_sub(signals.pool_size);
        if missing == 0 {
            return Ok(None);
        }
        if let Some(left) = self.cooldown_remaining(self.last_scale_up, Instant::now()) {
            debug!(
                pool = signals.pool_size,
                min = self.pool.min_agents,
                left_secs = left.as_secs(),
                "pool below minimum, waiting for scale-up cooldown"
            );
            return Ok(None);
        }
        let reason = format!(
            "pool below minimum ({}/{})",
            signals.pool_size, self.pool.min_agents
        );
        self.launch(missing, signals, &reason).await
    }

    async fn launch(
        &mut self,
        n: u32,
        signals: ScalingSignals,
        reason: &str,
    ) -> CoordinatorResult<Option<ScalingDecisionRecord>> {
        self.phase = ScalingPhase::ScalingUp;

        let mut added: Vec<AgentId> = Vec::new();
        let mut first_error = None;
        while (added.len() as u32) < n {
            self.launched += 1;
            let id = format!("{}-{}", self.config.agent_template.id_prefix, self.launched);
            match self
                .coordinator
                .launch_agent(self.config.agent_template.to_spec(id))
                .await
            {
                Ok(agent_id) => added.push(agent_id),
                Err(CoordinatorError::DuplicateAgent(taken)) => {
                    debug!(agent = %taken, "template id taken, trying next");
                }
                Err(e) => {
                    warn!(error = %e, "scale-up launch failed");
                    first_error = Some(e);
                    break;
                }
            }
        }

        if added.is_empty() {
            self.phase = ScalingPhase::NoAction;
            return match first_error {
                Some(e) => Err(e),
                None => Ok(None),
            };
        }

        let now = Instant::now();
        self.last_scale_up = Some(now);
        self.up_since = None;
        let pool_after = signals.pool_size + added.len() as u32;
        let record = self.record(ScalingDirection::Up, signals, reason, added, pool_after, 0);
        info!(
            magnitude = record.magnitude,
            pool_before = record.pool_before,
            pool_after = record.pool_after,
            reason,
            "scaled up"
        );
        self.history.push(record.clone()).await;
        self.phase = ScalingPhase::Cooldown;
        Ok(Some(record))
    }

    /// Remove up to `count` agents, bounded by the step size and
    /// `min_agents`.
    ///
    /// Idle agents are terminated straight away. If none are idle the
    /// removal is deferred; once `scale_down_max_wait` has passed the
    /// least-loaded agents are drained and terminated when their work is
    /// done.
    pub async fn scale_down(
        &mut self,
        count: u32,
        reason: &str,
    ) -> CoordinatorResult<Option<ScalingDecisionRecord>> {
        let signals = self.observe().await;
        let removable = signals.active_pool().saturating_sub(self.pool.min_agents);
        let n = count.min(self.config.step).min(removable);
        if n == 0 {
            debug!(count, removable, "scale-down has nothing removable");
            return Ok(None);
        }
        self.phase = ScalingPhase::ScalingDown;

        let mut affected: Vec<AgentId> = Vec::new();
        let mut removed = 0u32;
        for agent_id in self.coordinator.idle_agents().await.into_iter().take(n as usize) {
            match self.coordinator.terminate_agent(&agent_id).await {
                Ok(_) => {
                    removed += 1;
                    affected.push(agent_id);
                }
                Err(e) => warn!(agent = %agent_id, error = %e, "scale-down removal failed"),
            }
        }

        let now = Instant::now();
        let mut deferred = n - removed;
        if deferred > 0 {
            let since = *self.deferred_since.get_or_insert(now);
            let waited = now.saturating_duration_since(since);
            if waited < self.config.scale_down_max_wait.as_duration() {
                info!(
                    deferred,
                    waited_secs = waited.as_secs(),
                    "scale-down deferred: no idle agent"
                );
                if removed == 0 {
                    self.phase = ScalingPhase::NoAction;
                    return Ok(None);
                }
            } else {
                for _ in 0..deferred {
                    let Some(agent_id) = self.coordinator.least_loaded_agent().await else {
                        break;
                    };
                    let active = self.coordinator.drain_agent(&agent_id).await?;
                    info!(agent = %agent_id, active, "agent drained for scale-down");
                    affected.push(agent_id);
                }
                self.deferred_since = None;
                deferred = 0;
            }
        } else {
            self.deferred_since = None;
        }

        self.last_scale_down = Some(now);
        self.down_since = None;
        let pool_after = signals.pool_size - removed;
        let record = self.record(
            ScalingDirection::Down,
            signals,
            reason,
            affected,
            pool_after,
            deferred,
        );
        info!(
            magnitude = record.magnitude,
            deferred = record.deferred,
            pool_before = record.pool_before,
            pool_after = record.pool_after,
            reason,
            "scaled down"
        );
        self.history.push(record.clone()).await;
        self.phase = ScalingPhase::Cooldown;
        Ok(Some(record))
    }

    fn record(
        &self,
        direction: ScalingDirection,
        signals: ScalingSignals,
        reason: &str,
        agents: Vec<AgentId>,
        pool_after: u32,
        deferred: u32,
    ) -> ScalingDecisionRecord {
        let now = epoch_secs();
        ScalingDecisionRecord {
            timestamp: now,
            direction,
            // Drained agents count here but stay in the pool until idle.
            magnitude: agents.len() as u32,
            signals,
            reason: reason.to_string(),
            policy: self.policy.name().to_string(),
            cooldown_until: now.saturating_add(self.cooldown().as_secs()),
            pool_before: signals.pool_size,
            pool_after,
            deferred,
            agents,
        }
    }

    /// Terminate draining agents that have finished their work.
    pub async fn reap_drained(&self) -> Vec<AgentId> {
        let mut reaped = Vec::new();
        for agent_id in self.coordinator.drained_agents().await {
            match self.coordinator.terminate_agent(&agent_id).await {
                Ok(_) => {
                    info!(agent = %agent_id, "drained agent removed");
                    reaped.push(agent_id);
                }
                Err(e) => warn!(agent = %agent_id, error = %e, "drained agent removal failed"),
            }
        }
        reaped
    }

    /// Run one full cycle.
    pub async fn evaluate(&mut self) -> CoordinatorResult<Option<ScalingDecisionRecord>> {
        self.phase = ScalingPhase::Evaluating;
        self.last_evaluation = Some(Instant::now());
        self.reap_drained().await;

        if let Some(record) = self.ensure_minimum().await? {
            return Ok(Some(record));
        }

        let signals = self.observe().await;
        let (up, up_reason) = self.should_scale_up(&signals);
        let outcome = if up {
            let count = self.recommended_count(&signals);
            self.scale_up(count, &up_reason).await?
        } else {
            let (down, down_reason) = self.should_scale_down(&signals);
            if down {
                let count = self.recommended_count(&signals);
                self.scale_down(count, &down_reason).await?
            } else {
                debug!(
                    utilization = signals.utilization,
                    pool = signals.pool_size,
                    up = %up_reason,
                    down = %down_reason,
                    "no scaling action"
                );
                None
            }
        };

        let now = Instant::now();
        let cooling = self.cooldown_remaining(self.last_scale_up, now).is_some()
            || self.cooldown_remaining(self.last_scale_down, now).is_some();
        self.phase = match (&outcome, cooling) {
            (Some(_), _) | (None, true) => ScalingPhase::Cooldown,
            (None, false) => ScalingPhase::Idle,
        };
        Ok(outcome)
    }

    /// Evaluate every `interval`, and early when the coordinator signals a
    /// load change, until shutdown.
    pub async fn run(&mut self, interval: Duration, mut shutdown: watch::Receiver<bool>) {
        info!(
            interval_secs = interval.as_secs(),
            policy = self.policy.name(),
            "scaling controller started"
        );
        let load_changed = self.coordinator.load_changed();

        loop {
            tokio::select! {
                _ = tokio::time::sleep(interval) => {}
                _ = load_changed.notified() => {
                    let recent = self
                        .last_evaluation
                        .is_some_and(|t| t.elapsed() < MIN_EARLY_WAKE);
                    if recent {
                        continue;
                    }
                    debug!("load change, evaluating early");
                }
                _ = shutdown.changed() => {
                    info!("scaling controller shutting down");
                    break;
                }
            }
            if let Err(e) = self.evaluate().await {
                error!(error = %e, "scaling evaluation failed");
            }
        }
    }
}

fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .unwrap_or_default()
        .as_secs()
}

#[cfg(test)]
mod tests {
    use super::*;
    use swarm_core::{HumanDuration, ResourceVector, SwarmConfig};

    fn controller(configure: impl FnOnce(&mut SwarmConfig)) -> ScalingController {
        let mut config = SwarmConfig::scaffold(ResourceVector::cores(100));
        configure(&mut config);
        let coordinator = Arc::new(Coordinator::standalone(config).unwrap());
        ScalingController::new(coordinator)
    }

    fn signals(utilization: f64, pool_size: u32) -> ScalingSignals {
        ScalingSignals {
            utilization,
            mean_utilization: utilization,
            pool_size,
            draining: 0,
            idle_agents: 0,
            pending_tasks: 0,
            in_flight_tasks: 0,
            min_agents: 2,
            max_agents: 10,
        }
    }

    #[tokio::test(start_paused = true)]
    async fn scale_up_waits_for_sustain_window() {
        let mut ctl = controller(|c| {
            c.scaling.scale_up_sustain = HumanDuration::from_secs(30);
        });
        let high = signals(0.9, 4);

        let (up, reason) = ctl.should_scale_up(&high);
        assert!(!up);
        assert!(reason.contains("for 0s of 30s"), "{reason}");

        tokio::time::advance(Duration::from_secs(20)).await;
        assert!(!ctl.should_scale_up(&high).0);

        tokio::time::advance(Duration::from_secs(10)).await;
        let (up, reason) = ctl.should_scale_up(&high);
        assert!(up);
        assert_eq!(reason, "utilization 0.90 above 0.80");
    }

    #[tokio::test(start_paused = true)]
    async fn dip_resets_sustain_window() {
        let mut ctl = controller(|c| {
            c.scaling.scale_up_sustain = HumanDuration::from_secs(30);
        });
        ctl.should_scale_up(&signals(0.9, 4));
        tokio::time::advance(Duration::from_secs(25)).await;
        ctl.should_scale_up(&signals(0.5, 4));
        tokio::time::advance(Duration::from_secs(10)).await;

        assert!(!ctl.should_scale_up(&signals(0.9, 4)).0);
    }

    #[tokio::test(start_paused = true)]
    async fn bounds_block_both_directions() {
        let mut ctl = controller(|c| {
            c.pool.min_agents = 2;
            c.scaling.scale_down_sustain = HumanDuration::from_secs(0);
        });

        let (up, reason) = ctl.should_scale_up(&signals(0.95, 10));
        assert!(!up);
        assert!(reason.contains("maximum"), "{reason}");

        let (down, reason) = ctl.should_scale_down(&signals(0.1, 2));
        assert!(!down);
        assert!(reason.contains("minimum"), "{reason}");
    }

    #[tokio::test(start_paused = true)]
    async fn cooldown_is_per_direction() {
        let mut ctl = controller(|c| {
            c.scaling.scale_down_sustain = HumanDuration::from_secs(0);
        });
        ctl.last_scale_up = Some(Instant::now());

        let (up, reason) = ctl.should_scale_up(&signals(0.9, 4));
        assert!(!up);
        assert!(reason.starts_with("scale-up cooldown"), "{reason}");

        assert!(ctl.should_scale_down(&signals(0.1, 4)).0);

        tokio::time::advance(Duration::from_secs(60)).await;
        assert!(ctl.should_scale_up(&signals(0.9, 4)).0);
    }

    #[tokio::test]
    async fn hold_inside_band() {
        let mut ctl = controller(|_| {});
        let (up, reason) = ctl.should_scale_up(&signals(0.5, 4));
        assert!(!up);
        assert!(reason.contains("within"), "{reason}");
        assert!(!ctl.should_scale_down(&signals(0.5, 4)).0);
        assert_eq!(ctl.phase(), ScalingPhase::Idle);
    }
}
