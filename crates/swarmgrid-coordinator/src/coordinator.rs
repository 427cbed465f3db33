//! Coordinator: agent registry, task distribution, and fault recovery.
//!
//! # Locking
//!
//! One `RwLock` guards the registry (agents, tasks, pending queue and
//! balancer state). Every operation that touches capacity takes the
//! registry write lock first and then calls into the ledger, which has
//! its own lock, so the order is always registry → ledger. Driver calls
//! happen after the registry lock is dropped.
//!
//! When an operation both releases capacity and edits the registry, the
//! ledger call comes first and everything after it is synchronous. A
//! caller that drops the future before the release returns leaves both
//! sides untouched.

use std::collections::{HashMap, VecDeque};
use std::sync::Arc;
use std::time::{Duration, SystemTime, UNIX_EPOCH};

use serde::{Deserialize, Serialize};
use tokio::sync::{Notify, RwLock};
use tokio::time::Instant;
use tracing::{debug, error, info, warn};

use swarm_core::{
    AgentId, AgentSpec, AgentStatus, HeartbeatStatus, LoadBalancingStrategy, Priority, SwarmConfig,
    TaskId, TaskOutcome, TaskSpec, TaskStatus, WeightSource,
};
use swarmgrid_ledger::{
    AllocationId, Holder, LedgerStats, Reallocation, ResourceLedger, UsageSnapshot,
};

use crate::agent::{AgentRecord, AgentView};
use crate::balancer::{performance_weight, Candidate, LoadBalancer};
use crate::counters::{CounterSnapshot, CoordinatorCounters};
use crate::driver::{AgentDriver, NullDriver};
use crate::error::{CoordinatorError, CoordinatorResult, Ineligibility, RejectionReason};
use crate::health::HealthVerdict;
use crate::task::{
    Assignment, AttemptOutcome, AttemptRecord, PendingQueue, QueueKey, TaskRecord, TaskView,
};

pub(crate) fn epoch_secs() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_secs())
        .unwrap_or(0)
}

// ── Reports ───────────────────────────────────────────────────────

/// What removing an agent did to its in-flight work.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RecoveryReport {
    pub agent_id: AgentId,
    /// Tasks put back in the pending queue. They may have been reassigned
    /// by the time the report is returned.
    pub requeued: Vec<TaskId>,
    /// Tasks that exhausted their retries and are now terminal.
    pub exhausted: Vec<TaskId>,
    /// Allocations released, baseline included.
    pub released: Vec<AllocationId>,
}

/// Result of one monitoring sweep.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SweepReport {
    /// Agents failed for missing heartbeats.
    pub failed_agents: Vec<AgentId>,
    /// Tasks whose attempt deadline elapsed.
    pub timed_out: Vec<TaskId>,
    /// Pending tasks assigned during the sweep.
    pub dispatched: usize,
}

/// Task counts by status.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct TaskSummary {
    pub pending: usize,
    pub assigned: usize,
    pub running: usize,
    pub completed: usize,
    pub failed: usize,
    pub timed_out: usize,
}

impl TaskSummary {
    pub fn in_flight(&self) -> usize {
        self.assigned + self.running
    }
}

/// Consistent point-in-time view of the coordinator and its ledger.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CoordinatorSnapshot {
    /// Unix seconds.
    pub taken_at: u64,
    pub usage: UsageSnapshot,
    pub ledger: LedgerStats,
    pub pool_size: usize,
    pub agents: Vec<AgentView>,
    pub retired: Vec<AgentView>,
    pub tasks: TaskSummary,
    pub counters: CounterSnapshot,
}

impl CoordinatorSnapshot {
    /// Aggregate utilization (bottleneck dimension).
    pub fn utilization(&self) -> f64 {
        self.usage.utilization()
    }

    pub fn draining(&self) -> usize {
        self.agents.iter().filter(|a| a.draining).count()
    }
}

// ── Registry ──────────────────────────────────────────────────────

#[derive(Default)]
struct Registry {
    /// Live agents only.
    agents: HashMap<AgentId, AgentRecord>,
    /// Agents removed by the failure path, oldest first.
    retired: VecDeque<AgentRecord>,
    tasks: HashMap<TaskId, TaskRecord>,
    pending: PendingQueue,
    balancer: LoadBalancer,
    /// Registration and submission order.
    seq: u64,
    generated_agents: u64,
    generated_tasks: u64,
}

impl Registry {
    fn next_seq(&mut self) -> u64 {
        self.seq += 1;
        self.seq
    }

    fn generate_agent_id(&mut self) -> AgentId {
        loop {
            self.generated_agents += 1;
            let id = format!("agent-{}", self.generated_agents);
            if !self.agents.contains_key(&id) && !self.is_retired(&id) {
                return id;
            }
        }
    }

    fn generate_task_id(&mut self) -> TaskId {
        loop {
            self.generated_tasks += 1;
            let id = format!("task-{}", self.generated_tasks);
            if !self.tasks.contains_key(&id) {
                return id;
            }
        }
    }

    fn is_retired(&self, agent_id: &str) -> bool {
        self.retired.iter().any(|a| a.id == agent_id)
    }

    fn retire(&mut self, record: AgentRecord, limit: usize) {
        self.retired.retain(|a| a.id != record.id);
        self.retired.push_back(record);
        while self.retired.len() > limit.max(1) {
            self.retired.pop_front();
        }
    }

    /// Pick an agent for a task, or say why none qualifies.
    fn select_agent(
        &mut self,
        capability: &str,
        priority: Priority,
        config: &SwarmConfig,
    ) -> Result<AgentId, Ineligibility> {
        let Registry {
            agents, balancer, ..
        } = self;

        let mut capable = agents
            .values()
            .filter(|a| a.capabilities.contains(capability))
            .peekable();
        if capable.peek().is_none() {
            return Err(Ineligibility::NoCapableAgent);
        }
        let healthy: Vec<&AgentRecord> = capable.filter(|a| a.accepts_work()).collect();
        if healthy.is_empty() {
            return Err(Ineligibility::NoHealthyAgent);
        }

        let limit = slot_limit(priority, config);
        let candidates: Vec<Candidate<'_>> = healthy
            .into_iter()
            .filter(|a| a.active_tasks.len() < limit)
            .map(|a| Candidate {
                id: &a.id,
                active: a.active_tasks.len(),
                last_heartbeat: a.last_heartbeat,
                registered_seq: a.registered_seq,
                capability_count: a.capabilities.len(),
                weight: match config.balancing.weight_source {
                    WeightSource::Static => a.weight.max(1) as u64,
                    WeightSource::Performance => {
                        performance_weight(a.weight, a.completed, a.failed)
                    }
                },
            })
            .collect();

        balancer
            .select(&candidates)
            .ok_or(Ineligibility::AllSaturated)
    }

    /// Close the current attempt of an in-flight task.
    ///
    /// The caller must already have released the attempt's allocation.
    /// Failures re-queue the task until the retry limit is reached.
    fn finish_attempt(
        &mut self,
        task_id: &str,
        outcome: AttemptOutcome,
        retry_limit: u32,
        counters: &CoordinatorCounters,
    ) -> Option<TaskStatus> {
        let task = self.tasks.get_mut(task_id)?;
        let agent_id = task.agent.take();
        task.allocation = None;
        task.deadline = None;
        task.history.push(AttemptRecord {
            attempt: task.attempt,
            agent_id: agent_id.clone().unwrap_or_default(),
            outcome: outcome.clone(),
            finished_at: epoch_secs(),
        });

        let status = if outcome.is_failure() {
            task.failures += 1;
            if task.failures >= retry_limit {
                match outcome {
                    AttemptOutcome::TimedOut => {
                        CoordinatorCounters::bump(&counters.tasks_timed_out);
                        TaskStatus::TimedOut
                    }
                    _ => {
                        CoordinatorCounters::bump(&counters.tasks_failed);
                        TaskStatus::Failed
                    }
                }
            } else {
                CoordinatorCounters::bump(&counters.tasks_requeued);
                TaskStatus::Pending
            }
        } else {
            CoordinatorCounters::bump(&counters.tasks_completed);
            TaskStatus::Completed
        };
        task.status = status;

        if status == TaskStatus::Pending {
            let key = task.queue_key();
            self.pending.push(key);
        }
        if let Some(agent_id) = agent_id
            && let Some(agent) = self.agents.get_mut(&agent_id)
        {
            agent.active_tasks.remove(task_id);
            if outcome.is_failure() {
                agent.failed += 1;
            } else {
                agent.completed += 1;
            }
        }
        Some(status)
    }
}

/// Per-agent slot limit for a task of the given priority.
fn slot_limit(priority: Priority, config: &SwarmConfig) -> usize {
    let limit = config.pool.per_agent_concurrency as usize;
    if config.balancing.strategy == LoadBalancingStrategy::PriorityWeighted
        && priority < config.balancing.priority_overflow_threshold
    {
        limit.saturating_sub(config.balancing.priority_reserved_slots as usize)
    } else {
        limit
    }
}

// ── Coordinator ───────────────────────────────────────────────────

/// Owns the live agent set and the task-assignment policy.
pub struct Coordinator {
    config: Arc<SwarmConfig>,
    ledger: Arc<ResourceLedger>,
    registry: RwLock<Registry>,
    driver: Arc<dyn AgentDriver>,
    counters: CoordinatorCounters,
    load_changed: Arc<Notify>,
}

impl Coordinator {
    /// Create a coordinator over an existing ledger.
    pub fn new(
        config: SwarmConfig,
        ledger: Arc<ResourceLedger>,
        driver: Arc<dyn AgentDriver>,
    ) -> CoordinatorResult<Self> {
        config.validate()?;
        let registry = Registry {
            balancer: LoadBalancer::new(config.balancing.strategy),
            ..Registry::default()
        };
        info!(
            strategy = %config.balancing.strategy,
            max_agents = config.pool.max_agents,
            concurrency = config.pool.per_agent_concurrency,
            "coordinator created"
        );
        Ok(Self {
            config: Arc::new(config),
            ledger,
            registry: RwLock::new(registry),
            driver,
            counters: CoordinatorCounters::default(),
            load_changed: Arc::new(Notify::new()),
        })
    }

    /// Coordinator with its own ledger sized from the config and a
    /// [`NullDriver`].
    pub fn standalone(config: SwarmConfig) -> CoordinatorResult<Self> {
        let ledger = Arc::new(ResourceLedger::new(config.capacity));
        Self::new(config, ledger, Arc::new(NullDriver))
    }

    pub fn config(&self) -> &SwarmConfig {
        &self.config
    }

    pub fn ledger(&self) -> &Arc<ResourceLedger> {
        &self.ledger
    }

    /// Notified whenever load shifts enough to be worth a scaling look:
    /// rejected submissions, agent loss, and completed work.
    pub fn load_changed(&self) -> Arc<Notify> {
        self.load_changed.clone()
    }

    fn signal_load_change(&self) {
        self.load_changed.notify_one();
    }

    fn violation(&self, detail: String) -> CoordinatorError {
        error!(%detail, "invariant violation");
        CoordinatorCounters::bump(&self.counters.invariant_violations);
        CoordinatorError::InvariantViolation(detail)
    }

    // ── Agents ────────────────────────────────────────────────────

    /// Admit an agent and reserve its baseline footprint.
    ///
    /// The agent starts `Registered` and only receives work after its
    /// first healthy heartbeat.
    pub async fn register_agent(&self, spec: AgentSpec) -> CoordinatorResult<AgentId> {
        let mut reg = self.registry.write().await;

        let agent_id = match &spec.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => reg.generate_agent_id(),
        };
        if reg.agents.contains_key(&agent_id) {
            return Err(CoordinatorError::DuplicateAgent(agent_id));
        }
        let max = self.config.pool.max_agents;
        if reg.agents.len() >= max as usize {
            warn!(agent = %agent_id, max, "registration rejected: pool full");
            return Err(CoordinatorError::PoolFull { max });
        }

        let allocation = self
            .ledger
            .allocate(Holder::agent(&agent_id), spec.requirements)
            .await
            .map_err(|e| {
                warn!(agent = %agent_id, error = %e, "registration rejected");
                CoordinatorError::InsufficientCapacity {
                    id: agent_id.clone(),
                    constrained: e.constrained().to_vec(),
                }
            })?;

        let seq = reg.next_seq();
        let record = AgentRecord::new(
            agent_id.clone(),
            spec,
            allocation,
            seq,
            epoch_secs(),
            self.config.health.failure_threshold,
        );
        info!(
            agent = %agent_id,
            capabilities = ?record.capabilities,
            %allocation,
            "agent registered"
        );
        reg.retired.retain(|a| a.id != agent_id);
        reg.agents.insert(agent_id.clone(), record);
        CoordinatorCounters::bump(&self.counters.agents_registered);
        Ok(agent_id)
    }

    /// Remove an agent, re-queueing its in-flight tasks and releasing
    /// everything it held.
    pub async fn deregister_agent(&self, agent_id: &str) -> CoordinatorResult<RecoveryReport> {
        let mut reg = self.registry.write().await;
        let report = self
            .remove_agent_locked(&mut reg, agent_id, AgentStatus::Deregistered, "agent deregistered")
            .await?;
        CoordinatorCounters::bump(&self.counters.agents_deregistered);
        info!(
            agent = agent_id,
            requeued = report.requeued.len(),
            exhausted = report.exhausted.len(),
            "agent deregistered"
        );

        let assignments = self.dispatch_locked(&mut reg).await;
        drop(reg);
        self.deliver(assignments).await;
        self.signal_load_change();
        Ok(report)
    }

    /// Fault path. Returns `None` if the failure was already handled.
    pub async fn handle_agent_failure(
        &self,
        agent_id: &str,
        reason: &str,
    ) -> CoordinatorResult<Option<RecoveryReport>> {
        let mut reg = self.registry.write().await;
        if !reg.agents.contains_key(agent_id) {
            if reg.is_retired(agent_id) {
                debug!(agent = agent_id, "agent failure already handled");
                return Ok(None);
            }
            return Err(CoordinatorError::AgentNotFound(agent_id.to_string()));
        }

        let report = self.fail_agent_locked(&mut reg, agent_id, reason).await?;
        let assignments = self.dispatch_locked(&mut reg).await;
        drop(reg);
        self.stop_failed(&[agent_id]).await;
        self.deliver(assignments).await;
        self.signal_load_change();
        Ok(Some(report))
    }

    /// Apply a heartbeat and return the agent's resulting status.
    pub async fn report_heartbeat(
        &self,
        agent_id: &str,
        status: HeartbeatStatus,
    ) -> CoordinatorResult<AgentStatus> {
        let mut reg = self.registry.write().await;

        let Some(agent) = reg.agents.get_mut(agent_id) else {
            if reg.is_retired(agent_id) {
                CoordinatorCounters::bump(&self.counters.stale_heartbeats);
                warn!(agent = agent_id, "heartbeat from failed agent ignored");
            }
            return Err(CoordinatorError::AgentNotFound(agent_id.to_string()));
        };

        CoordinatorCounters::bump(&self.counters.heartbeats);
        agent.last_heartbeat = Instant::now();
        let previous = agent.status;
        let verdict = agent.health.record(status);

        if verdict == HealthVerdict::Failed {
            let reason = format!(
                "{} consecutive unhealthy heartbeats",
                agent.health.consecutive_failures()
            );
            self.fail_agent_locked(&mut reg, agent_id, &reason).await?;
            let assignments = self.dispatch_locked(&mut reg).await;
            drop(reg);
            self.stop_failed(&[agent_id]).await;
            self.deliver(assignments).await;
            self.signal_load_change();
            return Ok(AgentStatus::Unreachable);
        }

        let next = match verdict {
            HealthVerdict::Healthy => AgentStatus::Healthy,
            HealthVerdict::Degraded => AgentStatus::Degraded,
            HealthVerdict::Unknown | HealthVerdict::Failed => previous,
        };
        agent.status = next;
        if next != previous {
            info!(agent = agent_id, from = %previous, to = %next, "agent status changed");
        }

        let assignments = if next == AgentStatus::Healthy && previous != AgentStatus::Healthy {
            self.dispatch_locked(&mut reg).await
        } else {
            Vec::new()
        };
        drop(reg);
        self.deliver(assignments).await;
        Ok(next)
    }

    /// Stop sending new work to an agent. Returns its in-flight task count.
    pub async fn drain_agent(&self, agent_id: &str) -> CoordinatorResult<usize> {
        let mut reg = self.registry.write().await;
        let agent = reg
            .agents
            .get_mut(agent_id)
            .ok_or_else(|| CoordinatorError::AgentNotFound(agent_id.to_string()))?;
        if !agent.draining {
            agent.draining = true;
            info!(agent = agent_id, active = agent.active_tasks.len(), "agent draining");
        }
        Ok(agent.active_tasks.len())
    }

    /// Register an agent and start it through the driver. A failed start
    /// rolls the registration back.
    pub async fn launch_agent(&self, spec: AgentSpec) -> CoordinatorResult<AgentId> {
        let agent_id = self.register_agent(spec).await?;
        let spec = {
            let reg = self.registry.read().await;
            reg.agents.get(&agent_id).map(AgentRecord::spec)
        };
        let Some(spec) = spec else {
            return Err(CoordinatorError::AgentNotFound(agent_id));
        };

        if let Err(e) = self.driver.start(&spec).await {
            CoordinatorCounters::bump(&self.counters.driver_errors);
            warn!(agent = %agent_id, error = %e, "agent start failed, rolling back");
            if let Err(rollback) = self.deregister_agent(&agent_id).await {
                warn!(agent = %agent_id, error = %rollback, "rollback failed");
            }
            return Err(CoordinatorError::Driver(format!("start {agent_id}: {e}")));
        }
        info!(agent = %agent_id, "agent launched");
        Ok(agent_id)
    }

    /// Deregister an agent and stop it through the driver.
    pub async fn terminate_agent(&self, agent_id: &str) -> CoordinatorResult<RecoveryReport> {
        let report = self.deregister_agent(agent_id).await?;
        self.stop_agent(agent_id).await;
        Ok(report)
    }

    async fn stop_agent(&self, agent_id: &str) {
        if let Err(e) = self.driver.stop(agent_id).await {
            CoordinatorCounters::bump(&self.counters.driver_errors);
            warn!(agent = agent_id, error = %e, "agent stop failed");
        }
    }

    /// Stop the processes behind agents the failure path removed. Called
    /// with the registry lock released.
    async fn stop_failed<S: AsRef<str>>(&self, agents: &[S]) {
        for agent_id in agents {
            self.stop_agent(agent_id.as_ref()).await;
        }
    }

    async fn fail_agent_locked(
        &self,
        reg: &mut Registry,
        agent_id: &str,
        reason: &str,
    ) -> CoordinatorResult<RecoveryReport> {
        let report = self
            .remove_agent_locked(reg, agent_id, AgentStatus::Unreachable, reason)
            .await?;
        CoordinatorCounters::bump(&self.counters.agent_failures);
        warn!(
            agent = agent_id,
            reason,
            requeued = report.requeued.len(),
            exhausted = report.exhausted.len(),
            "agent failed"
        );
        Ok(report)
    }

    /// Release everything an agent holds, then take it out of the live set.
    async fn remove_agent_locked(
        &self,
        reg: &mut Registry,
        agent_id: &str,
        final_status: AgentStatus,
        reason: &str,
    ) -> CoordinatorResult<RecoveryReport> {
        let Some(agent) = reg.agents.get(agent_id) else {
            return Err(CoordinatorError::AgentNotFound(agent_id.to_string()));
        };
        let in_flight: Vec<TaskId> = agent.active_tasks.iter().cloned().collect();
        let mut allocations: Vec<AllocationId> = agent.allocation.into_iter().collect();
        allocations.extend(
            in_flight
                .iter()
                .filter_map(|t| reg.tasks.get(t).and_then(|t| t.allocation)),
        );

        // Commit point.
        let released = self.ledger.release_many(&allocations).await;

        for (id, result) in &released {
            if !result.is_released() {
                let _ = self.violation(format!(
                    "allocation {id} held by agent {agent_id} was not live ({result:?})"
                ));
            }
        }

        let Some(mut record) = reg.agents.remove(agent_id) else {
            return Err(self.violation(format!("agent {agent_id} vanished under lock")));
        };
        reg.balancer.forget(agent_id);

        let mut report = RecoveryReport {
            agent_id: agent_id.to_string(),
            released: allocations,
            ..RecoveryReport::default()
        };
        let outcome = AttemptOutcome::AgentLost {
            reason: reason.to_string(),
        };
        for task_id in in_flight {
            match reg.finish_attempt(
                &task_id,
                outcome.clone(),
                self.config.tasks.retry_limit,
                &self.counters,
            ) {
                Some(TaskStatus::Pending) => report.requeued.push(task_id),
                Some(_) => report.exhausted.push(task_id),
                None => {
                    let _ = self.violation(format!("in-flight task {task_id} missing"));
                }
            }
        }
        record.failed += (report.requeued.len() + report.exhausted.len()) as u64;
        record.active_tasks.clear();
        record.allocation = None;
        record.status = final_status;

        if final_status == AgentStatus::Unreachable {
            reg.retire(record, self.config.health.retired_history);
        }
        Ok(report)
    }

    // ── Tasks ─────────────────────────────────────────────────────

    /// Submit a task and try to place it immediately.
    ///
    /// A task that cannot be placed stays `Pending` and is retried whenever
    /// slots or capacity free up; the error says why it was not placed now.
    pub async fn distribute_task(&self, spec: TaskSpec) -> CoordinatorResult<Assignment> {
        let mut reg = self.registry.write().await;

        let task_id = match &spec.id {
            Some(id) if !id.is_empty() => id.clone(),
            _ => reg.generate_task_id(),
        };
        if reg.tasks.contains_key(&task_id) {
            return Err(CoordinatorError::DuplicateTask(task_id));
        }

        let seq = reg.next_seq();
        let record = TaskRecord::new(task_id.clone(), spec, seq, epoch_secs());
        debug!(
            task = %task_id,
            capability = %record.capability,
            priority = record.priority,
            "task submitted"
        );
        reg.pending.push(record.queue_key());
        reg.tasks.insert(task_id.clone(), record);
        CoordinatorCounters::bump(&self.counters.tasks_submitted);

        let assignments = self.dispatch_locked(&mut reg).await;
        let placed = assignments.iter().find(|a| a.task_id == task_id).cloned();
        let rejection = match placed {
            Some(_) => None,
            None => reg.tasks.get(&task_id).and_then(|t| t.last_rejection.clone()),
        };
        drop(reg);
        self.deliver(assignments).await;

        if let Some(assignment) = placed {
            return Ok(assignment);
        }

        self.signal_load_change();
        let rejection = rejection.unwrap_or(RejectionReason::NoEligibleAgent {
            detail: Ineligibility::AllSaturated,
        });
        Err(match rejection {
            RejectionReason::NoEligibleAgent { detail } => {
                CoordinatorCounters::bump(&self.counters.rejections_no_eligible);
                info!(task = %task_id, reason = %detail, "task pending: no eligible agent");
                CoordinatorError::NoEligibleAgent {
                    task_id,
                    reason: detail,
                }
            }
            RejectionReason::InsufficientCapacity { constrained } => {
                CoordinatorCounters::bump(&self.counters.rejections_capacity);
                info!(
                    task = %task_id,
                    constrained = constrained.len(),
                    "task pending: insufficient capacity"
                );
                CoordinatorError::InsufficientCapacity {
                    id: task_id,
                    constrained,
                }
            }
        })
    }

    /// Acknowledge that an agent has started a task.
    ///
    /// `reporter`, when given, must be the agent the task is assigned to.
    pub async fn report_task_started(
        &self,
        task_id: &str,
        reporter: Option<&str>,
    ) -> CoordinatorResult<TaskStatus> {
        let mut reg = self.registry.write().await;
        let task = reg
            .tasks
            .get_mut(task_id)
            .ok_or_else(|| CoordinatorError::TaskNotFound(task_id.to_string()))?;

        let from_assignee = reporter.is_none_or(|r| task.agent.as_deref() == Some(r));
        match task.status {
            TaskStatus::Assigned if from_assignee => {
                task.status = TaskStatus::Running;
                debug!(task = task_id, agent = ?task.agent, "task running");
                Ok(TaskStatus::Running)
            }
            TaskStatus::Running if from_assignee => Ok(TaskStatus::Running),
            status => {
                CoordinatorCounters::bump(&self.counters.stale_reports);
                warn!(task = task_id, ?reporter, %status, "stale start report ignored");
                Err(CoordinatorError::TaskNotInFlight {
                    task_id: task_id.to_string(),
                    status,
                })
            }
        }
    }

    /// Record the outcome of a task's current attempt.
    ///
    /// Releases the attempt's allocation, applies the retry policy and
    /// dispatches pending work into the freed slot. Reports for tasks that
    /// are not in flight, or from an agent the task is not assigned to,
    /// are stale and rejected.
    pub async fn report_task_result(
        &self,
        task_id: &str,
        reporter: Option<&str>,
        outcome: TaskOutcome,
    ) -> CoordinatorResult<TaskStatus> {
        let mut reg = self.registry.write().await;
        let task = reg
            .tasks
            .get(task_id)
            .ok_or_else(|| CoordinatorError::TaskNotFound(task_id.to_string()))?;

        let from_assignee = reporter.is_none_or(|r| task.agent.as_deref() == Some(r));
        if !task.status.is_in_flight() || !from_assignee {
            CoordinatorCounters::bump(&self.counters.stale_reports);
            warn!(task = task_id, ?reporter, status = %task.status, "stale task result ignored");
            return Err(CoordinatorError::TaskNotInFlight {
                task_id: task_id.to_string(),
                status: task.status,
            });
        }

        match task.allocation {
            Some(allocation) => {
                let result = self.ledger.release(allocation).await;
                if !result.is_released() {
                    let _ = self.violation(format!(
                        "task {task_id} allocation {allocation} was not live ({result:?})"
                    ));
                }
            }
            None => {
                let _ = self.violation(format!("in-flight task {task_id} has no allocation"));
            }
        }

        let attempt = match outcome {
            TaskOutcome::Completed => AttemptOutcome::Completed,
            TaskOutcome::Failed { error } => AttemptOutcome::Failed { error },
        };
        let status = reg
            .finish_attempt(task_id, attempt, self.config.tasks.retry_limit, &self.counters)
            .ok_or_else(|| CoordinatorError::TaskNotFound(task_id.to_string()))?;
        info!(task = task_id, %status, "task result recorded");

        let assignments = self.dispatch_locked(&mut reg).await;
        drop(reg);
        self.deliver(assignments).await;
        self.signal_load_change();
        Ok(status)
    }

    /// Retry pending tasks in priority order. Returns how many were placed.
    pub async fn dispatch_pending(&self) -> usize {
        let mut reg = self.registry.write().await;
        let assignments = self.dispatch_locked(&mut reg).await;
        drop(reg);
        let placed = assignments.len();
        self.deliver(assignments).await;
        placed
    }

    /// One monitoring pass: fail agents whose heartbeats have lapsed and
    /// time out attempts past their deadline.
    pub async fn sweep(&self) -> SweepReport {
        let mut reg = self.registry.write().await;
        let now = Instant::now();
        let timeout = self.config.health.heartbeat_timeout.as_duration();
        let mut report = SweepReport::default();

        let mut lapsed: Vec<(u64, AgentId)> = reg
            .agents
            .values()
            .filter(|a| now.saturating_duration_since(a.last_heartbeat) > timeout)
            .map(|a| (a.registered_seq, a.id.clone()))
            .collect();
        lapsed.sort();
        for (_, agent_id) in lapsed {
            match self
                .fail_agent_locked(&mut reg, &agent_id, "heartbeat timeout")
                .await
            {
                Ok(_) => report.failed_agents.push(agent_id),
                Err(e) => warn!(agent = %agent_id, error = %e, "failure handling failed"),
            }
        }

        let mut expired: Vec<(u64, TaskId)> = reg
            .tasks
            .values()
            .filter(|t| t.status.is_in_flight() && t.deadline.is_some_and(|d| d <= now))
            .map(|t| (t.submitted_seq, t.id.clone()))
            .collect();
        expired.sort();
        for (_, task_id) in expired {
            if let Some(allocation) = reg.tasks.get(&task_id).and_then(|t| t.allocation) {
                let result = self.ledger.release(allocation).await;
                if !result.is_released() {
                    let _ = self.violation(format!(
                        "task {task_id} allocation {allocation} was not live ({result:?})"
                    ));
                }
            }
            if let Some(status) = reg.finish_attempt(
                &task_id,
                AttemptOutcome::TimedOut,
                self.config.tasks.retry_limit,
                &self.counters,
            ) {
                warn!(task = %task_id, %status, "task deadline elapsed");
                report.timed_out.push(task_id);
            }
        }

        let assignments = self.dispatch_locked(&mut reg).await;
        report.dispatched = assignments.len();
        drop(reg);
        self.stop_failed(&report.failed_agents).await;
        self.deliver(assignments).await;

        if !report.failed_agents.is_empty() || !report.timed_out.is_empty() {
            self.signal_load_change();
        }
        report
    }

    /// Place as many pending tasks as possible, highest priority first.
    async fn dispatch_locked(&self, reg: &mut Registry) -> Vec<Assignment> {
        let mut assignments = Vec::new();
        if reg.pending.is_empty() {
            return assignments;
        }

        for key in reg.pending.ordered_keys() {
            let task_id = key.2.clone();
            match self.try_assign(reg, &key).await {
                Ok(Some(assignment)) => assignments.push(assignment),
                Ok(None) => {}
                Err(reason) => {
                    if let Some(task) = reg.tasks.get_mut(&task_id) {
                        task.last_rejection = Some(reason);
                    }
                }
            }
        }
        assignments
    }

    async fn try_assign(
        &self,
        reg: &mut Registry,
        key: &QueueKey,
    ) -> Result<Option<Assignment>, RejectionReason> {
        let task_id = key.2.as_str();
        let (capability, priority, requirements) = match reg.tasks.get(task_id) {
            Some(t) if t.status == TaskStatus::Pending => {
                (t.capability.clone(), t.priority, t.requirements)
            }
            other => {
                let status = other.map(|t| t.status);
                let _ = self.violation(format!(
                    "pending queue held task {task_id} with status {status:?}"
                ));
                reg.pending.remove(key);
                return Ok(None);
            }
        };

        let agent_id = reg
            .select_agent(&capability, priority, &self.config)
            .map_err(|detail| RejectionReason::NoEligibleAgent { detail })?;

        let allocation = self
            .ledger
            .allocate(Holder::task(task_id, &agent_id), requirements)
            .await
            .map_err(|e| RejectionReason::InsufficientCapacity {
                constrained: e.constrained().to_vec(),
            })?;

        let Some(task) = reg.tasks.get_mut(task_id) else {
            let result = self.ledger.release(allocation).await;
            if !result.is_released() {
                let _ = self.violation(format!(
                    "fresh allocation {allocation} for task {task_id} was not live ({result:?})"
                ));
            }
            return Ok(None);
        };
        task.status = TaskStatus::Assigned;
        task.agent = Some(agent_id.clone());
        task.allocation = Some(allocation);
        task.attempt += 1;
        task.deadline = task
            .deadline_ms
            .map(|ms| Instant::now() + Duration::from_millis(ms));
        task.last_rejection = None;
        let assignment = Assignment {
            task_id: task.id.clone(),
            agent_id: agent_id.clone(),
            attempt: task.attempt,
            allocation,
            capability: task.capability.clone(),
            priority: task.priority,
            payload: task.payload.clone(),
        };

        reg.pending.remove(key);
        if let Some(agent) = reg.agents.get_mut(&agent_id) {
            agent.active_tasks.insert(task_id.to_string());
        }
        CoordinatorCounters::bump(&self.counters.tasks_assigned);
        info!(
            task = task_id,
            agent = %agent_id,
            attempt = assignment.attempt,
            %allocation,
            "task assigned"
        );
        Ok(Some(assignment))
    }

    /// Hand assignments to the driver. Failed deliveries count as failed
    /// attempts, which may free slots for further assignments.
    async fn deliver(&self, mut batch: Vec<Assignment>) {
        while !batch.is_empty() {
            let mut failed = Vec::new();
            for assignment in &batch {
                if let Err(e) = self.driver.deliver(assignment).await {
                    CoordinatorCounters::bump(&self.counters.delivery_failures);
                    warn!(
                        task = %assignment.task_id,
                        agent = %assignment.agent_id,
                        error = %e,
                        "assignment delivery failed"
                    );
                    failed.push((assignment, e.to_string()));
                }
            }
            if failed.is_empty() {
                break;
            }

            let mut reg = self.registry.write().await;
            for (assignment, error) in failed {
                let live = reg
                    .tasks
                    .get(&assignment.task_id)
                    .filter(|t| {
                        t.status.is_in_flight()
                            && t.attempt == assignment.attempt
                            && t.agent.as_deref() == Some(assignment.agent_id.as_str())
                    })
                    .and_then(|t| t.allocation);
                // Already finished by some other path.
                let Some(allocation) = live else { continue };

                let result = self.ledger.release(allocation).await;
                if !result.is_released() {
                    let _ = self.violation(format!(
                        "task {} allocation {allocation} was not live ({result:?})",
                        assignment.task_id
                    ));
                }
                reg.finish_attempt(
                    &assignment.task_id,
                    AttemptOutcome::Failed {
                        error: format!("delivery failed: {error}"),
                    },
                    self.config.tasks.retry_limit,
                    &self.counters,
                );
            }
            let next = self.dispatch_locked(&mut reg).await;
            drop(reg);
            batch = next;
        }
    }

    // ── Queries ───────────────────────────────────────────────────

    /// View of a live or retired agent.
    pub async fn agent(&self, agent_id: &str) -> Option<AgentView> {
        let reg = self.registry.read().await;
        let now = Instant::now();
        reg.agents
            .get(agent_id)
            .or_else(|| reg.retired.iter().find(|a| a.id == agent_id))
            .map(|a| a.view(now))
    }

    /// Live agents in registration order.
    pub async fn agents(&self) -> Vec<AgentView> {
        let reg = self.registry.read().await;
        live_views(&reg, Instant::now())
    }

    pub async fn task(&self, task_id: &str) -> Option<TaskView> {
        let reg = self.registry.read().await;
        reg.tasks.get(task_id).map(TaskRecord::view)
    }

    /// All known tasks in submission order.
    pub async fn tasks(&self) -> Vec<TaskView> {
        let reg = self.registry.read().await;
        let mut tasks: Vec<&TaskRecord> = reg.tasks.values().collect();
        tasks.sort_by_key(|t| t.submitted_seq);
        tasks.into_iter().map(TaskRecord::view).collect()
    }

    /// In-flight assignments of a live agent, for agents that pull work.
    pub async fn assignments_for(&self, agent_id: &str) -> CoordinatorResult<Vec<Assignment>> {
        let reg = self.registry.read().await;
        let agent = reg
            .agents
            .get(agent_id)
            .ok_or_else(|| CoordinatorError::AgentNotFound(agent_id.to_string()))?;
        Ok(agent
            .active_tasks
            .iter()
            .filter_map(|t| reg.tasks.get(t))
            .filter_map(TaskRecord::assignment)
            .collect())
    }

    pub async fn pool_size(&self) -> usize {
        self.registry.read().await.agents.len()
    }

    pub async fn pending_count(&self) -> usize {
        self.registry.read().await.pending.len()
    }

    /// Non-draining agents with nothing in flight, most recently
    /// registered first.
    pub async fn idle_agents(&self) -> Vec<AgentId> {
        self.idle_where(|a| !a.draining).await
    }

    /// Draining agents that have finished all their work.
    pub async fn drained_agents(&self) -> Vec<AgentId> {
        self.idle_where(|a| a.draining).await
    }

    async fn idle_where(&self, keep: impl Fn(&AgentRecord) -> bool) -> Vec<AgentId> {
        let reg = self.registry.read().await;
        let mut idle: Vec<&AgentRecord> = reg
            .agents
            .values()
            .filter(|a| a.active_tasks.is_empty() && keep(a))
            .collect();
        idle.sort_by_key(|a| std::cmp::Reverse(a.registered_seq));
        idle.into_iter().map(|a| a.id.clone()).collect()
    }

    /// The non-draining agent with the fewest tasks in flight, most
    /// recently registered on ties.
    pub async fn least_loaded_agent(&self) -> Option<AgentId> {
        let reg = self.registry.read().await;
        reg.agents
            .values()
            .filter(|a| !a.draining)
            .min_by_key(|a| (a.active_tasks.len(), std::cmp::Reverse(a.registered_seq)))
            .map(|a| a.id.clone())
    }

    pub fn counters(&self) -> CounterSnapshot {
        self.counters.snapshot()
    }

    /// Advisory rebalancing over the current allocations.
    pub async fn optimization_suggestions(&self) -> Vec<Reallocation> {
        let _reg = self.registry.read().await;
        self.ledger.optimize().await
    }

    /// Registry and ledger state read under the registry lock.
    pub async fn snapshot(&self) -> CoordinatorSnapshot {
        let reg = self.registry.read().await;
        let usage = self.ledger.current_usage().await;
        let ledger = self.ledger.stats().await;
        let now = Instant::now();

        let mut tasks = TaskSummary::default();
        for task in reg.tasks.values() {
            match task.status {
                TaskStatus::Pending => tasks.pending += 1,
                TaskStatus::Assigned => tasks.assigned += 1,
                TaskStatus::Running => tasks.running += 1,
                TaskStatus::Completed => tasks.completed += 1,
                TaskStatus::Failed => tasks.failed += 1,
                TaskStatus::TimedOut => tasks.timed_out += 1,
            }
        }

        CoordinatorSnapshot {
            taken_at: epoch_secs(),
            usage,
            ledger,
            pool_size: reg.agents.len(),
            agents: live_views(&reg, now),
            retired: reg.retired.iter().map(|a| a.view(now)).collect(),
            tasks,
            counters: self.counters.snapshot(),
        }
    }
}

fn live_views(reg: &Registry, now: Instant) -> Vec<AgentView> {
    let mut agents: Vec<&AgentRecord> = reg.agents.values().collect();
    agents.sort_by_key(|a| a.registered_seq);
    agents.into_iter().map(|a| a.view(now)).collect()
}
