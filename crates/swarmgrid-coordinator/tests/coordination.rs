//! End-to-end coordinator behavior: placement, recovery and retry.

use std::collections::{BTreeSet, HashSet};
use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc::UnboundedReceiver;
use tokio::task::JoinHandle;

use swarm_core::{
    AgentSpec, AgentStatus, HeartbeatStatus, LoadBalancingStrategy, ResourceDimension,
    ResourceVector, SwarmConfig, TaskOutcome, TaskSpec, TaskStatus,
};
use swarmgrid_coordinator::{
    Assignment, AttemptOutcome, ChannelDriver, Coordinator, CoordinatorError, CoordinatorResult,
    DriverEvent, Ineligibility, RejectionReason,
};
use swarmgrid_ledger::ResourceLedger;

fn config(capacity: ResourceVector) -> SwarmConfig {
    SwarmConfig::scaffold(capacity)
}

fn coordinator(config: SwarmConfig) -> Arc<Coordinator> {
    Arc::new(Coordinator::standalone(config).unwrap())
}

async fn healthy_agent(coord: &Coordinator, id: &str, capabilities: &[&str]) {
    coord
        .register_agent(AgentSpec::new(id, capabilities.iter().copied()))
        .await
        .unwrap();
    coord
        .report_heartbeat(id, HeartbeatStatus::Healthy)
        .await
        .unwrap();
}

fn task(id: &str, capability: &str) -> TaskSpec {
    TaskSpec::new(id, capability)
}

// ── Placement ─────────────────────────────────────────────────────

#[tokio::test]
async fn fourth_task_waits_when_capacity_is_exhausted() {
    let coord = coordinator(config(ResourceVector::cores(6)));
    for id in ["a", "b", "c"] {
        healthy_agent(&coord, id, &["compute"]).await;
    }

    let mut placed = BTreeSet::new();
    for n in 1..=3 {
        let spec = task(&format!("t{n}"), "compute").with_requirements(ResourceVector::cores(2));
        let assignment = coord.distribute_task(spec).await.unwrap();
        placed.insert(assignment.agent_id);
    }
    assert_eq!(placed, BTreeSet::from(["a".into(), "b".into(), "c".into()]));

    let err = coord
        .distribute_task(task("t4", "compute").with_requirements(ResourceVector::cores(2)))
        .await
        .unwrap_err();
    match err {
        CoordinatorError::InsufficientCapacity { id, constrained } => {
            assert_eq!(id, "t4");
            assert_eq!(constrained.len(), 1);
            assert_eq!(constrained[0].dimension, ResourceDimension::Cpu);
            assert_eq!(constrained[0].requested, 2000);
            assert_eq!(constrained[0].free, 0);
        }
        other => panic!("unexpected error: {other}"),
    }

    let view = coord.task("t4").await.unwrap();
    assert_eq!(view.status, TaskStatus::Pending);
    assert!(view.allocation.is_none());
    assert!(matches!(
        view.last_rejection,
        Some(RejectionReason::InsufficientCapacity { .. })
    ));
    assert_eq!(coord.pending_count().await, 1);
    assert_eq!(coord.counters().rejections_capacity, 1);
}

#[tokio::test]
async fn unknown_capability_is_rejected_without_touching_the_ledger() {
    let coord = coordinator(config(ResourceVector::cores(4)));
    healthy_agent(&coord, "a", &["cpu"]).await;

    let err = coord.distribute_task(task("t1", "gpu")).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::NoEligibleAgent {
            reason: Ineligibility::NoCapableAgent,
            ..
        }
    ));
    assert_eq!(coord.task("t1").await.unwrap().status, TaskStatus::Pending);

    let stats = coord.ledger().stats().await;
    assert_eq!(stats.granted, 1, "only the agent baseline");
    assert_eq!(stats.denied, 0);
}

#[tokio::test]
async fn registered_agent_gets_work_after_first_healthy_heartbeat() {
    let coord = coordinator(config(ResourceVector::cores(4)));
    coord
        .register_agent(AgentSpec::new("a", ["build"]))
        .await
        .unwrap();
    assert_eq!(
        coord.agent("a").await.unwrap().status,
        AgentStatus::Registered
    );

    let err = coord.distribute_task(task("t1", "build")).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::NoEligibleAgent {
            reason: Ineligibility::NoHealthyAgent,
            ..
        }
    ));

    let status = coord
        .report_heartbeat("a", HeartbeatStatus::Healthy)
        .await
        .unwrap();
    assert_eq!(status, AgentStatus::Healthy);

    let view = coord.task("t1").await.unwrap();
    assert_eq!(view.status, TaskStatus::Assigned);
    assert_eq!(view.agent.as_deref(), Some("a"));
}

#[tokio::test]
async fn registration_rejections() {
    let mut cfg = config(ResourceVector::cores(2));
    cfg.pool.max_agents = 2;
    let coord = coordinator(cfg);

    coord
        .register_agent(AgentSpec::new("a", ["x"]).with_requirements(ResourceVector::cores(1)))
        .await
        .unwrap();

    let dup = coord
        .register_agent(AgentSpec::new("a", ["x"]))
        .await
        .unwrap_err();
    assert!(matches!(dup, CoordinatorError::DuplicateAgent(_)));

    let too_big = coord
        .register_agent(AgentSpec::new("b", ["x"]).with_requirements(ResourceVector::cores(2)))
        .await
        .unwrap_err();
    assert!(too_big.is_capacity());
    assert!(coord.agent("b").await.is_none());

    coord
        .register_agent(AgentSpec::new("c", ["x"]))
        .await
        .unwrap();
    let full = coord
        .register_agent(AgentSpec::new("d", ["x"]))
        .await
        .unwrap_err();
    assert!(matches!(full, CoordinatorError::PoolFull { max: 2 }));
}

#[tokio::test]
async fn generated_ids_are_unique() {
    let coord = coordinator(config(ResourceVector::cores(4)));
    let spec = AgentSpec {
        id: None,
        ..AgentSpec::new("ignored", ["x"])
    };
    let first = coord.register_agent(spec.clone()).await.unwrap();
    let second = coord.register_agent(spec).await.unwrap();
    assert_ne!(first, second);
    assert!(first.starts_with("agent-"));
}

#[tokio::test]
async fn completion_frees_slot_for_pending_task() {
    let mut cfg = config(ResourceVector::cores(4));
    cfg.pool.per_agent_concurrency = 1;
    let coord = coordinator(cfg);
    healthy_agent(&coord, "a", &["build"]).await;

    coord.distribute_task(task("t1", "build")).await.unwrap();
    let err = coord.distribute_task(task("t2", "build")).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::NoEligibleAgent {
            reason: Ineligibility::AllSaturated,
            ..
        }
    ));

    let status = coord
        .report_task_result("t1", Some("a"), TaskOutcome::Completed)
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Completed);
    assert_eq!(coord.task("t2").await.unwrap().status, TaskStatus::Assigned);
    assert_eq!(coord.agent("a").await.unwrap().completed, 1);
}

#[tokio::test]
async fn higher_priority_pending_task_is_dispatched_first() {
    let mut cfg = config(ResourceVector::cores(4));
    cfg.pool.per_agent_concurrency = 1;
    let coord = coordinator(cfg);
    healthy_agent(&coord, "a", &["build"]).await;

    coord.distribute_task(task("busy", "build")).await.unwrap();
    let _ = coord.distribute_task(task("low", "build").with_priority(1)).await;
    let _ = coord.distribute_task(task("high", "build").with_priority(9)).await;

    coord
        .report_task_result("busy", None, TaskOutcome::Completed)
        .await
        .unwrap();
    assert_eq!(coord.task("high").await.unwrap().status, TaskStatus::Assigned);
    assert_eq!(coord.task("low").await.unwrap().status, TaskStatus::Pending);
}

#[tokio::test]
async fn priority_weighted_reserves_slots_for_urgent_work() {
    let mut cfg = config(ResourceVector::cores(4));
    cfg.pool.per_agent_concurrency = 2;
    cfg.balancing.strategy = LoadBalancingStrategy::PriorityWeighted;
    cfg.balancing.priority_reserved_slots = 1;
    cfg.balancing.priority_overflow_threshold = 10;
    let coord = coordinator(cfg);
    healthy_agent(&coord, "a", &["build"]).await;

    coord.distribute_task(task("n1", "build")).await.unwrap();
    let err = coord.distribute_task(task("n2", "build")).await.unwrap_err();
    assert!(matches!(
        err,
        CoordinatorError::NoEligibleAgent {
            reason: Ineligibility::AllSaturated,
            ..
        }
    ));

    let urgent = coord
        .distribute_task(task("u1", "build").with_priority(10))
        .await
        .unwrap();
    assert_eq!(urgent.agent_id, "a");
    assert_eq!(coord.agent("a").await.unwrap().active_tasks, 2);
}

#[tokio::test]
async fn draining_agent_receives_no_new_tasks() {
    let coord = coordinator(config(ResourceVector::cores(4)));
    healthy_agent(&coord, "a", &["build"]).await;
    healthy_agent(&coord, "b", &["build"]).await;

    assert_eq!(coord.drain_agent("a").await.unwrap(), 0);
    for n in 0..3 {
        let a = coord
            .distribute_task(task(&format!("t{n}"), "build"))
            .await
            .unwrap();
        assert_eq!(a.agent_id, "b");
    }
    assert!(coord.idle_agents().await.is_empty());
    assert_eq!(coord.drained_agents().await, vec!["a".to_string()]);
    assert_eq!(coord.least_loaded_agent().await.as_deref(), Some("b"));
}

#[tokio::test(flavor = "multi_thread", worker_threads = 4)]
async fn concurrent_submissions_never_double_assign() {
    let mut cfg = config(ResourceVector::cores(64));
    cfg.pool.per_agent_concurrency = 4;
    let coord = coordinator(cfg);
    for id in ["a", "b", "c"] {
        healthy_agent(&coord, id, &["build"]).await;
    }

    let mut handles = Vec::new();
    for n in 0..40 {
        let coord = coord.clone();
        handles.push(tokio::spawn(async move {
            coord
                .distribute_task(task(&format!("t{n}"), "build").with_requirements(
                    ResourceVector::new(100, 0, 0, 0),
                ))
                .await
        }));
    }
    let placed = count_placed(handles).await;
    assert_eq!(placed, 12, "3 agents x 4 slots");

    let mut seen = HashSet::new();
    for id in ["a", "b", "c"] {
        let assignments = coord.assignments_for(id).await.unwrap();
        assert!(assignments.len() <= 4);
        for a in assignments {
            assert!(seen.insert(a.task_id), "task assigned twice");
        }
    }
    assert_eq!(seen.len(), 12);
    assert!(coord.ledger().is_consistent().await);

    let snapshot = coord.snapshot().await;
    assert_eq!(snapshot.tasks.in_flight(), 12);
    assert_eq!(snapshot.tasks.pending, 28);
    assert_eq!(snapshot.usage.used.cpu_millis, 1200);
}

async fn count_placed(handles: Vec<JoinHandle<CoordinatorResult<Assignment>>>) -> usize {
    let mut placed = 0;
    for handle in handles {
        if handle.await.unwrap().is_ok() {
            placed += 1;
        }
    }
    placed
}

// ── Results and retries ───────────────────────────────────────────

#[tokio::test]
async fn failed_attempts_retry_until_limit() {
    let mut cfg = config(ResourceVector::cores(4));
    cfg.tasks.retry_limit = 2;
    let coord = coordinator(cfg);
    healthy_agent(&coord, "a", &["build"]).await;

    coord.distribute_task(task("t1", "build")).await.unwrap();
    let failed = TaskOutcome::Failed {
        error: "exit 1".into(),
    };

    let status = coord
        .report_task_result("t1", Some("a"), failed.clone())
        .await
        .unwrap();
    // Re-queued and immediately placed again on the only agent.
    assert_eq!(status, TaskStatus::Pending);
    let view = coord.task("t1").await.unwrap();
    assert_eq!(view.status, TaskStatus::Assigned);
    assert_eq!(view.attempts, 2);

    let status = coord
        .report_task_result("t1", Some("a"), failed)
        .await
        .unwrap();
    assert_eq!(status, TaskStatus::Failed);

    let view = coord.task("t1").await.unwrap();
    assert_eq!(view.status, TaskStatus::Failed);
    assert_eq!(view.failures, 2);
    assert_eq!(view.history.len(), 2);
    assert!(view.allocation.is_none());
    assert_eq!(coord.pending_count().await, 0);

    let counters = coord.counters();
    assert_eq!(counters.tasks_requeued, 1);
    assert_eq!(counters.tasks_failed, 1);
    assert!(coord.ledger().current_usage().await.used.is_zero());
}

#[tokio::test]
async fn stale_reports_are_rejected_and_counted() {
    let coord = coordinator(config(ResourceVector::cores(4)));
    healthy_agent(&coord, "a", &["build"]).await;
    coord.distribute_task(task("t1", "build")).await.unwrap();

    let wrong_agent = coord
        .report_task_result("t1", Some("b"), TaskOutcome::Completed)
        .await
        .unwrap_err();
    assert!(matches!(wrong_agent, CoordinatorError::TaskNotInFlight { .. }));

    coord
        .report_task_started("t1", Some("a"))
        .await
        .unwrap();
    assert_eq!(coord.task("t1").await.unwrap().status, TaskStatus::Running);

    coord
        .report_task_result("t1", Some("a"), TaskOutcome::Completed)
        .await
        .unwrap();
    let again = coord
        .report_task_result("t1", Some("a"), TaskOutcome::Completed)
        .await
        .unwrap_err();
    assert!(matches!(
        again,
        CoordinatorError::TaskNotInFlight {
            status: TaskStatus::Completed,
            ..
        }
    ));
    assert_eq!(coord.counters().stale_reports, 2);
    assert_eq!(coord.ledger().stats().await.stale_releases, 0);

    let missing = coord
        .report_task_result("nope", None, TaskOutcome::Completed)
        .await
        .unwrap_err();
    assert!(matches!(missing, CoordinatorError::TaskNotFound(_)));
}

#[tokio::test]
async fn duplicate_task_ids_are_rejected() {
    let coord = coordinator(config(ResourceVector::cores(4)));
    let _ = coord.distribute_task(task("t1", "build")).await;
    let err = coord.distribute_task(task("t1", "build")).await.unwrap_err();
    assert!(matches!(err, CoordinatorError::DuplicateTask(_)));
}

// ── Fault recovery ────────────────────────────────────────────────

#[tokio::test(start_paused = true)]
async fn heartbeat_timeout_requeues_in_flight_work() {
    let coord = coordinator(config(ResourceVector::cores(8)));
    coord
        .register_agent(AgentSpec::new("a", ["build"]).with_requirements(ResourceVector::cores(2)))
        .await
        .unwrap();
    coord
        .report_heartbeat("a", HeartbeatStatus::Healthy)
        .await
        .unwrap();
    for id in ["t1", "t2"] {
        coord
            .distribute_task(task(id, "build").with_requirements(ResourceVector::cores(1)))
            .await
            .unwrap();
    }
    let free_before = coord.ledger().current_usage().await.free();
    assert_eq!(free_before.cpu_millis, 4000);

    tokio::time::advance(Duration::from_secs(20)).await;
    assert!(coord.sweep().await.failed_agents.is_empty());

    tokio::time::advance(Duration::from_secs(11)).await;
    let report = coord.sweep().await;
    assert_eq!(report.failed_agents, vec!["a".to_string()]);

    for id in ["t1", "t2"] {
        let view = coord.task(id).await.unwrap();
        assert_eq!(view.status, TaskStatus::Pending);
        assert!(view.agent.is_none());
        assert!(matches!(
            view.history[0].outcome,
            AttemptOutcome::AgentLost { .. }
        ));
    }

    let agent = coord.agent("a").await.unwrap();
    assert_eq!(agent.status, AgentStatus::Unreachable);
    assert!(agent.allocation.is_none());
    assert_eq!(coord.pool_size().await, 0);

    let free_after = coord.ledger().current_usage().await.free();
    assert_eq!(free_after.cpu_millis, 8000);
}

#[tokio::test]
async fn unhealthy_heartbeats_fail_agent_once() {
    let coord = coordinator(config(ResourceVector::cores(4)));
    healthy_agent(&coord, "a", &["build"]).await;

    for _ in 0..2 {
        let status = coord
            .report_heartbeat("a", HeartbeatStatus::Unhealthy)
            .await
            .unwrap();
        assert_eq!(status, AgentStatus::Degraded);
    }
    let status = coord
        .report_heartbeat("a", HeartbeatStatus::Unhealthy)
        .await
        .unwrap();
    assert_eq!(status, AgentStatus::Unreachable);

    // Repeated failure handling is a no-op.
    assert!(coord
        .handle_agent_failure("a", "operator")
        .await
        .unwrap()
        .is_none());
    assert_eq!(coord.counters().agent_failures, 1);

    // Late heartbeats are stale.
    let late = coord
        .report_heartbeat("a", HeartbeatStatus::Healthy)
        .await
        .unwrap_err();
    assert!(matches!(late, CoordinatorError::AgentNotFound(_)));
    assert_eq!(coord.counters().stale_heartbeats, 1);
    assert!(coord.ledger().current_usage().await.used.is_zero());
}

#[tokio::test]
async fn degraded_agent_recovers_on_healthy_heartbeat() {
    let coord = coordinator(config(ResourceVector::cores(4)));
    healthy_agent(&coord, "a", &["build"]).await;
    coord
        .report_heartbeat("a", HeartbeatStatus::Unhealthy)
        .await
        .unwrap();

    let _ = coord.distribute_task(task("t1", "build")).await;
    assert_eq!(coord.task("t1").await.unwrap().status, TaskStatus::Pending);

    coord
        .report_heartbeat("a", HeartbeatStatus::Healthy)
        .await
        .unwrap();
    let agent = coord.agent("a").await.unwrap();
    assert_eq!(agent.status, AgentStatus::Healthy);
    assert_eq!(agent.consecutive_failures, 0);
    assert_eq!(coord.task("t1").await.unwrap().status, TaskStatus::Assigned);
}

#[tokio::test]
async fn deregistration_moves_work_to_remaining_agent() {
    let coord = coordinator(config(ResourceVector::cores(4)));
    healthy_agent(&coord, "a", &["build"]).await;
    let first = coord.distribute_task(task("t1", "build")).await.unwrap();
    assert_eq!(first.agent_id, "a");
    healthy_agent(&coord, "b", &["build"]).await;

    let report = coord.deregister_agent("a").await.unwrap();
    assert_eq!(report.requeued, vec!["t1".to_string()]);
    assert_eq!(report.released.len(), 2);

    let view = coord.task("t1").await.unwrap();
    assert_eq!(view.status, TaskStatus::Assigned);
    assert_eq!(view.agent.as_deref(), Some("b"));
    assert_eq!(view.attempts, 2);

    let again = coord.deregister_agent("a").await.unwrap_err();
    assert!(matches!(again, CoordinatorError::AgentNotFound(_)));
    assert!(coord.agent("a").await.is_none());
    assert_eq!(coord.ledger().stats().await.stale_releases, 0);
}

#[tokio::test(start_paused = true)]
async fn elapsed_deadline_times_out_attempt() {
    let mut cfg = config(ResourceVector::cores(4));
    cfg.tasks.retry_limit = 1;
    let coord = coordinator(cfg);
    coord
        .register_agent(AgentSpec::new("a", ["build"]))
        .await
        .unwrap();
    coord
        .report_heartbeat("a", HeartbeatStatus::Healthy)
        .await
        .unwrap();
    coord
        .distribute_task(task("t1", "build").with_deadline_ms(500))
        .await
        .unwrap();

    tokio::time::advance(Duration::from_millis(400)).await;
    assert!(coord.sweep().await.timed_out.is_empty());

    tokio::time::advance(Duration::from_millis(200)).await;
    let report = coord.sweep().await;
    assert_eq!(report.timed_out, vec!["t1".to_string()]);

    let view = coord.task("t1").await.unwrap();
    assert_eq!(view.status, TaskStatus::TimedOut);
    assert_eq!(view.history[0].outcome, AttemptOutcome::TimedOut);
    assert_eq!(coord.counters().tasks_timed_out, 1);
    assert_eq!(coord.agent("a").await.unwrap().active_tasks, 0);
}

// ── Driver ────────────────────────────────────────────────────────

fn driven(config: SwarmConfig) -> (Arc<Coordinator>, UnboundedReceiver<DriverEvent>) {
    let (driver, rx) = ChannelDriver::new();
    let ledger = Arc::new(ResourceLedger::new(config.capacity));
    let coord = Coordinator::new(config, ledger, Arc::new(driver)).unwrap();
    (Arc::new(coord), rx)
}

#[tokio::test]
async fn launch_deliver_terminate_through_driver() {
    let (coord, mut rx) = driven(config(ResourceVector::cores(4)));

    let id = coord
        .launch_agent(AgentSpec::new("a", ["build"]))
        .await
        .unwrap();
    assert!(matches!(
        rx.recv().await,
        Some(DriverEvent::Started(spec)) if spec.id.as_deref() == Some("a")
    ));

    coord
        .report_heartbeat(&id, HeartbeatStatus::Healthy)
        .await
        .unwrap();
    let assignment = coord.distribute_task(task("t1", "build")).await.unwrap();
    assert_eq!(rx.recv().await, Some(DriverEvent::Delivered(assignment)));

    coord.terminate_agent(&id).await.unwrap();
    assert_eq!(rx.recv().await, Some(DriverEvent::Stopped("a".into())));
}

#[tokio::test(start_paused = true)]
async fn failed_agents_are_stopped_through_driver() {
    let (coord, mut rx) = driven(config(ResourceVector::cores(8)));
    for id in ["a", "b", "c", "d"] {
        healthy_agent(&coord, id, &["build"]).await;
    }

    coord.handle_agent_failure("a", "operator").await.unwrap();
    assert_eq!(rx.try_recv().ok(), Some(DriverEvent::Stopped("a".into())));

    for _ in 0..3 {
        coord
            .report_heartbeat("b", HeartbeatStatus::Unhealthy)
            .await
            .unwrap();
    }
    assert_eq!(rx.try_recv().ok(), Some(DriverEvent::Stopped("b".into())));

    coord
        .report_heartbeat("d", HeartbeatStatus::Healthy)
        .await
        .unwrap();
    tokio::time::advance(Duration::from_secs(31)).await;
    let report = coord.sweep().await;
    assert_eq!(report.failed_agents, vec!["c".to_string(), "d".to_string()]);
    assert_eq!(rx.try_recv().ok(), Some(DriverEvent::Stopped("c".into())));
    assert_eq!(rx.try_recv().ok(), Some(DriverEvent::Stopped("d".into())));
    assert!(rx.try_recv().is_err());
    assert_eq!(coord.counters().driver_errors, 0);
}

#[tokio::test]
async fn failed_stop_is_counted() {
    let (coord, rx) = driven(config(ResourceVector::cores(4)));
    healthy_agent(&coord, "a", &["build"]).await;
    drop(rx);

    let report = coord.handle_agent_failure("a", "operator").await.unwrap();
    assert!(report.is_some());
    assert_eq!(coord.counters().driver_errors, 1);
    assert_eq!(coord.agent("a").await.unwrap().status, AgentStatus::Unreachable);
}

#[tokio::test]
async fn failed_delivery_counts_as_failed_attempt() {
    let mut cfg = config(ResourceVector::cores(4));
    cfg.tasks.retry_limit = 1;
    let (coord, rx) = driven(cfg);
    coord
        .register_agent(AgentSpec::new("a", ["build"]))
        .await
        .unwrap();
    coord
        .report_heartbeat("a", HeartbeatStatus::Healthy)
        .await
        .unwrap();
    drop(rx);

    coord.distribute_task(task("t1", "build")).await.unwrap();

    let view = coord.task("t1").await.unwrap();
    assert_eq!(view.status, TaskStatus::Failed);
    assert!(matches!(
        &view.history[0].outcome,
        AttemptOutcome::Failed { error } if error.starts_with("delivery failed")
    ));
    assert_eq!(coord.counters().delivery_failures, 1);
    assert_eq!(coord.counters().invariant_violations, 0);
    assert_eq!(coord.ledger().stats().await.stale_releases, 0);
    assert!(coord.ledger().is_consistent().await);
}

#[tokio::test]
async fn failed_start_rolls_back_registration() {
    let (coord, rx) = driven(config(ResourceVector::cores(4)));
    drop(rx);

    let err = coord
        .launch_agent(AgentSpec::new("a", ["build"]))
        .await
        .unwrap_err();
    assert!(matches!(err, CoordinatorError::Driver(_)));
    assert_eq!(coord.pool_size().await, 0);
    assert!(coord.ledger().current_usage().await.used.is_zero());
}
