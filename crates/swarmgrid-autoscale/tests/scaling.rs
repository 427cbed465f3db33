//! Scaling controller against a live coordinator.

use std::sync::Arc;
use std::time::Duration;

use swarm_core::{
    AgentSpec, HeartbeatStatus, HumanDuration, ResourceVector, SwarmConfig, TaskOutcome, TaskSpec,
};
use swarmgrid_autoscale::{
    Recommendation, ScalingController, ScalingDirection, ScalingPhase, ScalingPolicy,
    ScalingSignals,
};
use swarmgrid_coordinator::Coordinator;

fn coordinator(configure: impl FnOnce(&mut SwarmConfig)) -> Arc<Coordinator> {
    let mut config = SwarmConfig::scaffold(ResourceVector::cores(100));
    configure(&mut config);
    Arc::new(Coordinator::standalone(config).unwrap())
}

async fn healthy_agents(coord: &Coordinator, ids: &[&str]) {
    for id in ids {
        coord
            .register_agent(AgentSpec::new(*id, ["compute"]))
            .await
            .unwrap();
        coord
            .report_heartbeat(id, HeartbeatStatus::Healthy)
            .await
            .unwrap();
    }
}

fn work(id: &str, cores: u64) -> TaskSpec {
    TaskSpec::new(id, "compute").with_requirements(ResourceVector::cores(cores))
}

#[tokio::test(start_paused = true)]
async fn sustained_high_utilization_adds_one_agent() {
    let coord = coordinator(|c| {
        c.pool.min_agents = 2;
        c.pool.max_agents = 10;
        c.scaling.scale_up_sustain = HumanDuration::from_secs(30);
    });
    healthy_agents(&coord, &["a", "b", "c", "d"]).await;
    coord.distribute_task(work("big", 85)).await.unwrap();

    let mut ctl = ScalingController::new(coord.clone());
    let history = ctl.history();

    assert!(ctl.evaluate().await.unwrap().is_none());
    tokio::time::advance(Duration::from_secs(31)).await;

    let record = ctl.evaluate().await.unwrap().expect("scale-up");
    assert_eq!(record.direction, ScalingDirection::Up);
    assert_eq!(record.magnitude, 1);
    assert_eq!(record.pool_before, 4);
    assert_eq!(record.pool_after, 5);
    assert_eq!(record.policy, "threshold");
    assert!((record.signals.utilization - 0.85).abs() < 1e-9);
    assert_eq!(record.agents, vec!["auto-1".to_string()]);
    assert_eq!(coord.pool_size().await, 5);
    assert_eq!(history.len().await, 1);
    assert_eq!(ctl.phase(), ScalingPhase::Cooldown);

    // Utilization is still high, but the cooldown holds the next action.
    tokio::time::advance(Duration::from_secs(31)).await;
    assert!(ctl.evaluate().await.unwrap().is_none());
    assert_eq!(coord.pool_size().await, 5);
    assert_eq!(history.len().await, 1);
}

#[tokio::test(start_paused = true)]
async fn pool_at_minimum_is_not_shrunk() {
    let coord = coordinator(|c| {
        c.pool.min_agents = 2;
        c.scaling.scale_down_sustain = HumanDuration::from_secs(0);
    });
    healthy_agents(&coord, &["a", "b"]).await;
    coord.distribute_task(work("small", 10)).await.unwrap();

    let mut ctl = ScalingController::new(coord.clone());
    let signals = ctl.observe().await;
    assert!((signals.utilization - 0.10).abs() < 1e-9);

    let (down, reason) = ctl.should_scale_down(&signals);
    assert!(!down);
    assert!(reason.contains("minimum"), "{reason}");
    assert!(ctl.evaluate().await.unwrap().is_none());
    assert_eq!(coord.pool_size().await, 2);
    assert!(ctl.history().is_empty().await);
}

#[tokio::test(start_paused = true)]
async fn idle_agent_is_removed_newest_first() {
    let coord = coordinator(|c| {
        c.pool.min_agents = 1;
        c.scaling.scale_down_sustain = HumanDuration::from_secs(0);
    });
    healthy_agents(&coord, &["a", "b", "c"]).await;
    let busy = coord.distribute_task(work("t1", 5)).await.unwrap().agent_id;
    let newest_idle = if busy == "c" { "b" } else { "c" };

    let mut ctl = ScalingController::new(coord.clone());
    let record = ctl.evaluate().await.unwrap().expect("scale-down");

    assert_eq!(record.direction, ScalingDirection::Down);
    assert_eq!(record.agents, vec![newest_idle.to_string()]);
    assert_eq!(record.deferred, 0);
    assert_eq!(record.pool_after, 2);
    assert!(coord.agent(newest_idle).await.is_none());
    assert_eq!(coord.pool_size().await, 2);
}

#[tokio::test(start_paused = true)]
async fn busy_pool_drains_after_max_wait() {
    let coord = coordinator(|c| {
        c.pool.min_agents = 1;
        c.scaling.scale_down_sustain = HumanDuration::from_secs(0);
        c.scaling.scale_down_max_wait = HumanDuration::from_secs(60);
    });
    healthy_agents(&coord, &["a", "b"]).await;
    let first = coord.distribute_task(work("t1", 5)).await.unwrap();
    let second = coord.distribute_task(work("t2", 5)).await.unwrap();
    assert_ne!(first.agent_id, second.agent_id);

    let mut ctl = ScalingController::new(coord.clone());

    // Nobody is idle: the removal waits.
    assert!(ctl.evaluate().await.unwrap().is_none());
    assert_eq!(coord.pool_size().await, 2);

    tokio::time::advance(Duration::from_secs(61)).await;
    let record = ctl.evaluate().await.unwrap().expect("drain");
    assert_eq!(record.magnitude, 1);
    assert_eq!(record.pool_after, 2);
    let drained = record.agents[0].clone();
    assert!(coord.agent(&drained).await.unwrap().draining);

    // A draining agent takes no new work.
    let next = coord.distribute_task(work("t3", 5)).await.unwrap();
    assert_ne!(next.agent_id, drained);

    let drained_task = if first.agent_id == drained { &first } else { &second };
    coord
        .report_task_result(&drained_task.task_id, Some(&drained), TaskOutcome::Completed)
        .await
        .unwrap();

    assert_eq!(ctl.reap_drained().await, vec![drained.clone()]);
    assert!(coord.agent(&drained).await.is_none());
    assert_eq!(coord.pool_size().await, 1);
}

struct Always(u32);

impl ScalingPolicy for Always {
    fn name(&self) -> &str {
        "always-up"
    }

    fn recommend(&self, _signals: &ScalingSignals) -> Recommendation {
        Recommendation::ScaleUp {
            count: self.0,
            reason: "forced".to_string(),
        }
    }
}

#[tokio::test(start_paused = true)]
async fn custom_policy_is_bounded_by_max_agents() {
    let coord = coordinator(|c| {
        c.pool.max_agents = 5;
        c.scaling.step = 3;
    });
    healthy_agents(&coord, &["a", "b", "c", "d"]).await;

    let mut ctl = ScalingController::with_policy(coord.clone(), Box::new(Always(5)));
    assert_eq!(ctl.policy_name(), "always-up");

    let record = ctl.evaluate().await.unwrap().expect("scale-up");
    assert_eq!(record.magnitude, 1);
    assert_eq!(record.policy, "always-up");
    assert_eq!(record.reason, "forced");
    assert_eq!(coord.pool_size().await, 5);

    tokio::time::advance(Duration::from_secs(120)).await;
    let signals = ctl.observe().await;
    let (up, reason) = ctl.should_scale_up(&signals);
    assert!(!up);
    assert!(reason.contains("maximum"), "{reason}");
}

#[tokio::test(start_paused = true)]
async fn template_id_collision_is_skipped() {
    let coord = coordinator(|c| {
        c.scaling.scale_up_sustain = HumanDuration::from_secs(0);
    });
    coord
        .register_agent(AgentSpec::new("auto-1", ["compute"]))
        .await
        .unwrap();

    let mut ctl = ScalingController::new(coord.clone());
    let record = ctl.scale_up(1, "manual").await.unwrap().expect("scale-up");
    assert_eq!(record.agents, vec!["auto-2".to_string()]);
}

#[tokio::test(start_paused = true)]
async fn pool_is_filled_to_minimum() {
    let coord = coordinator(|c| {
        c.pool.min_agents = 3;
        c.scaling.step = 1;
    });
    healthy_agents(&coord, &["a"]).await;

    let mut ctl = ScalingController::new(coord.clone());
    let record = ctl.evaluate().await.unwrap().expect("fill");
    assert_eq!(record.direction, ScalingDirection::Up);
    assert_eq!(record.magnitude, 2);
    assert!(record.reason.starts_with("pool below minimum"), "{}", record.reason);
    assert_eq!(coord.pool_size().await, 3);

    assert!(ctl.ensure_minimum().await.unwrap().is_none());
}

#[tokio::test(start_paused = true)]
async fn minimum_fill_waits_for_scale_up_cooldown() {
    let coord = coordinator(|c| {
        c.pool.min_agents = 2;
        c.scaling.cooldown = HumanDuration::from_secs(60);
    });
    healthy_agents(&coord, &["a", "b"]).await;

    let mut ctl = ScalingController::new(coord.clone());
    let history = ctl.history();
    ctl.scale_up(1, "manual").await.unwrap().expect("scale-up");

    coord.handle_agent_failure("a", "lost").await.unwrap();
    coord.handle_agent_failure("b", "lost").await.unwrap();
    assert_eq!(coord.pool_size().await, 1);

    tokio::time::advance(Duration::from_secs(5)).await;
    assert!(ctl.evaluate().await.unwrap().is_none());
    assert_eq!(coord.pool_size().await, 1);
    assert_eq!(history.len().await, 1);
    assert_eq!(ctl.phase(), ScalingPhase::Cooldown);

    tokio::time::advance(Duration::from_secs(56)).await;
    let record = ctl.evaluate().await.unwrap().expect("fill");
    assert_eq!(record.direction, ScalingDirection::Up);
    assert_eq!(record.reason, "pool below minimum (1/2)");
    assert_eq!(coord.pool_size().await, 2);

    let ups = history.recent(10).await;
    assert_eq!(ups.len(), 2);
    assert!(ups.iter().all(|r| r.direction == ScalingDirection::Up));
}

#[tokio::test(start_paused = true)]
async fn run_stops_on_shutdown() {
    let coord = coordinator(|c| c.pool.min_agents = 0);
    let mut ctl = ScalingController::new(coord);
    let (tx, rx) = tokio::sync::watch::channel(false);

    let handle = tokio::spawn(async move {
        ctl.run(Duration::from_secs(15), rx).await;
        ctl.phase()
    });
    tokio::time::advance(Duration::from_secs(16)).await;
    tx.send(true).unwrap();

    let phase = handle.await.unwrap();
    assert_eq!(phase, ScalingPhase::Idle);
}
