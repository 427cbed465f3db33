//! Daemon wiring.
//!
//! In this mode, the daemon:
//! 1. Builds the resource ledger from the configured capacity
//! 2. Creates the coordinator over the ledger and an agent driver
//! 3. Runs the health monitor, scaling controller and snapshot publisher
//! 4. Serves the REST API over HTTP
//! 5. On Ctrl-C, stops the loops and any agent processes it started

use std::net::SocketAddr;
use std::sync::Arc;

use tokio::sync::watch;
use tracing::{debug, error, info, warn};

use swarm_core::SwarmConfig;
use swarmgrid_api::{ApiState, build_router};
use swarmgrid_autoscale::ScalingController;
use swarmgrid_coordinator::{AgentDriver, Coordinator, HealthMonitor, NullDriver};
use swarmgrid_ledger::ResourceLedger;
use swarmgrid_metrics::SnapshotPublisher;

use crate::process::CommandDriver;

pub struct RunOptions {
    pub port: u16,
    /// Agent launch command; autoscaling runs only when set.
    pub agent_command: Option<String>,
}

pub async fn run(config: SwarmConfig, opts: RunOptions) -> anyhow::Result<()> {
    info!("SwarmGrid daemon starting");

    // ── Initialize subsystems ──────────────────────────────────

    let ledger = Arc::new(ResourceLedger::new(config.capacity));
    info!(capacity = %config.capacity, "resource ledger initialized");

    let process_driver = match &opts.agent_command {
        Some(command) => {
            let api_url = format!("http://127.0.0.1:{}", opts.port);
            Some(Arc::new(CommandDriver::new(command, api_url)?))
        }
        None => None,
    };
    let driver: Arc<dyn AgentDriver> = match &process_driver {
        Some(d) => Arc::clone(d) as Arc<dyn AgentDriver>,
        None => Arc::new(NullDriver),
    };

    let sweep_interval = config.health.sweep_interval.as_duration();
    let evaluation_interval = config.scaling.evaluation_interval.as_duration();
    let publish_interval = config.metrics.publish_interval.as_duration();

    let coordinator = Arc::new(Coordinator::new(config, ledger, driver)?);
    info!("coordinator initialized");

    let health_monitor = HealthMonitor::new(coordinator.clone());

    let scaler = process_driver
        .as_ref()
        .map(|_| ScalingController::new(coordinator.clone()));
    if scaler.is_none() {
        info!("no agent command configured, autoscaling disabled");
    }
    let history = scaler.as_ref().map(ScalingController::history);

    let mut publisher = SnapshotPublisher::new(coordinator.clone(), publish_interval);
    if let Some(h) = &history {
        publisher = publisher.with_history(h.clone());
    }
    let publisher = Arc::new(publisher);
    let mut snapshots = publisher.subscribe();

    // ── Shutdown signal ────────────────────────────────────────

    let (shutdown_tx, shutdown_rx) = watch::channel(false);

    // ── Start background tasks ─────────────────────────────────

    let health_handle = {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            health_monitor.run(sweep_interval, shutdown).await;
        })
    };

    let scale_handle = scaler.map(|mut scaler| {
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            if let Err(e) = scaler.ensure_minimum().await {
                warn!(error = %e, "initial pool launch failed");
            }
            scaler.run(evaluation_interval, shutdown).await;
        })
    });

    let publish_handle = {
        let publisher = publisher.clone();
        let shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            publisher.run(shutdown).await;
        })
    };

    // Log sink for pushed snapshots.
    let log_handle = {
        let mut shutdown = shutdown_rx.clone();
        tokio::spawn(async move {
            loop {
                tokio::select! {
                    received = snapshots.recv() => match received {
                        Ok(snapshot) => debug!(
                            utilization = snapshot.utilization(),
                            pool = snapshot.coordinator.pool_size,
                            pending = snapshot.coordinator.tasks.pending,
                            in_flight = snapshot.coordinator.tasks.in_flight(),
                            "monitoring snapshot"
                        ),
                        Err(tokio::sync::broadcast::error::RecvError::Lagged(n)) => {
                            debug!(skipped = n, "snapshot log lagging");
                        }
                        Err(tokio::sync::broadcast::error::RecvError::Closed) => break,
                    },
                    _ = shutdown.changed() => break,
                }
            }
        })
    };

    // ── Start API server ───────────────────────────────────────

    let mut api_state = ApiState::new(coordinator.clone());
    if let Some(h) = history {
        api_state = api_state.with_history(h);
    }
    let router = build_router(api_state);
    let addr = SocketAddr::from(([0, 0, 0, 0], opts.port));

    info!(%addr, "API server starting");

    let listener = tokio::net::TcpListener::bind(addr).await?;

    // Graceful shutdown on Ctrl-C.
    let server = axum::serve(listener, router).with_graceful_shutdown(async move {
        if let Err(e) = tokio::signal::ctrl_c().await {
            error!(error = %e, "failed to listen for Ctrl-C");
        }
        info!("shutdown signal received");
        let _ = shutdown_tx.send(true);
    });

    server.await?;

    // Wait for background tasks.
    let _ = health_handle.await;
    if let Some(handle) = scale_handle {
        let _ = handle.await;
    }
    let _ = publish_handle.await;
    let _ = log_handle.await;

    if let Some(driver) = process_driver {
        driver.stop_all().await;
    }

    let snapshot = coordinator.snapshot().await;
    info!(
        pool = snapshot.pool_size,
        pending = snapshot.tasks.pending,
        completed = snapshot.tasks.completed,
        "SwarmGrid daemon stopped"
    );
    Ok(())
}
