//! swarmgrid-api — REST API for SwarmGrid.
//!
//! Provides axum route handlers for task submission, agent registration
//! and reporting, and monitoring pulls.
//!
//! # API Routes
//!
//! | Method | Path | Description |
//! |---|---|---|
//! | GET | `/api/v1/tasks` | List tasks |
//! | POST | `/api/v1/tasks` | Submit a task |
//! | GET | `/api/v1/tasks/{id}` | Get task details |
//! | POST | `/api/v1/tasks/{id}/started` | Agent acknowledges a start |
//! | POST | `/api/v1/tasks/{id}/result` | Agent reports an outcome |
//! | GET | `/api/v1/agents` | List live agents |
//! | POST | `/api/v1/agents` | Register an agent |
//! | GET | `/api/v1/agents/{id}` | Get agent details |
//! | DELETE | `/api/v1/agents/{id}` | Deregister an agent |
//! | POST | `/api/v1/agents/{id}/heartbeat` | Report agent health |
//! | POST | `/api/v1/agents/{id}/drain` | Stop sending work to an agent |
//! | GET | `/api/v1/agents/{id}/tasks` | Assignments held by an agent |
//! | GET | `/api/v1/resources` | Ledger usage |
//! | GET | `/api/v1/resources/suggestions` | Rebalancing advice |
//! | GET | `/api/v1/scaling/history` | Recent scaling decisions |
//! | GET | `/api/v1/snapshot` | Monitoring snapshot |
//! | GET | `/metrics` | Prometheus exposition |

pub mod handlers;

use std::sync::Arc;

use axum::Router;
use axum::routing::{get, post};

use swarmgrid_autoscale::ScalingHistory;
use swarmgrid_coordinator::Coordinator;

/// Shared state for API handlers.
#[derive(Clone)]
pub struct ApiState {
    pub coordinator: Arc<Coordinator>,
    /// Absent when autoscaling is not running.
    pub history: Option<ScalingHistory>,
}

impl ApiState {
    pub fn new(coordinator: Arc<Coordinator>) -> Self {
        Self {
            coordinator,
            history: None,
        }
    }

    pub fn with_history(mut self, history: ScalingHistory) -> Self {
        self.history = Some(history);
        self
    }
}

/// Build the complete API router (REST + metrics).
pub fn build_router(state: ApiState) -> Router {
    let api_routes = Router::new()
        .route("/tasks", get(handlers::list_tasks).post(handlers::submit_task))
        .route("/tasks/{id}", get(handlers::get_task))
        .route("/tasks/{id}/started", post(handlers::task_started))
        .route("/tasks/{id}/result", post(handlers::task_result))
        .route("/agents", get(handlers::list_agents).post(handlers::register_agent))
        .route("/agents/{id}", get(handlers::get_agent).delete(handlers::deregister_agent))
        .route("/agents/{id}/heartbeat", post(handlers::heartbeat))
        .route("/agents/{id}/drain", post(handlers::drain_agent))
        .route("/agents/{id}/tasks", get(handlers::agent_assignments))
        .route("/resources", get(handlers::resource_usage))
        .route("/resources/suggestions", get(handlers::rebalance_suggestions))
        .route("/scaling/history", get(handlers::scaling_history))
        .route("/snapshot", get(handlers::snapshot))
        .with_state(state.clone());

    Router::new()
        .nest("/api/v1", api_routes)
        .route("/metrics", get(handlers::prometheus_metrics).with_state(state))
}
