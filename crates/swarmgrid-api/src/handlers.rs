//! REST API handlers.
//!
//! Each handler calls into the `Coordinator` and returns JSON responses.

use axum::Json;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use serde::Deserialize;
use tracing::{debug, warn};

use swarm_core::{AgentId, AgentSpec, HeartbeatStatus, TaskOutcome, TaskSpec};
use swarmgrid_coordinator::CoordinatorError;
use swarmgrid_metrics::{MonitoringSnapshot, render_prometheus};

use crate::ApiState;

/// Response wrapper for consistent API format.
#[derive(serde::Serialize)]
struct ApiResponse<T: serde::Serialize> {
    success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    error: Option<String>,
}

impl<T: serde::Serialize> ApiResponse<T> {
    fn ok(data: T) -> Json<Self> {
        Json(Self {
            success: true,
            data: Some(data),
            error: None,
        })
    }
}

fn error_response(msg: &str, status: StatusCode) -> Response {
    (
        status,
        Json(ApiResponse::<()> {
            success: false,
            data: None,
            error: Some(msg.to_string()),
        }),
    )
        .into_response()
}

fn status_for(e: &CoordinatorError) -> StatusCode {
    match e {
        CoordinatorError::AgentNotFound(_) | CoordinatorError::TaskNotFound(_) => {
            StatusCode::NOT_FOUND
        }
        CoordinatorError::DuplicateAgent(_)
        | CoordinatorError::DuplicateTask(_)
        | CoordinatorError::TaskNotInFlight { .. } => StatusCode::CONFLICT,
        CoordinatorError::PoolFull { .. }
        | CoordinatorError::InsufficientCapacity { .. }
        | CoordinatorError::NoEligibleAgent { .. } => StatusCode::SERVICE_UNAVAILABLE,
        CoordinatorError::Config(_)
        | CoordinatorError::InvariantViolation(_)
        | CoordinatorError::Driver(_) => StatusCode::INTERNAL_SERVER_ERROR,
    }
}

fn coordinator_error(e: CoordinatorError) -> Response {
    let status = status_for(&e);
    if status.is_server_error() && !e.is_capacity() {
        warn!(error = %e, "request failed");
    }
    error_response(&e.to_string(), status)
}

// ── Tasks ──────────────────────────────────────────────────────

/// GET /api/v1/tasks
pub async fn list_tasks(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.coordinator.tasks().await)
}

/// POST /api/v1/tasks
///
/// A placement rejection leaves the task queued: the response is 503 with
/// the task id and the typed reason in `data`.
pub async fn submit_task(
    State(state): State<ApiState>,
    Json(spec): Json<TaskSpec>,
) -> impl IntoResponse {
    match state.coordinator.distribute_task(spec).await {
        Ok(assignment) => (StatusCode::CREATED, ApiResponse::ok(assignment)).into_response(),
        Err(e) => match e.rejection() {
            Some(rejection) => {
                let task_id = match &e {
                    CoordinatorError::InsufficientCapacity { id, .. } => id.clone(),
                    CoordinatorError::NoEligibleAgent { task_id, .. } => task_id.clone(),
                    _ => String::new(),
                };
                debug!(task = %task_id, error = %e, "task queued after rejection");
                (
                    StatusCode::SERVICE_UNAVAILABLE,
                    Json(ApiResponse {
                        success: false,
                        data: Some(serde_json::json!({
                            "task_id": task_id,
                            "status": "pending",
                            "rejection": rejection,
                        })),
                        error: Some(e.to_string()),
                    }),
                )
                    .into_response()
            }
            None => coordinator_error(e),
        },
    }
}

/// GET /api/v1/tasks/{id}
pub async fn get_task(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.coordinator.task(&id).await {
        Some(task) => ApiResponse::ok(task).into_response(),
        None => error_response("task not found", StatusCode::NOT_FOUND),
    }
}

/// Agent-side report body. `agent_id` identifies the reporter; reports
/// from an agent the task is not assigned to are rejected as stale.
#[derive(Debug, Default, Deserialize)]
pub struct StartedReport {
    #[serde(default)]
    pub agent_id: Option<AgentId>,
}

/// POST /api/v1/tasks/{id}/started
pub async fn task_started(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(report): Json<StartedReport>,
) -> impl IntoResponse {
    match state
        .coordinator
        .report_task_started(&id, report.agent_id.as_deref())
        .await
    {
        Ok(status) => ApiResponse::ok(serde_json::json!({ "task_id": id, "status": status }))
            .into_response(),
        Err(e) => coordinator_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct ResultReport {
    #[serde(default)]
    pub agent_id: Option<AgentId>,
    #[serde(flatten)]
    pub outcome: TaskOutcome,
}

/// POST /api/v1/tasks/{id}/result
pub async fn task_result(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(report): Json<ResultReport>,
) -> impl IntoResponse {
    match state
        .coordinator
        .report_task_result(&id, report.agent_id.as_deref(), report.outcome)
        .await
    {
        Ok(status) => ApiResponse::ok(serde_json::json!({ "task_id": id, "status": status }))
            .into_response(),
        Err(e) => coordinator_error(e),
    }
}

// ── Agents ─────────────────────────────────────────────────────

/// GET /api/v1/agents
pub async fn list_agents(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.coordinator.agents().await)
}

/// POST /api/v1/agents
pub async fn register_agent(
    State(state): State<ApiState>,
    Json(spec): Json<AgentSpec>,
) -> impl IntoResponse {
    match state.coordinator.register_agent(spec).await {
        Ok(id) => {
            (StatusCode::CREATED, ApiResponse::ok(serde_json::json!({ "id": id }))).into_response()
        }
        Err(e) => coordinator_error(e),
    }
}

/// GET /api/v1/agents/{id}
pub async fn get_agent(State(state): State<ApiState>, Path(id): Path<String>) -> impl IntoResponse {
    match state.coordinator.agent(&id).await {
        Some(agent) => ApiResponse::ok(agent).into_response(),
        None => error_response("agent not found", StatusCode::NOT_FOUND),
    }
}

/// DELETE /api/v1/agents/{id}
pub async fn deregister_agent(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.coordinator.deregister_agent(&id).await {
        Ok(report) => ApiResponse::ok(report).into_response(),
        Err(e) => coordinator_error(e),
    }
}

#[derive(Debug, Deserialize)]
pub struct HeartbeatReport {
    pub status: HeartbeatStatus,
}

/// POST /api/v1/agents/{id}/heartbeat
pub async fn heartbeat(
    State(state): State<ApiState>,
    Path(id): Path<String>,
    Json(report): Json<HeartbeatReport>,
) -> impl IntoResponse {
    match state.coordinator.report_heartbeat(&id, report.status).await {
        Ok(status) => {
            ApiResponse::ok(serde_json::json!({ "agent_id": id, "status": status })).into_response()
        }
        Err(e) => coordinator_error(e),
    }
}

/// POST /api/v1/agents/{id}/drain
pub async fn drain_agent(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.coordinator.drain_agent(&id).await {
        Ok(active) => {
            ApiResponse::ok(serde_json::json!({ "agent_id": id, "active_tasks": active }))
                .into_response()
        }
        Err(e) => coordinator_error(e),
    }
}

/// GET /api/v1/agents/{id}/tasks
pub async fn agent_assignments(
    State(state): State<ApiState>,
    Path(id): Path<String>,
) -> impl IntoResponse {
    match state.coordinator.assignments_for(&id).await {
        Ok(assignments) => ApiResponse::ok(assignments).into_response(),
        Err(e) => coordinator_error(e),
    }
}

// ── Resources ──────────────────────────────────────────────────

/// GET /api/v1/resources
pub async fn resource_usage(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.coordinator.ledger().current_usage().await)
}

/// GET /api/v1/resources/suggestions
pub async fn rebalance_suggestions(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(state.coordinator.optimization_suggestions().await)
}

// ── Monitoring ─────────────────────────────────────────────────

#[derive(Debug, Deserialize)]
pub struct HistoryQuery {
    #[serde(default = "default_history_limit")]
    pub limit: usize,
}

fn default_history_limit() -> usize {
    20
}

/// GET /api/v1/scaling/history
pub async fn scaling_history(
    State(state): State<ApiState>,
    Query(query): Query<HistoryQuery>,
) -> impl IntoResponse {
    let records = match &state.history {
        Some(history) => history.recent(query.limit).await,
        None => Vec::new(),
    };
    ApiResponse::ok(records)
}

/// GET /api/v1/snapshot
pub async fn snapshot(State(state): State<ApiState>) -> impl IntoResponse {
    ApiResponse::ok(MonitoringSnapshot::collect(&state.coordinator, state.history.as_ref()).await)
}

// ── Prometheus ─────────────────────────────────────────────────

/// GET /metrics
pub async fn prometheus_metrics(State(state): State<ApiState>) -> impl IntoResponse {
    let snapshot = MonitoringSnapshot::collect(&state.coordinator, state.history.as_ref()).await;
    let body = render_prometheus(&snapshot);
    (
        StatusCode::OK,
        [("content-type", "text/plain; version=0.0.4; charset=utf-8")],
        body,
    )
}
