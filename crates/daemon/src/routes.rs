// SPDX-License-Identifier: BUSL-1.1
// Copyright (c) 2026 Alfred Jean LLC

//! HTTP surface: executor callbacks and control routes
//!
//! The four callbacks are keyed by the node's latest running execution and
//! are idempotent (last write wins). Control routes are a thin JSON layer
//! over the execution driver.

use crate::lifecycle::Driver;
use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::routing::{delete, get, post};
use axum::{Json, Router};
use fm_core::{
    BlueprintId, ContextHealth, EvaluationBody, ExecutionId, NodeId, ReportedStatus,
};
use fm_engine::EngineError;
use serde::Deserialize;
use serde_json::json;
use std::sync::Arc;
use tower_http::cors::CorsLayer;

#[derive(Clone)]
pub struct AppState {
    pub driver: Arc<Driver>,
}

pub fn router(driver: Driver) -> Router {
    let state = AppState {
        driver: Arc::new(driver),
    };

    Router::new()
        .route("/healthz", get(healthz))
        .route("/api/queue", get(global_queue))
        .route("/api/blueprints/{bid}", get(blueprint_graph))
        .route("/api/blueprints/{bid}/queue", get(blueprint_queue))
        .route("/api/blueprints/{bid}/run-all", post(run_all))
        .route("/api/blueprints/{bid}/nodes/{nid}/run", post(run_node))
        .route(
            "/api/blueprints/{bid}/nodes/{nid}/reevaluate",
            post(reevaluate_node),
        )
        .route("/api/blueprints/{bid}/nodes/{nid}/enrich", post(enrich_node))
        .route("/api/blueprints/{bid}/nodes/{nid}/split", post(split_node))
        .route(
            "/api/blueprints/{bid}/nodes/{nid}/queue",
            delete(cancel_queued),
        )
        .route(
            "/api/blueprints/{bid}/nodes/{nid}/status-callback",
            post(status_callback),
        )
        .route(
            "/api/blueprints/{bid}/nodes/{nid}/blocker-callback",
            post(blocker_callback),
        )
        .route(
            "/api/blueprints/{bid}/nodes/{nid}/summary-callback",
            post(summary_callback),
        )
        .route(
            "/api/blueprints/{bid}/nodes/{nid}/evaluation-callback",
            post(evaluation_callback),
        )
        .route("/api/executions/{eid}/resume", post(resume_execution))
        .layer(CorsLayer::permissive())
        .with_state(state)
}

// ── Error mapping ───────────────────────────────────────────────────────────

struct ApiError {
    status: StatusCode,
    message: String,
}

impl ApiError {
    fn bad_request(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::BAD_REQUEST,
            message: message.into(),
        }
    }

    fn not_found(message: impl Into<String>) -> Self {
        Self {
            status: StatusCode::NOT_FOUND,
            message: message.into(),
        }
    }
}

impl From<EngineError> for ApiError {
    fn from(err: EngineError) -> Self {
        let status = match &err {
            EngineError::DependencyUnmet(_) | EngineError::InvalidState(_) => StatusCode::CONFLICT,
            EngineError::InvalidRequest(_) => StatusCode::BAD_REQUEST,
            EngineError::Store(store_err) if store_err.is_not_found() => StatusCode::NOT_FOUND,
            _ => StatusCode::INTERNAL_SERVER_ERROR,
        };
        Self {
            status,
            message: err.to_string(),
        }
    }
}

impl From<fm_storage::StoreError> for ApiError {
    fn from(err: fm_storage::StoreError) -> Self {
        Self::from(EngineError::Store(err))
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status, Json(json!({ "error": self.message }))).into_response()
    }
}

// ── Control routes ──────────────────────────────────────────────────────────

async fn healthz() -> impl IntoResponse {
    Json(json!({ "status": "ok" }))
}

async fn blueprint_graph(
    State(state): State<AppState>,
    Path(bid): Path<String>,
) -> Result<Response, ApiError> {
    let graph = state
        .driver
        .store()
        .load_blueprint_graph(&BlueprintId::new(bid))?;
    Ok(Json(json!({
        "blueprint": graph.blueprint,
        "nodes": graph.nodes,
        "artifacts": graph.artifacts,
        "executions": graph.executions,
    }))
    .into_response())
}

async fn run_node(
    State(state): State<AppState>,
    Path((_bid, nid)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let _handle = state.driver.run_node(&NodeId::new(nid.clone()))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "queued": true, "node_id": nid })),
    )
        .into_response())
}

async fn run_all(
    State(state): State<AppState>,
    Path(bid): Path<String>,
) -> Result<Response, ApiError> {
    let handles = state.driver.run_all(&BlueprintId::new(bid))?;
    let queued: Vec<&str> = handles.iter().map(|(id, _)| id.as_str()).collect();
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "queued": queued })),
    )
        .into_response())
}

async fn reevaluate_node(
    State(state): State<AppState>,
    Path((_bid, nid)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state.driver.reevaluate_node(&NodeId::new(nid.clone()))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "queued": true, "node_id": nid })),
    )
        .into_response())
}

async fn enrich_node(
    State(state): State<AppState>,
    Path((_bid, nid)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    state.driver.enrich_node(&NodeId::new(nid.clone()))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "queued": true, "node_id": nid })),
    )
        .into_response())
}

#[derive(Deserialize)]
struct SplitBody {
    nodes: Vec<SplitNodeSpec>,
}

#[derive(Deserialize)]
struct SplitNodeSpec {
    title: String,
    #[serde(default)]
    description: String,
}

async fn split_node(
    State(state): State<AppState>,
    Path((_bid, nid)): Path<(String, String)>,
    Json(body): Json<SplitBody>,
) -> Result<Response, ApiError> {
    let specs: Vec<fm_core::NewNodeSpec> = body
        .nodes
        .into_iter()
        .map(|n| fm_core::NewNodeSpec {
            title: n.title,
            description: n.description,
        })
        .collect();
    let outcome = state.driver.split_node(&NodeId::new(nid), &specs)?;
    let chain: Vec<&str> = outcome.chain.iter().map(|n| n.id.as_str()).collect();
    Ok(Json(json!({ "chain": chain })).into_response())
}

async fn cancel_queued(
    State(state): State<AppState>,
    Path((bid, nid)): Path<(String, String)>,
) -> Result<Response, ApiError> {
    let cancelled = state
        .driver
        .cancel_queued(&BlueprintId::new(bid), &NodeId::new(nid))?;
    Ok(Json(json!({ "cancelled": cancelled })).into_response())
}

async fn resume_execution(
    State(state): State<AppState>,
    Path(eid): Path<String>,
) -> Result<Response, ApiError> {
    state.driver.resume_execution(&ExecutionId::new(eid.clone()))?;
    Ok((
        StatusCode::ACCEPTED,
        Json(json!({ "queued": true, "execution_id": eid })),
    )
        .into_response())
}

async fn blueprint_queue(
    State(state): State<AppState>,
    Path(bid): Path<String>,
) -> Result<Response, ApiError> {
    let id = BlueprintId::new(bid);
    let info = state.driver.queue().queue_info(&id);
    let pending = state.driver.pending().list(&id);
    Ok(Json(json!({
        "running": info.running,
        "depth": info.depth,
        "pending_tasks": pending,
    }))
    .into_response())
}

async fn global_queue(State(state): State<AppState>) -> Result<Response, ApiError> {
    let all: Vec<serde_json::Value> = state
        .driver
        .pending()
        .list_all()
        .into_iter()
        .map(|(blueprint_id, task)| {
            json!({
                "blueprint_id": blueprint_id,
                "task_type": task.task_type,
                "node_id": task.node_id,
                "queued_at": task.queued_at,
            })
        })
        .collect();
    Ok(Json(json!({ "tasks": all })).into_response())
}

// ── Executor-facing callbacks ───────────────────────────────────────────────

#[derive(Deserialize)]
struct StatusCallbackBody {
    status: String,
    #[serde(default)]
    reason: Option<String>,
}

async fn status_callback(
    State(state): State<AppState>,
    Path((_bid, nid)): Path<(String, String)>,
    Json(body): Json<StatusCallbackBody>,
) -> Result<Response, ApiError> {
    let Some(status) = ReportedStatus::parse(&body.status) else {
        return Err(ApiError::bad_request(format!(
            "unknown status: {}",
            body.status
        )));
    };

    let node_id = NodeId::new(nid);
    let execution = running_execution(&state, &node_id)?;
    state
        .driver
        .store()
        .set_reported_status(&execution.id, status, body.reason.as_deref())?;
    tracing::debug!(node_id = %node_id, execution_id = %execution.id, status = %body.status, "status callback");
    Ok(Json(json!({ "ok": true })).into_response())
}

async fn blocker_callback(
    State(state): State<AppState>,
    Path((_bid, nid)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    let node_id = NodeId::new(nid);
    let execution = running_execution(&state, &node_id)?;
    state.driver.store().set_blocker_info(&execution.id, &body)?;
    Ok(Json(json!({ "ok": true })).into_response())
}

#[derive(Deserialize)]
struct SummaryCallbackBody {
    summary: String,
    #[serde(default)]
    compaction_count: Option<i64>,
    #[serde(default)]
    peak_tokens: Option<i64>,
    #[serde(default)]
    pressure_level: Option<String>,
}

async fn summary_callback(
    State(state): State<AppState>,
    Path((_bid, nid)): Path<(String, String)>,
    Json(body): Json<SummaryCallbackBody>,
) -> Result<Response, ApiError> {
    let node_id = NodeId::new(nid);
    let execution = running_execution(&state, &node_id)?;
    let store = state.driver.store();
    store.set_task_summary(&execution.id, &body.summary)?;

    if body.compaction_count.is_some() || body.peak_tokens.is_some() || body.pressure_level.is_some()
    {
        store.set_context_health(
            &execution.id,
            &ContextHealth {
                compaction_count: body.compaction_count.unwrap_or(0),
                peak_tokens: body.peak_tokens,
                pressure_level: body.pressure_level,
            },
        )?;
    }
    Ok(Json(json!({ "ok": true })).into_response())
}

async fn evaluation_callback(
    State(state): State<AppState>,
    Path((_bid, nid)): Path<(String, String)>,
    Json(body): Json<serde_json::Value>,
) -> Result<Response, ApiError> {
    let body: EvaluationBody = serde_json::from_value(body)
        .map_err(|e| ApiError::bad_request(format!("invalid evaluation body: {e}")))?;

    let node_id = NodeId::new(nid);
    // Existence check so typos 404 instead of queueing dead letters
    state.driver.store().node(&node_id)?;
    state.driver.inbox().push(&node_id, body);
    tracing::debug!(node_id = %node_id, "evaluation callback received");
    Ok(Json(json!({ "ok": true })).into_response())
}

fn running_execution(
    state: &AppState,
    node_id: &NodeId,
) -> Result<fm_core::NodeExecution, ApiError> {
    state
        .driver
        .store()
        .latest_running_execution(node_id)?
        .ok_or_else(|| ApiError::not_found(format!("no running execution for node {node_id}")))
}

#[cfg(test)]
#[path = "routes_tests.rs"]
mod tests;
