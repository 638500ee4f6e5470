use std::str::FromStr;
use std::sync::Arc;

use axum::{
    Json, Router,
    extract::{Path, Query, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::errors::CutoverError;
use crate::models::{ChecklistGate, JobType};
use crate::orchestrator::CutoverOrchestrator;

// ── Shared application state ──────────────────────────────────────────

pub struct AppState {
    pub orchestrator: CutoverOrchestrator,
}

pub type SharedState = Arc<AppState>;

// ── Request payload types ─────────────────────────────────────────────

#[derive(Deserialize)]
pub struct AddTableRequest {
    pub name: String,
}

#[derive(Deserialize)]
pub struct CutoverRequest {
    pub actor: String,
}

#[derive(Deserialize)]
pub struct RollbackRequest {
    pub actor: String,
    pub reason: String,
}

#[derive(Deserialize)]
pub struct SetGateRequest {
    pub completed_by: String,
}

#[derive(Deserialize)]
pub struct CreateWindowRequest {
    pub tables: Vec<String>,
    pub start: DateTime<Utc>,
    pub end: DateTime<Utc>,
    pub created_by: String,
}

#[derive(Deserialize)]
pub struct CreateJobRequest {
    pub table: String,
    pub job_type: JobType,
}

#[derive(Deserialize)]
pub struct JobsQuery {
    pub table: Option<String>,
}

// ── Error handling ────────────────────────────────────────────────────

pub enum ApiError {
    BadRequest(String),
    Domain(CutoverError),
}

impl From<CutoverError> for ApiError {
    fn from(err: CutoverError) -> Self {
        Self::Domain(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, kind, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, "bad_request", msg),
            ApiError::Domain(err) => {
                let status = match &err {
                    CutoverError::ValidationFailed { .. } => StatusCode::UNPROCESSABLE_ENTITY,
                    CutoverError::NotReady { .. } => StatusCode::PRECONDITION_FAILED,
                    CutoverError::Conflict { .. } | CutoverError::FreezeConflict { .. } => {
                        StatusCode::CONFLICT
                    }
                    CutoverError::StoreUnavailable { .. } => StatusCode::SERVICE_UNAVAILABLE,
                    CutoverError::TableNotFound(_) => StatusCode::NOT_FOUND,
                    CutoverError::InvariantViolation(_) | CutoverError::Internal(_) => {
                        StatusCode::INTERNAL_SERVER_ERROR
                    }
                };
                let kind = match &err {
                    CutoverError::ValidationFailed { .. } => "validation_failed",
                    CutoverError::NotReady { .. } => "not_ready",
                    CutoverError::Conflict { .. } => "conflict",
                    CutoverError::FreezeConflict { .. } => "freeze_conflict",
                    CutoverError::StoreUnavailable { .. } => "store_unavailable",
                    CutoverError::TableNotFound(_) => "table_not_found",
                    CutoverError::InvariantViolation(_) => "invariant_violation",
                    CutoverError::Internal(_) => "internal",
                };
                (status, kind, err.to_string())
            }
        };
        (status, Json(serde_json::json!({"error": message, "kind": kind}))).into_response()
    }
}

// ── Router ────────────────────────────────────────────────────────────

pub fn api_router() -> Router<SharedState> {
    Router::new()
        .route("/api/tables", get(list_tables).post(add_table))
        .route("/api/tables/{name}", get(get_table))
        .route("/api/tables/{name}/prepare", post(prepare_table))
        .route("/api/tables/{name}/cutover", post(cutover_table))
        .route("/api/tables/{name}/rollback", post(rollback_table))
        .route("/api/tables/{name}/complete", post(complete_table))
        .route("/api/tables/{name}/retry", post(retry_table))
        .route("/api/tables/{name}/checklist", get(get_checklist))
        .route("/api/tables/{name}/checklist/{gate}", post(set_gate))
        .route("/api/freeze-windows", get(list_windows).post(create_window))
        .route("/api/freeze-windows/{id}/cancel", post(cancel_window))
        .route(
            "/api/reconciliation-jobs",
            get(list_jobs).post(create_job),
        )
        .route("/api/reconciliation-jobs/{id}/cancel", post(cancel_job))
        .route("/health", get(health_check))
}

// ── Handlers ──────────────────────────────────────────────────────────

async fn health_check() -> &'static str {
    "ok"
}

async fn list_tables(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let tables = state.orchestrator.registry().list().await?;
    Ok(Json(tables))
}

async fn add_table(
    State(state): State<SharedState>,
    Json(req): Json<AddTableRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let name = req.name.trim().to_string();
    if name.is_empty() {
        return Err(ApiError::BadRequest("Table name is required".into()));
    }
    let table = state.orchestrator.registry().register(name).await?;
    Ok((StatusCode::CREATED, Json(table)))
}

async fn get_table(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let table = state.orchestrator.registry().require(&name).await?;
    Ok(Json(table))
}

async fn prepare_table(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let table = state.orchestrator.prepare(&name).await?;
    Ok(Json(table))
}

async fn cutover_table(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(req): Json<CutoverRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let outcome = state.orchestrator.cutover(&name, &req.actor).await?;
    Ok(Json(outcome))
}

async fn rollback_table(
    State(state): State<SharedState>,
    Path(name): Path<String>,
    Json(req): Json<RollbackRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let table = state
        .orchestrator
        .rollback(&name, &req.actor, &req.reason)
        .await?;
    Ok(Json(table))
}

async fn complete_table(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let table = state.orchestrator.complete(&name).await?;
    Ok(Json(table))
}

async fn retry_table(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let table = state.orchestrator.retry_preparation(&name).await?;
    Ok(Json(table))
}

async fn get_checklist(
    State(state): State<SharedState>,
    Path(name): Path<String>,
) -> Result<impl IntoResponse, ApiError> {
    let checklist = state
        .orchestrator
        .checklists()
        .get(&name)
        .await?
        .ok_or_else(|| ApiError::Domain(CutoverError::TableNotFound(name)))?;
    Ok(Json(checklist))
}

async fn set_gate(
    State(state): State<SharedState>,
    Path((name, gate)): Path<(String, String)>,
    Json(req): Json<SetGateRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let gate = ChecklistGate::from_str(&gate).map_err(ApiError::BadRequest)?;
    let checklist = state
        .orchestrator
        .checklists()
        .set_gate(&name, gate, &req.completed_by)
        .await?;
    Ok(Json(checklist))
}

async fn list_windows(State(state): State<SharedState>) -> Result<impl IntoResponse, ApiError> {
    let windows = state.orchestrator.scheduler().list().await?;
    Ok(Json(windows))
}

async fn create_window(
    State(state): State<SharedState>,
    Json(req): Json<CreateWindowRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let window = state
        .orchestrator
        .scheduler()
        .schedule(req.tables, req.start, req.end, &req.created_by)
        .await?;
    Ok((StatusCode::CREATED, Json(window)))
}

async fn cancel_window(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let window = state.orchestrator.scheduler().cancel(id).await?;
    Ok(Json(window))
}

async fn list_jobs(
    State(state): State<SharedState>,
    Query(query): Query<JobsQuery>,
) -> Result<impl IntoResponse, ApiError> {
    let jobs = state
        .orchestrator
        .runner()
        .list(query.table.as_deref())
        .await?;
    Ok(Json(jobs))
}

async fn create_job(
    State(state): State<SharedState>,
    Json(req): Json<CreateJobRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state
        .orchestrator
        .runner()
        .run(&req.table, req.job_type)
        .await?;
    Ok((StatusCode::CREATED, Json(job)))
}

async fn cancel_job(
    State(state): State<SharedState>,
    Path(id): Path<Uuid>,
) -> Result<impl IntoResponse, ApiError> {
    let job = state.orchestrator.runner().cancel(id).await?;
    Ok(Json(job))
}

// ── Tests ─────────────────────────────────────────────────────────────
