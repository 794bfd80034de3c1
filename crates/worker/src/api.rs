// HTTP routes for starting, inspecting and stopping executions

use std::convert::Infallible;
use std::sync::Arc;

use axum::{
    extract::{Path, Query, State},
    http::StatusCode,
    response::sse::{Event as SseEvent, KeepAlive, Sse},
    routing::{get, post},
    Json, Router,
};
use cadence_engine::{
    EngineError, EventBroadcaster, ExecutionRunner, ExecutionStore, StoreError,
    WorkflowExecution, WorkflowLog,
};
use futures::stream::{self, Stream};
use serde::{Deserialize, Serialize};
use tokio::sync::broadcast::error::RecvError;
use uuid::Uuid;

// ============================================
// DTOs
// ============================================

/// Standard error response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ErrorResponse {
    pub error: String,
}

impl ErrorResponse {
    pub fn new(error: impl Into<String>) -> Self {
        Self {
            error: error.into(),
        }
    }

    pub fn into_response(self, status: StatusCode) -> ApiError {
        (status, Json(self))
    }
}

/// List endpoints wrap their items in `data`
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ListResponse<T> {
    pub data: Vec<T>,
}

impl<T> From<Vec<T>> for ListResponse<T> {
    fn from(data: Vec<T>) -> Self {
        Self { data }
    }
}

#[derive(Debug, Deserialize)]
pub struct ContactRequest {
    pub contact_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct StartResponse {
    pub execution_id: Uuid,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct TriggerResponse {
    pub execution_ids: Vec<Uuid>,
}

#[derive(Debug, Deserialize)]
pub struct EventsQuery {
    /// Only stream events for this execution
    pub execution_id: Option<Uuid>,
}

pub type ApiError = (StatusCode, Json<ErrorResponse>);

fn engine_error(e: EngineError) -> ApiError {
    let status = if e.is_not_found() {
        StatusCode::NOT_FOUND
    } else if matches!(e, EngineError::Store(StoreError::InvalidTransition(_))) {
        StatusCode::CONFLICT
    } else {
        tracing::error!("Engine operation failed: {}", e);
        StatusCode::INTERNAL_SERVER_ERROR
    };
    ErrorResponse::new(e.to_string()).into_response(status)
}

fn store_error(e: StoreError) -> ApiError {
    tracing::error!("Store operation failed: {}", e);
    ErrorResponse::new("internal error").into_response(StatusCode::INTERNAL_SERVER_ERROR)
}

fn not_found(what: &str, id: Uuid) -> ApiError {
    ErrorResponse::new(format!("{} not found: {}", what, id)).into_response(StatusCode::NOT_FOUND)
}

// ============================================
// App State and Routes
// ============================================

#[derive(Clone)]
pub struct AppState {
    pub runner: Arc<ExecutionRunner>,
    pub store: Arc<dyn ExecutionStore>,
    pub events: Arc<EventBroadcaster>,
}

impl AppState {
    pub fn new(runner: Arc<ExecutionRunner>, events: Arc<EventBroadcaster>) -> Self {
        Self {
            store: runner.store().clone(),
            runner,
            events,
        }
    }
}

pub fn routes(state: AppState) -> Router {
    Router::new()
        .route(
            "/v1/workflows/:workflow_id/executions",
            post(start_execution),
        )
        .route("/v1/triggers/:label", post(fire_trigger))
        .route("/v1/executions/:execution_id", get(get_execution))
        .route("/v1/executions/:execution_id/logs", get(list_logs))
        .route("/v1/executions/:execution_id/stop", post(stop_execution))
        .route("/v1/events", get(stream_events))
        .with_state(state)
}

// ============================================
// HTTP Handlers
// ============================================

/// POST /v1/workflows/{workflow_id}/executions - Start a workflow for a contact
pub async fn start_execution(
    State(state): State<AppState>,
    Path(workflow_id): Path<Uuid>,
    Json(req): Json<ContactRequest>,
) -> Result<(StatusCode, Json<StartResponse>), ApiError> {
    let execution_id = state
        .runner
        .trigger(workflow_id, req.contact_id)
        .await
        .map_err(engine_error)?;

    Ok((StatusCode::ACCEPTED, Json(StartResponse { execution_id })))
}

/// POST /v1/triggers/{label} - Start every active workflow listening on a trigger
pub async fn fire_trigger(
    State(state): State<AppState>,
    Path(label): Path<String>,
    Json(req): Json<ContactRequest>,
) -> Result<(StatusCode, Json<TriggerResponse>), ApiError> {
    let execution_ids = state
        .runner
        .fire_trigger(&label, req.contact_id)
        .await
        .map_err(engine_error)?;

    Ok((StatusCode::ACCEPTED, Json(TriggerResponse { execution_ids })))
}

/// GET /v1/executions/{execution_id}
pub async fn get_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<WorkflowExecution>, ApiError> {
    let execution = state
        .store
        .get_execution(execution_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("execution", execution_id))?;

    Ok(Json(execution))
}

/// GET /v1/executions/{execution_id}/logs
pub async fn list_logs(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
) -> Result<Json<ListResponse<WorkflowLog>>, ApiError> {
    state
        .store
        .get_execution(execution_id)
        .await
        .map_err(store_error)?
        .ok_or_else(|| not_found("execution", execution_id))?;

    let logs = state
        .store
        .list_logs(execution_id)
        .await
        .map_err(store_error)?;

    Ok(Json(logs.into()))
}

/// POST /v1/executions/{execution_id}/stop - Stop a paused execution
pub async fn stop_execution(
    State(state): State<AppState>,
    Path(execution_id): Path<Uuid>,
) -> Result<StatusCode, ApiError> {
    state
        .runner
        .stop(execution_id)
        .await
        .map_err(engine_error)?;

    Ok(StatusCode::NO_CONTENT)
}

/// GET /v1/events - Stream step events (SSE)
///
/// Subscribers that fall behind skip the events they missed.
pub async fn stream_events(
    State(state): State<AppState>,
    Query(query): Query<EventsQuery>,
) -> Sse<impl Stream<Item = Result<SseEvent, Infallible>>> {
    let receiver = state.events.subscribe();
    let filter = query.execution_id;

    tracing::info!(execution_id = ?filter, "Starting event stream");

    let stream = stream::unfold(receiver, move |mut receiver| async move {
        loop {
            match receiver.recv().await {
                Ok(event) if filter.map_or(true, |id| id == event.execution_id) => {
                    let json = serde_json::to_string(&event).unwrap_or_else(|_| "{}".to_string());
                    let sse = SseEvent::default()
                        .event(event.status.as_str())
                        .data(json);
                    return Some((Ok::<_, Infallible>(sse), receiver));
                }
                Ok(_) => {}
                Err(RecvError::Lagged(skipped)) => {
                    tracing::warn!(skipped, "SSE: subscriber lagged");
                }
                Err(RecvError::Closed) => return None,
            }
        }
    });

    Sse::new(stream).keep_alive(KeepAlive::default())
}
