//! HTTP endpoint handlers

use std::{sync::Arc, time::Duration};
use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::Json,
};
use chrono::Utc;
use tracing::{error, info, warn};

use crate::{
    error::EngineError,
    services::{LifecycleEvent, LifecyclePhase},
    state::{AppState, SessionSnapshot, WorkoutConfig},
};
use super::responses::{ApiResponse, ErrorResponse, HealthResponse, LifecycleRequest, StatusResponse};

type ApiResult<T> = Result<Json<T>, (StatusCode, Json<ErrorResponse>)>;

fn reject(action: &str, e: EngineError) -> (StatusCode, Json<ErrorResponse>) {
    let status = match e {
        EngineError::InvalidConfig(_) => StatusCode::UNPROCESSABLE_ENTITY,
        EngineError::NotIdle | EngineError::AlreadyCompleted => StatusCode::CONFLICT,
        EngineError::LockPoisoned(_) => {
            error!("Failed to {}: {}", action, e);
            StatusCode::INTERNAL_SERVER_ERROR
        }
    };
    if status != StatusCode::INTERNAL_SERVER_ERROR {
        warn!("Rejected {}: {}", action, e);
    }
    (status, Json(ErrorResponse::new(e.to_string())))
}

fn respond(action: &str, message: &str, result: Result<SessionSnapshot, EngineError>) -> ApiResult<ApiResponse> {
    match result {
        Ok(session) => {
            info!("{} endpoint called", action);
            Ok(Json(ApiResponse::ok(message, session)))
        }
        Err(e) => Err(reject(action, e)),
    }
}

/// Handle PUT /workout/config - Replace the workout while idle
pub async fn configure_handler(
    State(state): State<Arc<AppState>>,
    Json(config): Json<WorkoutConfig>,
) -> ApiResult<ApiResponse> {
    respond("configure", "Workout configured", state.configure(config))
}

/// Handle POST /workout/start
pub async fn start_handler(State(state): State<Arc<AppState>>) -> ApiResult<ApiResponse> {
    respond("start", "Workout started", state.start())
}

/// Handle POST /workout/pause
pub async fn pause_handler(State(state): State<Arc<AppState>>) -> ApiResult<ApiResponse> {
    respond("pause", "Workout paused", state.pause())
}

/// Handle POST /workout/stop - Stop and return to the start of the workout
pub async fn stop_handler(State(state): State<Arc<AppState>>) -> ApiResult<ApiResponse> {
    respond("stop", "Workout stopped", state.stop())
}

/// Handle POST /workout/reset
pub async fn reset_handler(State(state): State<Arc<AppState>>) -> ApiResult<ApiResponse> {
    respond("reset", "Workout reset", state.reset())
}

/// Handle POST /lifecycle/:phase - Host moved to the foreground or background
pub async fn lifecycle_handler(
    State(state): State<Arc<AppState>>,
    Path(phase): Path<String>,
    body: Option<Json<LifecycleRequest>>,
) -> ApiResult<ApiResponse> {
    let Some(phase) = LifecyclePhase::from_name(&phase) else {
        warn!("Unknown lifecycle phase: {}", phase);
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(format!("unknown lifecycle phase '{}'", phase))),
        ));
    };

    let request = body.map(|Json(request)| request).unwrap_or_default();
    let event = LifecycleEvent {
        phase,
        at: request.at.unwrap_or_else(Utc::now),
    };
    let budget = request.budget_secs.map(Duration::from_secs);
    respond(
        "lifecycle",
        &format!("Lifecycle is now {}", phase),
        state.handle_lifecycle(event, budget),
    )
}

/// Handle GET /status - Return current session and server status
pub async fn status_handler(State(state): State<Arc<AppState>>) -> ApiResult<StatusResponse> {
    let session = state.snapshot().map_err(|e| reject("read status", e))?;
    let (last_action, last_action_time) = state.get_last_action();

    Ok(Json(StatusResponse {
        session,
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    }))
}

/// Handle GET /health - Health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
