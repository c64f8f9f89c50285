//! HTTP endpoint handlers

use std::sync::Arc;

use axum::{extract::State, http::StatusCode, response::Json};
use serde::Deserialize;
use tracing::{error, info, warn};

use crate::state::{AppState, TimerError};

use super::responses::{ApiResponse, HealthResponse, StatusResponse};

/// Body for POST /start
#[derive(Debug, Deserialize)]
pub struct StartRequest {
    /// Requested countdown as "HH:MM:SS"
    pub duration: String,
}

/// Body for POST /extend. The canonical increments are 300, 1800 and
/// 3600 seconds; any positive value is accepted.
#[derive(Debug, Deserialize)]
pub struct ExtendRequest {
    pub seconds: u64,
}

/// Body for POST /reset
#[derive(Debug, Deserialize)]
pub struct ResetRequest {
    pub secret: String,
}

type CommandResult = Result<Json<ApiResponse>, (StatusCode, Json<ApiResponse>)>;

/// Map a rejected command onto a status code and a JSON denial body. The
/// unchanged snapshot rides along when it is readable.
fn reject(state: &AppState, err: TimerError) -> (StatusCode, Json<ApiResponse>) {
    let code = match &err {
        TimerError::InvalidDuration(_) => StatusCode::UNPROCESSABLE_ENTITY,
        TimerError::AlreadyRunning | TimerError::AwaitingReset | TimerError::NotRunning => {
            StatusCode::CONFLICT
        }
        TimerError::BadCredential => StatusCode::UNAUTHORIZED,
        TimerError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
    };

    (code, Json(ApiResponse::rejected(err.to_string(), state.snapshot().ok())))
}

/// Handle POST /start - begin a countdown
pub async fn start_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<StartRequest>,
) -> CommandResult {
    match state.start_timer(&request.duration) {
        Ok(snapshot) => {
            info!("start endpoint called, {} remaining", snapshot.display);
            Ok(Json(ApiResponse::ok(
                format!("countdown started, {} remaining", snapshot.display),
                snapshot,
            )))
        }
        Err(e) => {
            warn!("start rejected: {}", e);
            Err(reject(&state, e))
        }
    }
}

/// Handle POST /extend - add time to the running countdown
pub async fn extend_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ExtendRequest>,
) -> CommandResult {
    match state.extend_timer(request.seconds) {
        Ok(snapshot) => {
            info!("extend endpoint called, {} remaining", snapshot.display);
            Ok(Json(ApiResponse::ok(
                format!("added {} s, {} remaining", request.seconds, snapshot.display),
                snapshot,
            )))
        }
        Err(e) => {
            warn!("extend rejected: {}", e);
            Err(reject(&state, e))
        }
    }
}

/// Handle POST /reset - clear the countdown, gated by the shared secret
pub async fn reset_handler(
    State(state): State<Arc<AppState>>,
    Json(request): Json<ResetRequest>,
) -> CommandResult {
    match state.reset_timer(&request.secret) {
        Ok(snapshot) => {
            info!("reset endpoint called, countdown cleared");
            Ok(Json(ApiResponse::ok("countdown reset".to_string(), snapshot)))
        }
        Err(e) => {
            warn!("reset rejected: {}", e);
            Err(reject(&state, e))
        }
    }
}

/// Handle POST /focus - the single-instance "show yourself" signal
pub async fn focus_handler(State(state): State<Arc<AppState>>) -> CommandResult {
    match state.handle_focus_request() {
        Ok(snapshot) => Ok(Json(ApiResponse::ok(
            "focus acknowledged".to_string(),
            snapshot,
        ))),
        Err(e) => {
            error!("focus handling failed: {}", e);
            Err(reject(&state, e))
        }
    }
}

/// Handle GET /status - return the current snapshot and server metadata
pub async fn status_handler(
    State(state): State<Arc<AppState>>,
) -> Result<Json<StatusResponse>, StatusCode> {
    let timer = match state.snapshot() {
        Ok(snapshot) => snapshot,
        Err(e) => {
            error!("failed to read timer state: {}", e);
            return Err(StatusCode::INTERNAL_SERVER_ERROR);
        }
    };

    let (last_action, last_action_time) = state.get_last_action();

    Ok(Json(StatusResponse {
        timer,
        uptime: state.get_uptime(),
        port: state.port,
        host: state.host.clone(),
        last_action,
        last_action_time,
    }))
}

/// Handle GET /health - health check endpoint
pub async fn health_handler() -> Json<HealthResponse> {
    Json(HealthResponse::ok())
}
