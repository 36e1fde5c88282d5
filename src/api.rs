//! HTTP API endpoints for state management.
//!
//! These endpoints are used by the display for exporting/importing state and
//! for reading the current session and its scores.

use axum::{
    extract::{Path, State},
    http::StatusCode,
    response::{IntoResponse, Response},
    routing::{get, post},
    Json, Router,
};
use std::sync::Arc;

use crate::state::export::SessionStateExport;
use crate::state::AppState;

/// Routes under `/api`
pub fn routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/api/state/export", get(export_state))
        .route("/api/state/import", post(import_state))
        .route("/api/session", get(current_session))
        .route("/api/sessions/{id}/scores", get(session_scores))
}

/// Export the entire session state as JSON.
///
/// GET /api/state/export
pub async fn export_state(State(state): State<Arc<AppState>>) -> Json<SessionStateExport> {
    let export = state.export_state().await;
    Json(export)
}

/// Import a state snapshot.
///
/// POST /api/state/import
///
/// Replaces all current state with the imported data.
pub async fn import_state(
    State(state): State<Arc<AppState>>,
    Json(export): Json<SessionStateExport>,
) -> Response {
    match state.import_state(export).await {
        Ok(()) => (StatusCode::OK, "State imported successfully").into_response(),
        Err(e) => {
            tracing::error!("State import failed: {}", e);
            (StatusCode::BAD_REQUEST, format!("Import failed: {}", e)).into_response()
        }
    }
}

/// GET /api/session
pub async fn current_session(State(state): State<Arc<AppState>>) -> Response {
    match state.current_session().await {
        Some(session) => Json(session).into_response(),
        None => (StatusCode::NOT_FOUND, "No session in progress").into_response(),
    }
}

/// Leaderboard for one session, highest score first.
///
/// GET /api/sessions/{id}/scores
pub async fn session_scores(
    State(state): State<Arc<AppState>>,
    Path(id): Path<String>,
) -> Response {
    match state.leaderboard(&id).await {
        Ok(scores) => Json(scores).into_response(),
        Err(e) => (StatusCode::NOT_FOUND, e.to_string()).into_response(),
    }
}
