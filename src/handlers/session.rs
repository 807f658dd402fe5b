use crate::{error::SessionError, models::{ErrorResponse, Participant, SessionSnapshotResponse}, AppState};
use axum::{extract::{State, Path}, http::StatusCode, Json};
use tracing::error;

fn error_reply(session_id: &str, e: SessionError) -> (StatusCode, Json<ErrorResponse>) {
    match e {
        SessionError::SessionNotFound(_) => {
            ErrorResponse::reply(StatusCode::NOT_FOUND, format!("Session '{}' not found", session_id))
        }
        e => {
            error!(session_id = %session_id, "Failed to read session: {}", e);
            ErrorResponse::reply(StatusCode::SERVICE_UNAVAILABLE, e.to_string())
        }
    }
}

/// Live snapshot of a session, or its durable record when not loaded
pub async fn session_snapshot(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<(StatusCode, Json<SessionSnapshotResponse>), (StatusCode, Json<ErrorResponse>)> {
    let snapshot = state
        .sessions
        .snapshot(&session_id)
        .await
        .map_err(|e| error_reply(&session_id, e))?;
    Ok((StatusCode::OK, Json(snapshot)))
}

pub async fn session_participants(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Result<(StatusCode, Json<Vec<Participant>>), (StatusCode, Json<ErrorResponse>)> {
    let snapshot = state
        .sessions
        .snapshot(&session_id)
        .await
        .map_err(|e| error_reply(&session_id, e))?;
    Ok((StatusCode::OK, Json(snapshot.participants)))
}
