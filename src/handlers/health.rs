use axum::{extract::State, http::StatusCode, Json};
use crate::models::{HealthResponse, ReadyResponse};
use crate::AppState;
use tracing::{debug, warn};

/// Health check endpoint
pub async fn health_check() -> Json<HealthResponse> {
    debug!("Health check requested");
    Json(HealthResponse {
        status: "ok".to_string(),
        message: "Server is running".to_string(),
    })
}

/// Readiness check endpoint, fails while durable storage is unreachable
pub async fn ready_check(State(state): State<AppState>) -> (StatusCode, Json<ReadyResponse>) {
    debug!("Readiness check requested");
    let store = state.sessions.synchronizer().store();
    match store.ping().await {
        Ok(()) => (
            StatusCode::OK,
            Json(ReadyResponse {
                status: "ok".to_string(),
                message: "Service is ready".to_string(),
                storage: store.backend().to_string(),
            }),
        ),
        Err(e) => {
            warn!("Readiness check failed: {}", e);
            (
                StatusCode::SERVICE_UNAVAILABLE,
                Json(ReadyResponse {
                    status: "unavailable".to_string(),
                    message: e.to_string(),
                    storage: store.backend().to_string(),
                }),
            )
        }
    }
}
