use utoipa::OpenApi;
use crate::models::*;

/// Health check endpoint
#[utoipa::path(
    get,
    path = "/api/health",
    responses(
        (status = 200, description = "Service is healthy", body = HealthResponse)
    )
)]
#[allow(dead_code)]
pub async fn health_check_doc() {}

/// Readiness check, verifies durable storage
#[utoipa::path(
    get,
    path = "/api/ready",
    responses(
        (status = 200, description = "Service is ready", body = ReadyResponse),
        (status = 503, description = "Storage unreachable", body = ReadyResponse)
    )
)]
#[allow(dead_code)]
pub async fn ready_check_doc() {}

/// Snapshot of a session
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{session_id}",
    params(
        ("session_id" = String, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Live or stored session state", body = SessionSnapshotResponse),
        (status = 404, description = "Unknown session", body = ErrorResponse),
        (status = 503, description = "Storage unreachable", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn session_snapshot_doc() {}

/// Roster of a session
#[utoipa::path(
    get,
    path = "/api/v1/sessions/{session_id}/participants",
    params(
        ("session_id" = String, Path, description = "Session identifier")
    ),
    responses(
        (status = 200, description = "Participants ordered by join time", body = [Participant]),
        (status = 404, description = "Unknown session", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn session_participants_doc() {}

/// Process diagnostics, cloud admins only
#[utoipa::path(
    get,
    path = "/api/v1/diagnostics",
    responses(
        (status = 200, description = "Session counts and system load", body = DiagnosticsResponse),
        (status = 401, description = "Missing or invalid token"),
        (status = 403, description = "Cloud Admin access required", body = ErrorResponse)
    )
)]
#[allow(dead_code)]
pub async fn diagnostics_doc() {}

#[derive(OpenApi)]
#[openapi(
    paths(
        health_check_doc,
        ready_check_doc,
        session_snapshot_doc,
        session_participants_doc,
        diagnostics_doc,
    ),
    components(
        schemas(
            HealthResponse,
            ReadyResponse,
            SessionSnapshotResponse,
            SnapshotSource,
            Participant,
            Language,
            DiagnosticsResponse,
            ErrorResponse
        )
    ),
    tags(
        (name = "api", description = "API endpoints")
    )
)]
pub struct ApiDoc;
