use crate::{auth::auth, models::{DiagnosticsResponse, ErrorResponse}, AppState};
use axum::{extract::{State, Extension}, http::StatusCode, Json};
use std::sync::{Mutex, OnceLock};
use sysinfo::System;
use tracing::info;

static SYSTEM_MONITOR: OnceLock<Mutex<System>> = OnceLock::new();

/// Report session counts and process load
pub async fn diagnostics(
    State(state): State<AppState>,
    Extension(prpls): Extension<Vec<String>>,
) -> Result<(StatusCode, Json<DiagnosticsResponse>), (StatusCode, Json<ErrorResponse>)> {

    // Ensure the caller is a cloud admin
    let _ = auth::ensure_cloud_admin(&prpls)?;

    // Aggregate diagnostics from the registry
    let mut n_conn: u32 = 0;
    let mut n_sessions: u32 = 0;
    let mut n_dirty_sessions: u32 = 0;
    for session in state.sessions.registry().sessions() {
        n_sessions += 1;
        n_conn += session.connection_count() as u32;
        if session.lock().await.dirty {
            n_dirty_sessions += 1;
        }
    }

    // System stats
    let (cpu_usage, memory_alloc, memory_free, memory_total) = {
        let sys_lock = SYSTEM_MONITOR.get_or_init(|| {
            Mutex::new(System::new_all())
        });
        match sys_lock.lock() {
            Ok(mut sys) => {
                sys.refresh_cpu();
                sys.refresh_memory();
                (
                    sys.global_cpu_info().cpu_usage(),
                    sys.used_memory(),
                    sys.free_memory(),
                    sys.total_memory(),
                )
            }
            Err(_) => (0.0, 0, 0, 0)
        }
    };

    info!(
        "Diagnostics: CPU: {:.2}%, Mem: {}/{} MB (Free: {} MB), Conn: {}, Sessions: {} ({} dirty)",
        cpu_usage,
        memory_alloc / 1024 / 1024,
        memory_total / 1024 / 1024,
        memory_free / 1024 / 1024,
        n_conn,
        n_sessions,
        n_dirty_sessions
    );

    Ok((
        StatusCode::OK,
        Json(DiagnosticsResponse {
            n_conn,
            n_sessions,
            n_dirty_sessions,
            cpu_usage,
            memory_alloc,
            memory_total,
            memory_free,
        }),
    ))
}
