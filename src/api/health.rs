use axum::{Json, extract::State};
use serde::Serialize;

use super::AppState;
use crate::db::Store;

#[derive(Serialize)]
pub struct HealthResponse {
    pub status: &'static str,
    pub version: &'static str,
    pub services: ServiceStatus,
}

#[derive(Serialize)]
pub struct ServiceStatus {
    pub database: bool,
}

#[derive(Serialize)]
pub struct PingResponse {
    pub status: &'static str,
}

/// Lightweight liveness probe for container healthchecks.
/// Returns 200 immediately with no database call; use `/health` for
/// the full diagnostic check.
pub async fn ping() -> Json<PingResponse> {
    Json(PingResponse { status: "ok" })
}

/// Full health check — exercises the database.
pub async fn health_check(State(state): State<AppState>) -> Json<HealthResponse> {
    let db_healthy = state.store.count_active_scans().await.is_ok();

    Json(HealthResponse {
        status: if db_healthy { "healthy" } else { "degraded" },
        version: env!("CARGO_PKG_VERSION"),
        services: ServiceStatus {
            database: db_healthy,
        },
    })
}
