//! Scan lifecycle endpoints.

use axum::{
    Json,
    extract::{Path, Query, State},
    http::StatusCode,
};
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{AppState, ErrorResponse};
use crate::db::{ScanUpdate, Store};
use crate::models::{Finding, Scan, ScanDepth, ScanStatus, SeverityCounts};

// ============================================
// Request/Response Types
// ============================================

#[derive(Deserialize)]
pub struct StartScanRequest {
    pub target_url: String,
    #[serde(default = "default_depth")]
    pub depth: ScanDepth,
}

fn default_depth() -> ScanDepth {
    ScanDepth::Medium
}

#[derive(Serialize, Debug)]
pub struct StartScanResponse {
    pub scan_id: Uuid,
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Deserialize)]
pub struct ListScansQuery {
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    50
}

#[derive(Serialize)]
pub struct ListScansResponse {
    pub scans: Vec<Scan>,
    pub total: usize,
}

#[derive(Serialize, Debug)]
pub struct ScanResultsResponse {
    pub scan_id: Uuid,
    pub status: String,
    pub target_url: String,
    pub total_findings: i32,
    pub severity_counts: SeverityCounts,
    pub findings: Vec<Finding>,
}

#[derive(Serialize, Debug)]
pub struct CancelScanResponse {
    pub scan_id: Uuid,
    pub status: &'static str,
    pub message: &'static str,
}

#[derive(Serialize, Debug)]
pub struct ReportResponse {
    pub scan_id: Uuid,
    pub summary: serde_json::Value,
    pub generated_at: DateTime<Utc>,
}

// ============================================
// Helpers
// ============================================

type ApiError = (StatusCode, Json<ErrorResponse>);

fn db_error(e: impl std::fmt::Display) -> ApiError {
    tracing::error!("Database error: {}", e);
    (
        StatusCode::INTERNAL_SERVER_ERROR,
        Json(ErrorResponse::new("Database error", "DB_ERROR").with_details(e.to_string())),
    )
}

fn scan_not_found(scan_id: Uuid) -> ApiError {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorResponse::new(
            format!("Scan {} not found", scan_id),
            "SCAN_NOT_FOUND",
        )),
    )
}

/// Accept only absolute http(s) URLs with a host.
fn validate_target_url(raw: &str) -> Result<(), ApiError> {
    let parsed = reqwest::Url::parse(raw).map_err(|e| {
        (
            StatusCode::BAD_REQUEST,
            Json(
                ErrorResponse::new("Invalid target URL", "INVALID_TARGET_URL")
                    .with_details(e.to_string()),
            ),
        )
    })?;

    if !matches!(parsed.scheme(), "http" | "https") || parsed.host_str().is_none() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "Target URL must be an absolute http or https URL",
                "INVALID_TARGET_URL",
            )),
        ));
    }
    Ok(())
}

// ============================================
// Handlers
// ============================================

/// Start a new vulnerability scan.
///
/// Creates the scan record and launches the pipeline asynchronously;
/// the 202 response carries the id to poll. User-initiated scans are
/// not subject to the scheduler's concurrency cap.
pub async fn start_scan(
    State(state): State<AppState>,
    Json(req): Json<StartScanRequest>,
) -> Result<(StatusCode, Json<StartScanResponse>), ApiError> {
    validate_target_url(&req.target_url)?;

    let scan = Scan::new(req.target_url.clone(), req.depth);
    state.store.create_scan(&scan).await.map_err(db_error)?;

    tracing::info!(
        "Scan {} started for {} (depth {})",
        scan.id,
        scan.target_url,
        scan.depth.as_str()
    );

    let token = state.registry.register(scan.id);
    let launcher = state.launcher.clone();
    let scan_id = scan.id;
    let target_url = scan.target_url.clone();
    let depth = scan.depth;
    tokio::spawn(async move {
        launcher.launch(scan_id, target_url, depth, token).await;
    });

    Ok((
        StatusCode::ACCEPTED,
        Json(StartScanResponse {
            scan_id: scan.id,
            status: "pending",
            message: "Scan started",
        }),
    ))
}

/// List recent scans, newest first.
pub async fn list_scans(
    State(state): State<AppState>,
    Query(query): Query<ListScansQuery>,
) -> Result<Json<ListScansResponse>, ApiError> {
    let limit = query.limit.clamp(1, 200);
    let scans = state.store.list_scans(limit).await.map_err(db_error)?;
    let total = scans.len();
    Ok(Json(ListScansResponse { scans, total }))
}

/// Get the current status of one scan.
pub async fn get_scan_status(
    State(state): State<AppState>,
    Path(scan_id): Path<Uuid>,
) -> Result<Json<Scan>, ApiError> {
    let scan = state
        .store
        .get_scan(scan_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| scan_not_found(scan_id))?;
    Ok(Json(scan))
}

/// Get the persisted findings of a finished scan.
pub async fn get_scan_results(
    State(state): State<AppState>,
    Path(scan_id): Path<Uuid>,
) -> Result<Json<ScanResultsResponse>, ApiError> {
    let scan = state
        .store
        .get_scan(scan_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| scan_not_found(scan_id))?;

    if scan.status.is_active() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                "Scan is still running; results are available once it finishes",
                "SCAN_NOT_FINISHED",
            )),
        ));
    }

    let findings = state
        .store
        .findings_for_scan(scan_id)
        .await
        .map_err(db_error)?;

    Ok(Json(ScanResultsResponse {
        scan_id,
        status: scan.status.as_str().to_string(),
        target_url: scan.target_url,
        total_findings: scan.total_findings,
        severity_counts: scan.severity_counts,
        findings,
    }))
}

/// Cancel a running scan.
///
/// Cancellation is cooperative: the pipeline observes its token at the
/// next checkpoint, stops the scan daemon if one is active, and marks
/// the row `cancelled`. If the scan is active in the database but no
/// live token exists (orphaned after a restart), the row is marked
/// cancelled directly.
pub async fn cancel_scan(
    State(state): State<AppState>,
    Path(scan_id): Path<Uuid>,
) -> Result<Json<CancelScanResponse>, ApiError> {
    let scan = state
        .store
        .get_scan(scan_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| scan_not_found(scan_id))?;

    if scan.status.is_terminal() {
        return Err((
            StatusCode::BAD_REQUEST,
            Json(ErrorResponse::new(
                format!("Scan is already {}", scan.status.as_str()),
                "SCAN_NOT_ACTIVE",
            )),
        ));
    }

    if state.registry.cancel(scan_id) {
        tracing::info!("Cancellation requested for scan {}", scan_id);
        return Ok(Json(CancelScanResponse {
            scan_id,
            status: "cancelling",
            message: "Cancellation requested; the scan will stop at its next checkpoint",
        }));
    }

    // Active row without a live pipeline.
    tracing::warn!("Cancelling orphaned scan {} with no live pipeline", scan_id);
    let update = ScanUpdate {
        status: Some(ScanStatus::Cancelled),
        completed_at: Some(Utc::now()),
        ..ScanUpdate::default()
    };
    state
        .store
        .update_scan(scan_id, update)
        .await
        .map_err(db_error)?;

    Ok(Json(CancelScanResponse {
        scan_id,
        status: "cancelled",
        message: "Scan had no live pipeline and was marked cancelled",
    }))
}

/// Get the summary report generated when the scan finished.
pub async fn get_scan_report(
    State(state): State<AppState>,
    Path(scan_id): Path<Uuid>,
) -> Result<Json<ReportResponse>, ApiError> {
    // 404s distinguish an unknown scan from a scan without a report.
    state
        .store
        .get_scan(scan_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| scan_not_found(scan_id))?;

    let report = state
        .store
        .report_for_scan(scan_id)
        .await
        .map_err(db_error)?
        .ok_or_else(|| {
            (
                StatusCode::NOT_FOUND,
                Json(ErrorResponse::new(
                    "No report has been generated for this scan",
                    "REPORT_NOT_FOUND",
                )),
            )
        })?;

    Ok(Json(ReportResponse {
        scan_id,
        summary: report.summary,
        generated_at: report.generated_at,
    }))
}
