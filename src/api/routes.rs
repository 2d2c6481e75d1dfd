use axum::{
    Router,
    routing::{get, post},
};

use super::AppState;
use super::{scan, schedule};

/// V1 API routes
///
/// ## Scans
/// - POST /scan/start - Start a vulnerability scan
/// - GET  /scan/list - List recent scans
/// - GET  /scan/{scan_id} - Get scan status
/// - POST /scan/{scan_id}/cancel - Cancel a running scan
/// - GET  /scan/{scan_id}/results - Get scan findings
/// - GET  /scan/{scan_id}/report - Get the scan's summary report
///
/// ## Schedules
/// - POST   /schedules - Create a recurring scan
/// - GET    /schedules - List schedules
/// - GET    /schedules/{schedule_id} - Get one schedule
/// - PUT    /schedules/{schedule_id} - Update a schedule
/// - DELETE /schedules/{schedule_id} - Delete a schedule
pub fn v1_routes() -> Router<AppState> {
    Router::new()
        // ========================================
        // Scans
        // ========================================
        .route("/scan/start", post(scan::start_scan))
        .route("/scan/list", get(scan::list_scans))
        .route("/scan/{scan_id}", get(scan::get_scan_status))
        .route("/scan/{scan_id}/cancel", post(scan::cancel_scan))
        .route("/scan/{scan_id}/results", get(scan::get_scan_results))
        .route("/scan/{scan_id}/report", get(scan::get_scan_report))
        // ========================================
        // Schedules
        // ========================================
        .route(
            "/schedules",
            post(schedule::create_schedule).get(schedule::list_schedules),
        )
        .route(
            "/schedules/{schedule_id}",
            get(schedule::get_schedule)
                .put(schedule::update_schedule)
                .delete(schedule::delete_schedule),
        )
}
