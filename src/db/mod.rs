//! Persistence layer.
//!
//! The orchestrator and scheduler only ever talk to the [`Store`]
//! trait; `PgStore` is the production backend and the in-memory store
//! backs unit tests.

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use uuid::Uuid;

use crate::error::StoreError;
use crate::models::{Finding, Report, Scan, ScanStatus, ScheduledScan, SeverityCounts};

#[cfg(test)]
pub mod memory;
pub mod pg;

pub use pg::PgStore;

/// Partial update of a scan row. `None` fields are left untouched.
///
/// Progress writes are clamped monotone non-decreasing by the store,
/// and no update is applied once the scan reached a terminal status —
/// both invariants live here so every caller gets them for free.
#[derive(Debug, Default, Clone)]
pub struct ScanUpdate {
    pub status: Option<ScanStatus>,
    pub progress: Option<i32>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub severity_counts: Option<SeverityCounts>,
    pub total_findings: Option<i32>,
    pub error_message: Option<String>,
}

impl ScanUpdate {
    pub fn progress(progress: i32) -> Self {
        Self {
            progress: Some(progress),
            ..Self::default()
        }
    }
}

#[async_trait]
pub trait Store: Send + Sync {
    // ── Scans ────────────────────────────────────────────────────────
    async fn create_scan(&self, scan: &Scan) -> Result<(), StoreError>;
    async fn update_scan(&self, id: Uuid, update: ScanUpdate) -> Result<(), StoreError>;
    async fn get_scan(&self, id: Uuid) -> Result<Option<Scan>, StoreError>;
    async fn list_scans(&self, limit: i64) -> Result<Vec<Scan>, StoreError>;
    /// Number of scans currently `pending` or `running`.
    async fn count_active_scans(&self) -> Result<i64, StoreError>;

    // ── Findings ─────────────────────────────────────────────────────
    async fn create_finding(&self, finding: &Finding) -> Result<(), StoreError>;
    async fn findings_for_scan(&self, scan_id: Uuid) -> Result<Vec<Finding>, StoreError>;

    // ── Reports ──────────────────────────────────────────────────────
    async fn create_report(&self, report: &Report) -> Result<(), StoreError>;
    async fn report_for_scan(&self, scan_id: Uuid) -> Result<Option<Report>, StoreError>;

    // ── Schedules ────────────────────────────────────────────────────
    async fn create_schedule(&self, schedule: &ScheduledScan) -> Result<(), StoreError>;
    /// Full-row replace; the scheduler mutates `last_run`/`next_run`
    /// and writes the whole record back.
    async fn update_schedule(&self, schedule: &ScheduledScan) -> Result<(), StoreError>;
    async fn get_schedule(&self, id: Uuid) -> Result<Option<ScheduledScan>, StoreError>;
    async fn list_schedules(&self) -> Result<Vec<ScheduledScan>, StoreError>;
    async fn delete_schedule(&self, id: Uuid) -> Result<bool, StoreError>;
}
