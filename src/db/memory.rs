//! In-memory store for unit tests.
//!
//! Mirrors the invariants `PgStore` enforces in SQL: terminal scans are
//! immutable and progress writes are clamped monotone.

use std::collections::HashMap;
use std::sync::Mutex;

use async_trait::async_trait;
use uuid::Uuid;

use super::{ScanUpdate, Store};
use crate::error::StoreError;
use crate::models::{Finding, Report, Scan, ScanStatus, ScheduledScan};

#[derive(Default)]
pub struct MemoryStore {
    scans: Mutex<HashMap<Uuid, Scan>>,
    findings: Mutex<Vec<Finding>>,
    reports: Mutex<HashMap<Uuid, Report>>,
    schedules: Mutex<HashMap<Uuid, ScheduledScan>>,
    /// When set, `create_report` fails — used to test best-effort
    /// report creation.
    pub fail_reports: Mutex<bool>,
    /// When set, the update that completes a scan fails — used to test
    /// how the pipeline orders terminal writes against finding
    /// persistence.
    pub fail_completion: Mutex<bool>,
    /// Progress-only updates inside this inclusive range fail — used to
    /// test that advisory progress writes are absorbed.
    pub fail_progress_range: Mutex<Option<(i32, i32)>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl Store for MemoryStore {
    async fn create_scan(&self, scan: &Scan) -> Result<(), StoreError> {
        self.scans.lock().unwrap().insert(scan.id, scan.clone());
        Ok(())
    }

    async fn update_scan(&self, id: Uuid, update: ScanUpdate) -> Result<(), StoreError> {
        if matches!(update.status, Some(ScanStatus::Completed))
            && *self.fail_completion.lock().unwrap()
        {
            return Err(StoreError::Database("completion update failed".into()));
        }
        if update.status.is_none() {
            if let (Some(progress), Some((lo, hi))) =
                (update.progress, *self.fail_progress_range.lock().unwrap())
            {
                if (lo..=hi).contains(&progress) {
                    return Err(StoreError::Database("progress update failed".into()));
                }
            }
        }
        let mut scans = self.scans.lock().unwrap();
        let Some(scan) = scans.get_mut(&id) else {
            return Ok(());
        };
        if scan.status.is_terminal() {
            return Ok(());
        }
        if let Some(status) = update.status {
            scan.status = status;
        }
        if let Some(progress) = update.progress {
            scan.progress = scan.progress.max(progress);
        }
        if let Some(started_at) = update.started_at {
            scan.started_at = Some(started_at);
        }
        if let Some(completed_at) = update.completed_at {
            scan.completed_at = Some(completed_at);
        }
        if let Some(counts) = update.severity_counts {
            scan.severity_counts = counts;
        }
        if let Some(total) = update.total_findings {
            scan.total_findings = total;
        }
        if let Some(message) = update.error_message {
            scan.error_message = Some(message);
        }
        Ok(())
    }

    async fn get_scan(&self, id: Uuid) -> Result<Option<Scan>, StoreError> {
        Ok(self.scans.lock().unwrap().get(&id).cloned())
    }

    async fn list_scans(&self, limit: i64) -> Result<Vec<Scan>, StoreError> {
        let mut scans: Vec<Scan> = self.scans.lock().unwrap().values().cloned().collect();
        scans.sort_by(|a, b| b.created_at.cmp(&a.created_at));
        scans.truncate(limit as usize);
        Ok(scans)
    }

    async fn count_active_scans(&self) -> Result<i64, StoreError> {
        Ok(self
            .scans
            .lock()
            .unwrap()
            .values()
            .filter(|s| s.status.is_active())
            .count() as i64)
    }

    async fn create_finding(&self, finding: &Finding) -> Result<(), StoreError> {
        self.findings.lock().unwrap().push(finding.clone());
        Ok(())
    }

    async fn findings_for_scan(&self, scan_id: Uuid) -> Result<Vec<Finding>, StoreError> {
        Ok(self
            .findings
            .lock()
            .unwrap()
            .iter()
            .filter(|f| f.scan_id == scan_id)
            .cloned()
            .collect())
    }

    async fn create_report(&self, report: &Report) -> Result<(), StoreError> {
        if *self.fail_reports.lock().unwrap() {
            return Err(StoreError::Database("report insert failed".into()));
        }
        self.reports
            .lock()
            .unwrap()
            .insert(report.scan_id, report.clone());
        Ok(())
    }

    async fn report_for_scan(&self, scan_id: Uuid) -> Result<Option<Report>, StoreError> {
        Ok(self.reports.lock().unwrap().get(&scan_id).cloned())
    }

    async fn create_schedule(&self, schedule: &ScheduledScan) -> Result<(), StoreError> {
        self.schedules
            .lock()
            .unwrap()
            .insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn update_schedule(&self, schedule: &ScheduledScan) -> Result<(), StoreError> {
        self.schedules
            .lock()
            .unwrap()
            .insert(schedule.id, schedule.clone());
        Ok(())
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<ScheduledScan>, StoreError> {
        Ok(self.schedules.lock().unwrap().get(&id).cloned())
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduledScan>, StoreError> {
        let mut schedules: Vec<ScheduledScan> =
            self.schedules.lock().unwrap().values().cloned().collect();
        schedules.sort_by(|a, b| a.created_at.cmp(&b.created_at));
        Ok(schedules)
    }

    async fn delete_schedule(&self, id: Uuid) -> Result<bool, StoreError> {
        Ok(self.schedules.lock().unwrap().remove(&id).is_some())
    }
}
