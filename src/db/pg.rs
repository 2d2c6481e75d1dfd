//! PostgreSQL-backed store.

use async_trait::async_trait;
use sqlx::{PgPool, Row, postgres::PgRow};
use uuid::Uuid;

use super::{ScanUpdate, Store};
use crate::error::StoreError;
use crate::models::{
    Finding, Frequency, Report, Scan, ScanDepth, ScanStatus, ScheduledScan, Severity,
    SeverityCounts,
};

#[derive(Clone)]
pub struct PgStore {
    pool: PgPool,
}

impl PgStore {
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }
}

fn scan_from_row(row: &PgRow) -> Result<Scan, StoreError> {
    let status: String = row.get("status");
    let depth: String = row.get("depth");
    Ok(Scan {
        id: row.get("id"),
        target_url: row.get("target_url"),
        depth: ScanDepth::parse(&depth)
            .ok_or_else(|| StoreError::Database(format!("unknown scan depth '{depth}'")))?,
        status: ScanStatus::parse(&status)
            .ok_or_else(|| StoreError::Database(format!("unknown scan status '{status}'")))?,
        progress: row.get("progress"),
        total_findings: row.get("total_findings"),
        severity_counts: SeverityCounts {
            critical: row.get("critical_count"),
            high: row.get("high_count"),
            medium: row.get("medium_count"),
            low: row.get("low_count"),
            info: row.get("info_count"),
        },
        error_message: row.get("error_message"),
        started_at: row.get("started_at"),
        completed_at: row.get("completed_at"),
        created_at: row.get("created_at"),
    })
}

fn finding_from_row(row: &PgRow) -> Result<Finding, StoreError> {
    let severity: String = row.get("severity");
    Ok(Finding {
        id: row.get("id"),
        scan_id: row.get("scan_id"),
        category: row.get("category"),
        severity: Severity::parse(&severity)
            .ok_or_else(|| StoreError::Database(format!("unknown severity '{severity}'")))?,
        title: row.get("title"),
        description: row.get("description"),
        affected_url: row.get("affected_url"),
        remediation: row.get("remediation"),
        tool_details: row.get("tool_details"),
    })
}

fn schedule_from_row(row: &PgRow) -> Result<ScheduledScan, StoreError> {
    let frequency: String = row.get("frequency");
    Ok(ScheduledScan {
        id: row.get("id"),
        target_url: row.get("target_url"),
        frequency: Frequency::parse(&frequency)
            .ok_or_else(|| StoreError::Database(format!("unknown frequency '{frequency}'")))?,
        time_of_day: row.get("time_of_day"),
        day_of_week: row.get::<Option<i32>, _>("day_of_week").map(|v| v as u32),
        day_of_month: row.get::<Option<i32>, _>("day_of_month").map(|v| v as u32),
        month: row.get::<Option<i32>, _>("month").map(|v| v as u32),
        enabled: row.get("enabled"),
        last_run: row.get("last_run"),
        next_run: row.get("next_run"),
        created_at: row.get("created_at"),
    })
}

#[async_trait]
impl Store for PgStore {
    async fn create_scan(&self, scan: &Scan) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO scan (
                id, target_url, depth, status, progress, total_findings,
                critical_count, high_count, medium_count, low_count, info_count,
                error_message, started_at, completed_at, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11, $12, $13, $14, $15)
            "#,
        )
        .bind(scan.id)
        .bind(&scan.target_url)
        .bind(scan.depth.as_str())
        .bind(scan.status.as_str())
        .bind(scan.progress)
        .bind(scan.total_findings)
        .bind(scan.severity_counts.critical)
        .bind(scan.severity_counts.high)
        .bind(scan.severity_counts.medium)
        .bind(scan.severity_counts.low)
        .bind(scan.severity_counts.info)
        .bind(&scan.error_message)
        .bind(scan.started_at)
        .bind(scan.completed_at)
        .bind(scan.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_scan(&self, id: Uuid, update: ScanUpdate) -> Result<(), StoreError> {
        // Terminal scans are immutable and progress never decreases;
        // both are enforced in the query itself.
        sqlx::query(
            r#"
            UPDATE scan SET
                status = COALESCE($2, status),
                progress = GREATEST(progress, COALESCE($3, progress)),
                started_at = COALESCE($4, started_at),
                completed_at = COALESCE($5, completed_at),
                critical_count = COALESCE($6, critical_count),
                high_count = COALESCE($7, high_count),
                medium_count = COALESCE($8, medium_count),
                low_count = COALESCE($9, low_count),
                info_count = COALESCE($10, info_count),
                total_findings = COALESCE($11, total_findings),
                error_message = COALESCE($12, error_message)
            WHERE id = $1 AND status IN ('pending', 'running')
            "#,
        )
        .bind(id)
        .bind(update.status.map(|s| s.as_str()))
        .bind(update.progress)
        .bind(update.started_at)
        .bind(update.completed_at)
        .bind(update.severity_counts.map(|c| c.critical))
        .bind(update.severity_counts.map(|c| c.high))
        .bind(update.severity_counts.map(|c| c.medium))
        .bind(update.severity_counts.map(|c| c.low))
        .bind(update.severity_counts.map(|c| c.info))
        .bind(update.total_findings)
        .bind(update.error_message)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_scan(&self, id: Uuid) -> Result<Option<Scan>, StoreError> {
        let row = sqlx::query("SELECT * FROM scan WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(scan_from_row).transpose()
    }

    async fn list_scans(&self, limit: i64) -> Result<Vec<Scan>, StoreError> {
        let rows = sqlx::query("SELECT * FROM scan ORDER BY created_at DESC LIMIT $1")
            .bind(limit)
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(scan_from_row).collect()
    }

    async fn count_active_scans(&self) -> Result<i64, StoreError> {
        let count: i64 =
            sqlx::query_scalar("SELECT COUNT(*) FROM scan WHERE status IN ('pending', 'running')")
                .fetch_one(&self.pool)
                .await?;
        Ok(count)
    }

    async fn create_finding(&self, finding: &Finding) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO finding (
                id, scan_id, category, severity, title, description,
                affected_url, remediation, tool_details
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9)
            "#,
        )
        .bind(finding.id)
        .bind(finding.scan_id)
        .bind(&finding.category)
        .bind(finding.severity.as_str())
        .bind(&finding.title)
        .bind(&finding.description)
        .bind(&finding.affected_url)
        .bind(&finding.remediation)
        .bind(&finding.tool_details)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn findings_for_scan(&self, scan_id: Uuid) -> Result<Vec<Finding>, StoreError> {
        let rows = sqlx::query(
            r#"
            SELECT * FROM finding WHERE scan_id = $1
            ORDER BY CASE severity
                WHEN 'critical' THEN 0
                WHEN 'high' THEN 1
                WHEN 'medium' THEN 2
                WHEN 'low' THEN 3
                ELSE 4
            END, created_at
            "#,
        )
        .bind(scan_id)
        .fetch_all(&self.pool)
        .await?;
        rows.iter().map(finding_from_row).collect()
    }

    async fn create_report(&self, report: &Report) -> Result<(), StoreError> {
        sqlx::query(
            "INSERT INTO report (id, scan_id, summary, generated_at) VALUES ($1, $2, $3, $4)",
        )
        .bind(report.id)
        .bind(report.scan_id)
        .bind(&report.summary)
        .bind(report.generated_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn report_for_scan(&self, scan_id: Uuid) -> Result<Option<Report>, StoreError> {
        let row = sqlx::query("SELECT * FROM report WHERE scan_id = $1")
            .bind(scan_id)
            .fetch_optional(&self.pool)
            .await?;
        Ok(row.map(|row| Report {
            id: row.get("id"),
            scan_id: row.get("scan_id"),
            summary: row.get("summary"),
            generated_at: row.get("generated_at"),
        }))
    }

    async fn create_schedule(&self, schedule: &ScheduledScan) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            INSERT INTO scheduled_scan (
                id, target_url, frequency, time_of_day, day_of_week,
                day_of_month, month, enabled, last_run, next_run, created_at
            )
            VALUES ($1, $2, $3, $4, $5, $6, $7, $8, $9, $10, $11)
            "#,
        )
        .bind(schedule.id)
        .bind(&schedule.target_url)
        .bind(schedule.frequency.as_str())
        .bind(&schedule.time_of_day)
        .bind(schedule.day_of_week.map(|v| v as i32))
        .bind(schedule.day_of_month.map(|v| v as i32))
        .bind(schedule.month.map(|v| v as i32))
        .bind(schedule.enabled)
        .bind(schedule.last_run)
        .bind(schedule.next_run)
        .bind(schedule.created_at)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn update_schedule(&self, schedule: &ScheduledScan) -> Result<(), StoreError> {
        sqlx::query(
            r#"
            UPDATE scheduled_scan SET
                target_url = $2, frequency = $3, time_of_day = $4,
                day_of_week = $5, day_of_month = $6, month = $7,
                enabled = $8, last_run = $9, next_run = $10
            WHERE id = $1
            "#,
        )
        .bind(schedule.id)
        .bind(&schedule.target_url)
        .bind(schedule.frequency.as_str())
        .bind(&schedule.time_of_day)
        .bind(schedule.day_of_week.map(|v| v as i32))
        .bind(schedule.day_of_month.map(|v| v as i32))
        .bind(schedule.month.map(|v| v as i32))
        .bind(schedule.enabled)
        .bind(schedule.last_run)
        .bind(schedule.next_run)
        .execute(&self.pool)
        .await?;
        Ok(())
    }

    async fn get_schedule(&self, id: Uuid) -> Result<Option<ScheduledScan>, StoreError> {
        let row = sqlx::query("SELECT * FROM scheduled_scan WHERE id = $1")
            .bind(id)
            .fetch_optional(&self.pool)
            .await?;
        row.as_ref().map(schedule_from_row).transpose()
    }

    async fn list_schedules(&self) -> Result<Vec<ScheduledScan>, StoreError> {
        let rows = sqlx::query("SELECT * FROM scheduled_scan ORDER BY created_at")
            .fetch_all(&self.pool)
            .await?;
        rows.iter().map(schedule_from_row).collect()
    }

    async fn delete_schedule(&self, id: Uuid) -> Result<bool, StoreError> {
        let result = sqlx::query("DELETE FROM scheduled_scan WHERE id = $1")
            .bind(id)
            .execute(&self.pool)
            .await?;
        Ok(result.rows_affected() > 0)
    }
}
