use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finding::SeverityCounts;

/// One pipeline execution against a single target.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Scan {
    pub id: Uuid,
    pub target_url: String,
    pub depth: ScanDepth,
    pub status: ScanStatus,
    /// 0..=100, monotonically non-decreasing while the scan is running.
    pub progress: i32,
    pub total_findings: i32,
    pub severity_counts: SeverityCounts,
    pub error_message: Option<String>,
    pub started_at: Option<DateTime<Utc>>,
    pub completed_at: Option<DateTime<Utc>>,
    pub created_at: DateTime<Utc>,
}

impl Scan {
    pub fn new(target_url: impl Into<String>, depth: ScanDepth) -> Self {
        Self {
            id: Uuid::new_v4(),
            target_url: target_url.into(),
            depth,
            status: ScanStatus::Pending,
            progress: 0,
            total_findings: 0,
            severity_counts: SeverityCounts::default(),
            error_message: None,
            started_at: None,
            completed_at: None,
            created_at: Utc::now(),
        }
    }
}

#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanStatus {
    Pending,
    Running,
    Completed,
    Cancelled,
    Failed,
}

impl ScanStatus {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanStatus::Pending => "pending",
            ScanStatus::Running => "running",
            ScanStatus::Completed => "completed",
            ScanStatus::Cancelled => "cancelled",
            ScanStatus::Failed => "failed",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "pending" => Some(ScanStatus::Pending),
            "running" => Some(ScanStatus::Running),
            "completed" => Some(ScanStatus::Completed),
            "cancelled" => Some(ScanStatus::Cancelled),
            "failed" => Some(ScanStatus::Failed),
            _ => None,
        }
    }

    /// Terminal scans are immutable; nothing transitions out of these.
    pub fn is_terminal(&self) -> bool {
        matches!(
            self,
            ScanStatus::Completed | ScanStatus::Cancelled | ScanStatus::Failed
        )
    }

    pub fn is_active(&self) -> bool {
        matches!(self, ScanStatus::Pending | ScanStatus::Running)
    }
}

/// Named depth tier controlling per-stage scope and timeouts.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ScanDepth {
    Shallow,
    Medium,
    Deep,
}

impl ScanDepth {
    pub fn as_str(&self) -> &'static str {
        match self {
            ScanDepth::Shallow => "shallow",
            ScanDepth::Medium => "medium",
            ScanDepth::Deep => "deep",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "shallow" => Some(ScanDepth::Shallow),
            "medium" => Some(ScanDepth::Medium),
            "deep" => Some(ScanDepth::Deep),
            _ => None,
        }
    }
}
