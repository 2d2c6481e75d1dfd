use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::finding::SeverityCounts;
use super::scan::Scan;

/// Write-once summary of a finished scan. Creation is best-effort: a
/// failed report insert never flips the scan out of its terminal state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Report {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub summary: serde_json::Value,
    pub generated_at: DateTime<Utc>,
}

impl Report {
    pub fn for_scan(scan: &Scan, counts: &SeverityCounts) -> Self {
        Self {
            id: Uuid::new_v4(),
            scan_id: scan.id,
            summary: serde_json::json!({
                "target_url": scan.target_url,
                "depth": scan.depth.as_str(),
                "status": scan.status.as_str(),
                "total_findings": counts.total(),
                "severity_counts": counts,
            }),
            generated_at: Utc::now(),
        }
    }
}
