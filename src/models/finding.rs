use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// One candidate vulnerability or informational item produced by a
/// pipeline stage. Findings live in memory during the run; only the
/// deduplicated subset is persisted.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Finding {
    pub id: Uuid,
    pub scan_id: Uuid,
    pub category: String,
    pub severity: Severity,
    pub title: String,
    pub description: String,
    pub affected_url: Option<String>,
    pub remediation: Option<String>,
    /// Opaque tool payload; may carry a tool-assigned `plugin_id` used
    /// as a fast duplicate-match key.
    pub tool_details: serde_json::Value,
}

impl Finding {
    pub fn new(scan_id: Uuid, category: &str, severity: Severity, title: &str) -> Self {
        Self {
            id: Uuid::new_v4(),
            scan_id,
            category: category.to_string(),
            severity,
            title: title.to_string(),
            description: String::new(),
            affected_url: None,
            remediation: None,
            tool_details: serde_json::json!({}),
        }
    }

    pub fn with_description(mut self, description: impl Into<String>) -> Self {
        self.description = description.into();
        self
    }

    pub fn with_url(mut self, url: impl Into<String>) -> Self {
        self.affected_url = Some(url.into());
        self
    }

    pub fn with_remediation(mut self, remediation: impl Into<String>) -> Self {
        self.remediation = Some(remediation.into());
        self
    }

    pub fn with_tool_details(mut self, details: serde_json::Value) -> Self {
        self.tool_details = details;
        self
    }

    /// Tool-assigned stable identifier for the check that produced this
    /// finding, when the tool provides one.
    pub fn plugin_id(&self) -> Option<&str> {
        self.tool_details.get("plugin_id").and_then(|v| v.as_str())
    }
}

/// Total severity order: Info < Low < Medium < High < Critical.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, PartialOrd, Ord, Hash)]
#[serde(rename_all = "lowercase")]
pub enum Severity {
    Info,
    Low,
    Medium,
    High,
    Critical,
}

impl Severity {
    pub fn as_str(&self) -> &'static str {
        match self {
            Severity::Critical => "critical",
            Severity::High => "high",
            Severity::Medium => "medium",
            Severity::Low => "low",
            Severity::Info => "info",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "critical" => Some(Severity::Critical),
            "high" => Some(Severity::High),
            "medium" => Some(Severity::Medium),
            "low" => Some(Severity::Low),
            "info" => Some(Severity::Info),
            _ => None,
        }
    }
}

/// Per-severity finding totals for one scan.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct SeverityCounts {
    pub critical: i32,
    pub high: i32,
    pub medium: i32,
    pub low: i32,
    pub info: i32,
}

impl SeverityCounts {
    /// Recompute totals from a set of findings.
    pub fn tally(findings: &[Finding]) -> Self {
        let mut counts = Self::default();
        for finding in findings {
            match finding.severity {
                Severity::Critical => counts.critical += 1,
                Severity::High => counts.high += 1,
                Severity::Medium => counts.medium += 1,
                Severity::Low => counts.low += 1,
                Severity::Info => counts.info += 1,
            }
        }
        counts
    }

    pub fn total(&self) -> i32 {
        self.critical + self.high + self.medium + self.low + self.info
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn severity_order_is_total() {
        assert!(Severity::Critical > Severity::High);
        assert!(Severity::High > Severity::Medium);
        assert!(Severity::Medium > Severity::Low);
        assert!(Severity::Low > Severity::Info);
    }

    #[test]
    fn tally_counts_each_tier() {
        let scan_id = Uuid::new_v4();
        let findings = vec![
            Finding::new(scan_id, "web", Severity::High, "a"),
            Finding::new(scan_id, "web", Severity::High, "b"),
            Finding::new(scan_id, "info", Severity::Info, "c"),
        ];
        let counts = SeverityCounts::tally(&findings);
        assert_eq!(counts.high, 2);
        assert_eq!(counts.info, 1);
        assert_eq!(counts.total(), 3);
    }
}
