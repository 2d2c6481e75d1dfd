//! Web-server misconfiguration scanner adapter (nikto).

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;
use uuid::Uuid;

use super::WebServerScanner;
use crate::models::{Finding, ScanDepth, Severity};

pub struct NiktoWebScanner;

impl NiktoWebScanner {
    fn tier(depth: ScanDepth) -> (&'static str, Duration) {
        // (-maxtime argument, outer kill budget)
        match depth {
            ScanDepth::Shallow => ("60s", Duration::from_secs(90)),
            ScanDepth::Medium => ("300s", Duration::from_secs(360)),
            ScanDepth::Deep => ("900s", Duration::from_secs(960)),
        }
    }
}

#[async_trait]
impl WebServerScanner for NiktoWebScanner {
    async fn scan(
        &self,
        scan_id: Uuid,
        target: &str,
        depth: ScanDepth,
    ) -> anyhow::Result<Vec<Finding>> {
        let (maxtime, budget) = Self::tier(depth);

        let output = tokio::time::timeout(
            budget,
            Command::new("nikto")
                .args(["-h", target, "-nointeractive", "-maxtime", maxtime, "-ask", "no"])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("nikto timed out after {budget:?}"))??;

        // Nikto exits non-zero when it reports items; only a missing
        // binary or spawn failure reaches the caller as an error.
        Ok(parse_report(
            scan_id,
            target,
            &String::from_utf8_lossy(&output.stdout),
        ))
    }
}

/// Parse nikto's plain-text report. Finding lines start with "+ " and
/// often carry a stable check id ("+ OSVDB-3092: /admin/: ...") that we
/// keep as the plugin identity for deduplication.
fn parse_report(scan_id: Uuid, target: &str, stdout: &str) -> Vec<Finding> {
    let mut findings = Vec::new();
    for line in stdout.lines() {
        let Some(message) = line.strip_prefix("+ ") else {
            continue;
        };
        let message = message.trim();
        // Banner lines ("+ Target IP: ...", "+ Start Time: ...") are noise.
        if message.is_empty() || is_banner(message) {
            continue;
        }

        let plugin_id = message
            .split(':')
            .next()
            .filter(|head| head.starts_with("OSVDB-") || head.starts_with("CVE-"))
            .map(|head| head.to_string());

        let mut details = serde_json::json!({ "tool": "nikto", "raw": message });
        if let Some(ref id) = plugin_id {
            details["plugin_id"] = serde_json::json!(id);
        }

        findings.push(
            Finding::new(scan_id, "web", classify(message), title_of(message))
                .with_description(message)
                .with_url(target)
                .with_remediation("Review the reported server configuration item")
                .with_tool_details(details),
        );
    }
    findings
}

fn is_banner(message: &str) -> bool {
    const PREFIXES: [&str; 6] = [
        "Target IP:",
        "Target Hostname:",
        "Target Port:",
        "Start Time:",
        "End Time:",
        "Server:",
    ];
    PREFIXES.iter().any(|p| message.starts_with(p))
}

fn classify(message: &str) -> Severity {
    let lower = message.to_lowercase();
    if ["injection", "xss", "traversal", "remote file", "rce"]
        .iter()
        .any(|k| lower.contains(k))
    {
        Severity::Medium
    } else if lower.contains("osvdb") || lower.contains("cve-") || lower.contains("vulnerable") {
        Severity::Low
    } else {
        Severity::Info
    }
}

fn title_of(message: &str) -> &str {
    let end = message
        .char_indices()
        .nth(80)
        .map(|(i, _)| i)
        .unwrap_or(message.len());
    &message[..end]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_finding_lines_and_plugin_ids() {
        let scan_id = Uuid::new_v4();
        let report = "- Nikto v2.5.0\n\
                      + Target IP: 93.184.216.34\n\
                      + Server: nginx/1.18.0\n\
                      + OSVDB-3092: /admin/: This might be interesting.\n\
                      + The anti-clickjacking X-Frame-Options header is not present.\n";
        let findings = parse_report(scan_id, "https://example.com", report);
        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].plugin_id(), Some("OSVDB-3092"));
        assert!(findings[1].plugin_id().is_none());
        assert_eq!(findings[0].scan_id, scan_id);
    }

    #[test]
    fn classifies_injection_findings_higher() {
        assert_eq!(classify("possible SQL injection at /q"), Severity::Medium);
        assert_eq!(classify("OSVDB-123: something"), Severity::Low);
        assert_eq!(classify("header missing"), Severity::Info);
    }
}
