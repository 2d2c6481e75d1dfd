//! Active-scan poller.
//!
//! Drives the external scan daemon through readiness check, session
//! reset, target access, spidering and active scanning, then collects
//! alerts. Cancellation is checked before every poll; when it fires the
//! poller tells the daemon to stop its in-flight job before raising
//! cancellation upward.

use std::sync::Arc;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::daemon::{DaemonAlert, ScanDaemon};
use crate::error::PipelineError;
use crate::models::{Finding, ScanDepth, Severity};

/// Readiness backoff: 5 attempts at 500ms, 1s, 2s, 4s, 8s.
const READY_ATTEMPTS: u32 = 5;
const READY_BASE_DELAY: Duration = Duration::from_millis(500);

/// Fixed short interval for spider and active-scan status polls.
const POLL_INTERVAL: Duration = Duration::from_secs(2);

/// Status-poll failures tolerated before declaring the daemon gone.
const MAX_CONSECUTIVE_FAILURES: u32 = 10;

/// Spider page-count ceiling per tier; 0 = unbounded.
fn spider_max_children(depth: ScanDepth) -> u32 {
    match depth {
        ScanDepth::Shallow => 10,
        ScanDepth::Medium => 50,
        ScanDepth::Deep => 0,
    }
}

fn spider_budget(depth: ScanDepth) -> Duration {
    match depth {
        ScanDepth::Shallow => Duration::from_secs(60),
        ScanDepth::Medium => Duration::from_secs(300),
        ScanDepth::Deep => Duration::from_secs(900),
    }
}

fn active_scan_budget(depth: ScanDepth) -> Duration {
    match depth {
        ScanDepth::Shallow => Duration::from_secs(300),
        ScanDepth::Medium => Duration::from_secs(900),
        ScanDepth::Deep => Duration::from_secs(3600),
    }
}

/// Run the full poller state machine and return the collected findings.
///
/// Fractional active-scan progress (0-100) is emitted on `progress`;
/// the orchestrator remaps it into the ActiveScan window.
pub async fn run_active_scan(
    daemon: Arc<dyn ScanDaemon>,
    scan_id: Uuid,
    target: &str,
    depth: ScanDepth,
    token: &CancellationToken,
    progress: mpsc::Sender<u8>,
) -> Result<Vec<Finding>, PipelineError> {
    wait_until_ready(daemon.as_ref(), token).await?;

    // Session reset is pure resource hygiene; the daemon accumulates
    // crawl and alert state across scans otherwise.
    if let Err(e) = daemon.new_session().await {
        tracing::warn!("Session reset failed (continuing): {}", e);
    }

    if let Err(e) = daemon.access_url(target).await {
        tracing::warn!("Target access via daemon failed (continuing): {}", e);
    }

    run_spider(daemon.as_ref(), target, depth, token).await?;

    let remote_id = daemon
        .start_active_scan(target)
        .await
        .map_err(|e| PipelineError::DaemonUnavailable(e.to_string()))?;
    tracing::info!(
        "Active scan started for scan {} (daemon id {})",
        scan_id,
        remote_id
    );

    let timed_out = wait_for_active_scan(daemon.as_ref(), &remote_id, depth, token, &progress).await?;

    let findings = collect_alerts(daemon.as_ref(), scan_id, target).await;
    if timed_out {
        if findings.is_empty() {
            return Err(PipelineError::StageTimeout(active_scan_budget(depth)));
        }
        tracing::warn!(
            "Active scan for {} timed out; keeping {} retrievable findings",
            scan_id,
            findings.len()
        );
    }
    Ok(findings)
}

/// Bounded readiness check with exponential backoff.
async fn wait_until_ready(
    daemon: &dyn ScanDaemon,
    token: &CancellationToken,
) -> Result<(), PipelineError> {
    let mut delay = READY_BASE_DELAY;
    let mut last_error = String::new();

    for attempt in 1..=READY_ATTEMPTS {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        match daemon.version().await {
            Ok(version) => {
                tracing::debug!("Scan daemon ready (version {})", version);
                return Ok(());
            }
            Err(e) => {
                tracing::warn!(
                    "Daemon readiness check failed (attempt {}/{}): {}",
                    attempt,
                    READY_ATTEMPTS,
                    e
                );
                last_error = e.to_string();
            }
        }
        if attempt < READY_ATTEMPTS {
            tokio::time::sleep(delay).await;
            delay *= 2;
        }
    }

    Err(PipelineError::DaemonUnavailable(last_error))
}

/// Spider the target. A spider timeout is non-fatal: partial crawl data
/// still feeds the active scan.
async fn run_spider(
    daemon: &dyn ScanDaemon,
    target: &str,
    depth: ScanDepth,
    token: &CancellationToken,
) -> Result<(), PipelineError> {
    let spider_id = match daemon.start_spider(target, spider_max_children(depth)).await {
        Ok(id) => id,
        Err(e) => {
            tracing::warn!("Spider start failed (continuing to active scan): {}", e);
            return Ok(());
        }
    };

    let deadline = tokio::time::Instant::now() + spider_budget(depth);
    let mut failures = 0u32;

    loop {
        if token.is_cancelled() {
            return Err(PipelineError::Cancelled);
        }
        if tokio::time::Instant::now() >= deadline {
            tracing::warn!("Spider did not finish within budget; proceeding with partial crawl");
            return Ok(());
        }

        match daemon.spider_status(&spider_id).await {
            Ok(100) => return Ok(()),
            Ok(_) => failures = 0,
            Err(e) => {
                failures += 1;
                tracing::warn!("Spider status poll failed ({}/{}): {}", failures, MAX_CONSECUTIVE_FAILURES, e);
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    return Err(PipelineError::DaemonUnavailable(e.to_string()));
                }
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Poll the active scan to completion. Returns true when the time
/// budget ran out before the daemon reported 100%.
async fn wait_for_active_scan(
    daemon: &dyn ScanDaemon,
    remote_id: &str,
    depth: ScanDepth,
    token: &CancellationToken,
    progress: &mpsc::Sender<u8>,
) -> Result<bool, PipelineError> {
    let deadline = tokio::time::Instant::now() + active_scan_budget(depth);
    let mut failures = 0u32;

    loop {
        if token.is_cancelled() {
            // Best-effort stop so the daemon does not keep attacking
            // the target after the user walked away.
            if let Err(e) = daemon.stop_active_scan(remote_id).await {
                tracing::warn!("Daemon stop after cancellation failed: {}", e);
            }
            return Err(PipelineError::Cancelled);
        }
        if tokio::time::Instant::now() >= deadline {
            if let Err(e) = daemon.stop_active_scan(remote_id).await {
                tracing::warn!("Daemon stop after timeout failed: {}", e);
            }
            return Ok(true);
        }

        match daemon.active_scan_status(remote_id).await {
            Ok(pct) => {
                failures = 0;
                // Progress is advisory; drop events when the consumer
                // lags rather than stalling the poll loop.
                let _ = progress.try_send(pct.min(100));
                if pct >= 100 {
                    return Ok(false);
                }
            }
            Err(e) => {
                failures += 1;
                tracing::warn!("Active-scan status poll failed ({}/{}): {}", failures, MAX_CONSECUTIVE_FAILURES, e);
                if failures >= MAX_CONSECUTIVE_FAILURES {
                    return Err(PipelineError::DaemonUnavailable(e.to_string()));
                }
            }
        }
        tokio::time::sleep(POLL_INTERVAL).await;
    }
}

/// Fetch alerts; a fetch failure yields an empty list rather than an
/// error.
async fn collect_alerts(daemon: &dyn ScanDaemon, scan_id: Uuid, target: &str) -> Vec<Finding> {
    match daemon.alerts(target).await {
        Ok(alerts) => alerts
            .into_iter()
            .map(|alert| finding_from_alert(scan_id, alert))
            .collect(),
        Err(e) => {
            tracing::warn!("Alert fetch failed for scan {}: {}", scan_id, e);
            Vec::new()
        }
    }
}

fn finding_from_alert(scan_id: Uuid, alert: DaemonAlert) -> Finding {
    let mut details = serde_json::json!({ "tool": "daemon", "risk": alert.risk });
    if let Some(ref plugin_id) = alert.plugin_id {
        details["plugin_id"] = serde_json::json!(plugin_id);
    }

    let mut finding = Finding::new(scan_id, "web", map_risk(&alert.risk), &alert.name)
        .with_description(alert.description)
        .with_tool_details(details);
    if let Some(url) = alert.url {
        finding = finding.with_url(url);
    }
    if let Some(solution) = alert.solution {
        finding = finding.with_remediation(solution);
    }
    finding
}

/// Daemon risk code -> severity. Unknown codes map to the lowest tier;
/// never over-report severity on unrecognized input.
pub fn map_risk(risk: &str) -> Severity {
    match risk.trim().to_lowercase().as_str() {
        "high" | "3" => Severity::High,
        "medium" | "2" => Severity::Medium,
        "low" | "1" => Severity::Low,
        "informational" | "info" | "0" => Severity::Info,
        _ => Severity::Info,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicU32, Ordering};

    use async_trait::async_trait;

    use crate::error::DaemonError;

    /// Scripted daemon for poller tests.
    #[derive(Default)]
    struct FakeDaemon {
        ready: bool,
        version_calls: AtomicU32,
        /// Active-scan statuses returned in order; the last repeats.
        ascan_statuses: Mutex<Vec<u8>>,
        alerts: Mutex<Vec<DaemonAlert>>,
        stop_calls: AtomicU32,
        /// Cancel this token as a side effect of the first status poll.
        cancel_on_status: Mutex<Option<CancellationToken>>,
    }

    #[async_trait]
    impl ScanDaemon for FakeDaemon {
        async fn version(&self) -> Result<String, DaemonError> {
            self.version_calls.fetch_add(1, Ordering::SeqCst);
            if self.ready {
                Ok("2.14.0".into())
            } else {
                Err(DaemonError::Network("connection refused".into()))
            }
        }

        async fn new_session(&self) -> Result<(), DaemonError> {
            Ok(())
        }

        async fn access_url(&self, _target: &str) -> Result<(), DaemonError> {
            Ok(())
        }

        async fn start_spider(&self, _target: &str, _max: u32) -> Result<String, DaemonError> {
            Ok("0".into())
        }

        async fn spider_status(&self, _spider_id: &str) -> Result<u8, DaemonError> {
            Ok(100)
        }

        async fn start_active_scan(&self, _target: &str) -> Result<String, DaemonError> {
            Ok("1".into())
        }

        async fn active_scan_status(&self, _scan_id: &str) -> Result<u8, DaemonError> {
            if let Some(token) = self.cancel_on_status.lock().unwrap().take() {
                token.cancel();
            }
            let mut statuses = self.ascan_statuses.lock().unwrap();
            if statuses.len() > 1 {
                Ok(statuses.remove(0))
            } else {
                Ok(*statuses.first().unwrap_or(&100))
            }
        }

        async fn stop_active_scan(&self, _scan_id: &str) -> Result<(), DaemonError> {
            self.stop_calls.fetch_add(1, Ordering::SeqCst);
            Ok(())
        }

        async fn alerts(&self, _target: &str) -> Result<Vec<DaemonAlert>, DaemonError> {
            Ok(self.alerts.lock().unwrap().clone())
        }
    }

    fn alert(name: &str, risk: &str) -> DaemonAlert {
        DaemonAlert {
            plugin_id: Some("40012".into()),
            name: name.into(),
            risk: risk.into(),
            description: "d".into(),
            url: Some("https://example.com/q".into()),
            solution: None,
        }
    }

    #[test]
    fn risk_codes_map_to_severity_tiers() {
        assert_eq!(map_risk("High"), Severity::High);
        assert_eq!(map_risk("3"), Severity::High);
        assert_eq!(map_risk("Medium"), Severity::Medium);
        assert_eq!(map_risk("1"), Severity::Low);
        assert_eq!(map_risk("Informational"), Severity::Info);
        // Unknown codes never over-report.
        assert_eq!(map_risk("EXTREME"), Severity::Info);
    }

    #[tokio::test(start_paused = true)]
    async fn readiness_backoff_exhausts_into_daemon_unavailable() {
        let daemon = Arc::new(FakeDaemon::default());
        let token = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(16);

        let err = run_active_scan(
            daemon.clone(),
            Uuid::new_v4(),
            "https://example.com",
            ScanDepth::Shallow,
            &token,
            tx,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::DaemonUnavailable(_)));
        assert_eq!(daemon.version_calls.load(Ordering::SeqCst), READY_ATTEMPTS);
    }

    #[tokio::test(start_paused = true)]
    async fn completed_scan_collects_and_maps_alerts() {
        let daemon = Arc::new(FakeDaemon {
            ready: true,
            ascan_statuses: Mutex::new(vec![40, 80, 100]),
            alerts: Mutex::new(vec![alert("Reflected XSS", "High"), alert("Cookie flag", "Low")]),
            ..FakeDaemon::default()
        });
        let token = CancellationToken::new();
        let (tx, mut rx) = mpsc::channel(16);
        let scan_id = Uuid::new_v4();

        let findings = run_active_scan(
            daemon,
            scan_id,
            "https://example.com",
            ScanDepth::Shallow,
            &token,
            tx,
        )
        .await
        .unwrap();

        assert_eq!(findings.len(), 2);
        assert_eq!(findings[0].severity, Severity::High);
        assert_eq!(findings[0].plugin_id(), Some("40012"));
        assert_eq!(findings[0].scan_id, scan_id);

        // Progress events were emitted for each status poll.
        let mut seen = Vec::new();
        while let Ok(pct) = rx.try_recv() {
            seen.push(pct);
        }
        assert_eq!(seen, vec![40, 80, 100]);
    }

    #[tokio::test(start_paused = true)]
    async fn cancellation_stops_daemon_before_propagating() {
        let token = CancellationToken::new();
        let daemon = Arc::new(FakeDaemon {
            ready: true,
            ascan_statuses: Mutex::new(vec![10]),
            cancel_on_status: Mutex::new(Some(token.clone())),
            ..FakeDaemon::default()
        });
        let (tx, _rx) = mpsc::channel(16);

        let err = run_active_scan(
            daemon.clone(),
            Uuid::new_v4(),
            "https://example.com",
            ScanDepth::Shallow,
            &token,
            tx,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::Cancelled));
        assert_eq!(daemon.stop_calls.load(Ordering::SeqCst), 1);
    }

    #[tokio::test(start_paused = true)]
    async fn timeout_with_no_alerts_is_stage_timeout() {
        let daemon = Arc::new(FakeDaemon {
            ready: true,
            // Never reaches 100.
            ascan_statuses: Mutex::new(vec![42]),
            ..FakeDaemon::default()
        });
        let token = CancellationToken::new();
        let (tx, _rx) = mpsc::channel(16);

        let err = run_active_scan(
            daemon.clone(),
            Uuid::new_v4(),
            "https://example.com",
            ScanDepth::Shallow,
            &token,
            tx,
        )
        .await
        .unwrap_err();

        assert!(matches!(err, PipelineError::StageTimeout(_)));
        assert_eq!(daemon.stop_calls.load(Ordering::SeqCst), 1);
    }
}
