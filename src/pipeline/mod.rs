//! Scan pipeline orchestrator.
//!
//! Stages run strictly in order — Validate, PortScan, WebServerScan,
//! ActiveScan, Finalize — each owning a fixed window of the overall
//! progress scale. Per-stage tool failures are absorbed (the stage
//! contributes nothing); only user cancellation and unexpected errors
//! abort the run.

use std::sync::Arc;
use std::time::Duration;

use chrono::Utc;
use tokio::sync::mpsc;
use tokio_util::sync::CancellationToken;
use uuid::Uuid;

use crate::daemon::ScanDaemon;
use crate::db::{ScanUpdate, Store};
use crate::error::PipelineError;
use crate::models::{Finding, Report, ScanDepth, ScanStatus, Severity, SeverityCounts};
use crate::probes::{OpenPort, PortScanner, Prober, WebServerScanner, host_of};
use crate::registry::CancelRegistry;

pub mod dedupe;
pub mod poller;
pub mod progress;

use progress::{ProgressTracker, Window};

pub const VALIDATE_WINDOW: Window = Window { lo: 0, hi: 10 };
pub const PORT_SCAN_WINDOW: Window = Window { lo: 10, hi: 35 };
pub const WEB_SCAN_WINDOW: Window = Window { lo: 35, hi: 60 };
pub const ACTIVE_SCAN_WINDOW: Window = Window { lo: 60, hi: 95 };
pub const FINALIZE_WINDOW: Window = Window { lo: 95, hi: 100 };

/// Duration of the quick traversal through a skipped stage's window.
const SKIP_ANIMATION: Duration = Duration::from_millis(600);
const SKIP_ANIMATION_STEPS: u32 = 4;

/// Final tallies of one pipeline run.
#[derive(Debug, Clone)]
pub struct AggregateResult {
    pub persisted: usize,
    pub duplicates_removed: usize,
    pub severity_counts: SeverityCounts,
}

pub struct Orchestrator {
    store: Arc<dyn Store>,
    daemon: Arc<dyn ScanDaemon>,
    prober: Arc<dyn Prober>,
    port_scanner: Arc<dyn PortScanner>,
    web_scanner: Arc<dyn WebServerScanner>,
    registry: Arc<CancelRegistry>,
}

impl Orchestrator {
    pub fn new(
        store: Arc<dyn Store>,
        daemon: Arc<dyn ScanDaemon>,
        prober: Arc<dyn Prober>,
        port_scanner: Arc<dyn PortScanner>,
        web_scanner: Arc<dyn WebServerScanner>,
        registry: Arc<CancelRegistry>,
    ) -> Self {
        Self {
            store,
            daemon,
            prober,
            port_scanner,
            web_scanner,
            registry,
        }
    }

    /// Drive one scan to a terminal state. Never returns an error to
    /// the caller — the terminal scan row carries the outcome.
    pub async fn run(
        &self,
        scan_id: Uuid,
        target_url: String,
        depth: ScanDepth,
        token: CancellationToken,
    ) {
        match self.run_stages(scan_id, &target_url, depth, &token).await {
            Ok(aggregate) => {
                tracing::info!(
                    "Scan {} completed: {} findings persisted ({} critical/high), {} duplicates removed",
                    scan_id,
                    aggregate.persisted,
                    aggregate.severity_counts.critical + aggregate.severity_counts.high,
                    aggregate.duplicates_removed
                );
            }
            Err(PipelineError::Cancelled) => {
                tracing::info!("Scan {} cancelled by user", scan_id);
                self.mark_terminal(scan_id, ScanStatus::Cancelled, None).await;
            }
            Err(e) => {
                tracing::error!("Scan {} failed: {}", scan_id, e);
                self.mark_terminal(scan_id, ScanStatus::Failed, Some(e.to_string()))
                    .await;
            }
        }
        self.registry.remove(scan_id);
    }

    async fn run_stages(
        &self,
        scan_id: Uuid,
        target_url: &str,
        depth: ScanDepth,
        token: &CancellationToken,
    ) -> Result<AggregateResult, PipelineError> {
        ensure_live(token)?;

        self.store
            .update_scan(
                scan_id,
                ScanUpdate {
                    status: Some(ScanStatus::Running),
                    started_at: Some(Utc::now()),
                    ..ScanUpdate::default()
                },
            )
            .await
            .map_err(|e| PipelineError::Unexpected(anyhow::anyhow!(e)))?;

        let tracker = Arc::new(ProgressTracker::new(self.store.clone(), scan_id));
        let mut findings: Vec<Finding> = Vec::new();

        // ── Validate ─────────────────────────────────────────────────
        ensure_live(token)?;
        self.validate_target(scan_id, target_url, &mut findings).await;
        tracker.report_stage(VALIDATE_WINDOW, 100).await?;

        // ── PortScan ─────────────────────────────────────────────────
        ensure_live(token)?;
        if depth == ScanDepth::Shallow {
            tracker
                .animate_to(PORT_SCAN_WINDOW.hi, SKIP_ANIMATION, SKIP_ANIMATION_STEPS, token)
                .await?;
        } else {
            let host = host_of(target_url);
            match self.port_scanner.scan(&host, depth).await {
                Ok(ports) => {
                    findings.extend(
                        ports
                            .into_iter()
                            .map(|p| port_finding(scan_id, &host, p)),
                    );
                }
                Err(e) => {
                    // Non-fatal: the stage contributes zero findings.
                    let err = PipelineError::ToolExecution {
                        stage: "port_scan",
                        message: e.to_string(),
                    };
                    tracing::warn!("Scan {}: {}", scan_id, err);
                }
            }
            tracker.report_stage(PORT_SCAN_WINDOW, 100).await?;
        }

        // ── WebServerScan ────────────────────────────────────────────
        ensure_live(token)?;
        if depth == ScanDepth::Shallow {
            tracker
                .animate_to(WEB_SCAN_WINDOW.hi, SKIP_ANIMATION, SKIP_ANIMATION_STEPS, token)
                .await?;
        } else {
            match self.web_scanner.scan(scan_id, target_url, depth).await {
                Ok(web_findings) => findings.extend(web_findings),
                Err(e) => {
                    let err = PipelineError::ToolExecution {
                        stage: "web_server_scan",
                        message: e.to_string(),
                    };
                    tracing::warn!("Scan {}: {}", scan_id, err);
                }
            }
            tracker.report_stage(WEB_SCAN_WINDOW, 100).await?;
        }

        // ── ActiveScan ───────────────────────────────────────────────
        ensure_live(token)?;
        let (progress_tx, mut progress_rx) = mpsc::channel::<u8>(32);
        let forwarder = {
            let tracker = tracker.clone();
            tokio::spawn(async move {
                while let Some(pct) = progress_rx.recv().await {
                    if let Err(e) = tracker.report_stage(ACTIVE_SCAN_WINDOW, pct).await {
                        tracing::warn!("Progress write for scan {} failed: {}", scan_id, e);
                    }
                }
            })
        };

        let active_result = poller::run_active_scan(
            self.daemon.clone(),
            scan_id,
            target_url,
            depth,
            token,
            progress_tx,
        )
        .await;
        forwarder.abort();

        match active_result {
            Ok(active_findings) => findings.extend(active_findings),
            Err(PipelineError::DaemonUnavailable(e)) => {
                tracing::warn!("Active scan skipped for {} (daemon unavailable): {}", scan_id, e);
            }
            Err(PipelineError::StageTimeout(budget)) => {
                tracing::warn!("Active scan for {} gave up after {:?}", scan_id, budget);
            }
            Err(fatal) => return Err(fatal),
        }
        tracker
            .animate_to(ACTIVE_SCAN_WINDOW.hi, SKIP_ANIMATION, SKIP_ANIMATION_STEPS, token)
            .await?;

        // ── Finalize ─────────────────────────────────────────────────
        ensure_live(token)?;
        let outcome = dedupe::dedupe(findings);
        let counts = SeverityCounts::tally(&outcome.deduplicated);
        for (kept_id, count) in &outcome.duplicate_counts {
            tracing::debug!("Finding {} absorbed {} duplicate(s)", kept_id, count);
        }

        // Terminal write first: if it fails the run unwinds to `failed`,
        // and a failed scan must expose zero findings.
        self.store
            .update_scan(
                scan_id,
                ScanUpdate {
                    status: Some(ScanStatus::Completed),
                    progress: Some(FINALIZE_WINDOW.hi),
                    completed_at: Some(Utc::now()),
                    severity_counts: Some(counts),
                    total_findings: Some(counts.total()),
                    ..ScanUpdate::default()
                },
            )
            .await
            .map_err(|e| PipelineError::Unexpected(anyhow::anyhow!(e)))?;

        for finding in &outcome.deduplicated {
            if let Err(e) = self.store.create_finding(finding).await {
                tracing::error!("Failed to persist finding for scan {}: {}", scan_id, e);
            }
        }

        // Report creation is best-effort; a failure here never flips
        // the scan out of `completed`.
        if let Ok(Some(scan)) = self.store.get_scan(scan_id).await {
            let report = Report::for_scan(&scan, &counts);
            if let Err(e) = self.store.create_report(&report).await {
                tracing::warn!("Report creation failed for scan {}: {}", scan_id, e);
            }
        }

        Ok(AggregateResult {
            persisted: outcome.deduplicated.len(),
            duplicates_removed: outcome.removed,
            severity_counts: counts,
        })
    }

    /// Reachability probe. Never aborts the pipeline: a dead target
    /// becomes an informational finding and the run continues
    /// best-effort.
    async fn validate_target(&self, scan_id: Uuid, target_url: &str, findings: &mut Vec<Finding>) {
        match self.prober.probe(target_url).await {
            Ok(outcome) if outcome.reachable => {
                tracing::info!(
                    "Target {} validated (status {:?})",
                    target_url,
                    outcome.status
                );
            }
            Ok(outcome) => {
                tracing::warn!(
                    "Target {} returned server error {:?}; continuing",
                    target_url,
                    outcome.status
                );
                findings.push(
                    Finding::new(scan_id, "info", Severity::Info, "Target validation inconclusive")
                        .with_description(format!(
                            "The target responded with HTTP {} during validation; results may be incomplete",
                            outcome.status.unwrap_or(0)
                        ))
                        .with_url(target_url)
                        .with_tool_details(outcome.metadata),
                );
            }
            Err(e) => {
                tracing::warn!("Target {} unreachable: {}; continuing", target_url, e);
                findings.push(
                    Finding::new(scan_id, "info", Severity::Info, "Target unreachable")
                        .with_description(format!(
                            "The reachability probe could not contact the target: {e}"
                        ))
                        .with_url(target_url)
                        .with_remediation("Verify the target URL is correct and publicly reachable"),
                );
            }
        }
    }

    async fn mark_terminal(&self, scan_id: Uuid, status: ScanStatus, error: Option<String>) {
        let update = ScanUpdate {
            status: Some(status),
            completed_at: Some(Utc::now()),
            error_message: error,
            ..ScanUpdate::default()
        };
        if let Err(e) = self.store.update_scan(scan_id, update).await {
            tracing::error!("Failed to mark scan {} as {}: {}", scan_id, status.as_str(), e);
        }
    }
}

fn ensure_live(token: &CancellationToken) -> Result<(), PipelineError> {
    if token.is_cancelled() {
        Err(PipelineError::Cancelled)
    } else {
        Ok(())
    }
}

/// Classify an open port into a finding. Well-known web ports are
/// informational; remote-access and database services rate higher.
fn port_finding(scan_id: Uuid, host: &str, open_port: OpenPort) -> Finding {
    let severity = match open_port.port {
        80 | 443 | 8080 | 8443 => Severity::Info,
        21 | 23 | 445 | 3389 | 5900 => Severity::Medium,
        1433 | 3306 | 5432 | 6379 | 9200 | 27017 => Severity::Medium,
        _ => Severity::Low,
    };

    Finding::new(
        scan_id,
        "network",
        severity,
        &format!("Open port {} ({})", open_port.port, open_port.service),
    )
    .with_description(format!(
        "Port {} is open on {} and exposes the '{}' service",
        open_port.port, host, open_port.service
    ))
    .with_url(host)
    .with_remediation("Close the port or restrict access if the service is not required")
    .with_tool_details(serde_json::json!({
        "tool": "nmap",
        "port": open_port.port,
        "service": open_port.service,
    }))
}
