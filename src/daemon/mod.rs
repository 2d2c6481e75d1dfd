//! Active-scan daemon protocol (consumed, not defined here).
//!
//! The daemon is a long-running ZAP-style scanner with a JSON HTTP API:
//! readiness check, session reset, spider, active scan, stop, alert
//! fetch. The pipeline only sees the [`ScanDaemon`] trait.

use async_trait::async_trait;

use crate::error::DaemonError;

pub mod zap;

pub use zap::ZapDaemon;

/// One alert reported by the daemon for a finished (or in-flight) scan.
#[derive(Debug, Clone)]
pub struct DaemonAlert {
    /// Stable identifier of the check that fired, when assigned.
    pub plugin_id: Option<String>,
    pub name: String,
    /// Daemon-native risk code ("High", "2", "Informational", ...).
    pub risk: String,
    pub description: String,
    pub url: Option<String>,
    pub solution: Option<String>,
}

#[async_trait]
pub trait ScanDaemon: Send + Sync {
    /// Readiness probe; any `Ok` means the daemon is up.
    async fn version(&self) -> Result<String, DaemonError>;

    /// Reset daemon session state. Best-effort resource hygiene — the
    /// daemon accumulates crawl/alert state across scans otherwise.
    async fn new_session(&self) -> Result<(), DaemonError>;

    /// Prime the daemon's site tree with the target.
    async fn access_url(&self, target: &str) -> Result<(), DaemonError>;

    /// Start the spider; `max_children` of 0 means unbounded. Returns
    /// the daemon-assigned spider id.
    async fn start_spider(&self, target: &str, max_children: u32) -> Result<String, DaemonError>;

    /// Spider completion percentage, 0-100.
    async fn spider_status(&self, spider_id: &str) -> Result<u8, DaemonError>;

    /// Start the active scan; returns the daemon-assigned scan id.
    async fn start_active_scan(&self, target: &str) -> Result<String, DaemonError>;

    /// Active-scan completion percentage, 0-100.
    async fn active_scan_status(&self, scan_id: &str) -> Result<u8, DaemonError>;

    /// Tell the daemon to stop an in-flight active scan.
    async fn stop_active_scan(&self, scan_id: &str) -> Result<(), DaemonError>;

    /// Fetch alerts for the scanned target.
    async fn alerts(&self, target: &str) -> Result<Vec<DaemonAlert>, DaemonError>;
}
