//! Stage client adapters.
//!
//! Each external tool is consumed through a narrow trait so the
//! pipeline can be exercised with mocks. Adapters normalize tool output
//! into the common [`Finding`] shape and guarantee they only error for
//! "tool could not execute" — a target with zero results is `Ok`.

use async_trait::async_trait;

use crate::models::{Finding, ScanDepth};

pub mod http;
pub mod nikto;
pub mod nmap;

pub use http::HttpProber;
pub use nikto::NiktoWebScanner;
pub use nmap::NmapPortScanner;

/// Result of the fast reachability/tech-detection probe.
#[derive(Debug, Clone)]
pub struct ProbeOutcome {
    pub reachable: bool,
    pub status: Option<u16>,
    pub metadata: serde_json::Value,
}

/// One open port reported by the port scanner.
#[derive(Debug, Clone)]
pub struct OpenPort {
    pub port: u16,
    pub service: String,
}

#[async_trait]
pub trait Prober: Send + Sync {
    async fn probe(&self, target: &str) -> anyhow::Result<ProbeOutcome>;
}

#[async_trait]
pub trait PortScanner: Send + Sync {
    async fn scan(&self, host: &str, depth: ScanDepth) -> anyhow::Result<Vec<OpenPort>>;
}

#[async_trait]
pub trait WebServerScanner: Send + Sync {
    /// Runs the misconfiguration scanner and returns normalized
    /// findings already tagged with the owning scan id.
    async fn scan(
        &self,
        scan_id: uuid::Uuid,
        target: &str,
        depth: ScanDepth,
    ) -> anyhow::Result<Vec<Finding>>;
}

/// Strip the scheme and path from a target URL, leaving the host the
/// port scanner expects.
pub fn host_of(target: &str) -> String {
    let stripped = target
        .trim()
        .trim_start_matches("https://")
        .trim_start_matches("http://");
    let host = stripped
        .split(['/', '?', '#'])
        .next()
        .unwrap_or(stripped);
    // Drop an explicit port but keep IPv6 literals intact.
    if host.starts_with('[') {
        host.split(']').next().map(|h| format!("{h}]")).unwrap_or_else(|| host.to_string())
    } else {
        host.split(':').next().unwrap_or(host).to_string()
    }
}
