//! Port scanner adapter (nmap).

use std::time::Duration;

use async_trait::async_trait;
use tokio::process::Command;

use super::{OpenPort, PortScanner};
use crate::models::ScanDepth;

pub struct NmapPortScanner;

impl NmapPortScanner {
    /// Port coverage and time budget per depth tier. Shallow is never
    /// reached — the pipeline skips the stage entirely — but keeps a
    /// sane value anyway.
    fn tier(depth: ScanDepth) -> (&'static str, Duration) {
        match depth {
            ScanDepth::Shallow => ("50", Duration::from_secs(60)),
            ScanDepth::Medium => ("100", Duration::from_secs(180)),
            ScanDepth::Deep => ("1000", Duration::from_secs(600)),
        }
    }
}

#[async_trait]
impl PortScanner for NmapPortScanner {
    async fn scan(&self, host: &str, depth: ScanDepth) -> anyhow::Result<Vec<OpenPort>> {
        let (top_ports, budget) = Self::tier(depth);

        let output = tokio::time::timeout(
            budget,
            Command::new("nmap")
                .args(["-Pn", "-T4", "--top-ports", top_ports, "-oG", "-", host])
                .kill_on_drop(true)
                .output(),
        )
        .await
        .map_err(|_| anyhow::anyhow!("nmap timed out after {budget:?}"))??;

        if !output.status.success() {
            anyhow::bail!(
                "nmap exited with {}: {}",
                output.status,
                String::from_utf8_lossy(&output.stderr).trim()
            );
        }

        Ok(parse_grepable(&String::from_utf8_lossy(&output.stdout)))
    }
}

/// Parse nmap's greppable (`-oG`) output into open ports.
///
/// Relevant lines look like:
/// `Host: 1.2.3.4 () Ports: 22/open/tcp//ssh//, 80/open/tcp//http//`
fn parse_grepable(stdout: &str) -> Vec<OpenPort> {
    let mut ports = Vec::new();
    for line in stdout.lines() {
        let Some(idx) = line.find("Ports:") else {
            continue;
        };
        for entry in line[idx + 6..].split(',') {
            let fields: Vec<&str> = entry.trim().split('/').collect();
            if fields.len() < 5 || fields[1] != "open" {
                continue;
            }
            if let Ok(port) = fields[0].parse::<u16>() {
                ports.push(OpenPort {
                    port,
                    service: fields[4].to_string(),
                });
            }
        }
    }
    ports
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_open_ports_from_grepable_output() {
        let out = "# Nmap scan\n\
                   Host: 93.184.216.34 () Ports: 22/open/tcp//ssh//, 80/open/tcp//http//, 443/closed/tcp//https//\n\
                   # Nmap done";
        let ports = parse_grepable(out);
        assert_eq!(ports.len(), 2);
        assert_eq!(ports[0].port, 22);
        assert_eq!(ports[0].service, "ssh");
        assert_eq!(ports[1].port, 80);
    }

    #[test]
    fn ignores_lines_without_ports() {
        assert!(parse_grepable("# Nmap done at ...\n").is_empty());
    }
}
