//! Fast HTTP reachability / tech-detection probe.

use std::time::Duration;

use async_trait::async_trait;
use reqwest::redirect::Policy;

use super::{ProbeOutcome, Prober};

const PROBE_TIMEOUT: Duration = Duration::from_secs(10);

pub struct HttpProber {
    client: reqwest::Client,
}

impl HttpProber {
    pub fn new() -> Self {
        let client = reqwest::Client::builder()
            .timeout(PROBE_TIMEOUT)
            .redirect(Policy::limited(5))
            .danger_accept_invalid_certs(true)
            .user_agent("vigil-probe/0.1")
            .build()
            .unwrap_or_default();
        Self { client }
    }
}

impl Default for HttpProber {
    fn default() -> Self {
        Self::new()
    }
}

#[async_trait]
impl Prober for HttpProber {
    async fn probe(&self, target: &str) -> anyhow::Result<ProbeOutcome> {
        let response = self.client.get(target).send().await?;
        let status = response.status().as_u16();

        let header = |name: &str| {
            response
                .headers()
                .get(name)
                .and_then(|v| v.to_str().ok())
                .map(|v| v.to_string())
        };
        let metadata = serde_json::json!({
            "status": status,
            "server": header("server"),
            "powered_by": header("x-powered-by"),
            "content_type": header("content-type"),
            "final_url": response.url().to_string(),
        });

        // Anything below 500 counts as reachable: 4xx still proves a
        // live web server behind the URL.
        Ok(ProbeOutcome {
            reachable: status < 500,
            status: Some(status),
            metadata,
        })
    }
}
