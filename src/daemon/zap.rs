//! HTTP client for the ZAP-style daemon JSON API.

use std::time::Duration;

use async_trait::async_trait;
use serde_json::Value;

use super::{DaemonAlert, ScanDaemon};
use crate::error::DaemonError;

const CALL_TIMEOUT: Duration = Duration::from_secs(15);

pub struct ZapDaemon {
    client: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl ZapDaemon {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Self {
        let client = reqwest::Client::builder()
            .timeout(CALL_TIMEOUT)
            .build()
            .unwrap_or_default();
        Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        }
    }

    async fn call(&self, path: &str, params: &[(&str, &str)]) -> Result<Value, DaemonError> {
        let url = format!("{}{}", self.base_url, path);
        let mut request = self.client.get(&url).query(params);
        if !self.api_key.is_empty() {
            request = request.header("X-ZAP-API-Key", &self.api_key);
        }

        let response = request.send().await?;
        if !response.status().is_success() {
            return Err(DaemonError::Status(response.status().as_u16()));
        }
        Ok(response.json::<Value>().await?)
    }

    fn string_field(body: &Value, field: &str) -> Result<String, DaemonError> {
        body.get(field)
            .and_then(|v| v.as_str())
            .map(|v| v.to_string())
            .ok_or_else(|| DaemonError::InvalidResponse(format!("missing field '{field}'")))
    }

    fn percent_field(body: &Value, field: &str) -> Result<u8, DaemonError> {
        let raw = Self::string_field(body, field)?;
        raw.parse::<u8>()
            .map(|p| p.min(100))
            .map_err(|_| DaemonError::InvalidResponse(format!("bad percentage '{raw}'")))
    }
}

#[async_trait]
impl ScanDaemon for ZapDaemon {
    async fn version(&self) -> Result<String, DaemonError> {
        let body = self.call("/JSON/core/view/version/", &[]).await?;
        Self::string_field(&body, "version")
    }

    async fn new_session(&self) -> Result<(), DaemonError> {
        self.call("/JSON/core/action/newSession/", &[("overwrite", "true")])
            .await?;
        Ok(())
    }

    async fn access_url(&self, target: &str) -> Result<(), DaemonError> {
        self.call(
            "/JSON/core/action/accessUrl/",
            &[("url", target), ("followRedirects", "true")],
        )
        .await?;
        Ok(())
    }

    async fn start_spider(&self, target: &str, max_children: u32) -> Result<String, DaemonError> {
        let max_children = max_children.to_string();
        let body = self
            .call(
                "/JSON/spider/action/scan/",
                &[("url", target), ("maxChildren", &max_children)],
            )
            .await?;
        Self::string_field(&body, "scan")
    }

    async fn spider_status(&self, spider_id: &str) -> Result<u8, DaemonError> {
        let body = self
            .call("/JSON/spider/view/status/", &[("scanId", spider_id)])
            .await?;
        Self::percent_field(&body, "status")
    }

    async fn start_active_scan(&self, target: &str) -> Result<String, DaemonError> {
        let body = self
            .call(
                "/JSON/ascan/action/scan/",
                &[("url", target), ("recurse", "true")],
            )
            .await?;
        Self::string_field(&body, "scan")
    }

    async fn active_scan_status(&self, scan_id: &str) -> Result<u8, DaemonError> {
        let body = self
            .call("/JSON/ascan/view/status/", &[("scanId", scan_id)])
            .await?;
        Self::percent_field(&body, "status")
    }

    async fn stop_active_scan(&self, scan_id: &str) -> Result<(), DaemonError> {
        self.call("/JSON/ascan/action/stop/", &[("scanId", scan_id)])
            .await?;
        Ok(())
    }

    async fn alerts(&self, target: &str) -> Result<Vec<DaemonAlert>, DaemonError> {
        let body = self
            .call("/JSON/core/view/alerts/", &[("baseurl", target)])
            .await?;
        let alerts = body
            .get("alerts")
            .and_then(|v| v.as_array())
            .ok_or_else(|| DaemonError::InvalidResponse("missing field 'alerts'".into()))?;

        Ok(alerts.iter().map(parse_alert).collect())
    }
}

fn parse_alert(raw: &Value) -> DaemonAlert {
    let text = |field: &str| {
        raw.get(field)
            .and_then(|v| v.as_str())
            .unwrap_or_default()
            .to_string()
    };
    let optional = |field: &str| {
        raw.get(field)
            .and_then(|v| v.as_str())
            .filter(|s| !s.is_empty())
            .map(|s| s.to_string())
    };

    DaemonAlert {
        plugin_id: optional("pluginId"),
        name: if text("alert").is_empty() {
            text("name")
        } else {
            text("alert")
        },
        risk: text("risk"),
        description: text("description"),
        url: optional("url"),
        solution: optional("solution"),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parses_alert_fields_with_fallbacks() {
        let raw = serde_json::json!({
            "pluginId": "40012",
            "alert": "Cross Site Scripting (Reflected)",
            "risk": "High",
            "description": "XSS ...",
            "url": "https://example.com/q",
            "solution": "Encode output",
        });
        let alert = parse_alert(&raw);
        assert_eq!(alert.plugin_id.as_deref(), Some("40012"));
        assert_eq!(alert.name, "Cross Site Scripting (Reflected)");
        assert_eq!(alert.risk, "High");

        let empty = parse_alert(&serde_json::json!({"name": "fallback"}));
        assert_eq!(empty.name, "fallback");
        assert!(empty.plugin_id.is_none());
    }
}
