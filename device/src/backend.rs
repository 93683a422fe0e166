//! HTTP client for the occupancy backend.

use std::time::Duration;

use anyhow::{Context, Result, bail};
use reqwest::Client;
use serde_json::json;

use crate::config::BackendSection;
use crate::events::{BounceEvent, DebugSamplesEvent};

/// Typed client for the backend's device-facing endpoints.
pub struct BackendClient {
    client: Client,
    event_url: String,
    ping_url: String,
    samples_url: String,
}

impl BackendClient {
    pub fn new(cfg: &BackendSection) -> Result<Self> {
        let base = cfg.backend_base();
        let client = Client::builder()
            .timeout(Duration::from_millis(cfg.request_timeout_ms))
            .build()
            .context("failed to build HTTP client")?;
        Ok(Self {
            event_url: format!("{base}/pingpong-event"),
            ping_url: format!("{base}/ping"),
            samples_url: format!("{base}/audio-samples"),
            client,
        })
    }

    /// Startup liveness check against the backend.
    pub async fn ping(&self) -> Result<()> {
        let resp = self
            .client
            .get(self.ping_url.as_str())
            .send()
            .await
            .context("ping request failed")?;
        if !resp.status().is_success() {
            bail!("ping returned status {}", resp.status());
        }
        Ok(())
    }

    /// Report one detected bounce.
    pub async fn send_event(&self, event: &BounceEvent) -> Result<()> {
        self.post(&self.event_url, &json!({ "event": event })).await
    }

    /// Ship one analyzed window for the live debug stream.
    pub async fn send_debug_samples(&self, event: &DebugSamplesEvent) -> Result<()> {
        self.post(&self.samples_url, &json!({ "event": event }))
            .await
    }

    async fn post(&self, url: &str, body: &serde_json::Value) -> Result<()> {
        let resp = self
            .client
            .post(url)
            .json(body)
            .send()
            .await
            .with_context(|| format!("POST {url} failed"))?;
        let status = resp.status();
        if !status.is_success() {
            let text = resp.text().await.unwrap_or_default();
            bail!("POST {url} returned {status}: {text}");
        }
        Ok(())
    }
}

impl BackendSection {
    /// Base URL with any trailing slash stripped, so endpoint paths can be
    /// appended directly.
    fn backend_base(&self) -> &str {
        self.server_url.trim_end_matches('/')
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn endpoint_urls_are_joined_without_double_slashes() {
        let cfg = BackendSection {
            server_url: "http://pingpong.local:12345/".to_string(),
            request_timeout_ms: 1000,
        };
        let client = BackendClient::new(&cfg).unwrap();
        assert_eq!(client.event_url, "http://pingpong.local:12345/pingpong-event");
        assert_eq!(client.ping_url, "http://pingpong.local:12345/ping");
        assert_eq!(client.samples_url, "http://pingpong.local:12345/audio-samples");
    }
}
