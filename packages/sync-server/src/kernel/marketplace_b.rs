//! Outbound client for the Marketplace B inventory API.

use std::time::Duration;

use anyhow::{Context, Result};
use serde::Deserialize;
use serde_json::Value;

use crate::common::SyncError;

const REQUEST_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Debug, Deserialize)]
struct UpdatesResponse {
    #[serde(default)]
    items: Vec<Value>,
}

pub struct MarketplaceBClient {
    http: reqwest::Client,
    base_url: String,
    api_key: String,
}

impl MarketplaceBClient {
    pub fn new(base_url: impl Into<String>, api_key: impl Into<String>) -> Result<Self> {
        let http = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .context("Failed to build Marketplace B HTTP client")?;
        Ok(Self {
            http,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            api_key: api_key.into(),
        })
    }

    /// Fetch updates modified since the cursor. Network failures and non-2xx
    /// responses are `UpstreamUnavailable` and feed the circuit breaker.
    pub async fn fetch_updates(&self, since: i64, limit: u32) -> Result<Vec<Value>, SyncError> {
        let url = format!("{}/inventory/updates", self.base_url);
        let response = self
            .http
            .get(&url)
            .query(&[("since", since.to_string()), ("limit", limit.to_string())])
            .bearer_auth(&self.api_key)
            .send()
            .await
            .map_err(|e| SyncError::UpstreamUnavailable(e.to_string()))?;

        let status = response.status();
        if !status.is_success() {
            return Err(SyncError::UpstreamUnavailable(format!(
                "GET /inventory/updates returned {status}"
            )));
        }

        let body: UpdatesResponse = response
            .json()
            .await
            .map_err(|e| SyncError::UpstreamUnavailable(format!("malformed response: {e}")))?;
        Ok(body.items)
    }
}
