use std::time::Duration;

use async_trait::async_trait;
use asset_publisher_core::contract::VersionHook;
use serde::Serialize;

/// Reports the published version by POSTing `{"version": "<v>"}` to a URL.
pub struct WebhookVersionHook {
    http: reqwest::Client,
    url: String,
}

#[derive(Serialize)]
struct VersionPayload<'a> {
    version: &'a str,
}

impl WebhookVersionHook {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, reqwest::Error> {
        let http = reqwest::Client::builder().timeout(timeout).build()?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }
}

#[async_trait]
impl VersionHook for WebhookVersionHook {
    async fn set_version(&self, version: &str) -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
        tracing::info!(url = %self.url, version, "Posting version to webhook");
        let response = self
            .http
            .post(&self.url)
            .json(&VersionPayload { version })
            .send()
            .await?;
        let status = response.status();
        if !status.is_success() {
            tracing::error!(url = %self.url, %status, "Version webhook rejected the update");
            return Err(format!("version webhook returned {status}").into());
        }
        Ok(())
    }
}
