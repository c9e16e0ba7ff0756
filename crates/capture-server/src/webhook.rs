//! Export delivery over HTTP.
//!
//! Each job is POSTed as JSON to the configured webhook. 2xx is delivered;
//! 408, 429 and 5xx are retried; any other status is a permanent rejection.

use std::time::Duration;

use async_trait::async_trait;
use capture_core::ExportJob;
use capture_engine::{ExportSink, SinkError};
use http::StatusCode;
use serde::Serialize;

/// Request timeout for one delivery.
const DELIVERY_TIMEOUT: Duration = Duration::from_secs(10);

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct Delivery<'a> {
    job: &'a ExportJob,
}

/// Delivers exports by POSTing them to a URL.
#[derive(Debug, Clone)]
pub struct WebhookSink {
    client: reqwest::Client,
    url: String,
}

impl WebhookSink {
    pub fn new(url: impl Into<String>) -> Result<Self, reqwest::Error> {
        let client = reqwest::Client::builder()
            .timeout(DELIVERY_TIMEOUT)
            .build()?;
        Ok(Self {
            client,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl ExportSink for WebhookSink {
    async fn deliver(&self, job: &ExportJob) -> Result<(), SinkError> {
        let response = self
            .client
            .post(&self.url)
            .json(&Delivery { job })
            .send()
            .await
            .map_err(|e| SinkError::Transient(e.to_string()))?;

        let status = response.status();
        if status.is_success() {
            return Ok(());
        }

        let body = response.text().await.unwrap_or_default();
        let message = if body.trim().is_empty() {
            format!("webhook returned {}", status)
        } else {
            format!("webhook returned {}: {}", status, body.trim())
        };
        Err(classify(status, message))
    }
}

fn classify(status: StatusCode, message: String) -> SinkError {
    if status.is_server_error()
        || status == StatusCode::REQUEST_TIMEOUT
        || status == StatusCode::TOO_MANY_REQUESTS
    {
        SinkError::Transient(message)
    } else {
        SinkError::Permanent(message)
    }
}
