//! Outbound color submission
//!
//! Two clients: [`HttpBulbClient`] posts to the color backend's `/api/color`, and
//! [`ShellyBulbClient`] drives a Shelly bulb directly over its HTTP GET interface.

use crate::config::{BulbConfig, BulbMode, SyncConfig};
use crate::errors::{ConfigError, SubmissionError};
use crate::types::ColorSample;
use async_trait::async_trait;
use reqwest::Client;
use serde::Deserialize;
use std::sync::Arc;
use std::time::Duration;

/// What a successful submission reported back
#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct BulbReply {
    /// Server-provided message, if any
    pub message: Option<String>,
}

impl BulbReply {
    pub fn with_message(message: impl Into<String>) -> Self {
        Self {
            message: Some(message.into()),
        }
    }
}

/// Request/response boundary to whatever drives the physical light
#[async_trait]
pub trait BulbClient: Send + Sync {
    /// Short description for logs
    fn describe(&self) -> String;

    async fn submit(&self, color: ColorSample) -> Result<BulbReply, SubmissionError>;
}

/// Body of `/api/color` replies
#[derive(Debug, Deserialize)]
struct ColorResponse {
    success: bool,
    #[serde(default)]
    message: Option<String>,
}

/// Client for the color backend: `POST {endpoint}/api/color` with `{red, green, blue}`
pub struct HttpBulbClient {
    client: Client,
    url: String,
    timeout: Duration,
}

impl HttpBulbClient {
    pub fn new(endpoint: &str, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            url: format!("{}/api/color", endpoint.trim_end_matches('/')),
            timeout,
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

#[async_trait]
impl BulbClient for HttpBulbClient {
    fn describe(&self) -> String {
        format!("backend {}", self.url)
    }

    async fn submit(&self, color: ColorSample) -> Result<BulbReply, SubmissionError> {
        log::debug!("POST {} {}", self.url, color);
        let response = self
            .client
            .post(&self.url)
            .timeout(self.timeout)
            .json(&color)
            .send()
            .await
            .map_err(|e| SubmissionError::Network(e.to_string()))?;

        let status = response.status();
        let body: ColorResponse = response
            .json()
            .await
            .map_err(|e| SubmissionError::Network(format!("unreadable response: {}", e)))?;

        if status.is_success() && body.success {
            Ok(BulbReply {
                message: body.message,
            })
        } else {
            Err(SubmissionError::Rejected {
                status: status.as_u16(),
                message: body
                    .message
                    .unwrap_or_else(|| "Failed to set color".to_string()),
            })
        }
    }
}

/// Direct Shelly RGBW bulb: `GET http://{host}/light/0?turn=on&red=R&green=G&blue=B`
pub struct ShellyBulbClient {
    client: Client,
    host: String,
    timeout: Duration,
}

impl ShellyBulbClient {
    pub fn new(host: impl Into<String>, timeout: Duration) -> Self {
        Self {
            client: Client::new(),
            host: host.into(),
            timeout,
        }
    }

    pub fn url_for(&self, color: ColorSample) -> String {
        format!(
            "http://{}/light/0?turn=on&red={}&green={}&blue={}",
            self.host, color.red, color.green, color.blue
        )
    }
}

#[async_trait]
impl BulbClient for ShellyBulbClient {
    fn describe(&self) -> String {
        format!("shelly bulb at {}", self.host)
    }

    async fn submit(&self, color: ColorSample) -> Result<BulbReply, SubmissionError> {
        let url = self.url_for(color);
        log::debug!("GET {}", url);
        self.client
            .get(&url)
            .timeout(self.timeout)
            .send()
            .await
            .and_then(|response| response.error_for_status())
            .map_err(|e| SubmissionError::Bulb(e.to_string()))?;

        Ok(BulbReply::with_message("Color set successfully"))
    }
}

/// Build the client selected by `[bulb] mode`
pub fn from_config(bulb: &BulbConfig, sync: &SyncConfig) -> Result<Arc<dyn BulbClient>, ConfigError> {
    let timeout = sync.request_timeout();
    match bulb.mode {
        BulbMode::Backend => Ok(Arc::new(HttpBulbClient::new(&bulb.endpoint, timeout))),
        BulbMode::Shelly => match bulb.shelly_host.as_deref() {
            Some(host) if !host.trim().is_empty() => {
                Ok(Arc::new(ShellyBulbClient::new(host.trim(), timeout)))
            }
            _ => Err(ConfigError::Invalid(
                "bulb.shelly_host is required in shelly mode".to_string(),
            )),
        },
    }
}
