//! Upstream weather source.
//!
//! A single `GET` per call. Anything other than `200` with a JSON object body
//! is a typed error; nothing is retried here.

use std::time::Duration;

use reqwest::StatusCode;
use tracing::debug;
use wxrelay_core::{Payload, payload};

/// Default per-request timeout for the upstream source.
pub const DEFAULT_TIMEOUT: Duration = Duration::from_secs(10);

/// Errors returned by [`WeatherClient::fetch`].
#[derive(Debug, thiserror::Error)]
pub enum UpstreamError {
    /// Failed to build the HTTP client.
    #[error("Upstream client error: {0}")]
    Client(String),

    /// Transport failure or timeout.
    #[error("Failed to reach weather source: {0}")]
    Request(String),

    /// The source answered with something other than 200.
    #[error("Weather source returned status: {0}")]
    Status(u16),

    /// The body was not a JSON object.
    #[error("Failed to decode weather response: {0}")]
    Decode(String),
}

/// Client for the upstream weather endpoint.
#[derive(Debug, Clone)]
pub struct WeatherClient {
    http: reqwest::Client,
    url: String,
}

impl WeatherClient {
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, UpstreamError> {
        let http = wxrelay_core::http::build_client(timeout)
            .map_err(|e| UpstreamError::Client(e.to_string()))?;
        Ok(Self {
            http,
            url: url.into(),
        })
    }

    pub fn url(&self) -> &str {
        &self.url
    }

    /// Fetch one weather reading.
    pub async fn fetch(&self) -> Result<Payload, UpstreamError> {
        let response = self
            .http
            .get(&self.url)
            .send()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;

        let status = response.status();
        if status != StatusCode::OK {
            return Err(UpstreamError::Status(status.as_u16()));
        }

        let body = response
            .bytes()
            .await
            .map_err(|e| UpstreamError::Request(e.to_string()))?;
        let reading = payload::decode(&body).map_err(|e| UpstreamError::Decode(e.to_string()))?;
        debug!(url = %self.url, fields = reading.len(), "Fetched weather reading");
        Ok(reading)
    }
}
