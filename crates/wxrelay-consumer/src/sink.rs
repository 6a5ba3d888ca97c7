//! HTTP sink for forwarded payloads.
//!
//! The downstream API is opaque: it accepts a JSON body over `POST` and
//! answers with a status code. Any 2xx is success; everything else,
//! including transport failures and timeouts, is a forwarding failure.

use std::future::Future;
use std::time::Duration;

use tracing::debug;
use wxrelay_core::Payload;

/// Longest response body kept in a [`SinkError::Status`] for logging.
const MAX_ERROR_BODY: usize = 512;

/// Errors that can occur when forwarding a payload.
#[derive(Debug, thiserror::Error)]
pub enum SinkError {
    /// Failed to build the HTTP client.
    #[error("Sink client error: {0}")]
    Client(String),

    /// The request did not complete within the sink timeout.
    #[error("Sink request timed out: {0}")]
    Timeout(String),

    /// Connection refused, DNS failure or any other transport error.
    #[error("Sink request error: {0}")]
    Request(String),

    /// The sink answered with a non-2xx status code.
    #[error("Sink returned status {status}: {body}")]
    Status {
        /// HTTP status code returned by the sink.
        status: u16,
        /// Response body, truncated.
        body: String,
    },
}

impl From<reqwest::Error> for SinkError {
    fn from(e: reqwest::Error) -> Self {
        if e.is_timeout() {
            Self::Timeout(e.to_string())
        } else {
            Self::Request(e.to_string())
        }
    }
}

/// Destination for validated payloads.
pub trait Sink {
    /// Deliver one payload. `Ok` only when the sink acknowledged it with a 2xx.
    fn forward(&self, payload: &Payload) -> impl Future<Output = Result<(), SinkError>>;
}

/// Sink that `POST`s JSON to a fixed URL.
#[derive(Debug, Clone)]
pub struct HttpSink {
    http: reqwest::Client,
    url: String,
}

impl HttpSink {
    /// Create a sink with its own client bounded by `timeout`.
    pub fn new(url: impl Into<String>, timeout: Duration) -> Result<Self, SinkError> {
        let http = wxrelay_core::http::build_client(timeout)
            .map_err(|e| SinkError::Client(e.to_string()))?;
        Ok(Self::with_client(url, http))
    }

    /// Create a sink from a pre-built HTTP client.
    pub fn with_client(url: impl Into<String>, http: reqwest::Client) -> Self {
        Self {
            http,
            url: url.into(),
        }
    }

    pub fn url(&self) -> &str {
        &self.url
    }
}

impl Sink for HttpSink {
    async fn forward(&self, payload: &Payload) -> Result<(), SinkError> {
        // `.json()` sets `Content-Type: application/json`.
        let response = self.http.post(&self.url).json(payload).send().await?;

        let status = response.status();
        if status.is_success() {
            debug!(status = status.as_u16(), url = %self.url, "Sink accepted payload");
            return Ok(());
        }

        let mut body = response
            .text()
            .await
            .unwrap_or_else(|_| "<failed to read body>".to_string());
        if body.len() > MAX_ERROR_BODY {
            let mut cut = MAX_ERROR_BODY;
            while !body.is_char_boundary(cut) {
                cut -= 1;
            }
            body.truncate(cut);
        }
        Err(SinkError::Status {
            status: status.as_u16(),
            body,
        })
    }
}
