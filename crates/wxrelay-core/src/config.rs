//! Broker configuration resolution.
//!
//! The broker endpoint is resolved in this order:
//! 1. A full AMQP URL (`RABBITMQ_URL`)
//! 2. Discrete `user`/`pass`/`host`/`port` parts, all four required
//!
//! Anything else is a fatal startup condition.

use std::fmt::Write;
use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::error::{Error, Result};

/// Default durable topic exchange shared by producer and consumers.
pub const DEFAULT_EXCHANGE: &str = "weather.exchange";

/// Default virtual host when building the URL from parts.
pub const DEFAULT_VHOST: &str = "/";

/// Connection settings for the message broker.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct BrokerSettings {
    pub url: Option<String>,
    pub user: Option<String>,
    pub pass: Option<String>,
    pub host: Option<String>,
    pub port: Option<u16>,
    pub vhost: Option<String>,
}

impl BrokerSettings {
    /// Resolve the AMQP URL to dial.
    ///
    /// An explicit, non-empty URL wins. Otherwise the URL is assembled from
    /// the discrete parts when user, pass, host and port are all present.
    pub fn resolve(&self) -> Result<String> {
        if let Some(url) = non_empty(self.url.as_deref()) {
            return Ok(url.to_string());
        }

        let user = non_empty(self.user.as_deref());
        let pass = non_empty(self.pass.as_deref());
        let host = non_empty(self.host.as_deref());
        match (user, pass, host, self.port) {
            (Some(user), Some(pass), Some(host), Some(port)) => {
                let vhost = non_empty(self.vhost.as_deref()).unwrap_or(DEFAULT_VHOST);
                Ok(format!(
                    "amqp://{}:{}@{host}:{port}/{}",
                    encode_userinfo(user),
                    encode_userinfo(pass),
                    encode_vhost(vhost)
                ))
            }
            _ => Err(Error::Config(
                "missing broker URL: set RABBITMQ_URL or RABBITMQ_USER/PASS/HOST/PORT".into(),
            )),
        }
    }
}

fn non_empty(value: Option<&str>) -> Option<&str> {
    value.map(str::trim).filter(|v| !v.is_empty())
}

/// Percent-encode a user or password, keeping only unreserved characters.
fn encode_userinfo(value: &str) -> String {
    let mut out = String::with_capacity(value.len());
    for byte in value.bytes() {
        if byte.is_ascii_alphanumeric() || matches!(byte, b'-' | b'.' | b'_' | b'~') {
            out.push(char::from(byte));
        } else {
            let _ = write!(out, "%{byte:02X}");
        }
    }
    out
}

/// Percent-encode the vhost path segment (`/` becomes `%2f`).
fn encode_vhost(vhost: &str) -> String {
    vhost.replace('%', "%25").replace('/', "%2f")
}

/// Exchange/queue/binding names used by one component.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Topology {
    pub exchange: String,
    pub queue: String,
    pub routing_key: String,
}

impl Topology {
    pub fn new(
        exchange: impl Into<String>,
        queue: impl Into<String>,
        routing_key: impl Into<String>,
    ) -> Self {
        Self {
            exchange: exchange.into(),
            queue: queue.into(),
            routing_key: routing_key.into(),
        }
    }
}

/// Fixed-delay retry policy for the initial broker connection.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct BootRetry {
    /// Total number of attempts, including the first one.
    pub attempts: u32,
    /// Delay between consecutive attempts.
    pub delay: Duration,
}

impl Default for BootRetry {
    fn default() -> Self {
        Self {
            attempts: 10,
            delay: Duration::from_secs(5),
        }
    }
}

impl BootRetry {
    pub const fn new(attempts: u32, delay: Duration) -> Self {
        Self { attempts, delay }
    }

    /// Whether another attempt should be made after `attempt` (0-indexed) failed.
    pub const fn should_retry(&self, attempt: u32) -> bool {
        attempt.saturating_add(1) < self.attempts
    }
}
