//! Named consumer profiles.
//!
//! Two consumers share the exchange. `augment` stamps provenance on raw
//! readings and forwards them to the logs endpoint; `passthrough` forwards
//! processed readings unchanged to the realtime endpoint. Every field can be
//! overridden individually at startup.

use std::time::Duration;

use wxrelay_core::Topology;
use wxrelay_core::config::DEFAULT_EXCHANGE;
use wxrelay_core::payload::DEFAULT_REQUIRED_FIELD;

/// Default provenance marker written into `processed_by`.
pub const DEFAULT_PROCESSED_BY: &str = "wxrelay-consumer";

/// Default AMQP consumer tag.
pub const DEFAULT_CONSUMER_TAG: &str = "wxrelay-consumer";

/// Default prefetch window.
pub const DEFAULT_PREFETCH: u16 = 10;

/// Preset consumer configuration.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, clap::ValueEnum)]
pub enum Profile {
    /// Raw readings: augment, validate `data`, post to the logs endpoint.
    #[default]
    Augment,
    /// Processed readings: post unchanged to the realtime endpoint.
    Passthrough,
}

/// Fully resolved consumer configuration.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ConsumerSettings {
    pub topology: Topology,
    pub consumer_tag: String,
    pub prefetch: u16,
    pub sink_url: String,
    pub sink_timeout: Duration,
    /// `None` disables augmentation.
    pub processed_by: Option<String>,
    /// `None` disables validation.
    pub required_field: Option<String>,
}

impl Profile {
    /// Default settings for this profile.
    pub fn settings(self) -> ConsumerSettings {
        match self {
            Self::Augment => ConsumerSettings {
                topology: Topology::new(DEFAULT_EXCHANGE, "weather.raw.queue", "weather.raw"),
                consumer_tag: DEFAULT_CONSUMER_TAG.into(),
                prefetch: DEFAULT_PREFETCH,
                sink_url: "http://nestjs-api:3000/weather/logs".into(),
                sink_timeout: Duration::from_secs(10),
                processed_by: Some(DEFAULT_PROCESSED_BY.into()),
                required_field: Some(DEFAULT_REQUIRED_FIELD.into()),
            },
            Self::Passthrough => ConsumerSettings {
                topology: Topology::new(DEFAULT_EXCHANGE, "weather.go.queue", "weather.data"),
                consumer_tag: DEFAULT_CONSUMER_TAG.into(),
                prefetch: DEFAULT_PREFETCH,
                sink_url: "http://nestjs-api:3000/api/weather/realtime".into(),
                sink_timeout: Duration::from_secs(5),
                processed_by: None,
                required_field: None,
            },
        }
    }
}

/// Per-field overrides applied on top of a profile.
#[derive(Debug, Clone, Default)]
pub struct Overrides {
    pub exchange: Option<String>,
    pub queue: Option<String>,
    pub routing_key: Option<String>,
    pub consumer_tag: Option<String>,
    pub prefetch: Option<u16>,
    pub sink_url: Option<String>,
    pub sink_timeout: Option<Duration>,
    pub processed_by: Option<String>,
    pub required_field: Option<String>,
}

impl ConsumerSettings {
    /// Apply overrides. An empty `processed_by`/`required_field` disables
    /// that step.
    pub fn with_overrides(mut self, o: Overrides) -> Self {
        if let Some(exchange) = o.exchange {
            self.topology.exchange = exchange;
        }
        if let Some(queue) = o.queue {
            self.topology.queue = queue;
        }
        if let Some(routing_key) = o.routing_key {
            self.topology.routing_key = routing_key;
        }
        if let Some(tag) = o.consumer_tag {
            self.consumer_tag = tag;
        }
        if let Some(prefetch) = o.prefetch {
            self.prefetch = prefetch;
        }
        if let Some(url) = o.sink_url {
            self.sink_url = url;
        }
        if let Some(timeout) = o.sink_timeout {
            self.sink_timeout = timeout;
        }
        if let Some(by) = o.processed_by {
            self.processed_by = Some(by).filter(|v| !v.is_empty());
        }
        if let Some(field) = o.required_field {
            self.required_field = Some(field).filter(|v| !v.is_empty());
        }
        self
    }
}
