//! `wxrelay` Core Library
//!
//! Shared functionality for the relay components:
//! - Broker endpoint and boot-retry configuration
//! - Weather payload decoding and augmentation
//! - Delivery dispositions and the reconnect-then-retry-once wrapper
//! - Common error types, HTTP client and tracing setup

pub mod config;
pub mod disposition;
pub mod error;
pub mod http;
pub mod payload;
pub mod retry;
pub mod tracing_init;

pub use config::{BootRetry, BrokerSettings, Topology};
pub use disposition::Disposition;
pub use error::{Error, Result};
pub use payload::Payload;
pub use retry::retry_once;
