//! wxrelay Producer Library
//!
//! - AMQP transport owning one connection/channel pair
//! - Publisher with reconnect-and-retry-once semantics
//! - Upstream weather client
//! - Periodic collect-and-publish scheduler

pub mod publisher;
pub mod scheduler;
pub mod transport;
pub mod upstream;

pub use publisher::Producer;
pub use scheduler::{Collector, CycleError, CycleStats};
pub use transport::{AmqpTransport, PublishError, Transport};
pub use upstream::{UpstreamError, WeatherClient};
