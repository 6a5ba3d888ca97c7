//! wxrelay Consumer Library
//!
//! Core functionality for the relay consumer:
//! - Broker session ownership and queue topology
//! - Per-message handling: decode, augment, validate, forward
//! - HTTP sink for forwarded payloads
//! - Dispatch loop translating dispositions into broker acknowledgements
//! - Named consumer profiles

pub mod broker;
pub mod dispatch;
pub mod handler;
pub mod profile;
pub mod sink;

pub use broker::{BrokerError, BrokerSession};
pub use dispatch::{Acknowledger, DrainStats, Envelope, RelayConsumer};
pub use handler::{MessageHandler, Outcome};
pub use profile::{ConsumerSettings, Overrides, Profile};
pub use sink::{HttpSink, Sink, SinkError};
