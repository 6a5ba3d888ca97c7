//! Publisher with reconnect-and-retry-once semantics.

use serde::Serialize;
use tracing::{info, warn};
use wxrelay_core::retry_once;

use crate::transport::{PublishError, Transport};

/// Default routing key for raw weather readings.
pub const DEFAULT_ROUTING_KEY: &str = "weather.raw";

/// Publishes JSON payloads to one exchange/routing-key pair.
pub struct Producer<T> {
    transport: T,
    exchange: String,
    routing_key: String,
}

impl<T: Transport> Producer<T> {
    pub fn new(transport: T, exchange: impl Into<String>, routing_key: impl Into<String>) -> Self {
        Self {
            transport,
            exchange: exchange.into(),
            routing_key: routing_key.into(),
        }
    }

    pub const fn transport(&self) -> &T {
        &self.transport
    }

    pub fn routing_key(&self) -> &str {
        &self.routing_key
    }

    /// Serialize `payload` and publish it as a persistent message.
    ///
    /// A failed publish triggers one reconnect and one retry. If either
    /// fails, the error is returned and the payload is not kept.
    pub async fn publish<P>(&mut self, payload: &P) -> Result<(), PublishError>
    where
        P: Serialize + ?Sized,
    {
        let body =
            serde_json::to_vec(payload).map_err(|e| PublishError::Serialize(e.to_string()))?;
        let exchange = self.exchange.as_str();
        let routing_key = self.routing_key.as_str();

        let result = retry_once(
            &mut self.transport,
            async |t: &mut T| t.publish(exchange, routing_key, &body).await,
            async |t: &mut T| t.reconnect().await,
        )
        .await;

        match &result {
            Ok(()) => info!(
                exchange = %exchange,
                routing_key = %routing_key,
                bytes = body.len(),
                "Published message"
            ),
            Err(e) => warn!(
                exchange = %exchange,
                routing_key = %routing_key,
                error = %e,
                "Publish failed after retry"
            ),
        }
        result
    }

    /// Release the transport. Safe to call more than once.
    pub async fn close(&mut self) {
        self.transport.close().await;
    }
}
