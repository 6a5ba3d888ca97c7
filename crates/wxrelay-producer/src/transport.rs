//! Broker transport for publishing.
//!
//! [`Transport`] is the seam between the publisher and the broker. The AMQP
//! implementation owns at most one live session; a reconnect throws the old
//! one away and dials a fresh one.

use std::future::Future;

use lapin::options::{BasicPublishOptions, ConfirmSelectOptions, ExchangeDeclareOptions};
use lapin::publisher_confirm::Confirmation;
use lapin::types::FieldTable;
use lapin::{BasicProperties, Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info};

/// AMQP delivery mode for messages that survive a broker restart.
const PERSISTENT: u8 = 2;

/// AMQP reply code for a normal shutdown.
const REPLY_SUCCESS: u16 = 200;

/// Properties stamped on every published message: persistent JSON.
pub(crate) fn publish_properties() -> BasicProperties {
    BasicProperties::default()
        .with_content_type("application/json".into())
        .with_delivery_mode(PERSISTENT)
}

/// Errors that can occur while publishing.
#[derive(Debug, thiserror::Error)]
pub enum PublishError {
    #[error("Serialization error: {0}")]
    Serialize(String),

    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Publish error: {0}")]
    Publish(String),

    #[error("Broker rejected message on exchange {0}")]
    Nacked(String),

    #[error("Transport is closed")]
    Closed,
}

/// Minimal publishing surface over a broker connection.
pub trait Transport {
    /// Publish one persistent JSON message and wait for the broker's confirm.
    fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> impl Future<Output = Result<(), PublishError>>;

    /// Discard the current session and open a new one.
    fn reconnect(&mut self) -> impl Future<Output = Result<(), PublishError>>;

    /// Release the session. Calling it again is a no-op.
    fn close(&mut self) -> impl Future<Output = ()>;
}

struct Session {
    connection: Connection,
    channel: Channel,
}

impl Session {
    async fn open(url: &str, exchange: &str) -> Result<Self, PublishError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| PublishError::Connect(format!("failed to connect to broker: {e}")))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| PublishError::Connect(format!("failed to open channel: {e}")))?;
        channel
            .confirm_select(ConfirmSelectOptions::default())
            .await
            .map_err(|e| PublishError::Connect(format!("failed to enable confirms: {e}")))?;
        channel
            .exchange_declare(
                exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| PublishError::Connect(format!("failed to declare exchange: {e}")))?;
        Ok(Self {
            connection,
            channel,
        })
    }

    async fn close(self) {
        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(REPLY_SUCCESS, "producer shutdown").await {
                debug!(error = %e, "Channel close failed");
            }
        }
        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(REPLY_SUCCESS, "producer shutdown").await {
                debug!(error = %e, "Connection close failed");
            }
        }
    }
}

/// [`Transport`] backed by a `lapin` connection with publisher confirms.
pub struct AmqpTransport {
    url: String,
    exchange: String,
    session: Option<Session>,
}

impl AmqpTransport {
    /// Dial the broker, open a confirm-mode channel and declare `exchange`.
    pub async fn connect(url: &str, exchange: &str) -> Result<Self, PublishError> {
        let session = Session::open(url, exchange).await?;
        info!(exchange = %exchange, "Connected to broker");
        Ok(Self {
            url: url.to_string(),
            exchange: exchange.to_string(),
            session: Some(session),
        })
    }

    pub fn is_connected(&self) -> bool {
        self.session
            .as_ref()
            .is_some_and(|s| s.connection.status().connected())
    }
}

impl Transport for AmqpTransport {
    async fn publish(
        &mut self,
        exchange: &str,
        routing_key: &str,
        body: &[u8],
    ) -> Result<(), PublishError> {
        let session = self.session.as_ref().ok_or(PublishError::Closed)?;

        let confirmation = session
            .channel
            .basic_publish(
                exchange,
                routing_key,
                BasicPublishOptions::default(),
                body,
                publish_properties(),
            )
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))?
            .await
            .map_err(|e| PublishError::Publish(e.to_string()))?;

        if let Confirmation::Nack(_) = confirmation {
            return Err(PublishError::Nacked(exchange.to_string()));
        }
        Ok(())
    }

    async fn reconnect(&mut self) -> Result<(), PublishError> {
        if let Some(stale) = self.session.take() {
            stale.close().await;
        }
        let session = Session::open(&self.url, &self.exchange).await?;
        self.session = Some(session);
        info!(exchange = %self.exchange, "Reconnected to broker");
        Ok(())
    }

    async fn close(&mut self) {
        if let Some(session) = self.session.take() {
            session.close().await;
            info!("Broker connection closed");
        }
    }
}
