//! Broker session owned by the consumer.
//!
//! One [`BrokerSession`] holds exactly one connection and one channel. It is
//! never shared with another component; when it dies it is discarded.

use std::fmt::Display;

use lapin::options::{
    BasicConsumeOptions, BasicQosOptions, ExchangeDeclareOptions, QueueBindOptions,
    QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, ExchangeKind};
use tracing::{debug, info};
use wxrelay_core::retry::with_boot_retry;
use wxrelay_core::{BootRetry, Topology};

/// AMQP reply code for a normal shutdown.
const REPLY_SUCCESS: u16 = 200;

/// Errors raised by the broker session.
#[derive(Debug, thiserror::Error)]
pub enum BrokerError {
    #[error("Connection error: {0}")]
    Connect(String),

    #[error("Topology error: {0}")]
    Topology(String),

    #[error("Consume error: {0}")]
    Consume(String),

    #[error("Acknowledgement error: {0}")]
    Ack(String),
}

/// A live connection/channel pair to the broker.
pub struct BrokerSession {
    connection: Connection,
    channel: Channel,
}

impl BrokerSession {
    /// Dial the broker and declare `topology`, retrying both under `policy`.
    ///
    /// A session whose topology could not be declared is closed before the
    /// next attempt.
    pub async fn connect(
        url: &str,
        topology: &Topology,
        policy: BootRetry,
    ) -> Result<Self, BrokerError> {
        establish(
            policy,
            async || Self::open(url).await,
            async |session: &Self| session.declare_topology(topology).await,
            async |session: Self| session.close().await,
        )
        .await
    }

    /// Dial the broker and open a channel.
    pub async fn open(url: &str) -> Result<Self, BrokerError> {
        let connection = Connection::connect(url, ConnectionProperties::default())
            .await
            .map_err(|e| BrokerError::Connect(format!("failed to connect to broker: {e}")))?;
        let channel = connection
            .create_channel()
            .await
            .map_err(|e| BrokerError::Connect(format!("failed to open channel: {e}")))?;
        debug!(channel_id = channel.id(), "Broker channel opened");
        Ok(Self {
            connection,
            channel,
        })
    }

    /// Declare the durable topic exchange and durable queue, then bind them.
    ///
    /// All three operations are idempotent on the broker side.
    pub async fn declare_topology(&self, topology: &Topology) -> Result<(), BrokerError> {
        self.channel
            .exchange_declare(
                &topology.exchange,
                ExchangeKind::Topic,
                ExchangeDeclareOptions {
                    durable: true,
                    ..ExchangeDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                BrokerError::Topology(format!("exchange {}: {e}", topology.exchange))
            })?;

        self.channel
            .queue_declare(
                &topology.queue,
                QueueDeclareOptions {
                    durable: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Topology(format!("queue {}: {e}", topology.queue)))?;

        self.channel
            .queue_bind(
                &topology.queue,
                &topology.exchange,
                &topology.routing_key,
                QueueBindOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(|e| {
                BrokerError::Topology(format!(
                    "bind {} -> {} ({}): {e}",
                    topology.exchange, topology.queue, topology.routing_key
                ))
            })?;

        info!(
            exchange = %topology.exchange,
            queue = %topology.queue,
            routing_key = %topology.routing_key,
            "Topology declared"
        );
        Ok(())
    }

    /// Open a manual-ack subscription on `queue`.
    ///
    /// `prefetch` bounds the number of unacknowledged deliveries in flight;
    /// `0` leaves it unbounded.
    pub async fn subscribe(
        &self,
        queue: &str,
        consumer_tag: &str,
        prefetch: u16,
    ) -> Result<lapin::Consumer, BrokerError> {
        if prefetch > 0 {
            self.channel
                .basic_qos(prefetch, BasicQosOptions::default())
                .await
                .map_err(|e| BrokerError::Consume(format!("qos: {e}")))?;
        }

        self.channel
            .basic_consume(
                queue,
                consumer_tag,
                BasicConsumeOptions {
                    no_ack: false,
                    ..BasicConsumeOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(|e| BrokerError::Consume(format!("queue {queue}: {e}")))
    }

    pub fn is_connected(&self) -> bool {
        self.connection.status().connected()
    }

    /// Close channel then connection. Safe to call on an already dead session.
    pub async fn close(&self) {
        if self.channel.status().connected() {
            if let Err(e) = self.channel.close(REPLY_SUCCESS, "consumer shutdown").await {
                debug!(error = %e, "Channel close failed");
            }
        }
        if self.connection.status().connected() {
            if let Err(e) = self.connection.close(REPLY_SUCCESS, "consumer shutdown").await {
                debug!(error = %e, "Connection close failed");
            }
        }
        info!("Broker session closed");
    }
}

/// Open a session and declare its topology as one unit, retried under `policy`.
///
/// A failed declaration hands the session to `discard` and counts as a
/// failed attempt.
pub async fn establish<S, E>(
    policy: BootRetry,
    mut open: impl AsyncFnMut() -> Result<S, E>,
    mut declare: impl AsyncFnMut(&S) -> Result<(), E>,
    mut discard: impl AsyncFnMut(S),
) -> Result<S, E>
where
    E: Display,
{
    with_boot_retry(policy, "broker topology", async || {
        let session = open().await?;
        match declare(&session).await {
            Ok(()) => Ok(session),
            Err(e) => {
                discard(session).await;
                Err(e)
            }
        }
    })
    .await
}
