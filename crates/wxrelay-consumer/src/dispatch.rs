//! Delivery dispatch.
//!
//! The handler decides a [`Disposition`]; this module is the only place that
//! turns it into a broker call, exactly once per delivery, sequentially on
//! the session's channel.

use std::future::Future;

use lapin::acker::Acker;
use lapin::message::Delivery;
use lapin::options::{BasicAckOptions, BasicNackOptions};
use tokio_stream::{Stream, StreamExt};
use tracing::{error, info, warn};
use wxrelay_core::Disposition;

use crate::broker::{BrokerError, BrokerSession};
use crate::handler::MessageHandler;
use crate::profile::ConsumerSettings;
use crate::sink::Sink;

/// Single-use acknowledgement handle for one delivery.
pub trait Acknowledger {
    fn ack(&self) -> impl Future<Output = Result<(), BrokerError>>;
    fn nack(&self, requeue: bool) -> impl Future<Output = Result<(), BrokerError>>;
}

impl Acknowledger for Acker {
    async fn ack(&self) -> Result<(), BrokerError> {
        Self::ack(self, BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(|e| BrokerError::Ack(e.to_string()))
    }

    async fn nack(&self, requeue: bool) -> Result<(), BrokerError> {
        Self::nack(
            self,
            BasicNackOptions {
                multiple: false,
                requeue,
            },
        )
        .await
        .map(|_| ())
        .map_err(|e| BrokerError::Ack(e.to_string()))
    }
}

/// A delivered message: body plus its acknowledgement handle.
#[derive(Debug)]
pub struct Envelope<A> {
    pub delivery_tag: u64,
    pub redelivered: bool,
    pub body: Vec<u8>,
    pub acker: A,
}

impl From<Delivery> for Envelope<Acker> {
    fn from(delivery: Delivery) -> Self {
        Self {
            delivery_tag: delivery.delivery_tag,
            redelivered: delivery.redelivered,
            body: delivery.data,
            acker: delivery.acker,
        }
    }
}

/// Apply one disposition through its acknowledger.
pub async fn settle<A: Acknowledger>(
    acker: &A,
    disposition: Disposition,
) -> Result<(), BrokerError> {
    match disposition {
        Disposition::Ack => acker.ack().await,
        Disposition::RejectDiscard => acker.nack(false).await,
        Disposition::RejectRequeue => acker.nack(true).await,
    }
}

/// Per-disposition counters for one drain run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct DrainStats {
    pub acked: u64,
    pub rejected: u64,
    pub requeued: u64,
    /// Dispositions the broker did not accept (channel already gone).
    pub settle_failures: u64,
}

impl DrainStats {
    fn record(&mut self, disposition: Disposition) {
        match disposition {
            Disposition::Ack => self.acked += 1,
            Disposition::RejectDiscard => self.rejected += 1,
            Disposition::RejectRequeue => self.requeued += 1,
        }
    }

    pub const fn total(&self) -> u64 {
        self.acked + self.rejected + self.requeued
    }
}

/// Process deliveries one at a time until the stream ends.
///
/// A stream error ends the drain with that error.
pub async fn drain<St, A, S>(
    mut deliveries: St,
    handler: &MessageHandler<S>,
) -> Result<DrainStats, BrokerError>
where
    St: Stream<Item = Result<Envelope<A>, BrokerError>> + Unpin,
    A: Acknowledger,
    S: Sink,
{
    let mut stats = DrainStats::default();

    while let Some(item) = deliveries.next().await {
        let envelope = match item {
            Ok(envelope) => envelope,
            Err(e) => {
                error!(error = %e, "Delivery stream failed");
                return Err(e);
            }
        };

        let disposition = handler.handle(&envelope.body).await;
        stats.record(disposition);

        match settle(&envelope.acker, disposition).await {
            Ok(()) if disposition.is_ack() => info!(
                delivery_tag = envelope.delivery_tag,
                redelivered = envelope.redelivered,
                disposition = %disposition,
                "Delivery settled"
            ),
            Ok(()) => warn!(
                delivery_tag = envelope.delivery_tag,
                redelivered = envelope.redelivered,
                disposition = %disposition,
                "Delivery settled"
            ),
            Err(e) => {
                stats.settle_failures += 1;
                error!(
                    delivery_tag = envelope.delivery_tag,
                    disposition = %disposition,
                    error = %e,
                    "Failed to settle delivery"
                );
            }
        }
    }

    Ok(stats)
}

/// Long-lived subscription on one queue, owning its broker session.
pub struct RelayConsumer<S> {
    session: BrokerSession,
    settings: ConsumerSettings,
    handler: MessageHandler<S>,
}

impl<S: Sink> RelayConsumer<S> {
    pub const fn new(
        session: BrokerSession,
        settings: ConsumerSettings,
        handler: MessageHandler<S>,
    ) -> Self {
        Self {
            session,
            settings,
            handler,
        }
    }

    /// Subscribe with manual acks and process deliveries until the broker
    /// closes the stream.
    ///
    /// The session must already carry the declared topology (see
    /// [`BrokerSession::connect`]). Connection loss mid-stream ends the call;
    /// it is not recovered here.
    pub async fn start(&self) -> Result<DrainStats, BrokerError> {
        let topology = &self.settings.topology;
        let consumer = self
            .session
            .subscribe(
                &topology.queue,
                &self.settings.consumer_tag,
                self.settings.prefetch,
            )
            .await?;

        info!(
            exchange = %topology.exchange,
            queue = %topology.queue,
            routing_key = %topology.routing_key,
            sink = %self.settings.sink_url,
            "Consumer listening"
        );

        let deliveries = consumer.map(|item| {
            item.map(Envelope::from)
                .map_err(|e| BrokerError::Consume(e.to_string()))
        });
        drain(deliveries, &self.handler).await
    }

    /// Release the broker session.
    pub async fn close(&self) {
        self.session.close().await;
    }
}
