//! Periodic collect-and-publish loop.

use std::future::Future;
use std::time::Duration;

use tokio::time::{MissedTickBehavior, interval};
use tracing::{info, warn};

use crate::publisher::Producer;
use crate::transport::{PublishError, Transport};
use crate::upstream::{UpstreamError, WeatherClient};

/// Why a collection cycle produced no message.
#[derive(Debug, thiserror::Error)]
pub enum CycleError {
    #[error(transparent)]
    Upstream(#[from] UpstreamError),

    #[error(transparent)]
    Publish(#[from] PublishError),
}

/// Counters for a scheduler run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct CycleStats {
    pub published: u64,
    pub failed: u64,
}

/// Fetches from the upstream source and hands readings to the producer.
pub struct Collector<T> {
    client: WeatherClient,
    producer: Producer<T>,
}

impl<T: Transport> Collector<T> {
    pub const fn new(client: WeatherClient, producer: Producer<T>) -> Self {
        Self { client, producer }
    }

    pub const fn producer(&self) -> &Producer<T> {
        &self.producer
    }

    /// Run one cycle: fetch a reading and publish it.
    pub async fn collect_and_publish(&mut self) -> Result<(), CycleError> {
        let reading = self.client.fetch().await?;
        self.producer.publish(&reading).await?;
        Ok(())
    }

    /// Collect immediately, then every `period`, until `shutdown` resolves.
    ///
    /// A failed cycle is logged and skipped; the loop keeps going.
    pub async fn run(
        &mut self,
        period: Duration,
        shutdown: impl Future<Output = ()>,
    ) -> CycleStats {
        let mut ticker = interval(period);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut stats = CycleStats::default();
        tokio::pin!(shutdown);

        info!(
            source = %self.client.url(),
            period_secs = period.as_secs(),
            "Collector started"
        );

        loop {
            tokio::select! {
                _ = ticker.tick() => {
                    match self.collect_and_publish().await {
                        Ok(()) => stats.published += 1,
                        Err(e) => {
                            stats.failed += 1;
                            warn!(error = %e, "Collection cycle failed");
                        }
                    }
                }
                () = &mut shutdown => {
                    info!(published = stats.published, failed = stats.failed, "Collector stopping");
                    break;
                }
            }
        }
        stats
    }

    /// Close the producer's broker session.
    pub async fn close(&mut self) {
        self.producer.close().await;
    }
}
