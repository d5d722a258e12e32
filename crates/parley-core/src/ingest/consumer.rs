//! Broker-agnostic consumer loop.
//!
//! The loop pulls one delivery at a time, hands its payload to a
//! [`DeliveryHandler`], and settles the delivery according to the returned
//! [`DeliveryOutcome`] before asking for the next one. The broker adapter
//! lives in parley-infra and implements [`DeliverySource`] and [`Delivery`].

use std::future::Future;
use std::sync::Arc;

use thiserror::Error;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info};

use crate::ingest::pipeline::DeliveryOutcome;

/// Failures reported by the broker adapter.
#[derive(Debug, Error)]
pub enum BrokerError {
    #[error("broker connection error: {0}")]
    Connection(String),

    #[error("delivery stream closed by broker")]
    StreamClosed,

    #[error("failed to settle delivery: {0}")]
    Settle(String),
}

/// Why the consumer loop stopped without being asked to.
#[derive(Debug, Error)]
pub enum ConsumerError {
    #[error(transparent)]
    Broker(#[from] BrokerError),

    #[error("storage degraded: {consecutive} consecutive deliveries requeued")]
    StorageDegraded { consecutive: u32 },
}

/// One message received from the broker, settled exactly once.
pub trait Delivery: Send {
    fn payload(&self) -> &[u8];

    /// Positive acknowledgment; the broker drops the message.
    fn ack(self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Negative acknowledgment without requeue.
    fn reject(self) -> impl Future<Output = Result<(), BrokerError>> + Send;

    /// Negative acknowledgment with requeue.
    fn requeue(self) -> impl Future<Output = Result<(), BrokerError>> + Send;
}

/// A subscription yielding deliveries.
pub trait DeliverySource: Send {
    type Delivery: Delivery;

    /// Wait for the next delivery. `None` means the subscription ended.
    ///
    /// Must be cancel-safe: dropping the future before it completes must not
    /// lose a delivery.
    fn next_delivery(
        &mut self,
    ) -> impl Future<Output = Option<Result<Self::Delivery, BrokerError>>> + Send;
}

/// Turns a payload into a settlement decision.
pub trait DeliveryHandler: Send + Sync {
    fn handle(&self, payload: &[u8]) -> impl Future<Output = DeliveryOutcome> + Send;
}

impl<T: DeliveryHandler> DeliveryHandler for Arc<T> {
    fn handle(&self, payload: &[u8]) -> impl Future<Output = DeliveryOutcome> + Send {
        self.as_ref().handle(payload)
    }
}

/// Counters kept for the lifetime of one consumer run.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct ConsumerStats {
    pub acked: u64,
    pub rejected: u64,
    pub requeued: u64,
}

/// Sequential consumer: one delivery is handled and settled before the next
/// is requested.
pub struct QueueConsumer<H: DeliveryHandler> {
    handler: H,
    max_consecutive_failures: u32,
}

impl<H: DeliveryHandler> QueueConsumer<H> {
    /// `max_consecutive_failures` of `0` never escalates.
    pub fn new(handler: H, max_consecutive_failures: u32) -> Self {
        Self {
            handler,
            max_consecutive_failures,
        }
    }

    /// Consume until `shutdown` fires or the broker fails.
    ///
    /// Cancellation is only observed between deliveries; a delivery that has
    /// been received is always handled and settled first.
    pub async fn run<S: DeliverySource>(
        &self,
        source: &mut S,
        shutdown: CancellationToken,
    ) -> Result<ConsumerStats, ConsumerError> {
        let mut stats = ConsumerStats::default();
        let mut consecutive_requeues: u32 = 0;

        loop {
            let next = tokio::select! {
                biased;
                _ = shutdown.cancelled() => {
                    info!(?stats, "Consumer stopping on shutdown signal");
                    return Ok(stats);
                }
                next = source.next_delivery() => next,
            };

            let delivery = match next {
                Some(Ok(delivery)) => delivery,
                Some(Err(e)) => {
                    error!(error = %e, ?stats, "Broker failure, consumer exiting");
                    return Err(e.into());
                }
                None if shutdown.is_cancelled() => {
                    info!(?stats, "Delivery stream ended during shutdown");
                    return Ok(stats);
                }
                None => {
                    error!(?stats, "Delivery stream ended unexpectedly");
                    return Err(BrokerError::StreamClosed.into());
                }
            };

            let outcome = self.handler.handle(delivery.payload()).await;
            match outcome {
                DeliveryOutcome::Ack => {
                    delivery.ack().await?;
                    stats.acked += 1;
                    consecutive_requeues = 0;
                }
                DeliveryOutcome::Reject => {
                    delivery.reject().await?;
                    stats.rejected += 1;
                }
                DeliveryOutcome::Requeue => {
                    delivery.requeue().await?;
                    stats.requeued += 1;
                    consecutive_requeues += 1;

                    if self.max_consecutive_failures > 0
                        && consecutive_requeues >= self.max_consecutive_failures
                    {
                        error!(
                            consecutive = consecutive_requeues,
                            ?stats,
                            "Sustained storage failure, consumer exiting"
                        );
                        return Err(ConsumerError::StorageDegraded {
                            consecutive: consecutive_requeues,
                        });
                    }
                }
            }
            debug!(?outcome, "Delivery settled");
        }
    }
}
