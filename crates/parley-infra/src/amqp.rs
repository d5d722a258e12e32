//! RabbitMQ delivery source backed by lapin.
//!
//! Subscribes with manual acknowledgment so a delivery is only removed from
//! the queue once the ingestion pipeline has decided its outcome. The queue
//! is declared passively: it must already exist.

use futures_util::StreamExt;
use lapin::message::Delivery as LapinDelivery;
use lapin::options::{
    BasicAckOptions, BasicConsumeOptions, BasicNackOptions, BasicQosOptions, QueueDeclareOptions,
};
use lapin::types::FieldTable;
use lapin::{Channel, Connection, ConnectionProperties, Consumer};
use parley_core::ingest::consumer::{BrokerError, Delivery, DeliverySource};
use parley_types::config::AmqpConfig;
use tracing::{info, warn};

const REPLY_SUCCESS: u16 = 200;

fn connection_error(err: lapin::Error) -> BrokerError {
    BrokerError::Connection(err.to_string())
}

fn settle_error(err: lapin::Error) -> BrokerError {
    BrokerError::Settle(err.to_string())
}

/// Options for a single-delivery negative acknowledgment.
///
/// `requeue = false` lets the broker dead-letter or drop the message.
fn nack_options(requeue: bool) -> BasicNackOptions {
    BasicNackOptions {
        multiple: false,
        requeue,
    }
}

/// An open subscription on one queue.
pub struct AmqpSource {
    connection: Connection,
    channel: Channel,
    consumer: Consumer,
    queue: String,
}

impl AmqpSource {
    /// Dial the broker, verify the queue exists, and start consuming.
    pub async fn connect(config: &AmqpConfig) -> Result<Self, BrokerError> {
        let connection = Connection::connect(&config.url, ConnectionProperties::default())
            .await
            .map_err(connection_error)?;
        let channel = connection
            .create_channel()
            .await
            .map_err(connection_error)?;

        channel
            .basic_qos(config.prefetch, BasicQosOptions::default())
            .await
            .map_err(connection_error)?;

        let queue = channel
            .queue_declare(
                &config.queue,
                QueueDeclareOptions {
                    passive: true,
                    ..QueueDeclareOptions::default()
                },
                FieldTable::default(),
            )
            .await
            .map_err(connection_error)?;

        let consumer = channel
            .basic_consume(
                &config.queue,
                &config.consumer_tag,
                BasicConsumeOptions::default(),
                FieldTable::default(),
            )
            .await
            .map_err(connection_error)?;

        info!(
            queue = %config.queue,
            ready = queue.message_count(),
            consumers = queue.consumer_count(),
            prefetch = config.prefetch,
            "Subscribed to queue"
        );

        Ok(Self {
            connection,
            channel,
            consumer,
            queue: config.queue.clone(),
        })
    }

    /// Close the channel and the connection.
    ///
    /// Unsettled deliveries are returned to the queue by the broker.
    pub async fn close(self) -> Result<(), BrokerError> {
        if let Err(e) = self.channel.close(REPLY_SUCCESS, "consumer shutdown").await {
            warn!(queue = %self.queue, error = %e, "Failed to close channel cleanly");
        }
        self.connection
            .close(REPLY_SUCCESS, "consumer shutdown")
            .await
            .map_err(connection_error)?;
        info!(queue = %self.queue, "Broker connection closed");
        Ok(())
    }
}

impl DeliverySource for AmqpSource {
    type Delivery = AmqpDelivery;

    async fn next_delivery(&mut self) -> Option<Result<AmqpDelivery, BrokerError>> {
        self.consumer
            .next()
            .await
            .map(|item| item.map(AmqpDelivery).map_err(connection_error))
    }
}

/// A received message awaiting settlement.
pub struct AmqpDelivery(LapinDelivery);

impl Delivery for AmqpDelivery {
    fn payload(&self) -> &[u8] {
        &self.0.data
    }

    async fn ack(self) -> Result<(), BrokerError> {
        self.0
            .acker
            .ack(BasicAckOptions::default())
            .await
            .map(|_| ())
            .map_err(settle_error)
    }

    async fn reject(self) -> Result<(), BrokerError> {
        self.0
            .acker
            .nack(nack_options(false))
            .await
            .map(|_| ())
            .map_err(settle_error)
    }

    async fn requeue(self) -> Result<(), BrokerError> {
        self.0
            .acker
            .nack(nack_options(true))
            .await
            .map(|_| ())
            .map_err(settle_error)
    }
}
