//! Kafka adapter: producer-backed broker and request consumer loop.

use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use rdkafka::consumer::{CommitMode, Consumer, StreamConsumer};
use rdkafka::message::Message;
use rdkafka::producer::{FutureProducer, FutureRecord};
use rdkafka::util::Timeout;
use rdkafka::{ClientConfig, Offset};
use saga::{
    BrokerError, DeliveryCallback, DeliveryReceipt, DeliveryResult, MessageBroker, OutboundRecord,
};
use store::PaymentStore;
use tokio::sync::watch;

use crate::error::MessagingError;
use crate::listener::{InboundRecord, PaymentRequestListener};

/// Pause before a record that failed with a retryable error is read again.
const REDELIVERY_BACKOFF: Duration = Duration::from_secs(1);

/// Connection settings for the Kafka cluster.
#[derive(Debug, Clone)]
pub struct KafkaConfig {
    pub bootstrap_servers: String,
    pub group_id: String,
    pub request_topic: String,
}

impl KafkaConfig {
    /// Build a ClientConfig for producers.
    fn producer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("message.timeout.ms", "5000");
        config.set("acks", "all");
        config.set("enable.idempotence", "true");
        config
    }

    /// Build a ClientConfig for consumers.
    fn consumer_config(&self) -> ClientConfig {
        let mut config = ClientConfig::new();
        config.set("bootstrap.servers", &self.bootstrap_servers);
        config.set("group.id", &self.group_id);
        config.set("enable.auto.commit", "false");
        config.set("auto.offset.reset", "earliest");
        config
    }
}

/// [`MessageBroker`] backed by an rdkafka `FutureProducer`.
#[derive(Clone)]
pub struct KafkaBroker {
    producer: FutureProducer,
}

impl KafkaBroker {
    pub fn new(config: &KafkaConfig) -> Result<Self, MessagingError> {
        let producer: FutureProducer = config.producer_config().create()?;
        Ok(Self { producer })
    }
}

impl MessageBroker for KafkaBroker {
    fn send(&self, record: OutboundRecord, on_delivery: DeliveryCallback) {
        let producer = self.producer.clone();
        tokio::spawn(async move {
            // Stamped explicitly so the receipt carries the stored CreateTime.
            let created_at = Utc::now();
            let kafka_record = FutureRecord::to(&record.topic)
                .key(&record.key)
                .payload(&record.payload)
                .timestamp(created_at.timestamp_millis());

            let result = match producer.send(kafka_record, Timeout::Never).await {
                Ok((partition, offset)) => {
                    acknowledged(record.topic.clone(), partition, offset, created_at)
                }
                Err((err, _)) => DeliveryResult::Failed(BrokerError::Rejected(err.to_string())),
            };
            on_delivery(result);
        });
    }
}

fn acknowledged(
    topic: String,
    partition: i32,
    offset: i64,
    created_at: DateTime<Utc>,
) -> DeliveryResult {
    DeliveryResult::Acked(DeliveryReceipt {
        topic,
        partition,
        offset,
        timestamp: Some(created_at),
    })
}

/// Creates a consumer subscribed to the request topic.
pub fn request_consumer(config: &KafkaConfig) -> Result<StreamConsumer, MessagingError> {
    let consumer: StreamConsumer = config.consumer_config().create()?;
    consumer.subscribe(&[config.request_topic.as_str()])?;
    tracing::info!(
        topic = %config.request_topic,
        group_id = %config.group_id,
        "subscribed to payment requests"
    );
    Ok(consumer)
}

/// Reads payment requests until `shutdown` flips to true.
///
/// Offsets are committed once a record is processed or dead-lettered. A
/// retryable failure rewinds the partition so the record is read again.
pub async fn run_request_consumer<S>(
    consumer: StreamConsumer,
    listener: Arc<PaymentRequestListener<S>>,
    mut shutdown: watch::Receiver<bool>,
) where
    S: PaymentStore,
{
    loop {
        let message = tokio::select! {
            message = consumer.recv() => message,
            _ = shutdown.changed() => break,
        };

        let message = match message {
            Ok(message) => message,
            Err(err) => {
                tracing::error!(error = %err, "error receiving from kafka");
                continue;
            }
        };

        let record = InboundRecord {
            topic: message.topic().to_string(),
            partition: message.partition(),
            offset: message.offset(),
            key: message
                .key()
                .map(|k| String::from_utf8_lossy(k).into_owned()),
            payload: message.payload().map(<[u8]>::to_vec),
        };

        match listener.on_message(&record).await {
            Ok(_) => {
                if let Err(err) = consumer.commit_message(&message, CommitMode::Async) {
                    tracing::error!(error = %err, "failed to commit offset");
                }
            }
            Err(err) => {
                tracing::warn!(
                    error = %err,
                    offset = record.offset,
                    "rewinding partition for redelivery"
                );
                if let Err(err) = consumer.seek(
                    &record.topic,
                    record.partition,
                    Offset::Offset(record.offset),
                    Duration::from_secs(5),
                ) {
                    tracing::error!(error = %err, "failed to rewind partition");
                }
                tokio::time::sleep(REDELIVERY_BACKOFF).await;
            }
        }
    }
    tracing::info!("payment request consumer stopped");
}
