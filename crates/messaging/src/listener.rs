//! Payment request listener with dead-letter routing.

use std::sync::Arc;
use std::time::Duration;

use domain::PaymentEvent;
use saga::broker::deliver;
use saga::{MessageBroker, OutboundRecord, PaymentSagaCoordinator};
use serde::Serialize;
use store::PaymentStore;

use crate::error::MessagingError;
use crate::message::PaymentRequestMessage;

/// A record received from the request topic.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InboundRecord {
    pub topic: String,
    pub partition: i32,
    pub offset: i64,
    pub key: Option<String>,
    pub payload: Option<Vec<u8>>,
}

/// What happened to a record that can be committed.
#[derive(Debug, Clone, PartialEq)]
pub enum RecordOutcome {
    /// The saga step handled the request.
    Processed(PaymentEvent),
    /// The record can never succeed and was moved to the dead-letter topic.
    DeadLettered { reason: String },
}

/// Body of a dead-letter record.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct DeadLetter<'a> {
    reason: String,
    source_topic: &'a str,
    source_partition: i32,
    source_offset: i64,
    payload: Option<String>,
}

/// Feeds payment requests into the saga coordinator.
///
/// Records that fail permanently are forwarded to the dead-letter topic and
/// reported as handled. Retryable failures are returned so the caller leaves
/// the offset uncommitted and the record is delivered again.
pub struct PaymentRequestListener<S>
where
    S: PaymentStore,
{
    coordinator: Arc<PaymentSagaCoordinator<S>>,
    broker: Arc<dyn MessageBroker>,
    dlq_topic: String,
    ack_timeout: Duration,
}

impl<S> PaymentRequestListener<S>
where
    S: PaymentStore,
{
    pub fn new(
        coordinator: Arc<PaymentSagaCoordinator<S>>,
        broker: Arc<dyn MessageBroker>,
        dlq_topic: impl Into<String>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            coordinator,
            broker,
            dlq_topic: dlq_topic.into(),
            ack_timeout,
        }
    }

    /// Processes a batch in order, reporting one result per record.
    pub async fn receive(
        &self,
        records: &[InboundRecord],
    ) -> Vec<Result<RecordOutcome, MessagingError>> {
        tracing::info!(
            count = records.len(),
            keys = ?records.iter().map(|r| r.key.as_deref()).collect::<Vec<_>>(),
            partitions = ?records.iter().map(|r| r.partition).collect::<Vec<_>>(),
            offsets = ?records.iter().map(|r| r.offset).collect::<Vec<_>>(),
            "payment requests received"
        );

        let mut results = Vec::with_capacity(records.len());
        for record in records {
            results.push(self.on_message(record).await);
        }
        results
    }

    /// Processes a single record.
    #[tracing::instrument(
        skip(self, record),
        fields(topic = %record.topic, partition = record.partition, offset = record.offset)
    )]
    pub async fn on_message(
        &self,
        record: &InboundRecord,
    ) -> Result<RecordOutcome, MessagingError> {
        match self.process(record).await {
            Ok(event) => Ok(RecordOutcome::Processed(event)),
            Err(err) if err.is_retryable() => {
                tracing::warn!(error = %err, "payment request will be redelivered");
                Err(err)
            }
            Err(err) => {
                tracing::error!(error = %err, "payment request moved to dead-letter topic");
                self.dead_letter(record, &err).await?;
                Ok(RecordOutcome::DeadLettered {
                    reason: err.to_string(),
                })
            }
        }
    }

    async fn process(&self, record: &InboundRecord) -> Result<PaymentEvent, MessagingError> {
        let payload = record
            .payload
            .as_deref()
            .ok_or(MessagingError::EmptyPayload)?;
        let request = PaymentRequestMessage::decode(payload)?.into_request()?;
        Ok(self.coordinator.handle(&request).await?)
    }

    async fn dead_letter(
        &self,
        record: &InboundRecord,
        err: &MessagingError,
    ) -> Result<(), MessagingError> {
        let letter = DeadLetter {
            reason: err.to_string(),
            source_topic: &record.topic,
            source_partition: record.partition,
            source_offset: record.offset,
            payload: record
                .payload
                .as_deref()
                .map(|p| String::from_utf8_lossy(p).into_owned()),
        };
        let outbound = OutboundRecord {
            topic: self.dlq_topic.clone(),
            key: record.key.clone().unwrap_or_default(),
            payload: serde_json::to_vec(&letter)?,
        };

        deliver(self.broker.as_ref(), outbound, self.ack_timeout).await?;
        metrics::counter!("dead_letters_total").increment(1);
        Ok(())
    }
}
