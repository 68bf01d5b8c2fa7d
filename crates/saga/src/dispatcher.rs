//! Re-sends already published outcomes when a duplicate request arrives.

use std::sync::Arc;
use std::time::Duration;

use store::OutboxMessage;

use crate::broker::{DeliveryReceipt, MessageBroker, deliver};
use crate::error::Result;
use crate::response::PaymentResponse;

/// Sends stored payment outcomes straight to the response topic.
///
/// Bypasses the outbox state machine: a row handed to the dispatcher is
/// already `COMPLETED` and stays that way whatever the broker says.
#[derive(Clone)]
pub struct ResponseDispatcher {
    broker: Arc<dyn MessageBroker>,
    topic: String,
    ack_timeout: Duration,
}

impl ResponseDispatcher {
    pub fn new(
        broker: Arc<dyn MessageBroker>,
        topic: impl Into<String>,
        ack_timeout: Duration,
    ) -> Self {
        Self {
            broker,
            topic: topic.into(),
            ack_timeout,
        }
    }

    /// The topic responses are sent to.
    pub fn topic(&self) -> &str {
        &self.topic
    }

    /// Re-sends the payload stored in `message`.
    #[tracing::instrument(skip(self, message), fields(saga_id = %message.saga_id))]
    pub async fn redeliver(&self, message: &OutboxMessage) -> Result<DeliveryReceipt> {
        let record = PaymentResponse::from_outbox(message)?.to_record(&self.topic)?;
        let receipt = deliver(self.broker.as_ref(), record, self.ack_timeout).await?;
        tracing::info!(
            topic = %receipt.topic,
            partition = receipt.partition,
            offset = receipt.offset,
            "payment response re-sent"
        );
        Ok(receipt)
    }
}
