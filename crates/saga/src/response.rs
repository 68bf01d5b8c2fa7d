//! Outbound payment response sent back to the order service.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, PaymentId, SagaId};
use domain::{Money, PaymentEvent, PaymentStatus};
use serde::{Deserialize, Serialize};
use store::OutboxMessage;

use crate::broker::OutboundRecord;

/// The message announcing a payment outcome.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentResponse {
    pub saga_id: SagaId,
    pub order_id: OrderId,
    pub payment_id: PaymentId,
    pub customer_id: CustomerId,
    pub price: Money,
    pub created_at: DateTime<Utc>,
    pub payment_status: PaymentStatus,
    pub failure_messages: Vec<String>,
}

impl PaymentResponse {
    pub fn from_event(saga_id: SagaId, event: &PaymentEvent) -> Self {
        let payment = &event.payment;
        Self {
            saga_id,
            order_id: payment.order_id(),
            payment_id: payment.id(),
            customer_id: payment.customer_id(),
            price: payment.price(),
            created_at: event.created_at,
            payment_status: payment.status(),
            failure_messages: event.failure_messages.clone(),
        }
    }

    /// Rebuilds the response from a stored outbox row.
    pub fn from_outbox(message: &OutboxMessage) -> Result<Self, serde_json::Error> {
        let event: PaymentEvent = serde_json::from_value(message.payload.clone())?;
        Ok(Self::from_event(message.saga_id, &event))
    }

    /// Encodes the response as a record keyed by saga id.
    pub fn to_record(&self, topic: &str) -> Result<OutboundRecord, serde_json::Error> {
        Ok(OutboundRecord {
            topic: topic.to_string(),
            key: self.saga_id.to_string(),
            payload: serde_json::to_vec(self)?,
        })
    }
}
