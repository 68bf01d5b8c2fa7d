//! Wire messages exchanged with the order service.

use chrono::{DateTime, Utc};
use common::{CustomerId, OrderId, SagaId};
use domain::Money;
use rust_decimal::Decimal;
use saga::{PaymentCommand, PaymentRequest};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::MessagingError;

/// Outbound payment response, as published on the response topic.
pub type PaymentResponseMessage = saga::PaymentResponse;

/// Order-side status carried by a payment request.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentOrderStatus {
    /// The order waits for payment.
    Pending,
    /// The order was cancelled and its payment must be compensated.
    Cancelled,
}

impl From<PaymentOrderStatus> for PaymentCommand {
    fn from(status: PaymentOrderStatus) -> Self {
        match status {
            PaymentOrderStatus::Pending => PaymentCommand::Initiate,
            PaymentOrderStatus::Cancelled => PaymentCommand::Cancel,
        }
    }
}

/// Payment request as published by the order service.
///
/// Identifiers travel as strings and are validated on conversion.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentRequestMessage {
    pub id: String,
    pub saga_id: String,
    pub customer_id: String,
    pub order_id: String,
    pub price: Decimal,
    pub created_at: DateTime<Utc>,
    pub payment_order_status: PaymentOrderStatus,
}

impl PaymentRequestMessage {
    /// Decodes a JSON record payload.
    pub fn decode(payload: &[u8]) -> Result<Self, MessagingError> {
        Ok(serde_json::from_slice(payload)?)
    }

    /// Converts the wire message into a saga request.
    ///
    /// A price the ledger cannot store exactly is rejected here so the record
    /// goes to the dead-letter topic instead of reaching the saga.
    pub fn into_request(self) -> Result<PaymentRequest, MessagingError> {
        let price = Money::new(self.price);
        if !price.is_storable() {
            return Err(MessagingError::InvalidField {
                field: "price",
                value: self.price.to_string(),
            });
        }
        Ok(PaymentRequest {
            saga_id: SagaId::from_uuid(parse_uuid("sagaId", &self.saga_id)?),
            order_id: OrderId::from_uuid(parse_uuid("orderId", &self.order_id)?),
            customer_id: CustomerId::from_uuid(parse_uuid("customerId", &self.customer_id)?),
            price,
            command: self.payment_order_status.into(),
        })
    }
}

fn parse_uuid(field: &'static str, value: &str) -> Result<Uuid, MessagingError> {
    Uuid::parse_str(value).map_err(|_| MessagingError::InvalidField {
        field,
        value: value.to_string(),
    })
}
