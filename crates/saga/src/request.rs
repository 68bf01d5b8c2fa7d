//! Inbound payment requests, decoupled from their wire format.

use common::{CustomerId, OrderId, SagaId};
use domain::{Money, PaymentStatus};
use serde::{Deserialize, Serialize};

use crate::order_processing;

/// What the order service asks the payment step to do.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentCommand {
    /// Charge the customer for the order.
    Initiate,
    /// Compensate a completed payment.
    Cancel,
}

impl PaymentCommand {
    /// Payment statuses that mean this command was already handled for a saga.
    pub fn outcome_statuses(&self) -> &'static [PaymentStatus] {
        match self {
            PaymentCommand::Initiate => &[PaymentStatus::Completed, PaymentStatus::Failed],
            PaymentCommand::Cancel => &[PaymentStatus::Cancelled, PaymentStatus::Failed],
        }
    }

    /// Label used in metrics.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentCommand::Initiate => order_processing::COMMAND_INITIATE,
            PaymentCommand::Cancel => order_processing::COMMAND_CANCEL,
        }
    }
}

impl std::fmt::Display for PaymentCommand {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A payment request for one saga instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentRequest {
    pub saga_id: SagaId,
    pub order_id: OrderId,
    pub customer_id: CustomerId,
    /// Order total to charge.
    pub price: Money,
    pub command: PaymentCommand,
}

impl PaymentRequest {
    pub fn initiate(
        saga_id: SagaId,
        order_id: OrderId,
        customer_id: CustomerId,
        price: Money,
    ) -> Self {
        Self {
            saga_id,
            order_id,
            customer_id,
            price,
            command: PaymentCommand::Initiate,
        }
    }

    pub fn cancel(
        saga_id: SagaId,
        order_id: OrderId,
        customer_id: CustomerId,
        price: Money,
    ) -> Self {
        Self {
            saga_id,
            order_id,
            customer_id,
            price,
            command: PaymentCommand::Cancel,
        }
    }
}
