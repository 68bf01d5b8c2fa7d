//! Payment outcome events.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::{Payment, PaymentStatus};

/// Which outcome a `PaymentEvent` reports.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentEventKind {
    Completed,
    Cancelled,
    Failed,
}

impl PaymentEventKind {
    /// Returns the kind reported for a payment in `status`.
    ///
    /// An `Initiated` payment has not produced an outcome yet and maps to
    /// `None`.
    pub fn for_status(status: PaymentStatus) -> Option<Self> {
        match status {
            PaymentStatus::Initiated => None,
            PaymentStatus::Completed => Some(PaymentEventKind::Completed),
            PaymentStatus::Cancelled => Some(PaymentEventKind::Cancelled),
            PaymentStatus::Failed => Some(PaymentEventKind::Failed),
        }
    }
}

/// The outcome of one payment saga step.
///
/// A single tagged event stands in for separate completed / cancelled /
/// failed event types. Its JSON form is the payload stored in the outbox.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PaymentEvent {
    pub kind: PaymentEventKind,
    pub payment: Payment,
    pub failure_messages: Vec<String>,
    pub created_at: DateTime<Utc>,
}

impl PaymentEvent {
    pub fn completed(payment: Payment) -> Self {
        Self::new(PaymentEventKind::Completed, payment, Vec::new())
    }

    pub fn cancelled(payment: Payment) -> Self {
        Self::new(PaymentEventKind::Cancelled, payment, Vec::new())
    }

    pub fn failed(payment: Payment, failure_messages: Vec<String>) -> Self {
        Self::new(PaymentEventKind::Failed, payment, failure_messages)
    }

    fn new(kind: PaymentEventKind, payment: Payment, failure_messages: Vec<String>) -> Self {
        Self {
            kind,
            payment,
            failure_messages,
            created_at: Utc::now(),
        }
    }

    /// Returns the event type name.
    pub fn event_type(&self) -> &'static str {
        match self.kind {
            PaymentEventKind::Completed => "PaymentCompleted",
            PaymentEventKind::Cancelled => "PaymentCancelled",
            PaymentEventKind::Failed => "PaymentFailed",
        }
    }

    /// Returns true if the step succeeded.
    pub fn is_success(&self) -> bool {
        self.failure_messages.is_empty()
    }

    /// The payment status carried by this event.
    pub fn payment_status(&self) -> PaymentStatus {
        self.payment.status()
    }
}
