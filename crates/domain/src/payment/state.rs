//! Payment status state machine.

use serde::{Deserialize, Serialize};

use crate::error::DomainError;

/// The status of a payment in its lifecycle.
///
/// State transitions:
/// ```text
/// Initiated ──┬──► Completed ──┬──► Cancelled
///             │                └──► Failed
///             └──► Failed
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum PaymentStatus {
    /// Payment request received, not yet validated.
    #[default]
    Initiated,

    /// Customer was debited.
    Completed,

    /// A completed payment was compensated (terminal state).
    Cancelled,

    /// The payment was rejected (terminal state).
    Failed,
}

impl PaymentStatus {
    /// Returns true if a payment may move from this status to `target`.
    pub fn can_transition_to(&self, target: PaymentStatus) -> bool {
        matches!(
            (self, target),
            (PaymentStatus::Initiated, PaymentStatus::Completed)
                | (PaymentStatus::Initiated, PaymentStatus::Failed)
                | (PaymentStatus::Completed, PaymentStatus::Cancelled)
                | (PaymentStatus::Completed, PaymentStatus::Failed)
        )
    }

    /// Returns true if the payment can be compensated.
    pub fn can_cancel(&self) -> bool {
        self.can_transition_to(PaymentStatus::Cancelled)
    }

    /// Returns true if this is a terminal state (no further transitions possible).
    pub fn is_terminal(&self) -> bool {
        matches!(self, PaymentStatus::Cancelled | PaymentStatus::Failed)
    }

    /// Returns the status name as stored and sent on the wire.
    pub fn as_str(&self) -> &'static str {
        match self {
            PaymentStatus::Initiated => "INITIATED",
            PaymentStatus::Completed => "COMPLETED",
            PaymentStatus::Cancelled => "CANCELLED",
            PaymentStatus::Failed => "FAILED",
        }
    }
}

impl std::fmt::Display for PaymentStatus {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl std::str::FromStr for PaymentStatus {
    type Err = DomainError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "INITIATED" => Ok(PaymentStatus::Initiated),
            "COMPLETED" => Ok(PaymentStatus::Completed),
            "CANCELLED" => Ok(PaymentStatus::Cancelled),
            "FAILED" => Ok(PaymentStatus::Failed),
            other => Err(DomainError::UnknownPaymentStatus(other.to_string())),
        }
    }
}
