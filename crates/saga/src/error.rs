//! Saga error types.

use common::{CustomerId, OrderId};
use domain::DomainError;
use store::StoreError;
use thiserror::Error;

use crate::broker::BrokerError;

/// Errors that can occur while running the payment saga step.
///
/// Domain rejections are not errors: they come back as a failed
/// `PaymentEvent`.
#[derive(Debug, Error)]
pub enum SagaError {
    /// A cancellation arrived for an order that was never paid.
    #[error("Payment with order id: {0} could not be found")]
    PaymentNotFound(OrderId),

    #[error("Could not find credit entry for customer: {0}")]
    CreditEntryNotFound(CustomerId),

    #[error("Could not find credit history for customer: {0}")]
    CreditHistoryNotFound(CustomerId),

    /// Domain error.
    #[error("Domain error: {0}")]
    Domain(#[from] DomainError),

    /// Payment store error.
    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    /// Serialization error.
    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    /// Broker delivery error.
    #[error("Broker error: {0}")]
    Broker(#[from] BrokerError),
}

impl SagaError {
    /// Returns true if redelivering the same request may succeed.
    ///
    /// Data-integrity problems and malformed data are permanent; storage and
    /// broker outages are not.
    pub fn is_retryable(&self) -> bool {
        match self {
            SagaError::PaymentNotFound(_)
            | SagaError::CreditEntryNotFound(_)
            | SagaError::CreditHistoryNotFound(_)
            | SagaError::Domain(_)
            | SagaError::Serialization(_) => false,
            SagaError::Store(e) => e.is_retryable(),
            SagaError::Broker(_) => true,
        }
    }
}

/// Convenience type alias for saga results.
pub type Result<T> = std::result::Result<T, SagaError>;
