//! Domain error types.

use common::CustomerId;
use thiserror::Error;

use crate::money::Money;
use crate::payment::PaymentError;

/// Errors raised by domain operations.
///
/// A payment that is merely rejected (insufficient funds, invalid price) is
/// not an error: it is reported through the failure messages of a
/// `PaymentEvent`. These variants signal broken invariants or bad input.
#[derive(Debug, Error)]
pub enum DomainError {
    /// An error occurred in the payment aggregate.
    #[error("Payment error: {0}")]
    Payment(#[from] PaymentError),

    /// A debit would have driven a credit entry negative.
    #[error("Customer {customer_id} has {balance} credit, cannot debit {requested}")]
    InsufficientCredit {
        customer_id: CustomerId,
        balance: Money,
        requested: Money,
    },

    /// A stored payment status could not be parsed.
    #[error("Unknown payment status: {0}")]
    UnknownPaymentStatus(String),

    /// A stored transaction type could not be parsed.
    #[error("Unknown transaction type: {0}")]
    UnknownTransactionType(String),
}
