//! Payment aggregate and related types.

mod aggregate;
mod events;
mod service;
mod state;

pub use aggregate::Payment;
pub use events::{PaymentEvent, PaymentEventKind};
pub use service::PaymentDomainService;
pub use state::PaymentStatus;

use common::PaymentId;
use thiserror::Error;

/// Errors that can occur during payment operations.
#[derive(Debug, Error)]
pub enum PaymentError {
    /// The payment is not in a status that allows the requested change.
    #[error("Invalid state transition for payment {payment_id}: {current} -> {target}")]
    InvalidStateTransition {
        payment_id: PaymentId,
        current: PaymentStatus,
        target: PaymentStatus,
    },
}
