//! Payment domain for the order fulfillment saga.
//!
//! This crate is free of I/O. It provides:
//! - `Money`, an exact decimal amount
//! - the customer credit ledger (`CreditEntry`, `CreditHistory`)
//! - the `Payment` aggregate and its status state machine
//! - `PaymentEvent`, the tagged outcome of a payment step
//! - `PaymentDomainService`, which validates payments against the ledger

pub mod credit;
pub mod error;
pub mod money;
pub mod payment;

pub use credit::{CreditEntry, CreditHistory, TransactionType};
pub use error::DomainError;
pub use money::Money;
pub use payment::{
    Payment, PaymentDomainService, PaymentError, PaymentEvent, PaymentEventKind, PaymentStatus,
};
